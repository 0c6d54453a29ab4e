//! AST produced by the parser and consumed by the code generator.
//!
//! Every node is immutable and structurally comparable. The `Display` impls
//! unparse a node back to semantically equivalent source, which keeps
//! diagnostics readable and gives the test suite a round-trip handle.

use std::fmt;

use crate::ty::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdditiveOp {
  Add,
  Sub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiplicativeOp {
  Mul,
  Div,
  Rem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
  Lt,
  Le,
  Gt,
  Ge,
  Eq,
  Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
  And,
  Or,
}

/// In-place mutation of an integer variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfOp {
  Increment,
  Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompoundOp {
  AddAssign,
  SubAssign,
  MulAssign,
  DivAssign,
}

/// Expression tree. `Str` carries the literal text with every interpolation
/// placeholder excised plus ordered `(offset, expression)` pairs, where the
/// offset indexes the reduced literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Exp {
  Int(i32),
  Boolean(bool),
  Str {
    literal: String,
    interpolations: Vec<(usize, Exp)>,
  },
  Var(String),
  ArrayIndex {
    name: String,
    index: Box<Exp>,
  },
  SelfOp {
    name: String,
    op: SelfOp,
    prefix: bool,
  },
  Additive {
    left: Box<Exp>,
    right: Box<Exp>,
    op: AdditiveOp,
  },
  Multiplicative {
    left: Box<Exp>,
    right: Box<Exp>,
    op: MultiplicativeOp,
  },
  Compare {
    left: Box<Exp>,
    right: Box<Exp>,
    op: CompareOp,
  },
  Not(Box<Exp>),
  Logical {
    left: Box<Exp>,
    right: Box<Exp>,
    op: LogicalOp,
  },
  Call {
    name: String,
    args: Vec<Exp>,
  },
  If {
    condition: Box<Exp>,
    then_exp: Box<Exp>,
    else_exp: Option<Box<Exp>>,
  },
}

impl Exp {
  pub fn string(literal: impl Into<String>) -> Self {
    Self::Str {
      literal: literal.into(),
      interpolations: Vec::new(),
    }
  }

  pub fn var(name: impl Into<String>) -> Self {
    Self::Var(name.into())
  }

  pub fn additive(left: Exp, right: Exp, op: AdditiveOp) -> Self {
    Self::Additive {
      left: Box::new(left),
      right: Box::new(right),
      op,
    }
  }

  pub fn multiplicative(left: Exp, right: Exp, op: MultiplicativeOp) -> Self {
    Self::Multiplicative {
      left: Box::new(left),
      right: Box::new(right),
      op,
    }
  }

  pub fn compare(left: Exp, right: Exp, op: CompareOp) -> Self {
    Self::Compare {
      left: Box::new(left),
      right: Box::new(right),
      op,
    }
  }

  pub fn logical(left: Exp, right: Exp, op: LogicalOp) -> Self {
    Self::Logical {
      left: Box::new(left),
      right: Box::new(right),
      op,
    }
  }

  pub fn not(operand: Exp) -> Self {
    Self::Not(Box::new(operand))
  }

  pub fn call(name: impl Into<String>, args: Vec<Exp>) -> Self {
    Self::Call {
      name: name.into(),
      args,
    }
  }
}

/// A declared function, stored both as a statement and in the function table.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
  pub name: String,
  /// Parameters in declaration order; order determines slot indices.
  pub params: Vec<(String, Type)>,
  pub return_type: Type,
  pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
  /// Declaration without initializer. No code is emitted; the slot
  /// materializes on first assignment.
  VarDeclare {
    variable: String,
    ty: Option<Type>,
    read_only: bool,
  },
  Assign {
    variable: String,
    ty: Option<Type>,
    expr: Exp,
    read_only: bool,
  },
  CompoundAssign {
    variable: String,
    expr: Exp,
    op: CompoundOp,
  },
  Print(Exp),
  Println(Exp),
  If {
    condition: Exp,
    true_block: Vec<Stmt>,
    false_block: Vec<Stmt>,
  },
  While {
    condition: Exp,
    body: Vec<Stmt>,
  },
  Return(Option<Exp>),
  Block(Vec<Stmt>),
  FunctionDeclare(FunctionDecl),
  /// A call used as a statement; the result, if any, is discarded.
  Call {
    name: String,
    args: Vec<Exp>,
  },
}

impl Stmt {
  pub fn assign(variable: impl Into<String>, expr: Exp) -> Self {
    Self::Assign {
      variable: variable.into(),
      ty: None,
      expr,
      read_only: false,
    }
  }
}

/// An ordered sequence of top-level statements. `FunctionDeclare` entries are
/// hoisted into the function table before generation; the remainder form the
/// body of the synthesized entry routine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
  pub stmts: Vec<Stmt>,
}

impl Program {
  pub fn new(stmts: Vec<Stmt>) -> Self {
    Self { stmts }
  }
}

impl fmt::Display for AdditiveOp {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Add => "+",
      Self::Sub => "-",
    })
  }
}

impl fmt::Display for MultiplicativeOp {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Mul => "*",
      Self::Div => "/",
      Self::Rem => "%",
    })
  }
}

impl fmt::Display for CompareOp {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Lt => "<",
      Self::Le => "<=",
      Self::Gt => ">",
      Self::Ge => ">=",
      Self::Eq => "==",
      Self::Ne => "!=",
    })
  }
}

impl fmt::Display for LogicalOp {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::And => "&&",
      Self::Or => "||",
    })
  }
}

impl fmt::Display for Exp {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Int(value) => write!(f, "{value}"),
      Self::Boolean(value) => write!(f, "{value}"),
      Self::Str {
        literal,
        interpolations,
      } => {
        write!(f, "\"")?;
        let mut pending = interpolations.iter().peekable();
        for (offset, ch) in literal.char_indices() {
          while let Some((at, exp)) = pending.peek()
            && *at == offset
          {
            write!(f, "${{{exp}}}")?;
            pending.next();
          }
          write!(f, "{ch}")?;
        }
        // interpolations anchored past the last literal character
        for (_, exp) in pending {
          write!(f, "${{{exp}}}")?;
        }
        write!(f, "\"")
      }
      Self::Var(name) => write!(f, "{name}"),
      Self::ArrayIndex { name, index } => write!(f, "{name}[{index}]"),
      Self::SelfOp { name, op, prefix } => {
        let op = match op {
          SelfOp::Increment => "++",
          SelfOp::Decrement => "--",
        };
        if *prefix {
          write!(f, "{op}{name}")
        } else {
          write!(f, "{name}{op}")
        }
      }
      Self::Additive { left, right, op } => write!(f, "{left} {op} {right}"),
      Self::Multiplicative { left, right, op } => write!(f, "{left} {op} {right}"),
      Self::Compare { left, right, op } => write!(f, "{left} {op} {right}"),
      Self::Not(operand) => write!(f, "!{operand}"),
      Self::Logical { left, right, op } => write!(f, "{left} {op} {right}"),
      Self::Call { name, args } => {
        write!(f, "{name}(")?;
        for (i, arg) in args.iter().enumerate() {
          if i > 0 {
            write!(f, ", ")?;
          }
          write!(f, "{arg}")?;
        }
        write!(f, ")")
      }
      Self::If {
        condition,
        then_exp,
        else_exp,
      } => {
        write!(f, "if ({condition}) {then_exp}")?;
        if let Some(else_exp) = else_exp {
          write!(f, " else {else_exp}")?;
        }
        Ok(())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unparse_arithmetic() {
    let exp = Exp::additive(
      Exp::additive(Exp::Int(1), Exp::Int(2), AdditiveOp::Add),
      Exp::Int(3),
      AdditiveOp::Add,
    );
    assert_eq!(exp.to_string(), "1 + 2 + 3");
  }

  #[test]
  fn unparse_interpolated_string() {
    let exp = Exp::Str {
      literal: "x = ".to_string(),
      interpolations: vec![(
        4,
        Exp::additive(Exp::var("a"), Exp::Int(1), AdditiveOp::Add),
      )],
    };
    assert_eq!(exp.to_string(), "\"x = ${a + 1}\"");
  }

  #[test]
  fn unparse_if_expression() {
    let exp = Exp::If {
      condition: Box::new(Exp::var("b")),
      then_exp: Box::new(Exp::Int(1)),
      else_exp: Some(Box::new(Exp::Int(2))),
    };
    assert_eq!(exp.to_string(), "if (b) 1 else 2");
  }
}
