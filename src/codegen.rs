//! Code generation: lower the AST into an abstract stack-machine
//! instruction stream.
//!
//! The emitter targets a JVM-shaped managed runtime: every expression leaves
//! exactly one value of its static type on the operand stack, statements are
//! stack-neutral, and control flow is resolved through method-scoped labels
//! that the external binary emitter turns into instruction offsets. Locals
//! live in numbered slots handed out per function in first-declaration order.
//!
//! Type correctness is the (external) type checker's job; the checks here
//! exist so the generator fails loudly instead of emitting malformed
//! bytecode.

use std::collections::HashMap;

use crate::ast::{
  AdditiveOp, CompareOp, CompoundOp, Exp, FunctionDecl, LogicalOp, MultiplicativeOp, Program,
  SelfOp, Stmt,
};
use crate::error::{CodeGenError, CodeGenResult};
use crate::ty::{Type, method_descriptor};

const OBJECT_CLASS: &str = "java/lang/Object";
const STRING_BUILDER: &str = "java/lang/StringBuilder";
const STRING_DESCRIPTOR: &str = "Ljava/lang/String;";
const SYSTEM_CLASS: &str = "java/lang/System";
const PRINT_STREAM: &str = "java/io/PrintStream";
const EMPTY_VOID: &str = "()V";

/// A symbolic jump target, scoped to one method. The binary emitter resolves
/// it to an instruction offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(pub u32);

/// Comparison conditions for the two-operand integer branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpCond {
  Lt,
  Le,
  Gt,
  Ge,
  Eq,
  Ne,
}

/// Abstract stack-machine instructions. The external binary emitter maps
/// them onto the target bytecode container and computes max-stack/max-locals.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
  /// Small-constant fast path, valid for -1..=5.
  Iconst(i32),
  Ldc(i32),
  LdcString(String),
  Iload(u16),
  Istore(u16),
  Aload(u16),
  Astore(u16),
  Iinc { slot: u16, delta: i16 },
  Iadd,
  Isub,
  Imul,
  Idiv,
  Irem,
  Iaload,
  Baload,
  Aaload,
  /// Pop two ints, branch if the comparison holds.
  IfIcmp(JumpCond, Label),
  /// Pop one int, branch if it is zero.
  Ifeq(Label),
  /// Pop one int, branch if it is nonzero.
  Ifne(Label),
  Goto(Label),
  /// Definition point of a label.
  Mark(Label),
  GetStatic {
    class: String,
    field: String,
    descriptor: String,
  },
  InvokeStatic {
    class: String,
    name: String,
    descriptor: String,
  },
  InvokeVirtual {
    class: String,
    name: String,
    descriptor: String,
  },
  InvokeSpecial {
    class: String,
    name: String,
    descriptor: String,
  },
  New(String),
  Dup,
  Pop,
  Ireturn,
  Areturn,
  Return,
}

/// One emitted routine: name, calling descriptor and its instruction stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Method {
  pub name: String,
  pub descriptor: String,
  pub code: Vec<Instruction>,
}

/// The completed abstract class: constructor, `main`, one method per
/// declared function and the synthesized entry routine.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassImage {
  pub class_name: String,
  pub methods: Vec<Method>,
}

impl ClassImage {
  pub fn method(&self, name: &str) -> Option<&Method> {
    self.methods.iter().find(|m| m.name == name)
  }
}

/// Storage entry for one declared variable.
#[derive(Debug, Clone)]
struct VariableEntry {
  ty: Type,
  slot: u16,
}

/// In-progress method: instruction buffer plus a monotonically increasing
/// label allocator.
struct MethodBuilder {
  name: String,
  descriptor: String,
  code: Vec<Instruction>,
  next_label: u32,
}

impl MethodBuilder {
  fn new(name: impl Into<String>, descriptor: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      descriptor: descriptor.into(),
      code: Vec::new(),
      next_label: 0,
    }
  }

  fn new_label(&mut self) -> Label {
    let label = Label(self.next_label);
    self.next_label += 1;
    label
  }

  fn emit(&mut self, instruction: Instruction) {
    self.code.push(instruction);
  }

  fn finish(self) -> Method {
    Method {
      name: self.name,
      descriptor: self.descriptor,
      code: self.code,
    }
  }
}

/// Walks a program's AST and emits one method per function plus the entry
/// routine. One generator serves exactly one compilation; create a fresh one
/// per program.
pub struct CodeGenerator {
  class_name: String,
  entry_name: String,
  function_table: HashMap<String, FunctionDecl>,
  variables: HashMap<String, VariableEntry>,
  next_slot: u16,
  return_type: Type,
  method: Option<MethodBuilder>,
  methods: Vec<Method>,
}

impl CodeGenerator {
  pub fn new(class_name: impl Into<String>, entry_name: impl Into<String>) -> Self {
    let class_name = class_name.into();
    let entry_name = entry_name.into();

    // Constructor: call the superclass constructor and return.
    let mut constructor = MethodBuilder::new("<init>", EMPTY_VOID);
    constructor.emit(Instruction::Aload(0));
    constructor.emit(Instruction::InvokeSpecial {
      class: OBJECT_CLASS.to_string(),
      name: "<init>".to_string(),
      descriptor: EMPTY_VOID.to_string(),
    });
    constructor.emit(Instruction::Return);

    // `main` just invokes the synthesized entry routine.
    let mut main = MethodBuilder::new("main", "([Ljava/lang/String;)V");
    main.emit(Instruction::InvokeStatic {
      class: class_name.clone(),
      name: entry_name.clone(),
      descriptor: EMPTY_VOID.to_string(),
    });
    main.emit(Instruction::Return);

    Self {
      class_name,
      entry_name,
      function_table: HashMap::new(),
      variables: HashMap::new(),
      next_slot: 0,
      return_type: Type::Unit,
      method: None,
      methods: vec![constructor.finish(), main.finish()],
    }
  }

  /// Generate the whole program. Consumes the generator so no partial image
  /// can escape on failure.
  pub fn write_program(mut self, program: &Program) -> CodeGenResult<ClassImage> {
    self.load_function_table(program)?;

    // Declaration order, so compiling the same AST twice yields an
    // identical image.
    for stmt in &program.stmts {
      if let Stmt::FunctionDeclare(function) = stmt {
        self.write_function(function)?;
      }
    }
    self.write_entry_point(program)?;

    Ok(ClassImage {
      class_name: self.class_name,
      methods: self.methods,
    })
  }

  /// Pre-pass: hoist every top-level function into the table. The table is
  /// never mutated after this point.
  fn load_function_table(&mut self, program: &Program) -> CodeGenResult<()> {
    for stmt in &program.stmts {
      if let Stmt::FunctionDeclare(function) = stmt {
        if self.function_table.contains_key(&function.name) {
          return Err(CodeGenError::DuplicateFunction {
            name: function.name.clone(),
          });
        }
        self
          .function_table
          .insert(function.name.clone(), function.clone());
      }
    }
    Ok(())
  }

  fn write_function(&mut self, function: &FunctionDecl) -> CodeGenResult<()> {
    let descriptor = method_descriptor(
      function.params.iter().map(|(_, ty)| ty),
      &function.return_type,
    );
    self.function_start(&descriptor, function)?;
    self.write_stmts(&function.body)?;
    if function.return_type == Type::Unit {
      self.builder().emit(Instruction::Return);
    }
    self.function_end();
    Ok(())
  }

  /// The entry routine wraps the program's non-function top-level statements
  /// and always returns void.
  fn write_entry_point(&mut self, program: &Program) -> CodeGenResult<()> {
    let entry = FunctionDecl {
      name: self.entry_name.clone(),
      params: Vec::new(),
      return_type: Type::Unit,
      body: Vec::new(),
    };
    self.function_start(EMPTY_VOID, &entry)?;
    for stmt in &program.stmts {
      if !matches!(stmt, Stmt::FunctionDeclare(_)) {
        self.write_stmt(stmt)?;
      }
    }
    self.builder().emit(Instruction::Return);
    self.function_end();
    Ok(())
  }

  /// Open a method and register its parameters as the first storage slots,
  /// in declaration order.
  fn function_start(&mut self, descriptor: &str, function: &FunctionDecl) -> CodeGenResult<()> {
    debug_assert!(self.method.is_none());
    debug_assert!(self.variables.is_empty());
    debug_assert_eq!(self.next_slot, 0);

    for (param, ty) in &function.params {
      self.add_entry(param, ty.clone())?;
    }
    self.return_type = function.return_type.clone();
    self.method = Some(MethodBuilder::new(&*function.name, descriptor));
    Ok(())
  }

  /// Close the current method and discard all function-scoped state.
  fn function_end(&mut self) {
    let builder = self.method.take().expect("a method must be open");
    self.methods.push(builder.finish());
    self.variables.clear();
    self.next_slot = 0;
    self.return_type = Type::Unit;
  }

  fn builder(&mut self) -> &mut MethodBuilder {
    self.method.as_mut().expect("a method must be open")
  }

  /// Register a variable, handing out the next slot index. Redeclaration in
  /// the same function scope is fatal.
  fn add_entry(&mut self, name: &str, ty: Type) -> CodeGenResult<VariableEntry> {
    if self.variables.contains_key(name) {
      return Err(CodeGenError::DuplicateVariable {
        name: name.to_string(),
      });
    }
    let entry = VariableEntry {
      ty,
      slot: self.next_slot,
    };
    self.next_slot += 1;
    self.variables.insert(name.to_string(), entry.clone());
    Ok(entry)
  }

  fn entry_for(&self, name: &str) -> CodeGenResult<VariableEntry> {
    self
      .variables
      .get(name)
      .cloned()
      .ok_or_else(|| CodeGenError::UndeclaredVariable {
        name: name.to_string(),
      })
  }

  fn load_entry(&mut self, entry: &VariableEntry) {
    let instruction = match entry.ty {
      Type::Int | Type::Boolean => Instruction::Iload(entry.slot),
      _ => Instruction::Aload(entry.slot),
    };
    self.builder().emit(instruction);
  }

  fn store_entry(&mut self, entry: &VariableEntry) {
    let instruction = match entry.ty {
      Type::Int | Type::Boolean => Instruction::Istore(entry.slot),
      _ => Instruction::Astore(entry.slot),
    };
    self.builder().emit(instruction);
  }

  /// Push an integer constant, taking the small-constant fast path when the
  /// target format has one.
  fn write_int_literal(&mut self, value: i32) {
    let instruction = if (-1..=5).contains(&value) {
      Instruction::Iconst(value)
    } else {
      Instruction::Ldc(value)
    };
    self.builder().emit(instruction);
  }

  fn write_stmts(&mut self, stmts: &[Stmt]) -> CodeGenResult<()> {
    for stmt in stmts {
      self.write_stmt(stmt)?;
    }
    Ok(())
  }

  fn write_stmt(&mut self, stmt: &Stmt) -> CodeGenResult<()> {
    match stmt {
      // No code until the first assignment materializes the slot.
      Stmt::VarDeclare { .. } => Ok(()),
      Stmt::Assign {
        variable,
        ty,
        expr,
        read_only: _,
      } => {
        let inferred = self.write_exp(expr)?;
        let declared = ty.clone().unwrap_or(inferred);
        let entry = self.add_entry(variable, declared)?;
        self.store_entry(&entry);
        Ok(())
      }
      Stmt::CompoundAssign { variable, expr, op } => {
        let entry = self.entry_for(variable)?;
        if !entry.ty.is_int() {
          return Err(CodeGenError::IllTypedOperand {
            context: "compound assignment",
            expected: "Int",
          });
        }
        self.load_entry(&entry);
        let ty = self.write_exp(expr)?;
        if !ty.is_int() {
          return Err(CodeGenError::IllTypedOperand {
            context: "compound assignment",
            expected: "Int",
          });
        }
        let instruction = match op {
          CompoundOp::AddAssign => Instruction::Iadd,
          CompoundOp::SubAssign => Instruction::Isub,
          CompoundOp::MulAssign => Instruction::Imul,
          CompoundOp::DivAssign => Instruction::Idiv,
        };
        self.builder().emit(instruction);
        self.store_entry(&entry);
        Ok(())
      }
      Stmt::Print(value) => self.write_print(value, false),
      Stmt::Println(value) => self.write_print(value, true),
      Stmt::If {
        condition,
        true_block,
        false_block,
      } => {
        // if !condition, jump to the false block; the true block jumps past
        // it. An absent else branch is just an empty false block.
        let false_label = self.builder().new_label();
        let after_label = self.builder().new_label();
        self.write_condition(condition)?;
        self.builder().emit(Instruction::Ifeq(false_label));
        self.write_stmts(true_block)?;
        self.builder().emit(Instruction::Goto(after_label));
        self.builder().emit(Instruction::Mark(false_label));
        self.write_stmts(false_block)?;
        self.builder().emit(Instruction::Mark(after_label));
        Ok(())
      }
      Stmt::While { condition, body } => {
        let head = self.builder().new_label();
        let after = self.builder().new_label();
        self.builder().emit(Instruction::Mark(head));
        self.write_condition(condition)?;
        self.builder().emit(Instruction::Ifeq(after));
        self.write_stmts(body)?;
        self.builder().emit(Instruction::Goto(head));
        self.builder().emit(Instruction::Mark(after));
        Ok(())
      }
      Stmt::Return(value) => {
        if let Some(value) = value {
          self.write_exp(value)?;
        }
        let return_type = self.return_type.clone();
        self.write_return_for(&return_type);
        Ok(())
      }
      Stmt::Block(stmts) => self.write_stmts(stmts),
      Stmt::FunctionDeclare(function) => Err(CodeGenError::NestedFunction {
        name: function.name.clone(),
      }),
      Stmt::Call { name, args } => {
        let return_type = self.write_call(name, args)?;
        // result discarded; keep the statement stack-neutral
        if return_type != Type::Unit {
          self.builder().emit(Instruction::Pop);
        }
        Ok(())
      }
    }
  }

  /// Emit a boolean-valued controlling expression.
  fn write_condition(&mut self, condition: &Exp) -> CodeGenResult<()> {
    let ty = self.write_exp(condition)?;
    if ty.is_boolean() {
      Ok(())
    } else {
      Err(CodeGenError::IllTypedOperand {
        context: "condition",
        expected: "Boolean",
      })
    }
  }

  /// Emit one expression, leaving exactly one value of the returned type on
  /// the stack.
  fn write_exp(&mut self, exp: &Exp) -> CodeGenResult<Type> {
    match exp {
      Exp::Int(value) => {
        self.write_int_literal(*value);
        Ok(Type::Int)
      }
      Exp::Boolean(value) => {
        self.write_int_literal(i32::from(*value));
        Ok(Type::Boolean)
      }
      Exp::Str {
        literal,
        interpolations,
      } => {
        self.write_string(literal, interpolations)?;
        Ok(Type::Str)
      }
      Exp::Var(name) => {
        let entry = self.entry_for(name)?;
        self.load_entry(&entry);
        Ok(entry.ty)
      }
      Exp::ArrayIndex { name, index } => self.write_array_index(name, index),
      Exp::SelfOp { name, op, prefix } => self.write_self_op(name, *op, *prefix),
      Exp::Additive { left, right, op } => {
        self.write_int_operand(left)?;
        self.write_int_operand(right)?;
        let instruction = match op {
          AdditiveOp::Add => Instruction::Iadd,
          AdditiveOp::Sub => Instruction::Isub,
        };
        self.builder().emit(instruction);
        Ok(Type::Int)
      }
      Exp::Multiplicative { left, right, op } => {
        self.write_int_operand(left)?;
        self.write_int_operand(right)?;
        let instruction = match op {
          MultiplicativeOp::Mul => Instruction::Imul,
          MultiplicativeOp::Div => Instruction::Idiv,
          MultiplicativeOp::Rem => Instruction::Irem,
        };
        self.builder().emit(instruction);
        Ok(Type::Int)
      }
      Exp::Compare { left, right, op } => {
        self.write_int_operand(left)?;
        self.write_int_operand(right)?;
        self.write_compare_op(*op);
        Ok(Type::Boolean)
      }
      Exp::Not(operand) => {
        self.write_boolean_operand(operand, "logical not")?;
        // branch-on-zero materializes the negation
        let if_zero = self.builder().new_label();
        let after = self.builder().new_label();
        self.builder().emit(Instruction::Ifeq(if_zero));
        self.write_int_literal(0);
        self.builder().emit(Instruction::Goto(after));
        self.builder().emit(Instruction::Mark(if_zero));
        self.write_int_literal(1);
        self.builder().emit(Instruction::Mark(after));
        Ok(Type::Boolean)
      }
      Exp::Logical { left, right, op } => {
        self.write_logical(left, right, *op)?;
        Ok(Type::Boolean)
      }
      Exp::Call { name, args } => self.write_call(name, args),
      Exp::If {
        condition,
        then_exp,
        else_exp,
      } => {
        let Some(else_exp) = else_exp else {
          return Err(CodeGenError::IfWithoutElse);
        };
        let false_label = self.builder().new_label();
        let after_label = self.builder().new_label();
        self.write_condition(condition)?;
        self.builder().emit(Instruction::Ifeq(false_label));
        let ty = self.write_exp(then_exp)?;
        self.builder().emit(Instruction::Goto(after_label));
        self.builder().emit(Instruction::Mark(false_label));
        self.write_exp(else_exp)?;
        self.builder().emit(Instruction::Mark(after_label));
        Ok(ty)
      }
    }
  }

  /// Operand of an integer-only operator.
  fn write_int_operand(&mut self, exp: &Exp) -> CodeGenResult<()> {
    let ty = self.write_exp(exp)?;
    if ty.is_int() {
      Ok(())
    } else {
      Err(CodeGenError::IllTypedOperand {
        context: "integer arithmetic",
        expected: "Int",
      })
    }
  }

  /// Operand of a boolean-only operator.
  fn write_boolean_operand(&mut self, exp: &Exp, context: &'static str) -> CodeGenResult<()> {
    let ty = self.write_exp(exp)?;
    if ty.is_boolean() {
      Ok(())
    } else {
      Err(CodeGenError::IllTypedOperand {
        context,
        expected: "Boolean",
      })
    }
  }

  /// There is no push-able result for a comparison, only branching forms, so
  /// materialize the boolean:
  ///
  /// ```text
  ///   if_icmp<op> true
  ///   push 0
  ///   goto after
  /// true:
  ///   push 1
  /// after:
  /// ```
  fn write_compare_op(&mut self, op: CompareOp) {
    let cond = match op {
      CompareOp::Lt => JumpCond::Lt,
      CompareOp::Le => JumpCond::Le,
      CompareOp::Gt => JumpCond::Gt,
      CompareOp::Ge => JumpCond::Ge,
      CompareOp::Eq => JumpCond::Eq,
      CompareOp::Ne => JumpCond::Ne,
    };
    let condition_true = self.builder().new_label();
    let after_condition = self.builder().new_label();
    self.builder().emit(Instruction::IfIcmp(cond, condition_true));
    self.write_int_literal(0);
    self.builder().emit(Instruction::Goto(after_condition));
    self.builder().emit(Instruction::Mark(condition_true));
    self.write_int_literal(1);
    self.builder().emit(Instruction::Mark(after_condition));
  }

  /// True short-circuit control flow: the right operand's code is only
  /// reached when the left operand has not already decided the result.
  fn write_logical(&mut self, left: &Exp, right: &Exp, op: LogicalOp) -> CodeGenResult<()> {
    let decided = self.builder().new_label();
    let after = self.builder().new_label();

    match op {
      LogicalOp::And => {
        self.write_boolean_operand(left, "logical and")?;
        self.builder().emit(Instruction::Ifeq(decided));
        self.write_boolean_operand(right, "logical and")?;
        self.builder().emit(Instruction::Ifeq(decided));
        self.write_int_literal(1);
        self.builder().emit(Instruction::Goto(after));
        self.builder().emit(Instruction::Mark(decided));
        self.write_int_literal(0);
        self.builder().emit(Instruction::Mark(after));
      }
      LogicalOp::Or => {
        self.write_boolean_operand(left, "logical or")?;
        self.builder().emit(Instruction::Ifne(decided));
        self.write_boolean_operand(right, "logical or")?;
        self.builder().emit(Instruction::Ifne(decided));
        self.write_int_literal(0);
        self.builder().emit(Instruction::Goto(after));
        self.builder().emit(Instruction::Mark(decided));
        self.write_int_literal(1);
        self.builder().emit(Instruction::Mark(after));
      }
    }
    Ok(())
  }

  /// In-place increment/decrement of an integer slot, then a reload so the
  /// expression yields a value. Both prefix and postfix forms observe the
  /// post-mutation value; postfix semantics are a known deviation.
  fn write_self_op(&mut self, name: &str, op: SelfOp, _prefix: bool) -> CodeGenResult<Type> {
    let entry = self.entry_for(name)?;
    if !entry.ty.is_int() {
      return Err(CodeGenError::IllTypedOperand {
        context: "increment/decrement",
        expected: "Int",
      });
    }
    let delta = match op {
      SelfOp::Increment => 1,
      SelfOp::Decrement => -1,
    };
    self.builder().emit(Instruction::Iinc {
      slot: entry.slot,
      delta,
    });
    self.load_entry(&entry);
    Ok(Type::Int)
  }

  /// Indexed read: the base variable's slot is reused, the element type
  /// selects the array-load instruction. The indexed reference itself never
  /// becomes a storage entry.
  fn write_array_index(&mut self, name: &str, index: &Exp) -> CodeGenResult<Type> {
    let entry = self.entry_for(name)?;
    let Some(elem) = entry.ty.elem().cloned() else {
      return Err(CodeGenError::NotAnArray {
        name: name.to_string(),
      });
    };
    self.builder().emit(Instruction::Aload(entry.slot));
    let index_ty = self.write_exp(index)?;
    if !index_ty.is_int() {
      return Err(CodeGenError::IllTypedOperand {
        context: "array index",
        expected: "Int",
      });
    }
    let instruction = match elem {
      Type::Int => Instruction::Iaload,
      Type::Boolean => Instruction::Baload,
      _ => Instruction::Aaload,
    };
    self.builder().emit(instruction);
    Ok(elem)
  }

  /// Resolve the callee, push arguments left-to-right, invoke. The callee's
  /// declared return type propagates to the caller.
  fn write_call(&mut self, name: &str, args: &[Exp]) -> CodeGenResult<Type> {
    let Some(function) = self.function_table.get(name) else {
      return Err(CodeGenError::UnknownFunction {
        name: name.to_string(),
      });
    };
    if function.params.len() != args.len() {
      return Err(CodeGenError::WrongArity {
        name: name.to_string(),
        expected: function.params.len(),
        actual: args.len(),
      });
    }
    let descriptor = method_descriptor(
      function.params.iter().map(|(_, ty)| ty),
      &function.return_type,
    );
    let return_type = function.return_type.clone();

    for arg in args {
      self.write_exp(arg)?;
    }
    let class = self.class_name.clone();
    self.builder().emit(Instruction::InvokeStatic {
      class,
      name: name.to_string(),
      descriptor,
    });
    Ok(return_type)
  }

  /// `print`/`println` pick the output-routine overload matching the value's
  /// static type.
  fn write_print(&mut self, value: &Exp, newline: bool) -> CodeGenResult<()> {
    self.builder().emit(Instruction::GetStatic {
      class: SYSTEM_CLASS.to_string(),
      field: "out".to_string(),
      descriptor: format!("L{PRINT_STREAM};"),
    });
    let ty = self.write_exp(value)?;
    let descriptor = match ty {
      Type::Int => "(I)V",
      Type::Boolean => "(Z)V",
      Type::Str => "(Ljava/lang/String;)V",
      _ => {
        return Err(CodeGenError::IllTypedOperand {
          context: "print",
          expected: "Int, Boolean or String",
        });
      }
    };
    self.builder().emit(Instruction::InvokeVirtual {
      class: PRINT_STREAM.to_string(),
      name: if newline { "println" } else { "print" }.to_string(),
      descriptor: descriptor.to_string(),
    });
    Ok(())
  }

  /// A plain literal is one constant load. With interpolations, literal
  /// segments and evaluated sub-expressions are appended to a string builder
  /// in reduced-offset order.
  fn write_string(
    &mut self,
    literal: &str,
    interpolations: &[(usize, Exp)],
  ) -> CodeGenResult<()> {
    if interpolations.is_empty() {
      self
        .builder()
        .emit(Instruction::LdcString(literal.to_string()));
      return Ok(());
    }

    self
      .builder()
      .emit(Instruction::New(STRING_BUILDER.to_string()));
    self.builder().emit(Instruction::Dup);
    self.builder().emit(Instruction::InvokeSpecial {
      class: STRING_BUILDER.to_string(),
      name: "<init>".to_string(),
      descriptor: EMPTY_VOID.to_string(),
    });

    let mut consumed = 0;
    for (offset, exp) in interpolations {
      if *offset > consumed {
        let segment = literal[consumed..*offset].to_string();
        self.builder().emit(Instruction::LdcString(segment));
        self.write_append(STRING_DESCRIPTOR);
        consumed = *offset;
      }
      let ty = self.write_exp(exp)?;
      let code = match ty {
        Type::Int => "I",
        Type::Boolean => "Z",
        Type::Str => STRING_DESCRIPTOR,
        _ => {
          return Err(CodeGenError::IllTypedOperand {
            context: "string interpolation",
            expected: "Int, Boolean or String",
          });
        }
      };
      self.write_append(code);
    }
    if consumed < literal.len() {
      let segment = literal[consumed..].to_string();
      self.builder().emit(Instruction::LdcString(segment));
      self.write_append(STRING_DESCRIPTOR);
    }

    self.builder().emit(Instruction::InvokeVirtual {
      class: STRING_BUILDER.to_string(),
      name: "toString".to_string(),
      descriptor: format!("(){STRING_DESCRIPTOR}"),
    });
    Ok(())
  }

  fn write_append(&mut self, type_code: &str) {
    self.builder().emit(Instruction::InvokeVirtual {
      class: STRING_BUILDER.to_string(),
      name: "append".to_string(),
      descriptor: format!("({type_code})L{STRING_BUILDER};"),
    });
  }

  /// The declared return type selects the return instruction.
  fn write_return_for(&mut self, ty: &Type) {
    let instruction = match ty {
      Type::Int | Type::Boolean => Instruction::Ireturn,
      Type::Unit => Instruction::Return,
      _ => Instruction::Areturn,
    };
    self.builder().emit(instruction);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn compile(program: Program) -> ClassImage {
    CodeGenerator::new("Demo", "entry")
      .write_program(&program)
      .unwrap()
  }

  fn compile_err(program: Program) -> CodeGenError {
    CodeGenerator::new("Demo", "entry")
      .write_program(&program)
      .unwrap_err()
  }

  fn entry_code(image: &ClassImage) -> &[Instruction] {
    &image.method("entry").unwrap().code
  }

  #[test]
  fn class_skeleton_has_constructor_and_main() {
    let image = compile(Program::default());
    let init = image.method("<init>").unwrap();
    assert_eq!(init.code[0], Instruction::Aload(0));
    let main = image.method("main").unwrap();
    assert_eq!(main.descriptor, "([Ljava/lang/String;)V");
    assert!(matches!(
      &main.code[0],
      Instruction::InvokeStatic { name, .. } if name == "entry"
    ));
  }

  #[test]
  fn small_constants_use_the_fast_path() {
    let program = Program::new(vec![
      Stmt::assign("a", Exp::Int(5)),
      Stmt::assign("b", Exp::Int(6)),
    ]);
    let image = compile(program);
    let code = entry_code(&image);
    assert_eq!(code[0], Instruction::Iconst(5));
    assert_eq!(code[2], Instruction::Ldc(6));
  }

  #[test]
  fn slots_are_handed_out_in_declaration_order() {
    let program = Program::new(vec![
      Stmt::assign("a", Exp::Int(1)),
      Stmt::assign("b", Exp::Int(2)),
      Stmt::assign("c", Exp::string("x")),
    ]);
    let image = compile(program);
    let code = entry_code(&image);
    assert_eq!(code[1], Instruction::Istore(0));
    assert_eq!(code[3], Instruction::Istore(1));
    assert_eq!(code[5], Instruction::Astore(2));
  }

  #[test]
  fn redeclaring_a_variable_fails() {
    let program = Program::new(vec![
      Stmt::assign("a", Exp::Int(1)),
      Stmt::assign("a", Exp::Int(2)),
    ]);
    let err = compile_err(program);
    assert!(matches!(err, CodeGenError::DuplicateVariable { name } if name == "a"));
  }

  #[test]
  fn compound_assignment_loads_applies_and_stores() {
    let program = Program::new(vec![
      Stmt::assign("i", Exp::Int(0)),
      Stmt::CompoundAssign {
        variable: "i".to_string(),
        expr: Exp::Int(1),
        op: CompoundOp::AddAssign,
      },
    ]);
    let image = compile(program);
    let code = entry_code(&image);
    assert_eq!(
      &code[2..6],
      &[
        Instruction::Iload(0),
        Instruction::Iconst(1),
        Instruction::Iadd,
        Instruction::Istore(0),
      ]
    );
  }

  #[test]
  fn while_loop_shape() {
    // i = 0; while (i < 3) { println(i); i += 1 }
    let program = Program::new(vec![
      Stmt::assign("i", Exp::Int(0)),
      Stmt::While {
        condition: Exp::compare(Exp::var("i"), Exp::Int(3), CompareOp::Lt),
        body: vec![
          Stmt::Println(Exp::var("i")),
          Stmt::CompoundAssign {
            variable: "i".to_string(),
            expr: Exp::Int(1),
            op: CompoundOp::AddAssign,
          },
        ],
      },
    ]);
    let image = compile(program);
    let code = entry_code(&image);

    let head = Label(0);
    let after = Label(1);
    let head_at = code.iter().position(|i| *i == Instruction::Mark(head)).unwrap();
    let exit_at = code.iter().position(|i| *i == Instruction::Ifeq(after)).unwrap();
    let back_at = code.iter().position(|i| *i == Instruction::Goto(head)).unwrap();
    let after_at = code.iter().position(|i| *i == Instruction::Mark(after)).unwrap();
    assert!(head_at < exit_at && exit_at < back_at && back_at < after_at);
    // the body's print sits inside the loop
    let print_at = code
      .iter()
      .position(|i| matches!(i, Instruction::InvokeVirtual { name, .. } if name == "println"))
      .unwrap();
    assert!(exit_at < print_at && print_at < back_at);
  }

  #[test]
  fn if_without_else_still_defines_the_false_block() {
    let program = Program::new(vec![Stmt::If {
      condition: Exp::Boolean(true),
      true_block: vec![Stmt::assign("a", Exp::Int(1))],
      false_block: vec![],
    }]);
    let image = compile(program);
    let code = entry_code(&image);
    let false_label = Label(0);
    let goto_at = code
      .iter()
      .position(|i| matches!(i, Instruction::Goto(_)))
      .unwrap();
    let mark_at = code
      .iter()
      .position(|i| *i == Instruction::Mark(false_label))
      .unwrap();
    assert!(goto_at < mark_at);
  }

  #[test]
  fn logical_and_short_circuits() {
    let program = Program::new(vec![
      Stmt::assign("a", Exp::Boolean(true)),
      Stmt::assign("b", Exp::Boolean(false)),
      Stmt::assign(
        "c",
        Exp::logical(Exp::var("a"), Exp::var("b"), LogicalOp::And),
      ),
    ]);
    let image = compile(program);
    let code = entry_code(&image);
    // left operand load, branch that can skip the right operand, right load
    let left_at = code.iter().position(|i| *i == Instruction::Iload(0)).unwrap();
    let skip_at = code[left_at..]
      .iter()
      .position(|i| matches!(i, Instruction::Ifeq(_)))
      .unwrap()
      + left_at;
    let right_at = code.iter().position(|i| *i == Instruction::Iload(1)).unwrap();
    assert!(left_at < skip_at && skip_at < right_at);
  }

  #[test]
  fn logical_or_branches_on_nonzero() {
    let program = Program::new(vec![
      Stmt::assign("a", Exp::Boolean(true)),
      Stmt::assign(
        "b",
        Exp::logical(Exp::var("a"), Exp::Boolean(false), LogicalOp::Or),
      ),
    ]);
    let image = compile(program);
    assert!(
      entry_code(&image)
        .iter()
        .any(|i| matches!(i, Instruction::Ifne(_)))
    );
  }

  #[test]
  fn comparison_materializes_zero_and_one() {
    let program = Program::new(vec![Stmt::assign(
      "b",
      Exp::compare(Exp::Int(1), Exp::Int(2), CompareOp::Le),
    )]);
    let image = compile(program);
    let code = entry_code(&image);
    assert_eq!(
      &code[..3],
      &[
        Instruction::Iconst(1),
        Instruction::Iconst(2),
        Instruction::IfIcmp(JumpCond::Le, Label(0)),
      ]
    );
    assert!(code.contains(&Instruction::Iconst(0)));
  }

  #[test]
  fn increment_uses_iinc_and_reloads() {
    let program = Program::new(vec![
      Stmt::assign("i", Exp::Int(0)),
      Stmt::assign(
        "j",
        Exp::SelfOp {
          name: "i".to_string(),
          op: SelfOp::Increment,
          prefix: false,
        },
      ),
    ]);
    let image = compile(program);
    let code = entry_code(&image);
    assert_eq!(
      &code[2..5],
      &[
        Instruction::Iinc { slot: 0, delta: 1 },
        Instruction::Iload(0),
        Instruction::Istore(1),
      ]
    );
  }

  #[test]
  fn print_selects_the_matching_overload() {
    let program = Program::new(vec![
      Stmt::assign("n", Exp::Int(1)),
      Stmt::assign("s", Exp::string("hi")),
      Stmt::Print(Exp::var("n")),
      Stmt::Println(Exp::var("s")),
    ]);
    let image = compile(program);
    let overloads: Vec<&str> = entry_code(&image)
      .iter()
      .filter_map(|i| match i {
        Instruction::InvokeVirtual {
          class, descriptor, ..
        } if class == PRINT_STREAM => Some(descriptor.as_str()),
        _ => None,
      })
      .collect();
    assert_eq!(overloads, vec!["(I)V", "(Ljava/lang/String;)V"]);
  }

  #[test]
  fn interpolated_string_concatenates_through_a_builder() {
    // "x = ${a+1}" with a bound beforehand
    let program = Program::new(vec![
      Stmt::assign("a", Exp::Int(2)),
      Stmt::assign(
        "s",
        Exp::Str {
          literal: "x = ".to_string(),
          interpolations: vec![(
            4,
            Exp::additive(Exp::var("a"), Exp::Int(1), AdditiveOp::Add),
          )],
        },
      ),
    ]);
    let image = compile(program);
    let code = entry_code(&image);
    assert!(code.contains(&Instruction::New(STRING_BUILDER.to_string())));
    assert!(code.contains(&Instruction::LdcString("x = ".to_string())));
    let appends: Vec<&str> = code
      .iter()
      .filter_map(|i| match i {
        Instruction::InvokeVirtual {
          name, descriptor, ..
        } if name == "append" => Some(descriptor.as_str()),
        _ => None,
      })
      .collect();
    assert_eq!(
      appends,
      vec![
        "(Ljava/lang/String;)Ljava/lang/StringBuilder;",
        "(I)Ljava/lang/StringBuilder;",
      ]
    );
    assert!(
      code
        .iter()
        .any(|i| matches!(i, Instruction::InvokeVirtual { name, .. } if name == "toString"))
    );
  }

  #[test]
  fn function_call_resolves_descriptor_and_return_type() {
    let double = FunctionDecl {
      name: "double".to_string(),
      params: vec![("n".to_string(), Type::Int)],
      return_type: Type::Int,
      body: vec![Stmt::Return(Some(Exp::additive(
        Exp::var("n"),
        Exp::var("n"),
        AdditiveOp::Add,
      )))],
    };
    let program = Program::new(vec![
      Stmt::FunctionDeclare(double),
      Stmt::assign("x", Exp::call("double", vec![Exp::Int(21)])),
    ]);
    let image = compile(program);

    let double_method = image.method("double").unwrap();
    assert_eq!(double_method.descriptor, "(I)I");
    assert_eq!(double_method.code.last(), Some(&Instruction::Ireturn));

    let code = entry_code(&image);
    assert!(code.iter().any(|i| matches!(
      i,
      Instruction::InvokeStatic { name, descriptor, .. }
        if name == "double" && descriptor == "(I)I"
    )));
    // int result stored into an int slot
    assert!(code.contains(&Instruction::Istore(0)));
  }

  #[test]
  fn call_to_unknown_function_names_it() {
    let program = Program::new(vec![Stmt::Call {
      name: "missing".to_string(),
      args: vec![],
    }]);
    let err = compile_err(program);
    assert!(matches!(err, CodeGenError::UnknownFunction { ref name } if name == "missing"));
    assert!(err.to_string().contains("missing"));
  }

  #[test]
  fn discarded_call_result_is_popped() {
    let f = FunctionDecl {
      name: "f".to_string(),
      params: vec![],
      return_type: Type::Int,
      body: vec![Stmt::Return(Some(Exp::Int(1)))],
    };
    let program = Program::new(vec![
      Stmt::FunctionDeclare(f),
      Stmt::Call {
        name: "f".to_string(),
        args: vec![],
      },
    ]);
    let image = compile(program);
    assert!(entry_code(&image).contains(&Instruction::Pop));
  }

  #[test]
  fn parameters_occupy_the_first_slots() {
    let f = FunctionDecl {
      name: "addmul".to_string(),
      params: vec![("a".to_string(), Type::Int), ("b".to_string(), Type::Int)],
      return_type: Type::Int,
      body: vec![
        Stmt::assign("c", Exp::additive(Exp::var("a"), Exp::var("b"), AdditiveOp::Add)),
        Stmt::Return(Some(Exp::var("c"))),
      ],
    };
    let program = Program::new(vec![Stmt::FunctionDeclare(f)]);
    let image = compile(program);
    let code = &image.method("addmul").unwrap().code;
    assert_eq!(
      &code[..4],
      &[
        Instruction::Iload(0),
        Instruction::Iload(1),
        Instruction::Iadd,
        Instruction::Istore(2),
      ]
    );
  }

  #[test]
  fn duplicate_function_names_are_rejected() {
    let f = FunctionDecl {
      name: "f".to_string(),
      params: vec![],
      return_type: Type::Unit,
      body: vec![],
    };
    let program = Program::new(vec![
      Stmt::FunctionDeclare(f.clone()),
      Stmt::FunctionDeclare(f),
    ]);
    let err = compile_err(program);
    assert!(matches!(err, CodeGenError::DuplicateFunction { name } if name == "f"));
  }

  #[test]
  fn array_read_reuses_the_base_slot() {
    let f = FunctionDecl {
      name: "first".to_string(),
      params: vec![("xs".to_string(), Type::array_of(Type::Int))],
      return_type: Type::Int,
      body: vec![Stmt::Return(Some(Exp::ArrayIndex {
        name: "xs".to_string(),
        index: Box::new(Exp::Int(0)),
      }))],
    };
    let program = Program::new(vec![Stmt::FunctionDeclare(f)]);
    let image = compile(program);
    let code = &image.method("first").unwrap().code;
    assert_eq!(
      &code[..3],
      &[
        Instruction::Aload(0),
        Instruction::Iconst(0),
        Instruction::Iaload,
      ]
    );
  }

  #[test]
  fn variables_do_not_leak_across_functions() {
    let f = FunctionDecl {
      name: "f".to_string(),
      params: vec![],
      return_type: Type::Unit,
      body: vec![Stmt::assign("local", Exp::Int(1))],
    };
    let program = Program::new(vec![
      Stmt::FunctionDeclare(f),
      // reading f's local from the entry routine must fail
      Stmt::Println(Exp::var("local")),
    ]);
    let err = compile_err(program);
    assert!(matches!(err, CodeGenError::UndeclaredVariable { name } if name == "local"));
  }

  #[test]
  fn compiling_the_same_ast_twice_is_idempotent() {
    let program = Program::new(vec![
      Stmt::assign("i", Exp::Int(0)),
      Stmt::While {
        condition: Exp::compare(Exp::var("i"), Exp::Int(3), CompareOp::Lt),
        body: vec![
          Stmt::Println(Exp::var("i")),
          Stmt::CompoundAssign {
            variable: "i".to_string(),
            expr: Exp::Int(1),
            op: CompoundOp::AddAssign,
          },
        ],
      },
    ]);
    let first = compile(program.clone());
    let second = compile(program);
    assert_eq!(first, second);
  }
}
