//! Shared error utilities used across the compilation pipeline.
//!
//! Each stage owns a dedicated error enum so callers can tell a malformed
//! token sequence apart from a semantically inconsistent AST. All of them are
//! fatal for the compilation unit: there is no partial-success mode and no
//! partial artifact.

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;
pub type TokenizeResult<T> = Result<T, TokenizeError>;
pub type ParseResult<T> = Result<T, ParseError>;
pub type CodeGenResult<T> = Result<T, CodeGenError>;

/// Lexical failure, anchored at a byte offset in the raw source string.
#[derive(Debug, Snafu)]
pub enum TokenizeError {
  #[snafu(display("{expr_line}\n{marker} {message}"))]
  WithLocation {
    expr_line: String,
    marker: String,
    message: String,
  },
}

impl TokenizeError {
  /// Construct an error anchored at a specific byte offset in the source.
  pub fn at(expr: &str, loc: usize, message: impl Into<String>) -> Self {
    let expr_line = format!("'{expr}'");
    let safe_loc = loc.min(expr.len());
    let char_offset = expr[..safe_loc].chars().count() + 1; // account for opening quote
    let marker = format!("{}^", " ".repeat(char_offset));
    Self::WithLocation {
      expr_line,
      marker,
      message: message.into(),
    }
  }
}

/// Syntactic failure, anchored at a token position.
#[derive(Debug, Snafu)]
pub enum ParseError {
  #[snafu(display("position {position}: expected {expected}, but got {actual}"))]
  UnexpectedToken {
    position: usize,
    expected: String,
    actual: String,
  },
  #[snafu(display("token position out of bounds: {position}"))]
  OutOfBounds { position: usize },
  #[snafu(display("extra tokens at end, starting at position {position}"))]
  TrailingTokens { position: usize },
  #[snafu(display("invalid string interpolation: expected `}}` in \"{text}\""))]
  UnterminatedInterpolation { text: String },
  #[snafu(display("invalid string interpolation \"{text}\": {source}"))]
  InterpolationTokenize {
    text: String,
    source: TokenizeError,
  },
}

/// Semantic inconsistency detected while emitting instructions. These should
/// have been caught by the (external) type checker; the generator still
/// checks so that it fails loudly instead of emitting malformed bytecode.
#[derive(Debug, Snafu)]
pub enum CodeGenError {
  #[snafu(display("no such variable declared: {name}"))]
  UndeclaredVariable { name: String },
  #[snafu(display("variable already in scope: {name}"))]
  DuplicateVariable { name: String },
  #[snafu(display("duplicate function name: {name}"))]
  DuplicateFunction { name: String },
  #[snafu(display("call to nonexistent function: {name}"))]
  UnknownFunction { name: String },
  #[snafu(display("call to {name} passes {actual} arguments, expected {expected}"))]
  WrongArity {
    name: String,
    expected: usize,
    actual: usize,
  },
  #[snafu(display("function declaration is only allowed at top level: {name}"))]
  NestedFunction { name: String },
  #[snafu(display("if expression requires an else branch"))]
  IfWithoutElse,
  #[snafu(display("variable {name} is not an array"))]
  NotAnArray { name: String },
  #[snafu(display("operand of {context} must be {expected}"))]
  IllTypedOperand {
    context: &'static str,
    expected: &'static str,
  },
}

/// Umbrella for the public pipeline entry points.
#[derive(Debug, Snafu)]
pub enum CompileError {
  #[snafu(display("{source}"), context(false))]
  Tokenize { source: TokenizeError },
  #[snafu(display("{source}"), context(false))]
  Parse { source: ParseError },
  #[snafu(display("{source}"), context(false))]
  CodeGen { source: CodeGenError },
}
