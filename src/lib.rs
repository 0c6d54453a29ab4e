//! Crate root: wires together the compilation pipeline.
//!
//! The stages are intentionally small and composable so they can be evolved
//! independently:
//! - `tokenizer` performs lexical analysis and produces a flat token stream.
//! - `parser` owns all syntactic knowledge and returns the expression AST,
//!   including string-interpolation sub-parsing.
//! - `codegen` lowers a program into an abstract stack-machine instruction
//!   stream grouped per method; an external binary emitter turns that into
//!   the final class file.
//! - `error` centralises the per-stage error types.
//!
//! Statement and program grammars are not part of this language level, so
//! `Program` values are built directly from `ast` nodes; `compile_expression`
//! covers the expression-only parse path.

pub mod ast;
pub mod codegen;
pub mod error;
pub mod parser;
pub mod tokenizer;
pub mod ty;

pub use codegen::{ClassImage, CodeGenerator, Instruction};
pub use error::{CompileError, CompileResult};

/// Tokenize and parse a source string as a single expression.
pub fn compile_expression(source: &str) -> CompileResult<ast::Exp> {
  let tokens = tokenizer::tokenize(source)?;
  Ok(parser::parse_toplevel_exp(&tokens)?)
}

/// Generate the abstract class image for a program. Each call uses a fresh
/// generator; nothing is shared between compilations.
pub fn compile_program(
  program: &ast::Program,
  class_name: &str,
  entry_name: &str,
) -> CompileResult<ClassImage> {
  Ok(CodeGenerator::new(class_name, entry_name).write_program(program)?)
}
