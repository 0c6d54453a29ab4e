//! End-to-end tests driving the public pipeline: source text through the
//! tokenizer and parser, the resulting AST through the code generator.

use kscriptc::ast::{Exp, Program, Stmt};
use kscriptc::codegen::Instruction;
use kscriptc::{CompileError, compile_expression, compile_program};

#[test]
fn parse_unparse_round_trip() {
  for source in ["1 + 2 + 3", "true", "x - 4 + y", "if (b) 1 else 2"] {
    let exp = compile_expression(source).unwrap();
    let reparsed = compile_expression(&exp.to_string()).unwrap();
    assert_eq!(exp, reparsed, "round trip failed for {source}");
  }
}

#[test]
fn parsed_expression_feeds_the_generator() {
  // a = 2; s = "x = ${a+1}"; println(s)
  let interpolated = compile_expression("\"x = ${a+1}\"").unwrap();
  let program = Program::new(vec![
    Stmt::assign("a", compile_expression("2").unwrap()),
    Stmt::assign("s", interpolated),
    Stmt::Println(Exp::var("s")),
  ]);
  let image = compile_program(&program, "Interp", "entry").unwrap();
  let code = &image.method("entry").unwrap().code;

  // the interpolated sum is evaluated and appended, then the string printed
  assert!(code.contains(&Instruction::LdcString("x = ".to_string())));
  assert!(code.contains(&Instruction::Iadd));
  assert!(code.iter().any(|i| matches!(
    i,
    Instruction::InvokeVirtual { name, descriptor, .. }
      if name == "println" && descriptor == "(Ljava/lang/String;)V"
  )));
}

#[test]
fn tokenizer_errors_surface_as_compile_errors() {
  let err = compile_expression("1 + §").unwrap_err();
  assert!(matches!(err, CompileError::Tokenize { .. }));
}

#[test]
fn parser_errors_surface_as_compile_errors() {
  let err = compile_expression("(1 + 2").unwrap_err();
  assert!(matches!(err, CompileError::Parse { .. }));
}

#[test]
fn failed_generation_yields_no_image() {
  let program = Program::new(vec![Stmt::Println(Exp::var("ghost"))]);
  let err = compile_program(&program, "Broken", "entry").unwrap_err();
  assert!(matches!(err, CompileError::CodeGen { .. }));
  assert!(err.to_string().contains("ghost"));
}

#[test]
fn class_image_is_loadable_shape() {
  // minimal program still carries constructor, main and the entry routine
  let image = compile_program(&Program::default(), "Empty", "run").unwrap();
  let names: Vec<&str> = image.methods.iter().map(|m| m.name.as_str()).collect();
  assert_eq!(names, vec!["<init>", "main", "run"]);
  assert_eq!(image.class_name, "Empty");
}
