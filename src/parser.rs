//! Recursive-descent expression parser.
//!
//! Every parse function is a pure function of `(tokens, pos)` returning the
//! parsed node together with the next position; there is no cursor object and
//! no shared state, so speculative parses are discarded simply by not using
//! their result. Optional productions are recognised by peeking, never by
//! catching errors; hard errors are reserved for genuinely malformed input.
//!
//! The grammar, lowest precedence first: conditional expression, additive
//! (`+`/`-`, left-associative), primary (literals, variable references,
//! string literals, parenthesized expressions). A multiplicative layer would
//! slot between additive and primary as one more `parse_x` function; its
//! grammar is not part of this language level.

use crate::ast::{AdditiveOp, Exp};
use crate::error::{ParseError, ParseResult};
use crate::tokenizer::{self, Bracket, Keyword, Op, Token};

/// Parse one expression starting at `pos`.
pub fn parse_exp(tokens: &[Token], pos: usize) -> ParseResult<(Exp, usize)> {
  if read_token(tokens, pos)? == &Token::Keyword(Keyword::If) {
    expect(tokens, pos + 1, &Token::Bracket(Bracket::LParen))?;
    let (condition, next) = parse_exp(tokens, pos + 2)?;
    expect(tokens, next, &Token::Bracket(Bracket::RParen))?;
    let (then_exp, next) = parse_exp(tokens, next + 1)?;

    if tokens.get(next) == Some(&Token::Keyword(Keyword::Else)) {
      let (else_exp, next) = parse_exp(tokens, next + 1)?;
      let exp = Exp::If {
        condition: Box::new(condition),
        then_exp: Box::new(then_exp),
        else_exp: Some(Box::new(else_exp)),
      };
      return Ok((exp, next));
    }

    let exp = Exp::If {
      condition: Box::new(condition),
      then_exp: Box::new(then_exp),
      else_exp: None,
    };
    return Ok((exp, next));
  }

  parse_additive_exp(tokens, pos)
}

/// Additive level: a primary operand extended left-associatively while a
/// `+`/`-` token is present.
pub fn parse_additive_exp(tokens: &[Token], pos: usize) -> ParseResult<(Exp, usize)> {
  let (left, next) = parse_primary(tokens, pos)?;
  parse_additive_helper(tokens, next, left)
}

fn parse_additive_helper(
  tokens: &[Token],
  pos: usize,
  left: Exp,
) -> ParseResult<(Exp, usize)> {
  let mut result = left;
  let mut cur = pos;

  loop {
    let op = match tokens.get(cur) {
      Some(Token::Op(Op::Plus)) => AdditiveOp::Add,
      Some(Token::Op(Op::Minus)) => AdditiveOp::Sub,
      _ => break,
    };
    let (right, next) = parse_primary(tokens, cur + 1)?;
    result = Exp::additive(result, right, op);
    cur = next;
  }

  Ok((result, cur))
}

/// Highest precedence level: literals, variable references, string literals
/// (including interpolation) and parenthesized sub-expressions.
pub fn parse_primary(tokens: &[Token], pos: usize) -> ParseResult<(Exp, usize)> {
  match read_token(tokens, pos)? {
    Token::Ident(name) => Ok((Exp::Var(name.clone()), pos + 1)),
    Token::Int(value) => Ok((Exp::Int(*value), pos + 1)),
    Token::Keyword(Keyword::True) => Ok((Exp::Boolean(true), pos + 1)),
    Token::Keyword(Keyword::False) => Ok((Exp::Boolean(false), pos + 1)),
    Token::Str(value) => Ok((parse_string(value)?, pos + 1)),
    _ => {
      expect(tokens, pos, &Token::Bracket(Bracket::LParen))?;
      let (inner, next) = parse_exp(tokens, pos + 1)?;
      expect(tokens, next, &Token::Bracket(Bracket::RParen))?;
      Ok((inner, next + 1))
    }
  }
}

/// Parse the contents of a string literal, resolving interpolation.
///
/// Scans left to right building the reduced literal (interpolation syntax
/// stripped) and recording `(offset, expression)` pairs, where the offset
/// indexes the reduced literal at the point the interpolated value must be
/// spliced in. Recognised forms:
///
/// 1. `${...}`: the balanced-to-next-`}` substring is tokenized and parsed
///    as a standalone expression; a missing `}` is fatal.
/// 2. `$ident`: a letter after `$` starts a bare identifier of letters and
///    digits.
/// 3. any other `$` (before whitespace, at end of text, etc.) is literal text.
pub fn parse_string(text: &str) -> ParseResult<Exp> {
  let chars: Vec<char> = text.chars().collect();
  let mut reduced = String::new();
  let mut interpolations = Vec::new();
  let mut i = 0;

  while i < chars.len() {
    if chars[i] == '$' && i + 1 < chars.len() {
      if chars[i + 1] == '{' {
        let start = i + 2;
        let mut end = start;
        while end < chars.len() && chars[end] != '}' {
          end += 1;
        }
        if end == chars.len() {
          return Err(ParseError::UnterminatedInterpolation {
            text: text.to_string(),
          });
        }
        let inner: String = chars[start..end].iter().collect();
        interpolations.push((reduced.len(), parse_embedded(&inner, text)?));
        i = end + 1;
        continue;
      }

      if chars[i + 1].is_alphabetic() {
        let start = i + 1;
        let mut end = start + 1;
        while end < chars.len() && chars[end].is_alphanumeric() {
          end += 1;
        }
        let inner: String = chars[start..end].iter().collect();
        interpolations.push((reduced.len(), parse_embedded(&inner, text)?));
        i = end;
        continue;
      }
      // fall through: literal `$`
    }

    reduced.push(chars[i]);
    i += 1;
  }

  Ok(Exp::Str {
    literal: reduced,
    interpolations,
  })
}

/// Recursively invoke the tokenizer and parser on an extracted substring.
fn parse_embedded(inner: &str, context: &str) -> ParseResult<Exp> {
  let tokens =
    tokenizer::tokenize(inner).map_err(|source| ParseError::InterpolationTokenize {
      text: context.to_string(),
      source,
    })?;
  let (exp, _) = parse_exp(&tokens, 0)?;
  Ok(exp)
}

/// Parse a whole token sequence as a single expression; trailing tokens are
/// an error.
pub fn parse_toplevel_exp(tokens: &[Token]) -> ParseResult<Exp> {
  let (exp, next) = parse_exp(tokens, 0)?;
  if next == tokens.len() {
    Ok(exp)
  } else {
    Err(ParseError::TrailingTokens { position: next })
  }
}

fn read_token(tokens: &[Token], pos: usize) -> ParseResult<&Token> {
  tokens
    .get(pos)
    .ok_or(ParseError::OutOfBounds { position: pos })
}

fn expect(tokens: &[Token], pos: usize, expected: &Token) -> ParseResult<()> {
  let actual = read_token(tokens, pos)?;
  if actual == expected {
    Ok(())
  } else {
    Err(ParseError::UnexpectedToken {
      position: pos,
      expected: expected.to_string(),
      actual: actual.to_string(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse_source(source: &str) -> Exp {
    let tokens = tokenizer::tokenize(source).unwrap();
    parse_toplevel_exp(&tokens).unwrap()
  }

  #[test]
  fn addition_is_left_associative() {
    let exp = parse_source("1 + 2 + 3");
    let expected = Exp::additive(
      Exp::additive(Exp::Int(1), Exp::Int(2), AdditiveOp::Add),
      Exp::Int(3),
      AdditiveOp::Add,
    );
    assert_eq!(exp, expected);
  }

  #[test]
  fn parentheses_override_grouping() {
    let exp = parse_source("1 + (2 + 3)");
    let expected = Exp::additive(
      Exp::Int(1),
      Exp::additive(Exp::Int(2), Exp::Int(3), AdditiveOp::Add),
      AdditiveOp::Add,
    );
    assert_eq!(exp, expected);
  }

  #[test]
  fn if_expression_with_else() {
    let exp = parse_source("if (x) 1 else 2");
    let expected = Exp::If {
      condition: Box::new(Exp::var("x")),
      then_exp: Box::new(Exp::Int(1)),
      else_exp: Some(Box::new(Exp::Int(2))),
    };
    assert_eq!(exp, expected);
  }

  #[test]
  fn if_expression_without_else() {
    let exp = parse_source("if (x) 1");
    assert!(matches!(exp, Exp::If { else_exp: None, .. }));
  }

  #[test]
  fn trailing_tokens_are_rejected() {
    let tokens = tokenizer::tokenize("1 + 2 3").unwrap();
    let err = parse_toplevel_exp(&tokens).unwrap_err();
    assert!(matches!(err, ParseError::TrailingTokens { position: 3 }));
  }

  #[test]
  fn empty_input_is_out_of_bounds() {
    let err = parse_toplevel_exp(&[]).unwrap_err();
    assert!(matches!(err, ParseError::OutOfBounds { position: 0 }));
  }

  #[test]
  fn block_interpolation_records_reduced_offset() {
    let exp = parse_string("x = ${a+1}").unwrap();
    let expected = Exp::Str {
      literal: "x = ".to_string(),
      interpolations: vec![(
        4,
        Exp::additive(Exp::var("a"), Exp::Int(1), AdditiveOp::Add),
      )],
    };
    assert_eq!(exp, expected);
  }

  #[test]
  fn bare_identifier_interpolation() {
    let exp = parse_string("count: $n items").unwrap();
    let expected = Exp::Str {
      literal: "count:  items".to_string(),
      interpolations: vec![(7, Exp::var("n"))],
    };
    assert_eq!(exp, expected);
  }

  #[test]
  fn bare_identifier_stops_at_non_alphanumeric() {
    let exp = parse_string("$a+b").unwrap();
    let expected = Exp::Str {
      literal: "+b".to_string(),
      interpolations: vec![(0, Exp::var("a"))],
    };
    assert_eq!(exp, expected);
  }

  #[test]
  fn dollar_before_whitespace_is_literal() {
    let exp = parse_string("costs $ 5").unwrap();
    assert_eq!(exp, Exp::string("costs $ 5"));
  }

  #[test]
  fn dollar_at_end_is_literal() {
    let exp = parse_string("price in $").unwrap();
    assert_eq!(exp, Exp::string("price in $"));
  }

  #[test]
  fn repeated_literal_fragments_keep_distinct_offsets() {
    let exp = parse_string("ab${x}ab${y}").unwrap();
    let Exp::Str {
      literal,
      interpolations,
    } = exp
    else {
      panic!("expected a string expression");
    };
    assert_eq!(literal, "abab");
    assert_eq!(interpolations[0].0, 2);
    assert_eq!(interpolations[1].0, 4);
  }

  #[test]
  fn unterminated_block_interpolation_fails() {
    let err = parse_string("x = ${a+1").unwrap_err();
    assert!(matches!(err, ParseError::UnterminatedInterpolation { .. }));
  }

  #[test]
  fn string_primary_resolves_interpolation() {
    let exp = parse_source("\"n = ${1+2}\"");
    let Exp::Str { interpolations, .. } = exp else {
      panic!("expected a string expression");
    };
    assert_eq!(interpolations.len(), 1);
  }
}
