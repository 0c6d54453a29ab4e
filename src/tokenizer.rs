//! Lexical analysis: turns the raw input string into a vector of tokens.
//!
//! The tokenizer is intentionally tiny: it knows nothing about semantics
//! beyond classifying keywords, literals and operators. Multi-character
//! operators are matched before single-character ones to avoid ambiguity.
//! The parser also re-invokes it on substrings extracted from string
//! interpolation, so tokenizing must stay a pure function of the input text.

use std::fmt;

use crate::error::{TokenizeError, TokenizeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
  If,
  Else,
  While,
  Var,
  Val,
  Fun,
  Return,
  Print,
  Println,
  True,
  False,
}

impl Keyword {
  fn from_ident(text: &str) -> Option<Self> {
    match text {
      "if" => Some(Self::If),
      "else" => Some(Self::Else),
      "while" => Some(Self::While),
      "var" => Some(Self::Var),
      "val" => Some(Self::Val),
      "fun" => Some(Self::Fun),
      "return" => Some(Self::Return),
      "print" => Some(Self::Print),
      "println" => Some(Self::Println),
      "true" => Some(Self::True),
      "false" => Some(Self::False),
      _ => None,
    }
  }

  pub fn text(self) -> &'static str {
    match self {
      Self::If => "if",
      Self::Else => "else",
      Self::While => "while",
      Self::Var => "var",
      Self::Val => "val",
      Self::Fun => "fun",
      Self::Return => "return",
      Self::Print => "print",
      Self::Println => "println",
      Self::True => "true",
      Self::False => "false",
    }
  }
}

/// Operators and punctuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
  Plus,
  Minus,
  Star,
  Slash,
  Percent,
  Assign,
  Not,
  Lt,
  Le,
  Gt,
  Ge,
  EqEq,
  Ne,
  AndAnd,
  OrOr,
  PlusAssign,
  MinusAssign,
  StarAssign,
  SlashAssign,
  PlusPlus,
  MinusMinus,
  Comma,
  Colon,
  Semicolon,
}

impl Op {
  pub fn text(self) -> &'static str {
    match self {
      Self::Plus => "+",
      Self::Minus => "-",
      Self::Star => "*",
      Self::Slash => "/",
      Self::Percent => "%",
      Self::Assign => "=",
      Self::Not => "!",
      Self::Lt => "<",
      Self::Le => "<=",
      Self::Gt => ">",
      Self::Ge => ">=",
      Self::EqEq => "==",
      Self::Ne => "!=",
      Self::AndAnd => "&&",
      Self::OrOr => "||",
      Self::PlusAssign => "+=",
      Self::MinusAssign => "-=",
      Self::StarAssign => "*=",
      Self::SlashAssign => "/=",
      Self::PlusPlus => "++",
      Self::MinusMinus => "--",
      Self::Comma => ",",
      Self::Colon => ":",
      Self::Semicolon => ";",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bracket {
  LParen,
  RParen,
  LBrace,
  RBrace,
  LBracket,
  RBracket,
}

impl Bracket {
  pub fn text(self) -> &'static str {
    match self {
      Self::LParen => "(",
      Self::RParen => ")",
      Self::LBrace => "{",
      Self::RBrace => "}",
      Self::LBracket => "[",
      Self::RBracket => "]",
    }
  }
}

/// A classified lexical token. Produced once, consumed by position index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
  Keyword(Keyword),
  Ident(String),
  Int(i32),
  Str(String),
  Op(Op),
  Bracket(Bracket),
}

impl fmt::Display for Token {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Keyword(kw) => write!(f, "{}", kw.text()),
      Self::Ident(name) => write!(f, "{name}"),
      Self::Int(value) => write!(f, "{value}"),
      Self::Str(value) => write!(f, "\"{value}\""),
      Self::Op(op) => write!(f, "{}", op.text()),
      Self::Bracket(bracket) => write!(f, "{}", bracket.text()),
    }
  }
}

const MULTI_CHAR_OPS: [(&str, Op); 12] = [
  ("==", Op::EqEq),
  ("!=", Op::Ne),
  ("<=", Op::Le),
  (">=", Op::Ge),
  ("&&", Op::AndAnd),
  ("||", Op::OrOr),
  ("+=", Op::PlusAssign),
  ("-=", Op::MinusAssign),
  ("*=", Op::StarAssign),
  ("/=", Op::SlashAssign),
  ("++", Op::PlusPlus),
  ("--", Op::MinusMinus),
];

/// Lex the input into a flat vector of classified tokens.
pub fn tokenize(input: &str) -> TokenizeResult<Vec<Token>> {
  let mut tokens = Vec::new();
  let bytes = input.as_bytes();
  let mut i = 0;

  while i < bytes.len() {
    let c = bytes[i];
    if c.is_ascii_whitespace() {
      i += 1;
      continue;
    }

    if c.is_ascii_digit() {
      let start = i;
      i += 1;
      while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
      }
      let text = &input[start..i];
      let value = text
        .parse::<i32>()
        .map_err(|err| TokenizeError::at(input, start, format!("invalid number: {err}")))?;
      tokens.push(Token::Int(value));
      continue;
    }

    if c.is_ascii_alphabetic() || c == b'_' {
      let start = i;
      i += 1;
      while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
      }
      let text = &input[start..i];
      match Keyword::from_ident(text) {
        Some(keyword) => tokens.push(Token::Keyword(keyword)),
        None => tokens.push(Token::Ident(text.to_string())),
      }
      continue;
    }

    if c == b'"' {
      let (value, next) = lex_string(input, i)?;
      tokens.push(Token::Str(value));
      i = next;
      continue;
    }

    if let Some((text, op)) = MULTI_CHAR_OPS
      .into_iter()
      .find(|(text, _)| input[i..].starts_with(text))
    {
      tokens.push(Token::Op(op));
      i += text.len();
      continue;
    }

    let single = match c {
      b'+' => Some(Token::Op(Op::Plus)),
      b'-' => Some(Token::Op(Op::Minus)),
      b'*' => Some(Token::Op(Op::Star)),
      b'/' => Some(Token::Op(Op::Slash)),
      b'%' => Some(Token::Op(Op::Percent)),
      b'=' => Some(Token::Op(Op::Assign)),
      b'!' => Some(Token::Op(Op::Not)),
      b'<' => Some(Token::Op(Op::Lt)),
      b'>' => Some(Token::Op(Op::Gt)),
      b',' => Some(Token::Op(Op::Comma)),
      b':' => Some(Token::Op(Op::Colon)),
      b';' => Some(Token::Op(Op::Semicolon)),
      b'(' => Some(Token::Bracket(Bracket::LParen)),
      b')' => Some(Token::Bracket(Bracket::RParen)),
      b'{' => Some(Token::Bracket(Bracket::LBrace)),
      b'}' => Some(Token::Bracket(Bracket::RBrace)),
      b'[' => Some(Token::Bracket(Bracket::LBracket)),
      b']' => Some(Token::Bracket(Bracket::RBracket)),
      _ => None,
    };
    if let Some(token) = single {
      tokens.push(token);
      i += 1;
      continue;
    }

    let invalid_char = input[i..].chars().next().unwrap_or('\0');
    return Err(TokenizeError::at(
      input,
      i,
      format!("invalid token: '{invalid_char}'"),
    ));
  }

  Ok(tokens)
}

/// Lex a double-quoted string literal starting at `start`. Returns the
/// unescaped contents and the index just past the closing quote. The `$`
/// interpolation syntax is left untouched here; the parser owns it.
fn lex_string(input: &str, start: usize) -> TokenizeResult<(String, usize)> {
  let bytes = input.as_bytes();
  let mut value = String::new();
  let mut i = start + 1;

  while i < bytes.len() {
    match bytes[i] {
      b'"' => return Ok((value, i + 1)),
      b'\\' => {
        let Some(&escaped) = bytes.get(i + 1) else {
          break;
        };
        let replacement = match escaped {
          b'"' => '"',
          b'\\' => '\\',
          b'n' => '\n',
          b't' => '\t',
          other => {
            return Err(TokenizeError::at(
              input,
              i,
              format!("unknown escape sequence: '\\{}'", other as char),
            ));
          }
        };
        value.push(replacement);
        i += 2;
      }
      _ => {
        let ch = input[i..].chars().next().unwrap_or('\0');
        value.push(ch);
        i += ch.len_utf8();
      }
    }
  }

  Err(TokenizeError::at(input, start, "unterminated string literal"))
}
