//! Lexical analysis: turns the raw input string into a vector of tokens.
//!
//! The tokenizer knows nothing about semantics beyond recognising
//! punctuators, identifiers, keywords and decimal literals. Multi-character
//! punctuators are matched before single-character ones (maximal munch), and
//! the output always ends with a zero-length `Eof` token.

use snafu::Snafu;
use tracing::debug;

/// Failures raised while splitting the source into tokens.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LexError {
  #[snafu(display("invalid token: '{found}'"))]
  UnexpectedCharacter { offset: usize, found: char },

  #[snafu(display("invalid number: {text}"))]
  MalformedNumber { offset: usize, text: String },
}

impl LexError {
  /// Byte offset of the offending input.
  pub fn offset(&self) -> usize {
    match self {
      Self::UnexpectedCharacter { offset, .. } | Self::MalformedNumber { offset, .. } => *offset,
    }
  }
}

pub type LexResult<T> = Result<T, LexError>;

/// Reserved words. Anything else spelled like an identifier is one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
  Return,
  If,
  Else,
  While,
  For,
}

impl Keyword {
  const ALL: [Keyword; 5] = [
    Keyword::Return,
    Keyword::If,
    Keyword::Else,
    Keyword::While,
    Keyword::For,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Keyword::Return => "return",
      Keyword::If => "if",
      Keyword::Else => "else",
      Keyword::While => "while",
      Keyword::For => "for",
    }
  }

  fn lookup(text: &str) -> Option<Keyword> {
    Self::ALL.into_iter().find(|kw| kw.as_str() == text)
  }
}

/// Kinds of tokens recognised by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  Punctuator,
  Ident,
  Keyword(Keyword),
  Num,
  Eof,
}

/// Thin wrapper for lexical information needed by later stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
  pub kind: TokenKind,
  pub value: Option<i64>,
  pub loc: usize,
  pub len: usize,
}

impl Token {
  /// Convenience constructor to keep the `tokenize` loop readable.
  pub fn new(kind: TokenKind, loc: usize, len: usize, value: Option<i64>) -> Self {
    Self {
      kind,
      value,
      loc,
      len,
    }
  }
}

const TWO_CHAR_PUNCTUATORS: [&str; 4] = ["==", "!=", "<=", ">="];

fn is_ident_start(c: u8) -> bool {
  c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_continue(c: u8) -> bool {
  c.is_ascii_alphanumeric() || c == b'_'
}

/// Lex the input into a flat vector of tokens terminated by an `Eof` marker.
pub fn tokenize(input: &str) -> LexResult<Vec<Token>> {
  let mut tokens = Vec::new();
  let bytes = input.as_bytes();
  let mut i = 0;

  while i < bytes.len() {
    let c = bytes[i];
    if c.is_ascii_whitespace() {
      i += 1;
      continue;
    }

    if is_ident_start(c) {
      let start = i;
      i += 1;
      while i < bytes.len() && is_ident_continue(bytes[i]) {
        i += 1;
      }
      let kind = match Keyword::lookup(&input[start..i]) {
        Some(kw) => TokenKind::Keyword(kw),
        None => TokenKind::Ident,
      };
      tokens.push(Token::new(kind, start, i - start, None));
      continue;
    }

    if let Some(op) = TWO_CHAR_PUNCTUATORS
      .into_iter()
      .find(|op| input[i..].starts_with(op))
    {
      tokens.push(Token::new(TokenKind::Punctuator, i, op.len(), None));
      i += op.len();
      continue;
    }

    if matches!(
      c,
      b'+' | b'-' | b'*' | b'/' | b'(' | b')' | b'<' | b'>' | b';' | b'=' | b'{' | b'}' | b','
    ) {
      tokens.push(Token::new(TokenKind::Punctuator, i, 1, None));
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
      let value = text.parse::<i64>().map_err(|_| {
        MalformedNumberSnafu {
          offset: start,
          text,
        }
        .build()
      })?;
      tokens.push(Token::new(TokenKind::Num, start, i - start, Some(value)));
      continue;
    }

    let found = input[i..].chars().next().unwrap_or('\0');
    return UnexpectedCharacterSnafu { offset: i, found }.fail();
  }

  tokens.push(Token::new(TokenKind::Eof, input.len(), 0, None));
  debug!(count = tokens.len(), "tokenized input");
  Ok(tokens)
}

/// Return the slice from the source that produced this token.
pub fn token_text<'a>(token: &Token, source: &'a str) -> &'a str {
  let end = token.loc + token.len;
  &source[token.loc..end]
}

/// Human-friendly description used in diagnostics.
pub fn describe_token(token: Option<&Token>, source: &str) -> String {
  match token {
    Some(t) => match t.kind {
      TokenKind::Eof => "EOF".to_string(),
      _ => token_text(t, source).to_string(),
    },
    None => "EOF".to_string(),
  }
}
