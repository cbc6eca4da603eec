//! Shared error utilities used across the compilation pipeline.
//!
//! Each stage owns its own error enum; `CompileError` is the union handed
//! back to callers. Diagnostics point at the offending byte with a caret,
//! in the style of chibicc.

use std::fmt;

use snafu::Snafu;

use crate::codegen::CodegenError;
use crate::parser::ParseError;
use crate::tokenizer::LexError;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu)]
pub enum CompileError {
  #[snafu(context(false), display("{source}"))]
  Lex { source: LexError },

  #[snafu(context(false), display("{source}"))]
  Parse { source: ParseError },

  #[snafu(context(false), display("internal error: {source}"))]
  Codegen { source: CodegenError },
}

impl CompileError {
  /// Byte offset the error is anchored at, if it came from user input.
  pub fn offset(&self) -> Option<usize> {
    match self {
      Self::Lex { source } => Some(source.offset()),
      Self::Parse { source } => Some(source.offset()),
      Self::Codegen { .. } => None,
    }
  }

  /// Render the error for the terminal. Lex and parse failures reprint the
  /// source line with a caret; codegen failures are internal and carry none.
  pub fn render(&self, input: &str) -> String {
    match self.offset() {
      Some(offset) => Diagnostic::at(input, offset, self.to_string()).to_string(),
      None => self.to_string(),
    }
  }
}

/// A caret-pointing report anchored at a byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
  pub line: String,
  pub column: usize,
  pub message: String,
}

impl Diagnostic {
  /// Construct a diagnostic anchored at a specific byte offset in the source.
  ///
  /// The offset is clamped into the source. Only the line containing it is
  /// reproduced, so for single-line input the column equals the offset.
  pub fn at(source: &str, loc: usize, message: impl Into<String>) -> Self {
    let mut safe_loc = loc.min(source.len());
    while !source.is_char_boundary(safe_loc) {
      safe_loc -= 1;
    }
    let line_start = source[..safe_loc].rfind('\n').map_or(0, |i| i + 1);
    let line_end = source[safe_loc..]
      .find('\n')
      .map_or(source.len(), |i| safe_loc + i);

    Self {
      line: source[line_start..line_end].to_string(),
      column: safe_loc - line_start,
      message: message.into(),
    }
  }
}

impl fmt::Display for Diagnostic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}\n{}^ {}",
      self.line,
      " ".repeat(self.column),
      self.message
    )
  }
}
