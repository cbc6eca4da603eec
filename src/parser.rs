//! Recursive-descent parser producing functions, statement trees and
//! per-function local symbol tables.
//!
//! The parser mirrors the classic chibicc structure: a precedence-climbing
//! set of helpers for expressions with a thin statement layer on top.
//! Variables are resolved to frame offsets while parsing, so the code
//! generator never sees a name for a local.
//!
//! ```text
//! program    = function* | stmt*
//! function   = ident "(" (ident ("," ident)*)? ")" "{" stmt* "}"
//! stmt       = "return" expr ";"
//!            | "if" "(" expr ")" stmt ("else" stmt)?
//!            | "while" "(" expr ")" stmt
//!            | "for" "(" expr? ";" expr? ";" expr? ")" stmt
//!            | "{" stmt* "}"
//!            | expr? ";"
//! expr       = assign
//! assign     = equality ("=" assign)?
//! equality   = relational ("==" relational | "!=" relational)*
//! relational = add ("<" add | "<=" add | ">" add | ">=" add)*
//! add        = mul ("+" mul | "-" mul)*
//! mul        = unary ("*" unary | "/" unary)*
//! unary      = ("+" | "-") unary | primary
//! primary    = "(" expr ")" | ident ("(" (assign ("," assign)*)? ")")? | num
//! ```

use std::collections::HashMap;

use snafu::{Snafu, ensure};
use tracing::debug;

use crate::tokenizer::{Keyword, Token, TokenKind, describe_token, token_text};

/// Size of one stack slot in bytes.
pub const WORD_SIZE: i64 = 8;

/// Stack frames are rounded up to this many bytes.
pub const STACK_ALIGN: i64 = 16;

/// Integer argument registers available in the System V calling convention.
pub const MAX_REG_ARGS: usize = 6;

/// Failures raised while building the AST.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ParseError {
  #[snafu(display("expected \"{expected}\", but got \"{found}\""))]
  ExpectedToken {
    expected: String,
    found: String,
    offset: usize,
  },

  #[snafu(display("expected a number, but got \"{found}\""))]
  ExpectedNumber { found: String, offset: usize },

  #[snafu(display("expected an identifier, but got \"{found}\""))]
  ExpectedIdentifier { found: String, offset: usize },

  #[snafu(display(
    "call to \"{name}\" passes {count} arguments, at most 6 are supported"
  ))]
  TooManyArguments {
    name: String,
    count: usize,
    offset: usize,
  },

  #[snafu(display(
    "function \"{name}\" declares {count} parameters, at most 6 are supported"
  ))]
  TooManyParameters {
    name: String,
    count: usize,
    offset: usize,
  },

  #[snafu(display("parameter \"{name}\" is declared twice"))]
  DuplicateParameter { name: String, offset: usize },

  #[snafu(display("\"{name}\" is a register name and cannot name a function"))]
  RegisterName { name: String, offset: usize },

  #[snafu(display("left side of \"=\" is not assignable"))]
  NotAnLvalue { offset: usize },
}

impl ParseError {
  /// Byte offset of the offending token.
  pub fn offset(&self) -> usize {
    match self {
      Self::ExpectedToken { offset, .. }
      | Self::ExpectedNumber { offset, .. }
      | Self::ExpectedIdentifier { offset, .. }
      | Self::TooManyArguments { offset, .. }
      | Self::TooManyParameters { offset, .. }
      | Self::DuplicateParameter { offset, .. }
      | Self::RegisterName { offset, .. }
      | Self::NotAnLvalue { offset } => *offset,
    }
  }
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Binary operators that survive parsing. `>` and `>=` are rewritten into
/// `Lt`/`Le` with swapped operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  Eq,
  Ne,
  Lt,
  Le,
}

/// Expression and statement tree produced by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AstNode {
  Num {
    value: i64,
  },
  Var {
    offset: i64,
  },
  Assign {
    lhs: Box<AstNode>,
    rhs: Box<AstNode>,
  },
  Binary {
    op: BinaryOp,
    lhs: Box<AstNode>,
    rhs: Box<AstNode>,
  },
  Call {
    name: String,
    args: Vec<AstNode>,
  },
  ExprStmt {
    expr: Box<AstNode>,
  },
  Return {
    expr: Box<AstNode>,
  },
  If {
    cond: Box<AstNode>,
    then: Box<AstNode>,
    els: Option<Box<AstNode>>,
  },
  While {
    cond: Box<AstNode>,
    body: Box<AstNode>,
  },
  For {
    init: Option<Box<AstNode>>,
    cond: Option<Box<AstNode>>,
    inc: Option<Box<AstNode>>,
    body: Box<AstNode>,
  },
  Block {
    body: Vec<AstNode>,
  },
}

impl AstNode {
  pub fn number(value: i64) -> Self {
    Self::Num { value }
  }

  pub fn var(offset: i64) -> Self {
    Self::Var { offset }
  }

  pub fn binary(op: BinaryOp, lhs: AstNode, rhs: AstNode) -> Self {
    Self::Binary {
      op,
      lhs: Box::new(lhs),
      rhs: Box::new(rhs),
    }
  }

  pub fn assign(lhs: AstNode, rhs: AstNode) -> Self {
    Self::Assign {
      lhs: Box::new(lhs),
      rhs: Box::new(rhs),
    }
  }

  pub fn expr_stmt(expr: AstNode) -> Self {
    Self::ExprStmt {
      expr: Box::new(expr),
    }
  }

  pub fn block(body: Vec<AstNode>) -> Self {
    Self::Block { body }
  }

  /// Short name of the variant, used when reporting internal errors.
  pub fn kind_name(&self) -> &'static str {
    match self {
      Self::Num { .. } => "number",
      Self::Var { .. } => "variable",
      Self::Assign { .. } => "assignment",
      Self::Binary { .. } => "binary expression",
      Self::Call { .. } => "call",
      Self::ExprStmt { .. } => "expression statement",
      Self::Return { .. } => "return",
      Self::If { .. } => "if",
      Self::While { .. } => "while",
      Self::For { .. } => "for",
      Self::Block { .. } => "block",
    }
  }
}

/// A local variable or parameter and its slot below the frame pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVar {
  pub name: String,
  pub offset: i64,
}

/// Function-scoped symbol table. Iteration follows first-use order and a
/// name keeps the offset it was first given.
#[derive(Debug, Clone, Default)]
pub struct Locals {
  vars: Vec<LocalVar>,
  index: HashMap<String, usize>,
}

impl Locals {
  /// Look up `name`, allocating the next slot on first use.
  pub fn resolve(&mut self, name: &str) -> i64 {
    if let Some(&idx) = self.index.get(name) {
      return self.vars[idx].offset;
    }
    let offset = (self.vars.len() as i64 + 1) * WORD_SIZE;
    self.index.insert(name.to_string(), self.vars.len());
    self.vars.push(LocalVar {
      name: name.to_string(),
      offset,
    });
    offset
  }

  pub fn get(&self, name: &str) -> Option<&LocalVar> {
    self.index.get(name).map(|&idx| &self.vars[idx])
  }

  pub fn iter(&self) -> impl Iterator<Item = &LocalVar> {
    self.vars.iter()
  }

  pub fn len(&self) -> usize {
    self.vars.len()
  }

  pub fn is_empty(&self) -> bool {
    self.vars.is_empty()
  }

  /// Bytes to reserve below the frame pointer.
  pub fn frame_size(&self) -> i64 {
    let deepest = self.vars.iter().map(|var| var.offset).max().unwrap_or(0);
    align_to(deepest, STACK_ALIGN)
  }
}

/// Whether the assembler would read `name` as a register. Output is
/// Intel syntax without `%` prefixes, so such names cannot be symbols.
pub fn is_register_name(name: &str) -> bool {
  const NAMED: [&str; 42] = [
    "rax", "rbx", "rcx", "rdx", "rsi", "rdi", "rbp", "rsp", "rip", "eax", "ebx", "ecx", "edx",
    "esi", "edi", "ebp", "esp", "eip", "ax", "bx", "cx", "dx", "si", "di", "bp", "sp", "ip", "al",
    "bl", "cl", "dl", "ah", "bh", "ch", "dh", "sil", "dil", "bpl", "spl", "st", "fs", "gs",
  ];
  const SEGMENTS: [&str; 4] = ["cs", "ds", "es", "ss"];
  const NUMBERED: [&str; 7] = ["xmm", "ymm", "zmm", "mm", "cr", "dr", "k"];

  let lower = name.to_ascii_lowercase();
  if NAMED.contains(&lower.as_str()) || SEGMENTS.contains(&lower.as_str()) {
    return true;
  }

  let is_number = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
  if NUMBERED
    .iter()
    .any(|prefix| lower.strip_prefix(prefix).is_some_and(is_number))
  {
    return true;
  }

  // r8..r15 with an optional d/w/b/l width suffix.
  lower.strip_prefix('r').is_some_and(|rest| {
    let digits = rest
      .strip_suffix(['d', 'w', 'b', 'l'])
      .unwrap_or(rest);
    is_number(digits) && digits.parse::<u8>().is_ok_and(|n| (8..=15).contains(&n))
  })
}

/// Round `n` up to the nearest multiple of `align`.
pub fn align_to(n: i64, align: i64) -> i64 {
  (n + align - 1) / align * align
}

/// A parsed function definition.
#[derive(Debug, Clone)]
pub struct Function {
  pub name: String,
  pub params: Vec<LocalVar>,
  pub body: AstNode,
  pub locals: Locals,
  pub stack_size: i64,
}

/// The whole translation unit, functions in source order.
#[derive(Debug, Clone)]
pub struct Program {
  pub functions: Vec<Function>,
}

/// Parse a translation unit from the token stream.
///
/// Input that does not open with a function definition is treated as the
/// body of an implicit `main`.
pub fn parse(tokens: Vec<Token>, source: &str) -> ParseResult<Program> {
  let mut parser = Parser::new(tokens, source);

  let functions = if parser.stream.starts_function_definition() {
    let mut functions = Vec::new();
    while !parser.stream.is_eof() {
      functions.push(parser.parse_function()?);
    }
    functions
  } else {
    vec![parser.parse_implicit_main()?]
  };

  debug!(functions = functions.len(), "parsed translation unit");
  Ok(Program { functions })
}

struct Parser<'a> {
  stream: TokenStream<'a>,
  locals: Locals,
}

impl<'a> Parser<'a> {
  fn new(tokens: Vec<Token>, source: &'a str) -> Self {
    Self {
      stream: TokenStream::new(tokens, source),
      locals: Locals::default(),
    }
  }

  fn parse_function(&mut self) -> ParseResult<Function> {
    let (name, loc) = self.stream.get_ident()?;
    ensure!(
      !is_register_name(name),
      RegisterNameSnafu { name, offset: loc }
    );
    self.locals = Locals::default();

    self.stream.skip("(")?;
    let mut params = Vec::new();
    if !self.stream.equal(")") {
      loop {
        let (param, param_loc) = self.stream.get_ident()?;
        ensure!(
          self.locals.get(param).is_none(),
          DuplicateParameterSnafu {
            name: param,
            offset: param_loc,
          }
        );
        let offset = self.locals.resolve(param);
        params.push(LocalVar {
          name: param.to_string(),
          offset,
        });
        if self.stream.equal(")") {
          break;
        }
        self.stream.skip(",")?;
      }
    }
    ensure!(
      params.len() <= MAX_REG_ARGS,
      TooManyParametersSnafu {
        name,
        count: params.len(),
        offset: loc,
      }
    );

    self.stream.skip("{")?;
    let body = self.parse_compound_stmt()?;
    Ok(self.finish_function(name, params, body))
  }

  fn parse_implicit_main(&mut self) -> ParseResult<Function> {
    let mut body = Vec::new();
    while !self.stream.is_eof() {
      body.push(self.parse_stmt()?);
    }
    Ok(self.finish_function("main", Vec::new(), AstNode::block(body)))
  }

  fn finish_function(&mut self, name: &str, params: Vec<LocalVar>, body: AstNode) -> Function {
    let locals = std::mem::take(&mut self.locals);
    let stack_size = locals.frame_size();
    debug!(
      function = name,
      locals = locals.len(),
      stack_size,
      "parsed function"
    );
    Function {
      name: name.to_string(),
      params,
      body,
      locals,
      stack_size,
    }
  }

  fn parse_stmt(&mut self) -> ParseResult<AstNode> {
    if self.stream.equal_keyword(Keyword::Return) {
      let expr = self.parse_expr()?;
      self.stream.skip(";")?;
      return Ok(AstNode::Return {
        expr: Box::new(expr),
      });
    }

    if self.stream.equal_keyword(Keyword::If) {
      self.stream.skip("(")?;
      let cond = self.parse_expr()?;
      self.stream.skip(")")?;
      let then = self.parse_stmt()?;
      let els = if self.stream.equal_keyword(Keyword::Else) {
        Some(Box::new(self.parse_stmt()?))
      } else {
        None
      };
      return Ok(AstNode::If {
        cond: Box::new(cond),
        then: Box::new(then),
        els,
      });
    }

    if self.stream.equal_keyword(Keyword::While) {
      self.stream.skip("(")?;
      let cond = self.parse_expr()?;
      self.stream.skip(")")?;
      let body = self.parse_stmt()?;
      return Ok(AstNode::While {
        cond: Box::new(cond),
        body: Box::new(body),
      });
    }

    if self.stream.equal_keyword(Keyword::For) {
      self.stream.skip("(")?;
      let init = self.parse_optional_expr(";")?;
      self.stream.skip(";")?;
      let cond = self.parse_optional_expr(";")?;
      self.stream.skip(";")?;
      let inc = self.parse_optional_expr(")")?;
      self.stream.skip(")")?;
      let body = self.parse_stmt()?;
      return Ok(AstNode::For {
        init,
        cond,
        inc,
        body: Box::new(body),
      });
    }

    if self.stream.equal("{") {
      return self.parse_compound_stmt();
    }

    self.parse_expr_stmt()
  }

  /// Parse the statements of a block whose `{` was already consumed.
  fn parse_compound_stmt(&mut self) -> ParseResult<AstNode> {
    let mut body = Vec::new();
    while !self.stream.equal("}") {
      if self.stream.is_eof() {
        return Err(self.stream.expected_token("}"));
      }
      body.push(self.parse_stmt()?);
    }
    Ok(AstNode::block(body))
  }

  fn parse_expr_stmt(&mut self) -> ParseResult<AstNode> {
    // A lone `;` is the null statement.
    if self.stream.equal(";") {
      return Ok(AstNode::block(Vec::new()));
    }
    let expr = self.parse_expr()?;
    self.stream.skip(";")?;
    Ok(AstNode::expr_stmt(expr))
  }

  /// Parse an expression unless the next token is `terminator`.
  fn parse_optional_expr(&mut self, terminator: &str) -> ParseResult<Option<Box<AstNode>>> {
    if self.stream.peek_punct() == Some(terminator) {
      return Ok(None);
    }
    Ok(Some(Box::new(self.parse_expr()?)))
  }

  fn parse_expr(&mut self) -> ParseResult<AstNode> {
    self.parse_assign()
  }

  fn parse_assign(&mut self) -> ParseResult<AstNode> {
    let node = self.parse_equality()?;

    let eq_loc = self.stream.peek().map(|token| token.loc);
    if self.stream.equal("=") {
      if !matches!(node, AstNode::Var { .. }) {
        return NotAnLvalueSnafu {
          offset: eq_loc.unwrap_or_default(),
        }
        .fail();
      }
      let rhs = self.parse_assign()?;
      return Ok(AstNode::assign(node, rhs));
    }

    Ok(node)
  }

  fn parse_equality(&mut self) -> ParseResult<AstNode> {
    let mut node = self.parse_relational()?;

    loop {
      let op = match self.stream.peek_punct() {
        Some("==") => BinaryOp::Eq,
        Some("!=") => BinaryOp::Ne,
        _ => break,
      };

      self.stream.advance();
      let rhs = self.parse_relational()?;
      node = AstNode::binary(op, node, rhs);
    }

    Ok(node)
  }

  fn parse_relational(&mut self) -> ParseResult<AstNode> {
    let mut node = self.parse_add()?;

    loop {
      let (op, swapped) = match self.stream.peek_punct() {
        Some("<") => (BinaryOp::Lt, false),
        Some("<=") => (BinaryOp::Le, false),
        Some(">") => (BinaryOp::Lt, true),
        Some(">=") => (BinaryOp::Le, true),
        _ => break,
      };

      self.stream.advance();
      let rhs = self.parse_add()?;
      node = if swapped {
        AstNode::binary(op, rhs, node)
      } else {
        AstNode::binary(op, node, rhs)
      };
    }

    Ok(node)
  }

  fn parse_add(&mut self) -> ParseResult<AstNode> {
    let mut node = self.parse_mul()?;

    loop {
      let op = match self.stream.peek_punct() {
        Some("+") => BinaryOp::Add,
        Some("-") => BinaryOp::Sub,
        _ => break,
      };

      self.stream.advance();
      let rhs = self.parse_mul()?;
      node = AstNode::binary(op, node, rhs);
    }

    Ok(node)
  }

  fn parse_mul(&mut self) -> ParseResult<AstNode> {
    let mut node = self.parse_unary()?;

    loop {
      let op = match self.stream.peek_punct() {
        Some("*") => BinaryOp::Mul,
        Some("/") => BinaryOp::Div,
        _ => break,
      };

      self.stream.advance();
      let rhs = self.parse_unary()?;
      node = AstNode::binary(op, node, rhs);
    }

    Ok(node)
  }

  fn parse_unary(&mut self) -> ParseResult<AstNode> {
    if self.stream.equal("+") {
      return self.parse_unary();
    }

    if self.stream.equal("-") {
      let operand = self.parse_unary()?;
      return Ok(AstNode::binary(BinaryOp::Sub, AstNode::number(0), operand));
    }

    self.parse_primary()
  }

  fn parse_primary(&mut self) -> ParseResult<AstNode> {
    if self.stream.equal("(") {
      let node = self.parse_expr()?;
      self.stream.skip(")")?;
      return Ok(node);
    }

    if matches!(self.stream.peek().map(|token| token.kind), Some(TokenKind::Ident)) {
      let (name, loc) = self.stream.get_ident()?;
      if self.stream.equal("(") {
        return self.parse_call(name, loc);
      }
      return Ok(AstNode::var(self.locals.resolve(name)));
    }

    let (value, _) = self.stream.get_number()?;
    Ok(AstNode::number(value))
  }

  /// Parse call arguments after `name(`.
  fn parse_call(&mut self, name: &str, loc: usize) -> ParseResult<AstNode> {
    ensure!(
      !is_register_name(name),
      RegisterNameSnafu { name, offset: loc }
    );
    let mut args = Vec::new();
    if !self.stream.equal(")") {
      loop {
        args.push(self.parse_assign()?);
        if self.stream.equal(")") {
          break;
        }
        self.stream.skip(",")?;
      }
    }
    ensure!(
      args.len() <= MAX_REG_ARGS,
      TooManyArgumentsSnafu {
        name,
        count: args.len(),
        offset: loc,
      }
    );
    Ok(AstNode::Call {
      name: name.to_string(),
      args,
    })
  }
}

/// Lightweight cursor over the token vector.
struct TokenStream<'a> {
  tokens: Vec<Token>,
  source: &'a str,
  pos: usize,
}

impl<'a> TokenStream<'a> {
  /// Take ownership of the token stream; the parser will advance `pos` as it consumes input.
  fn new(tokens: Vec<Token>, source: &'a str) -> Self {
    Self {
      tokens,
      source,
      pos: 0,
    }
  }

  fn peek(&self) -> Option<&Token> {
    self.tokens.get(self.pos)
  }

  fn advance(&mut self) {
    if self.pos < self.tokens.len() {
      self.pos += 1;
    }
  }

  fn is_punct(&self, token: &Token, op: &str) -> bool {
    token.kind == TokenKind::Punctuator
      && token.len == op.len()
      && token_text(token, self.source) == op
  }

  /// Text of the current token if it is a punctuator.
  fn peek_punct(&self) -> Option<&'a str> {
    let source = self.source;
    self
      .peek()
      .filter(|token| token.kind == TokenKind::Punctuator)
      .map(|token| token_text(token, source))
  }

  /// Consume the current token if it matches the provided punctuator.
  fn equal(&mut self, op: &str) -> bool {
    if let Some(token) = self.peek()
      && self.is_punct(token, op)
    {
      self.pos += 1;
      return true;
    }
    false
  }

  /// Consume the current token if it is the given keyword.
  fn equal_keyword(&mut self, kw: Keyword) -> bool {
    if let Some(token) = self.peek()
      && token.kind == TokenKind::Keyword(kw)
    {
      self.pos += 1;
      return true;
    }
    false
  }

  /// Location and description of the current token, for error reporting.
  fn current_for_error(&self) -> (usize, String) {
    match self.peek() {
      Some(token) => (token.loc, describe_token(Some(token), self.source)),
      None => (self.source.len(), "EOF".to_string()),
    }
  }

  fn expected_token(&self, s: &str) -> ParseError {
    let (offset, found) = self.current_for_error();
    ExpectedTokenSnafu {
      expected: s,
      found,
      offset,
    }
    .build()
  }

  fn skip(&mut self, s: &str) -> ParseResult<()> {
    if self.equal(s) {
      Ok(())
    } else {
      Err(self.expected_token(s))
    }
  }

  /// Parse the current token as an integer literal returning its value and location.
  fn get_number(&mut self) -> ParseResult<(i64, usize)> {
    if let Some(token) = self.peek()
      && token.kind == TokenKind::Num
      && let Some(value) = token.value
    {
      let loc = token.loc;
      self.pos += 1;
      return Ok((value, loc));
    }

    let (offset, found) = self.current_for_error();
    ExpectedNumberSnafu { found, offset }.fail()
  }

  /// Parse the current token as an identifier.
  fn get_ident(&mut self) -> ParseResult<(&'a str, usize)> {
    let source = self.source;
    if let Some(token) = self.peek()
      && token.kind == TokenKind::Ident
    {
      let ident = token_text(token, source);
      let loc = token.loc;
      self.pos += 1;
      return Ok((ident, loc));
    }

    let (offset, found) = self.current_for_error();
    ExpectedIdentifierSnafu { found, offset }.fail()
  }

  fn is_eof(&self) -> bool {
    matches!(self.peek().map(|token| token.kind), Some(TokenKind::Eof) | None)
  }

  /// Whether the upcoming tokens read `ident ( ident, ... ) {`.
  fn starts_function_definition(&self) -> bool {
    let mut rest = self.tokens[self.pos..].iter();
    let (Some(name), Some(open)) = (rest.next(), rest.next()) else {
      return false;
    };
    if name.kind != TokenKind::Ident || !self.is_punct(open, "(") {
      return false;
    }

    let mut closed = false;
    for token in rest.by_ref() {
      if token.kind == TokenKind::Ident || self.is_punct(token, ",") {
        continue;
      }
      closed = self.is_punct(token, ")");
      break;
    }
    closed && rest.next().is_some_and(|token| self.is_punct(token, "{"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tokenizer::tokenize;

  fn parse_src(source: &str) -> ParseResult<Program> {
    parse(tokenize(source).unwrap(), source)
  }

  fn main_body(source: &str) -> Vec<AstNode> {
    let program = parse_src(source).unwrap();
    assert_eq!(program.functions.len(), 1);
    match program.functions.into_iter().next().unwrap().body {
      AstNode::Block { body } => body,
      other => panic!("expected block, got {other:?}"),
    }
  }

  fn ret(expr: AstNode) -> AstNode {
    AstNode::Return {
      expr: Box::new(expr),
    }
  }

  #[test]
  fn multiplication_binds_tighter_than_addition() {
    let body = main_body("return 1+2*3;");
    assert_eq!(
      body,
      vec![ret(AstNode::binary(
        BinaryOp::Add,
        AstNode::number(1),
        AstNode::binary(BinaryOp::Mul, AstNode::number(2), AstNode::number(3)),
      ))]
    );
  }

  #[test]
  fn greater_than_swaps_operands() {
    let body = main_body("return 1>2; return 3>=4;");
    assert_eq!(
      body,
      vec![
        ret(AstNode::binary(
          BinaryOp::Lt,
          AstNode::number(2),
          AstNode::number(1)
        )),
        ret(AstNode::binary(
          BinaryOp::Le,
          AstNode::number(4),
          AstNode::number(3)
        )),
      ]
    );
  }

  #[test]
  fn unary_minus_is_zero_minus_operand() {
    let body = main_body("return -5;");
    assert_eq!(
      body,
      vec![ret(AstNode::binary(
        BinaryOp::Sub,
        AstNode::number(0),
        AstNode::number(5)
      ))]
    );
    assert_eq!(main_body("return +5;"), vec![ret(AstNode::number(5))]);
  }

  #[test]
  fn assignment_is_right_associative() {
    let body = main_body("a=b=1;");
    assert_eq!(
      body,
      vec![AstNode::expr_stmt(AstNode::assign(
        AstNode::var(8),
        AstNode::assign(AstNode::var(16), AstNode::number(1)),
      ))]
    );
  }

  #[test]
  fn repeated_names_reuse_their_offset() {
    let program = parse_src("foo=1; bar=2; foo=foo+bar; baz=3;").unwrap();
    let locals: Vec<_> = program.functions[0]
      .locals
      .iter()
      .map(|var| (var.name.as_str(), var.offset))
      .collect();
    assert_eq!(locals, vec![("foo", 8), ("bar", 16), ("baz", 24)]);
    assert_eq!(program.functions[0].stack_size, 32);
  }

  #[test]
  fn frame_size_rounds_up_to_alignment() {
    let mut locals = Locals::default();
    assert_eq!(locals.frame_size(), 0);
    locals.resolve("a");
    assert_eq!(locals.frame_size(), 16);
    locals.resolve("b");
    assert_eq!(locals.frame_size(), 16);
    locals.resolve("a");
    assert_eq!(locals.len(), 2);
    assert_eq!(locals.get("b").map(|var| var.offset), Some(16));
  }

  #[test]
  fn for_clauses_may_be_empty() {
    let body = main_body("for (;;) return 1;");
    assert_eq!(
      body,
      vec![AstNode::For {
        init: None,
        cond: None,
        inc: None,
        body: Box::new(ret(AstNode::number(1))),
      }]
    );
  }

  #[test]
  fn dangling_else_binds_to_nearest_if() {
    let body = main_body("if (1) if (2) return 3; else return 4;");
    let AstNode::If { els, then, .. } = &body[0] else {
      panic!("expected if");
    };
    assert!(els.is_none());
    assert!(matches!(then.as_ref(), AstNode::If { els: Some(_), .. }));
  }

  #[test]
  fn null_statement_and_empty_block() {
    assert_eq!(
      main_body("; {}"),
      vec![AstNode::block(Vec::new()), AstNode::block(Vec::new())]
    );
  }

  #[test]
  fn function_definitions_register_params_first() {
    let program = parse_src("add(x, y) { z = x + y; return z; } main() { return add(1, 2); }")
      .unwrap();
    assert_eq!(program.functions.len(), 2);

    let add = &program.functions[0];
    assert_eq!(add.name, "add");
    let params: Vec<_> = add
      .params
      .iter()
      .map(|p| (p.name.as_str(), p.offset))
      .collect();
    assert_eq!(params, vec![("x", 8), ("y", 16)]);
    assert_eq!(add.locals.get("z").map(|var| var.offset), Some(24));

    let main = &program.functions[1];
    assert!(main.locals.is_empty());
    assert_eq!(
      main.body,
      AstNode::block(vec![ret(AstNode::Call {
        name: "add".to_string(),
        args: vec![AstNode::number(1), AstNode::number(2)],
      })])
    );
  }

  #[test]
  fn locals_do_not_leak_between_functions() {
    let program = parse_src("f() { a = 1; b = 2; return b; } g() { b = 5; return b; }").unwrap();
    assert_eq!(program.functions[0].locals.get("b").unwrap().offset, 16);
    assert_eq!(program.functions[1].locals.get("b").unwrap().offset, 8);
    assert!(program.functions[1].locals.get("a").is_none());
  }

  #[test]
  fn call_statement_is_not_a_definition() {
    let program = parse_src("foo(1, 2); return 0;").unwrap();
    assert_eq!(program.functions.len(), 1);
    assert_eq!(program.functions[0].name, "main");
  }

  #[test]
  fn unbalanced_paren_expects_closing_paren() {
    let err = parse_src("(1+2;").unwrap_err();
    assert_eq!(
      err,
      ParseError::ExpectedToken {
        expected: ")".to_string(),
        found: ";".to_string(),
        offset: 4,
      }
    );
  }

  #[test]
  fn missing_semicolon_reports_eof() {
    let err = parse_src("return 1").unwrap_err();
    assert_eq!(
      err,
      ParseError::ExpectedToken {
        expected: ";".to_string(),
        found: "EOF".to_string(),
        offset: 8,
      }
    );
  }

  #[test]
  fn unterminated_block_expects_closing_brace() {
    let err = parse_src("main() { return 1;").unwrap_err();
    assert!(matches!(err, ParseError::ExpectedToken { ref expected, .. } if expected == "}"));
  }

  #[test]
  fn operator_where_operand_belongs_expects_number() {
    let err = parse_src("return 1 + ;").unwrap_err();
    assert_eq!(
      err,
      ParseError::ExpectedNumber {
        found: ";".to_string(),
        offset: 11,
      }
    );
  }

  #[test]
  fn stray_tokens_after_functions_expect_identifier() {
    let err = parse_src("main() { return 0; } 42").unwrap_err();
    assert_eq!(
      err,
      ParseError::ExpectedIdentifier {
        found: "42".to_string(),
        offset: 21,
      }
    );
  }

  #[test]
  fn seven_arguments_are_rejected() {
    let err = parse_src("return f(1,2,3,4,5,6,7);").unwrap_err();
    assert!(matches!(err, ParseError::TooManyArguments { count: 7, offset: 7, .. }));
  }

  #[test]
  fn assignment_target_must_be_a_variable() {
    assert_eq!(
      parse_src("1 = 2;").unwrap_err(),
      ParseError::NotAnLvalue { offset: 2 }
    );
    assert_eq!(
      parse_src("a = b + 1 = 3;").unwrap_err(),
      ParseError::NotAnLvalue { offset: 10 }
    );
    assert!(parse_src("(a) = 3;").is_ok());
  }

  #[test]
  fn duplicate_parameters_are_rejected() {
    let err = parse_src("f(a, b, a) { return a; }").unwrap_err();
    assert_eq!(
      err,
      ParseError::DuplicateParameter {
        name: "a".to_string(),
        offset: 8,
      }
    );
  }

  #[test]
  fn register_names_cannot_name_functions() {
    let err = parse_src("rax() { return 1; } main() { return 0; }").unwrap_err();
    assert_eq!(
      err,
      ParseError::RegisterName {
        name: "rax".to_string(),
        offset: 0,
      }
    );
    let err = parse_src("return rdi(3);").unwrap_err();
    assert!(matches!(err, ParseError::RegisterName { offset: 7, .. }));
  }

  #[test]
  fn register_names_are_still_fine_as_variables() {
    let program = parse_src("rax = 1; r8 = 2; return rax + r8;").unwrap();
    assert_eq!(program.functions[0].locals.len(), 2);
  }

  #[test]
  fn register_name_table() {
    for name in ["rax", "EAX", "al", "r8", "r15d", "r10b", "xmm0", "cr3", "rip", "ss"] {
      assert!(is_register_name(name), "{name}");
    }
    for name in ["main", "r16", "r7", "r8x", "xmm", "foo", "add", "rdx1", "_rax"] {
      assert!(!is_register_name(name), "{name}");
    }
  }

  #[test]
  fn seven_parameters_are_rejected() {
    let err = parse_src("f(a,b,c,d,e,g,h) { return 0; }").unwrap_err();
    assert!(matches!(err, ParseError::TooManyParameters { count: 7, offset: 0, .. }));
  }
}
