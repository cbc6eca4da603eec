//! Code generation: lower the parsed AST into Intel-syntax x86-64 assembly.
//!
//! The emitter uses a simple stack machine: every expression leaves a single
//! value on the stack and statements pop what they do not need. Locals live
//! in the stack frame and are addressed relative to `rbp`.

use snafu::Snafu;
use tracing::{debug, trace};

use crate::parser::{AstNode, BinaryOp, Function, Program};

/// Integer argument registers in System V order.
const ARG_REGS: [&str; 6] = ["rdi", "rsi", "rdx", "rcx", "r8", "r9"];

/// The parser handed over a tree the emitter cannot lower. Unreachable for
/// trees built by `parser::parse`.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum CodegenError {
  #[snafu(display("unexpected {kind} node in expression position"))]
  UnrecognizedNodeKind { kind: &'static str },

  #[snafu(display("{kind} is not an lvalue"))]
  NotAnLvalue { kind: &'static str },

  #[snafu(display("{kind} node is not a statement"))]
  InvalidStatement { kind: &'static str },

  #[snafu(display("call to \"{name}\" has {count} arguments but only 6 registers"))]
  TooManyArguments { name: String, count: usize },
}

pub type CodegenResult<T> = Result<T, CodegenError>;

/// Emit assembly for a whole program. Nothing is returned unless every
/// function lowers cleanly.
pub fn generate(program: &Program) -> CodegenResult<String> {
  let mut cg = CodeGen::default();
  cg.asm.push_str(".intel_syntax noprefix\n");
  for func in &program.functions {
    cg.emit_function(func)?;
  }
  // Mark the stack non-executable for the linker.
  cg.emit(".section .note.GNU-stack,\"\",@progbits");
  debug!(
    functions = program.functions.len(),
    labels = cg.label_seq,
    bytes = cg.asm.len(),
    "generated assembly"
  );
  Ok(cg.asm)
}

/// Per-compilation emitter state.
#[derive(Debug, Default)]
struct CodeGen {
  asm: String,
  /// Last label id handed out; never reset within one compilation.
  label_seq: usize,
  /// Values currently pushed by the stack machine.
  depth: usize,
  return_label: String,
}

impl CodeGen {
  fn emit(&mut self, inst: &str) {
    self.asm.push('\t');
    self.asm.push_str(inst);
    self.asm.push('\n');
  }

  fn label(&mut self, name: &str) {
    self.asm.push_str(name);
    self.asm.push_str(":\n");
  }

  fn push(&mut self) {
    self.emit("push rax");
    self.depth += 1;
  }

  fn pop(&mut self, reg: &str) {
    self.emit(&format!("pop {reg}"));
    self.depth -= 1;
  }

  fn next_label(&mut self) -> usize {
    self.label_seq += 1;
    trace!(id = self.label_seq, "allocated label");
    self.label_seq
  }

  fn emit_function(&mut self, func: &Function) -> CodegenResult<()> {
    self.return_label = format!(".L.return.{}", func.name);
    self.depth = 0;

    self.emit(&format!(".global {}", func.name));
    self.label(&func.name);

    self.emit("push rbp");
    self.emit("mov rbp, rsp");
    if func.stack_size > 0 {
      self.emit(&format!("sub rsp, {}", func.stack_size));
    }
    for (param, reg) in func.params.iter().zip(ARG_REGS) {
      self.emit(&format!("mov [rbp-{}], {reg}", param.offset));
    }

    self.emit_stmt(&func.body)?;
    debug_assert_eq!(self.depth, 0, "stack imbalance in {}", func.name);

    // Falling off the end returns 0.
    self.emit("mov rax, 0");
    let return_label = self.return_label.clone();
    self.label(&return_label);
    self.emit("mov rsp, rbp");
    self.emit("pop rbp");
    self.emit("ret");
    Ok(())
  }

  fn emit_stmt(&mut self, node: &AstNode) -> CodegenResult<()> {
    match node {
      AstNode::ExprStmt { expr } => {
        self.emit_expr(expr)?;
        self.pop("rax");
      }
      AstNode::Return { expr } => {
        self.emit_expr(expr)?;
        self.pop("rax");
        let jump = format!("jmp {}", self.return_label);
        self.emit(&jump);
      }
      AstNode::If { cond, then, els } => {
        let id = self.next_label();
        self.emit_cond_jump(cond, &format!(".L.else.{id}"))?;
        self.emit_stmt(then)?;
        self.emit(&format!("jmp .L.end.{id}"));
        self.label(&format!(".L.else.{id}"));
        if let Some(els) = els {
          self.emit_stmt(els)?;
        }
        self.label(&format!(".L.end.{id}"));
      }
      AstNode::While { cond, body } => {
        let id = self.next_label();
        self.label(&format!(".L.begin.{id}"));
        self.emit_cond_jump(cond, &format!(".L.end.{id}"))?;
        self.emit_stmt(body)?;
        self.emit(&format!("jmp .L.begin.{id}"));
        self.label(&format!(".L.end.{id}"));
      }
      AstNode::For {
        init,
        cond,
        inc,
        body,
      } => {
        let id = self.next_label();
        if let Some(init) = init {
          self.emit_expr(init)?;
          self.pop("rax");
        }
        self.label(&format!(".L.begin.{id}"));
        if let Some(cond) = cond {
          self.emit_cond_jump(cond, &format!(".L.end.{id}"))?;
        }
        self.emit_stmt(body)?;
        if let Some(inc) = inc {
          self.emit_expr(inc)?;
          self.pop("rax");
        }
        self.emit(&format!("jmp .L.begin.{id}"));
        self.label(&format!(".L.end.{id}"));
      }
      AstNode::Block { body } => {
        for stmt in body {
          self.emit_stmt(stmt)?;
        }
      }
      other => {
        return InvalidStatementSnafu {
          kind: other.kind_name(),
        }
        .fail();
      }
    }
    Ok(())
  }

  /// Evaluate `cond` and jump to `target` when it is zero.
  fn emit_cond_jump(&mut self, cond: &AstNode, target: &str) -> CodegenResult<()> {
    self.emit_expr(cond)?;
    self.pop("rax");
    self.emit("cmp rax, 0");
    self.emit(&format!("je {target}"));
    Ok(())
  }

  /// Push the address of an lvalue.
  fn emit_addr(&mut self, node: &AstNode) -> CodegenResult<()> {
    match node {
      AstNode::Var { offset } => {
        self.emit(&format!("lea rax, [rbp-{offset}]"));
        self.push();
        Ok(())
      }
      other => NotAnLvalueSnafu {
        kind: other.kind_name(),
      }
      .fail(),
    }
  }

  /// Emit stack-based code for a single expression node.
  fn emit_expr(&mut self, node: &AstNode) -> CodegenResult<()> {
    match node {
      AstNode::Num { value } => {
        self.emit(&format!("mov rax, {value}"));
        self.push();
      }
      AstNode::Var { .. } => {
        self.emit_addr(node)?;
        self.pop("rax");
        self.emit("mov rax, [rax]");
        self.push();
      }
      AstNode::Assign { lhs, rhs } => {
        self.emit_addr(lhs)?;
        self.emit_expr(rhs)?;
        self.pop("rdi");
        self.pop("rax");
        self.emit("mov [rax], rdi");
        self.emit("mov rax, rdi");
        self.push();
      }
      AstNode::Binary { op, lhs, rhs } => {
        self.emit_expr(lhs)?;
        self.emit_expr(rhs)?;
        self.pop("rdi");
        self.pop("rax");
        match op {
          BinaryOp::Add => self.emit("add rax, rdi"),
          BinaryOp::Sub => self.emit("sub rax, rdi"),
          BinaryOp::Mul => self.emit("imul rax, rdi"),
          BinaryOp::Div => {
            self.emit("cqo");
            self.emit("idiv rdi");
          }
          BinaryOp::Eq => self.emit_compare("sete"),
          BinaryOp::Ne => self.emit_compare("setne"),
          BinaryOp::Lt => self.emit_compare("setl"),
          BinaryOp::Le => self.emit_compare("setle"),
        }
        self.push();
      }
      AstNode::Call { name, args } => {
        let Some(regs) = ARG_REGS.get(..args.len()) else {
          return TooManyArgumentsSnafu {
            name,
            count: args.len(),
          }
          .fail();
        };
        for arg in args {
          self.emit_expr(arg)?;
        }
        for reg in regs.iter().rev() {
          self.pop(reg);
        }

        // rsp must be 16-byte aligned at the call instruction.
        let misaligned = self.depth % 2 == 1;
        if misaligned {
          self.emit("sub rsp, 8");
        }
        self.emit("mov rax, 0");
        self.emit(&format!("call {name}"));
        if misaligned {
          self.emit("add rsp, 8");
        }
        self.push();
      }
      other => {
        return UnrecognizedNodeKindSnafu {
          kind: other.kind_name(),
        }
        .fail();
      }
    }
    Ok(())
  }

  fn emit_compare(&mut self, set: &str) {
    self.emit("cmp rax, rdi");
    self.emit(&format!("{set} al"));
    self.emit("movzx rax, al");
  }
}
