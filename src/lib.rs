//! Crate root: wires together the compilation pipeline.
//!
//! The stages are small and run once each, left to right:
//! - `tokenizer` performs lexical analysis and produces a flat token stream.
//! - `parser` owns all syntactic knowledge and returns functions with their locals.
//! - `codegen` lowers the parsed program into x86-64 Intel-syntax assembly.
//! - `error` holds the diagnostics shared by the other modules.

pub mod codegen;
pub mod error;
pub mod parser;
pub mod tokenizer;

pub use error::{CompileError, CompileResult, Diagnostic};

/// Compile a source string into Intel-syntax assembly.
///
/// Each call starts from fresh state, so compiling the same input twice
/// yields identical output.
pub fn generate_assembly(source: &str) -> CompileResult<String> {
  let tokens = tokenizer::tokenize(source)?;
  let program = parser::parse(tokens, source)?;
  Ok(codegen::generate(&program)?)
}
