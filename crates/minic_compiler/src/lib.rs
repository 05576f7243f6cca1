#![allow(
  clippy::module_inception,
  clippy::should_implement_trait,
  clippy::new_without_default
)]

pub mod analysis;
pub mod emitter;
pub mod error;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod symbol;

use std::path::Path;

pub use error::CompileError;

use crate::analysis::SemanticPass;
use crate::emitter::{Emitter, Output};
use crate::ir::tac::LoweringPass;
use crate::lexer::Lexer;
use crate::parser::Parser;

/// Runs the front half of the pipeline: source → tokens → AST → analyzed AST → IR.
fn lower(source: &str) -> Result<ir::tac::Program, CompileError> {
  let mut lexer = Lexer::new(source.as_bytes());
  let tokens = lexer.lex()?;

  let mut parser = Parser::new(tokens);
  let program = parser.parse()?;

  SemanticPass::new().run(&program)?;

  let tac = LoweringPass::new().lower(&program)?;

  Ok(tac)
}

/// Compiles the given source and returns the generated assembly.
pub fn compile(source: &str) -> Result<Output, CompileError> {
  let tac = lower(source)?;

  Ok(Emitter::new().emit(&tac))
}

/// Compiles the given source and writes the generated assembly to the given file.
pub fn compile_to_file(source: &str, path: impl AsRef<Path>) -> Result<Output, CompileError> {
  let tac = lower(source)?;

  Ok(Emitter::new().emit_to_file(&tac, path)?)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn compile_reports_stage() {
    let cases = [
      ("int main() { return 0 @ }", "lex error"),
      ("int main() { return 0 }", "parse error"),
      ("int main() { return x; }", "semantic error"),
    ];

    for (input, prefix) in cases {
      let error = compile(input).expect_err("should fail");
      let message = error.to_string();

      assert!(message.starts_with(prefix), "{message:?} vs {prefix:?}");
    }
  }

  #[test]
  fn compile_produces_assembly() {
    let output = compile("int main() { return 42; }").expect("should compile");
    let assembly = output.to_string();

    assert!(assembly.contains("global _start"));
    assert!(assembly.contains("main:"));
    assert!(assembly.contains("main_epilogue:"));
  }

  #[test]
  fn compile_is_deterministic() {
    let input = "int main() { int x = 1; while (x < 4) { x = x * 2; } return x; }";

    let first = compile(input).expect("should compile");
    let second = compile(input).expect("should compile");

    assert_eq!(first.as_bytes(), second.as_bytes());
  }

  #[test]
  fn compile_empty_program() {
    let output = compile("").expect("should compile");
    let assembly = output.to_string();

    // Preamble only.
    assert!(assembly.contains("global _start"));
    assert!(!assembly.contains("_epilogue:"));
  }
}
