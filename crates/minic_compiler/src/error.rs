use thiserror::Error;

use crate::analysis::SemanticError;
use crate::emitter::EmitError;
use crate::ir::tac::LoweringError;
use crate::lexer::LexError;
use crate::parser::ParseError;

/// Any failure the pipeline can surface. Each stage error displays with its stage prefix.
#[derive(Debug, Error)]
pub enum CompileError {
  #[error(transparent)]
  Lex(#[from] LexError),
  #[error(transparent)]
  Parse(#[from] ParseError),
  #[error(transparent)]
  Semantic(#[from] SemanticError),
  #[error(transparent)]
  Lowering(#[from] LoweringError),
  #[error(transparent)]
  Emit(#[from] EmitError),
}
