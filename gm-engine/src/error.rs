//! Error type for the orchestration layer.

use gm_core::GmError;
use gm_llm::LlmError;
use thiserror::Error;

/// Failures that make a turn impossible.
///
/// Model misbehaviour and tool failures never surface here; they are folded
/// into the conversation or answered with the stub reply.
#[derive(Debug, Error)]
pub enum EngineError {
    /// World store or configuration failure.
    #[error(transparent)]
    Core(#[from] GmError),

    /// Completion client could not be built.
    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, EngineError>;
