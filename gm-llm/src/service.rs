//! The completion-service seam consumed by the orchestrator.

use async_trait::async_trait;

use crate::error::LlmError;
use crate::types::{ChatMessage, LlmResponse, SamplingParams};

/// Generates the next message for a role-tagged history.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Produce one completion for `messages`.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Unavailable`] when no backend is configured and
    /// a transport or decoding error otherwise.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &SamplingParams,
    ) -> Result<LlmResponse, LlmError>;

    /// Whether a backend is configured at all.
    fn is_available(&self) -> bool;

    /// Model name for logs.
    fn model_name(&self) -> &str;
}
