//! In-process completion service that replays queued replies.
//!
//! Used by tests and offline runs: every request is recorded so callers can
//! assert on message history and sampling parameters afterwards.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::LlmError;
use crate::service::CompletionService;
use crate::types::{ChatMessage, LlmResponse, SamplingParams};

/// One queued outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    /// Answer with this text.
    Reply(String),
    /// Fail with [`LlmError::RequestFailed`] carrying this message.
    Fail(String),
}

/// A request as received by [`ScriptedCompletion`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    /// Full history sent.
    pub messages: Vec<ChatMessage>,
    /// Sampling parameters sent.
    pub params: SamplingParams,
}

/// Completion service backed by a queue of scripted steps.
///
/// Once the queue is empty it answers with the fallback text, or fails with
/// [`LlmError::Unavailable`] if none was set.
#[derive(Debug, Default)]
pub struct ScriptedCompletion {
    script: Mutex<VecDeque<ScriptStep>>,
    fallback: Option<String>,
    requests: Mutex<Vec<RecordedRequest>>,
    offline: bool,
}

impl ScriptedCompletion {
    /// Queue `replies` in order.
    #[must_use]
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(replies.into_iter().map(|r| ScriptStep::Reply(r.into())).collect()),
            ..Self::default()
        }
    }

    /// A service that reports itself unavailable and fails every call.
    #[must_use]
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    /// Answer with `text` whenever the queue is empty.
    #[must_use]
    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    /// Queue a reply.
    pub fn push_reply(&self, text: impl Into<String>) {
        self.script.lock().push_back(ScriptStep::Reply(text.into()));
    }

    /// Queue a transport failure.
    pub fn push_failure(&self, message: impl Into<String>) {
        self.script.lock().push_back(ScriptStep::Fail(message.into()));
    }

    /// Snapshot of every request received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Number of requests received so far.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Steps not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &SamplingParams,
    ) -> Result<LlmResponse, LlmError> {
        self.requests.lock().push(RecordedRequest {
            messages: messages.to_vec(),
            params: *params,
        });

        if self.offline {
            return Err(LlmError::Unavailable("scripted service is offline".into()));
        }

        let step = self.script.lock().pop_front();
        let text = match step {
            Some(ScriptStep::Reply(text)) => text,
            Some(ScriptStep::Fail(message)) => return Err(LlmError::RequestFailed(message)),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| LlmError::Unavailable("script exhausted".into()))?,
        };

        Ok(LlmResponse {
            text: text.trim().to_string(),
            tokens_generated: 0,
            latency_ms: 0,
            model: self.model_name().to_string(),
        })
    }

    fn is_available(&self) -> bool {
        !self.offline
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
