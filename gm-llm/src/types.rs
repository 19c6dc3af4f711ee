//! Core types for chat completions.

use serde::{Deserialize, Serialize};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions and observations from the engine.
    System,
    /// Player input.
    User,
    /// Model output echoed back into the history.
    Assistant,
}

/// One role-tagged message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author.
    pub role: Role,
    /// Text.
    pub content: String,
}

impl ChatMessage {
    /// A system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// A user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// An assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Append-only message history of one orchestration call.
///
/// Messages can be added but never edited, removed or reordered.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    /// An empty conversation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a system message.
    pub fn push_system(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::system(content));
    }

    /// Append a user message.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::user(content));
    }

    /// Append an assistant message.
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(content));
    }

    /// All messages, oldest first.
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether nothing has been appended yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The most recent message.
    #[must_use]
    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}

/// Sampling parameters of a single request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Temperature (0.0 = deterministic).
    pub temperature: f32,
    /// Penalty for tokens already present at all.
    pub presence_penalty: f32,
    /// Penalty proportional to token frequency.
    pub frequency_penalty: f32,
    /// Token cap; the client's configured cap when `None`.
    pub max_tokens: Option<u32>,
}

impl SamplingParams {
    /// Plain sampling at `temperature`, no penalties.
    #[must_use]
    pub fn new(temperature: f32) -> Self {
        Self {
            temperature,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            max_tokens: None,
        }
    }

    /// Set presence and frequency penalties.
    #[must_use]
    pub fn with_penalties(mut self, presence: f32, frequency: f32) -> Self {
        self.presence_penalty = presence;
        self.frequency_penalty = frequency;
        self
    }

    /// Cap the completion length.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A completion returned by a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmResponse {
    /// The generated text, trimmed.
    pub text: String,
    /// How many tokens were generated, if reported.
    pub tokens_generated: u32,
    /// Latency in milliseconds.
    pub latency_ms: u64,
    /// Which model answered.
    pub model: String,
}
