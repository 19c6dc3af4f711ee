//! # gm-llm: Completion-Service Layer
//!
//! Everything the orchestrator needs to talk to a language model:
//!
//! - [`CompletionService`]: the async seam (`complete`, `is_available`)
//! - [`LlmClient`]: HTTP backends:
//!   - **OpenAI-compatible** `POST {base}/v1/chat/completions`
//!   - **Ollama** `POST {base}/api/chat`
//!   - **None**: every call fails, triggering the stub reply upstream
//! - [`ScriptedCompletion`]: queued replies for tests and offline runs
//! - [`Conversation`]: the append-only, role-tagged history of one turn
//! - [`prompt`]: fixed Italian prompts and templates
//!
//! The loop above this crate performs no retries of its own; transport
//! retries, if any, happen inside [`LlmClient`] (`llm.max_retries`).

#![deny(clippy::unwrap_used)]
#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod prompt;
pub mod scripted;
pub mod service;
pub mod types;

pub use client::{LlmClient, LlmProvider};
pub use error::LlmError;
pub use scripted::{RecordedRequest, ScriptStep, ScriptedCompletion};
pub use service::CompletionService;
pub use types::{ChatMessage, Conversation, LlmResponse, Role, SamplingParams};
