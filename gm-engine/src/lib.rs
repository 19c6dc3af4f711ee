//! # gm-engine: Game-Master Orchestration
//!
//! Turns one player message into one narrative reply by letting a language
//! model call world tools, one action per step.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                  gm-engine                   │
//! │  ┌──────────────┐      ┌──────────────────┐  │
//! │  │ Orchestrator │─────▶│  ToolDispatcher  │  │
//! │  └──────┬───────┘      └────────┬─────────┘  │
//! │         │                       │            │
//! │         ▼                       ▼            │
//! │  ┌──────────────┐      ┌──────────────────┐  │
//! │  │    gm-llm    │      │     gm-core      │  │
//! │  │ (completion) │      │ (store, graph,   │  │
//! │  └──────────────┘      │  index, policy)  │  │
//! │                        └──────────────────┘  │
//! │  ┌──────────────┐                            │
//! │  │ WorldTicker  │── danger drift ──▶ store   │
//! │  └──────────────┘                            │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `action`: the tool catalog as a sum type and the model-output parser
//! - `dispatcher`: executes actions against the store
//! - `orchestrator`: the step loop, reply finalization and scene bookkeeping
//! - `ticker`: the background world tick
//! - `telemetry`: tracing subscriber setup

#![deny(clippy::unwrap_used)]
#![warn(missing_docs)]

pub mod action;
pub mod dispatcher;
pub mod error;
pub mod orchestrator;
pub mod telemetry;
pub mod ticker;

pub use action::{parse_model_output, ModelTurn, ToolAction};
pub use dispatcher::{ToolDispatcher, ToolResult};
pub use error::{EngineError, Result};
pub use orchestrator::{build_completion, Orchestrator, PathRequest, TraceEntry, TurnReply, TurnRequest};
pub use telemetry::init_tracing;
pub use ticker::WorldTicker;
