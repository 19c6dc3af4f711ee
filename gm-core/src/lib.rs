//! # GM Core Library
//!
//! World model behind the game-master engine. No async, no network:
//!
//! - [`persistence`]: the [`WorldStore`] collaborator and its SQLite
//!   implementation (characters, languages, locations, waypoints, events,
//!   scene states, embedded memories)
//! - [`graph`]: the travel [`CostGraph`] and Dijkstra shortest paths
//! - [`embedding`] / [`retrieval`]: text embeddings and the similarity
//!   [`MemoryIndex`] behind `rag_search`
//! - [`sanitizer`]: reply policies (partial comprehension, banned names,
//!   language heuristic, option extraction)
//! - [`world`] / [`seed`]: the danger tick and the demo world
//!
//! Everything is configured through [`GmConfig`], loaded from TOML.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod persistence;
pub mod retrieval;
pub mod sanitizer;
pub mod seed;
pub mod types;
pub mod world;

pub use config::GmConfig;
pub use error::GmError;
pub use graph::{CostGraph, PathResult};
pub use persistence::{SqliteWorldStore, WorldStore};
pub use retrieval::{MemoryHit, MemoryIndex};
pub use sanitizer::{Review, Sanitizer};
pub use types::*;
