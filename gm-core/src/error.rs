//! Error types for the game-master core library.

use thiserror::Error;

/// Top-level error type for all world-model operations.
#[derive(Error, Debug)]
pub enum GmError {
    /// A character with the given id does not exist.
    #[error("Character not found: {0}")]
    CharacterNotFound(String),

    /// A location with the given id does not exist.
    #[error("Location not found: {0}")]
    LocationNotFound(String),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The embedding provider could not produce a vector.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// The completion service failed and the caller chose to surface it.
    #[error("Completion service error: {0}")]
    Completion(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for GmError {
    fn from(err: serde_json::Error) -> Self {
        GmError::Serialization(err.to_string())
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, GmError>;
