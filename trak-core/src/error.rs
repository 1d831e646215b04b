//! Error types for trak-core

use thiserror::Error;

/// Main error type for the trak-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A persisted record or state file does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed persisted state or a malformed LLM response
    #[error("parse error: {0}")]
    Parse(String),

    /// Network or API failure talking to the LLM backend or the org endpoint
    #[error("backend error: {0}")]
    Backend(String),

    /// Caller-supplied arguments failed basic checks
    #[error("validation error: {0}")]
    Validation(String),

    /// `start` was called while a session is already active
    #[error("session {id} is already active; stop it first")]
    SessionActive { id: String },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// File watcher error
    #[error("watch error: {0}")]
    Watch(String),
}

/// Result type alias for trak-core
pub type Result<T> = std::result::Result<T, Error>;
