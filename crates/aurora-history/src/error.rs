//! Error types for the history crate.

use thiserror::Error;

/// Errors that can occur while recording or querying history.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Storage backend failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
