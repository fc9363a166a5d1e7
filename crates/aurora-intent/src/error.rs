//! Error types for the intent crate.

use thiserror::Error;

/// Errors raised while extracting raw fields from intent text.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Nothing to extract from.
    #[error("intent text is empty")]
    EmptyInput,

    /// A built-in pattern failed to compile.
    #[error("invalid extraction pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// The language model call failed.
    #[error("model call failed: {0}")]
    Model(anyhow::Error),

    /// The model replied with something that is not a JSON object.
    #[error("model reply is not a JSON object: {0}")]
    InvalidReply(String),

    /// The model reply did not match the raw fields schema.
    #[error("model reply violates schema: {}", .0.join("; "))]
    SchemaViolation(Vec<String>),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The provider is misconfigured.
    #[error("extractor configuration error: {0}")]
    Config(String),
}
