//! Deployment history configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for recording deployment attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Whether attempts are recorded at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Storage backend.
    #[serde(default)]
    pub backend: HistoryBackend,

    /// Directory holding `history.jsonl` (file backend).
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Also print a one-line summary of each record to stdout.
    #[serde(default)]
    pub stdout: bool,
}

/// History storage backend type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackend {
    /// Keep records in process memory.
    #[default]
    Memory,
    /// Append records to a JSON Lines file.
    File,
}

impl HistoryConfig {
    /// File the file backend appends to.
    pub fn file_path(&self) -> PathBuf {
        self.directory
            .clone()
            .unwrap_or_else(|| PathBuf::from(".aurora"))
            .join("history.jsonl")
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            backend: HistoryBackend::default(),
            directory: None,
            stdout: false,
        }
    }
}

fn default_enabled() -> bool {
    true
}
