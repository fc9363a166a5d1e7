//! Configuration types for the Aurora intent pipeline.
//!
//! A single `aurora.yaml` file configures every stage. All sections are optional and
//! fall back to defaults, so an empty file is a valid configuration.
//!
//! # Sections
//!
//! - **extraction**: which provider turns intent text into raw fields
//! - **discovery**: probe timeouts, retries and capability cache lifetime
//! - **generation**: transport preference and per-vendor overrides
//! - **deployment**: per-device operation timeouts and approval lifetime
//! - **history**: where deployment attempts are recorded
//! - **observability**: default log filter

pub mod history;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Transport, Vendor};

pub use history::{HistoryBackend, HistoryConfig};

/// Complete Aurora configuration loaded from a file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuroraConfig {
    /// Path to the device inventory, relative to the config file.
    #[serde(default)]
    pub inventory_file: Option<PathBuf>,

    #[serde(default)]
    pub extraction: ExtractionConfig,

    #[serde(default)]
    pub discovery: DiscoveryConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub deployment: DeploymentConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuroraConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: AuroraConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration and resolve relative paths against the file's directory.
    pub fn load_with_context(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = Self::from_file(path)?;

        let base_dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        if let Some(inventory) = &config.inventory_file
            && inventory.is_relative()
        {
            config.inventory_file = Some(base_dir.join(inventory));
        }
        if let Some(dir) = &config.history.directory
            && dir.is_relative()
        {
            config.history.directory = Some(base_dir.join(dir));
        }

        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.discovery.max_attempts == 0 {
            return Err(ConfigError::Config(
                "discovery.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.generation.transport_preference.is_empty() {
            return Err(ConfigError::Config(
                "generation.transport_preference must name at least one transport".to_string(),
            ));
        }
        if self.extraction.provider == ProviderKind::Model && self.extraction.model.is_none() {
            return Err(ConfigError::Config(
                "extraction.provider is 'model' but extraction.model is not set".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Extraction
// =============================================================================

/// Which extraction provider to use.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Deterministic pattern-based extraction.
    #[default]
    Rules,
    /// A language model behind an OpenAI-compatible chat endpoint.
    Model,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default)]
    pub provider: ProviderKind,

    #[serde(default)]
    pub model: Option<ModelProviderConfig>,

    /// Fall back to rule-based extraction when the model call fails.
    #[serde(default = "default_true")]
    pub fallback_to_rules: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Rules,
            model: None,
            fallback_to_rules: true,
        }
    }
}

/// Wire protocol spoken by the model endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelApi {
    /// `/chat/completions`, as served by OpenAI and by local servers such as MLX or vLLM.
    #[default]
    OpenaiCompatible,
    /// Anthropic `/v1/messages`.
    Anthropic,
}

/// Connection settings for a model-backed extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelProviderConfig {
    #[serde(default)]
    pub api: ModelApi,

    /// Base URL of the model API.
    pub endpoint: String,

    /// Model name sent with each request.
    pub model: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_model_timeout_ms")]
    pub timeout_ms: u64,

    /// Reply length cap, required by the Anthropic API.
    #[serde(default = "default_model_max_tokens")]
    pub max_tokens: u32,
}

impl ModelProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_api_key_env() -> String {
    "AURORA_MODEL_API_KEY".to_string()
}

fn default_model_timeout_ms() -> u64 {
    20_000
}

fn default_model_max_tokens() -> u32 {
    1024
}

// =============================================================================
// Discovery
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Timeout for a single capability probe.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Probe attempts per device before it is reported unreachable.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff between attempts; doubles after each failure.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// How long a cached capability set stays fresh.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl DiscoveryConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: default_probe_timeout_ms(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn default_probe_timeout_ms() -> u64 {
    5_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    200
}

fn default_cache_ttl_secs() -> u64 {
    300
}

// =============================================================================
// Generation
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Transports in order of preference.
    #[serde(default = "default_transport_preference")]
    pub transport_preference: Vec<Transport>,

    /// Per-vendor transport to use when the device supports it.
    #[serde(default)]
    pub vendor_overrides: BTreeMap<Vendor, Transport>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            transport_preference: default_transport_preference(),
            vendor_overrides: BTreeMap::new(),
        }
    }
}

fn default_transport_preference() -> Vec<Transport> {
    Transport::PREFERENCE.to_vec()
}

// =============================================================================
// Deployment
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    #[serde(default = "default_apply_timeout_ms")]
    pub apply_timeout_ms: u64,

    #[serde(default = "default_readback_timeout_ms")]
    pub readback_timeout_ms: u64,

    #[serde(default = "default_restore_timeout_ms")]
    pub restore_timeout_ms: u64,

    /// How long a pending approval remains valid.
    #[serde(default = "default_approval_ttl_secs")]
    pub approval_ttl_secs: u64,

    /// Confirmed-commit window announced in the commit plan.
    #[serde(default = "default_rollback_timeout_secs")]
    pub rollback_timeout_secs: u64,
}

impl DeploymentConfig {
    pub fn apply_timeout(&self) -> Duration {
        Duration::from_millis(self.apply_timeout_ms)
    }

    pub fn readback_timeout(&self) -> Duration {
        Duration::from_millis(self.readback_timeout_ms)
    }

    pub fn restore_timeout(&self) -> Duration {
        Duration::from_millis(self.restore_timeout_ms)
    }
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            apply_timeout_ms: default_apply_timeout_ms(),
            readback_timeout_ms: default_readback_timeout_ms(),
            restore_timeout_ms: default_restore_timeout_ms(),
            approval_ttl_secs: default_approval_ttl_secs(),
            rollback_timeout_secs: default_rollback_timeout_secs(),
        }
    }
}

fn default_apply_timeout_ms() -> u64 {
    30_000
}

fn default_readback_timeout_ms() -> u64 {
    10_000
}

fn default_restore_timeout_ms() -> u64 {
    30_000
}

fn default_approval_ttl_secs() -> u64 {
    3_600
}

fn default_rollback_timeout_secs() -> u64 {
    300
}

// =============================================================================
// Observability
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "aurora=info".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = AuroraConfig::from_yaml("{}").unwrap();
        assert_eq!(config.extraction.provider, ProviderKind::Rules);
        assert_eq!(config.discovery.max_attempts, 3);
        assert_eq!(
            config.generation.transport_preference,
            Transport::PREFERENCE.to_vec()
        );
        assert!(config.history.enabled);
    }

    #[test]
    fn parses_sections() {
        let yaml = r#"
inventory_file: inventory.yaml
discovery:
  probe_timeout_ms: 50
  max_attempts: 2
generation:
  transport_preference: [ssh, netconf]
  vendor_overrides:
    juniper: ssh
deployment:
  approval_ttl_secs: 60
"#;
        let config = AuroraConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.discovery.probe_timeout(), Duration::from_millis(50));
        assert_eq!(
            config.generation.transport_preference,
            vec![Transport::Ssh, Transport::Netconf]
        );
        assert_eq!(
            config.generation.vendor_overrides.get(&Vendor::Juniper),
            Some(&Transport::Ssh)
        );
        assert_eq!(config.deployment.approval_ttl_secs, 60);
    }

    #[test]
    fn rejects_zero_attempts() {
        let err = AuroraConfig::from_yaml("discovery:\n  max_attempts: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Config(_)));
    }

    #[test]
    fn model_api_defaults_to_openai_compatible() {
        let yaml = r#"
extraction:
  provider: model
  model: { endpoint: "http://localhost:8080/v1", model: local }
"#;
        let config = AuroraConfig::from_yaml(yaml).unwrap();
        let model = config.extraction.model.unwrap();
        assert_eq!(model.api, ModelApi::OpenaiCompatible);
        assert_eq!(model.max_tokens, 1024);

        let yaml = r#"
extraction:
  provider: model
  model: { api: anthropic, endpoint: "https://api.anthropic.com", model: claude, max_tokens: 512 }
"#;
        let model = AuroraConfig::from_yaml(yaml).unwrap().extraction.model.unwrap();
        assert_eq!(model.api, ModelApi::Anthropic);
        assert_eq!(model.max_tokens, 512);
    }

    #[test]
    fn model_provider_needs_settings() {
        let err = AuroraConfig::from_yaml("extraction:\n  provider: model\n").unwrap_err();
        assert!(err.to_string().contains("extraction.model"));
    }

    #[test]
    fn backoff_doubles() {
        let config = DiscoveryConfig {
            backoff_ms: 100,
            ..Default::default()
        };
        assert_eq!(config.backoff_for(1), Duration::from_millis(100));
        assert_eq!(config.backoff_for(2), Duration::from_millis(200));
        assert_eq!(config.backoff_for(3), Duration::from_millis(400));
    }
}
