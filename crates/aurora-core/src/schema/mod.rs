//! Read-only schema store: device capabilities and per-vendor template sets.

mod catalog;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use thiserror::Error;

use crate::inventory::DeviceRecord;
use crate::{IntentField, ServiceType, Transport, Vendor};

pub use catalog::TemplateCatalog;

/// Capability flag for devices that support a confirmed (auto-reverting) commit.
pub const CONFIRMED_COMMIT: &str = "confirmed-commit";

/// What a device reports about itself when probed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub vendor: Vendor,
    pub os_version: String,
    pub transports: BTreeSet<Transport>,
    #[serde(default)]
    pub models: BTreeSet<String>,
    #[serde(default)]
    pub flags: BTreeSet<String>,
}

/// How a logical value is written into a vendor field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueEncoding {
    #[default]
    Plain,
    /// The vendor expects a literal prefix before the value, e.g. `target:`.
    Prefixed(String),
}

impl ValueEncoding {
    pub fn encode(&self, value: &str) -> String {
        match self {
            ValueEncoding::Plain => value.to_string(),
            ValueEncoding::Prefixed(prefix) => format!("{}{}", prefix, value),
        }
    }

    /// Recover the logical value; `None` if the vendor value is not in this encoding.
    pub fn decode(&self, encoded: &str) -> Option<String> {
        match self {
            ValueEncoding::Plain => Some(encoded.to_string()),
            ValueEncoding::Prefixed(prefix) => encoded.strip_prefix(prefix.as_str()).map(str::to_string),
        }
    }
}

/// Location of one intent field in a vendor schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPath {
    pub field: IntentField,
    /// Slash-separated element path, root first.
    pub path: String,
    pub encoding: ValueEncoding,
}

/// Templates for one (vendor, model version, service type) combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSet {
    pub id: String,
    pub vendor: Vendor,
    pub model_version: String,
    pub service_type: ServiceType,
    /// Namespace attached to the rendered markup and structured-data payloads.
    pub namespace: String,
    /// Transports this template can be rendered for.
    pub transports: BTreeSet<Transport>,
    pub paths: Vec<FieldPath>,
    /// Command-line blocks. `{field}` is substituted; `{?field}` only requires presence.
    #[serde(default)]
    pub cli: Vec<String>,
}

impl TemplateSet {
    pub fn path_for(&self, field: IntentField) -> Option<&FieldPath> {
        self.paths.iter().find(|p| p.field == field)
    }
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("device '{0}' is unreachable")]
    Unreachable(String),

    #[error("capability probe of '{0}' timed out")]
    Timeout(String),

    #[error("protocol error talking to '{device}': {message}")]
    Protocol { device: String, message: String },
}

/// Source of device capabilities and vendor templates.
#[async_trait]
pub trait SchemaStore: Send + Sync {
    /// Increases whenever the stored models or templates change.
    fn revision(&self) -> u64;

    /// Probe a device for its capabilities.
    async fn capabilities(&self, device: &DeviceRecord) -> Result<CapabilitySet, SchemaError>;

    /// Model versions with templates for a vendor, in any order.
    fn model_versions(&self, vendor: Vendor) -> Vec<String>;

    fn templates(
        &self,
        vendor: Vendor,
        model_version: &str,
        service_type: ServiceType,
    ) -> Option<TemplateSet>;

    /// Highest model version for the vendor that does not exceed `os_version`.
    fn resolve_model_version(&self, vendor: Vendor, os_version: &str) -> Option<String> {
        self.model_versions(vendor)
            .into_iter()
            .filter(|v| compare_versions(v, os_version) != Ordering::Greater)
            .max_by(|a, b| compare_versions(a, b))
    }
}

/// Compare dotted version strings numerically, ignoring non-digit separators.
///
/// `21.4R1` sorts as `21.4.1`, `7.3` sorts before `7.3.2`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    fn parts(v: &str) -> Vec<u64> {
        v.split(|c: char| !c.is_ascii_digit())
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse().ok())
            .collect()
    }
    parts(a).cmp(&parts(b))
}
