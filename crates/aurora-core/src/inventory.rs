//! Device inventory.
//!
//! The inventory is the source of truth for device identity: canonical names, aliases,
//! vendor, management address and the services already running on each device.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::{DEVICE_SCOPE, Vendor};

/// Everything the pipeline knows about a device before talking to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Canonical device name.
    pub name: String,

    /// Alternative names accepted in intent text.
    #[serde(default)]
    pub aliases: Vec<String>,

    pub vendor: Vendor,

    /// Management address.
    pub address: String,

    /// Reference into an external secret store; never the secret itself.
    #[serde(default)]
    pub credentials_ref: Option<String>,

    /// Last known-good configuration, used as a rollback source.
    #[serde(default)]
    pub prior_config_snapshot: Option<String>,

    /// Local BGP AS number, used when the intent does not name one.
    #[serde(default)]
    pub bgp_asn: Option<u32>,

    /// Services already bound to this device.
    #[serde(default)]
    pub services: Vec<ServiceBinding>,
}

/// A service already running on a device, used for blast-radius estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceBinding {
    pub service_id: String,

    /// Interface the service is attached to; `*` for the whole device.
    #[serde(default = "default_scope")]
    pub interface: String,

    /// Production services escalate the risk of touching the device.
    #[serde(default)]
    pub production: bool,
}

impl ServiceBinding {
    /// Whether a change on `interface` touches this service.
    pub fn overlaps(&self, interface: &str) -> bool {
        self.interface == DEVICE_SCOPE || interface == DEVICE_SCOPE || self.interface == interface
    }
}

fn default_scope() -> String {
    DEVICE_SCOPE.to_string()
}

/// Errors from inventory lookups and loading.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("unknown device '{0}'")]
    UnknownDevice(String),

    #[error("alias '{alias}' is claimed by both '{first}' and '{second}'")]
    AmbiguousAlias {
        alias: String,
        first: String,
        second: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Device lookup by name or alias.
pub trait Inventory: Send + Sync {
    /// Resolve a name or alias to its record.
    fn lookup(&self, name: &str) -> Result<DeviceRecord, InventoryError>;

    /// All known devices.
    fn devices(&self) -> Vec<DeviceRecord>;
}

#[derive(Debug, Deserialize)]
struct InventoryDocument {
    #[serde(default)]
    devices: Vec<DeviceRecord>,
}

/// In-memory inventory with a case-insensitive name and alias index.
#[derive(Debug, Clone, Default)]
pub struct StaticInventory {
    records: Vec<DeviceRecord>,
    index: HashMap<String, usize>,
}

impl StaticInventory {
    pub fn new(records: Vec<DeviceRecord>) -> Result<Self, InventoryError> {
        let mut index: HashMap<String, usize> = HashMap::new();
        for (position, record) in records.iter().enumerate() {
            for key in std::iter::once(&record.name).chain(record.aliases.iter()) {
                let key = key.to_ascii_lowercase();
                if let Some(&existing) = index.get(&key)
                    && existing != position
                {
                    return Err(InventoryError::AmbiguousAlias {
                        alias: key,
                        first: records[existing].name.clone(),
                        second: record.name.clone(),
                    });
                }
                index.insert(key, position);
            }
        }
        Ok(Self { records, index })
    }

    /// Parse an inventory document with a top-level `devices:` list.
    pub fn from_yaml(content: &str) -> Result<Self, InventoryError> {
        let doc: InventoryDocument = serde_yaml::from_str(content)?;
        tracing::debug!(devices = doc.devices.len(), "Loaded inventory");
        Self::new(doc.devices)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, InventoryError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }
}

impl Inventory for StaticInventory {
    fn lookup(&self, name: &str) -> Result<DeviceRecord, InventoryError> {
        self.index
            .get(&name.trim().to_ascii_lowercase())
            .map(|&i| self.records[i].clone())
            .ok_or_else(|| InventoryError::UnknownDevice(name.to_string()))
    }

    fn devices(&self) -> Vec<DeviceRecord> {
        self.records.clone()
    }
}
