//! Simulated lab network.
//!
//! Serves as both the schema store and the device channel for a set of in-memory
//! devices, with per-device fault injection. Used by the scenario tests and by
//! `aurora process --lab`.

use async_trait::async_trait;
use aurora_core::{
    CapabilitySet, ConfigPayload, ConfigSnapshot, DeviceRecord, SchemaError, SchemaStore,
    ServiceType, TemplateCatalog, TemplateSet, Vendor,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;

use crate::channel::{ChannelError, DeviceChannel, DeviceState};

/// Faults a lab device can be told to exhibit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Faults {
    /// Probes and channel calls fail as unreachable.
    pub unreachable: bool,
    /// Apply is refused.
    pub reject_apply: bool,
    /// Readback never reports the applied checksum.
    pub stale_readback: bool,
    /// Restore is refused.
    pub reject_restore: bool,
    /// The next N readbacks fail as unreachable.
    pub failing_readbacks: u32,
    /// Delay added to every call.
    pub latency_ms: u64,
}

/// A device as declared in a lab document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabDevice {
    pub name: String,
    pub vendor: Vendor,
    pub os_version: String,
    /// Running configuration at start.
    #[serde(default)]
    pub config: String,
    /// Capability flags; the vendor defaults when absent.
    #[serde(default)]
    pub flags: Option<BTreeSet<String>>,
    #[serde(default)]
    pub faults: Faults,
}

#[derive(Debug, Error)]
pub enum LabError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("device '{0}' is declared twice")]
    Duplicate(String),
}

#[derive(Debug, Deserialize)]
struct LabDocument {
    #[serde(default)]
    devices: Vec<LabDevice>,
}

#[derive(Debug)]
struct SimulatedDevice {
    declared: LabDevice,
    running: String,
    committed_checksum: Option<String>,
    applies: usize,
    restores: usize,
}

/// In-memory devices behind one schema store and channel.
pub struct LabNetwork {
    catalog: TemplateCatalog,
    devices: RwLock<HashMap<String, SimulatedDevice>>,
}

impl LabNetwork {
    pub fn new(catalog: TemplateCatalog) -> Self {
        Self {
            catalog,
            devices: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_devices(devices: Vec<LabDevice>) -> Result<Self, LabError> {
        let lab = Self::new(TemplateCatalog::builtin());
        for device in devices {
            lab.add_device(device)?;
        }
        Ok(lab)
    }

    /// Parse a lab document with a top-level `devices:` list.
    pub fn from_yaml(content: &str) -> Result<Self, LabError> {
        let doc: LabDocument = serde_yaml::from_str(content)?;
        Self::from_devices(doc.devices)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LabError> {
        Self::from_yaml(&std::fs::read_to_string(path)?)
    }

    pub fn add_device(&self, device: LabDevice) -> Result<(), LabError> {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        if devices.contains_key(&device.name) {
            return Err(LabError::Duplicate(device.name));
        }
        devices.insert(
            device.name.clone(),
            SimulatedDevice {
                running: device.config.clone(),
                declared: device,
                committed_checksum: None,
                applies: 0,
                restores: 0,
            },
        );
        Ok(())
    }

    /// Replace a device's faults. Returns false for unknown devices.
    pub fn set_faults(&self, device: &str, faults: Faults) -> bool {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        match devices.get_mut(device) {
            Some(sim) => {
                sim.declared.faults = faults;
                true
            }
            None => false,
        }
    }

    pub fn running_config(&self, device: &str) -> Option<String> {
        self.with_device(device, |sim| sim.running.clone())
    }

    pub fn apply_count(&self, device: &str) -> usize {
        self.with_device(device, |sim| sim.applies).unwrap_or(0)
    }

    pub fn restore_count(&self, device: &str) -> usize {
        self.with_device(device, |sim| sim.restores).unwrap_or(0)
    }

    fn with_device<T>(&self, device: &str, f: impl FnOnce(&SimulatedDevice) -> T) -> Option<T> {
        let devices = self.devices.read().unwrap_or_else(PoisonError::into_inner);
        devices.get(device).map(f)
    }

    async fn delay(&self, device: &str) {
        let latency = self.with_device(device, |sim| sim.declared.faults.latency_ms).unwrap_or(0);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
    }

    /// Run `f` against a reachable device.
    fn operate<T>(
        &self,
        device: &str,
        f: impl FnOnce(&mut SimulatedDevice) -> Result<T, ChannelError>,
    ) -> Result<T, ChannelError> {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        match devices.get_mut(device) {
            Some(sim) if !sim.declared.faults.unreachable => f(sim),
            _ => Err(ChannelError::Unreachable(device.to_string())),
        }
    }
}

#[async_trait]
impl SchemaStore for LabNetwork {
    fn revision(&self) -> u64 {
        1
    }

    async fn capabilities(&self, device: &DeviceRecord) -> Result<CapabilitySet, SchemaError> {
        self.delay(&device.name).await;
        let devices = self.devices.read().unwrap_or_else(PoisonError::into_inner);
        let sim = devices
            .get(&device.name)
            .filter(|sim| !sim.declared.faults.unreachable)
            .ok_or_else(|| SchemaError::Unreachable(device.name.clone()))?;

        let mut capabilities =
            TemplateCatalog::default_capabilities(sim.declared.vendor, &sim.declared.os_version);
        if let Some(flags) = &sim.declared.flags {
            capabilities.flags = flags.clone();
        }
        Ok(capabilities)
    }

    fn model_versions(&self, vendor: Vendor) -> Vec<String> {
        self.catalog.model_versions(vendor)
    }

    fn templates(
        &self,
        vendor: Vendor,
        model_version: &str,
        service_type: ServiceType,
    ) -> Option<TemplateSet> {
        self.catalog.find(vendor, model_version, service_type)
    }
}

#[async_trait]
impl DeviceChannel for LabNetwork {
    async fn apply(&self, payload: &ConfigPayload) -> Result<(), ChannelError> {
        let device = payload.device();
        self.delay(device).await;
        self.operate(device, |sim| {
            if sim.declared.faults.reject_apply {
                return Err(ChannelError::Rejected {
                    device: device.to_string(),
                    message: "commit check failed".to_string(),
                });
            }
            sim.running = payload.body().to_string();
            sim.committed_checksum = Some(payload.checksum().to_string());
            sim.applies += 1;
            Ok(())
        })
    }

    async fn readback(&self, device: &str) -> Result<DeviceState, ChannelError> {
        self.delay(device).await;
        self.operate(device, |sim| {
            if sim.declared.faults.failing_readbacks > 0 {
                sim.declared.faults.failing_readbacks -= 1;
                return Err(ChannelError::Unreachable(device.to_string()));
            }
            let checksum = if sim.declared.faults.stale_readback {
                None
            } else {
                sim.committed_checksum.clone()
            };
            Ok(DeviceState {
                device: device.to_string(),
                config: sim.running.clone(),
                checksum,
            })
        })
    }

    async fn restore(&self, snapshot: &ConfigSnapshot) -> Result<(), ChannelError> {
        let device = snapshot.device.as_str();
        self.delay(device).await;
        self.operate(device, |sim| {
            if sim.declared.faults.reject_restore {
                return Err(ChannelError::Rejected {
                    device: device.to_string(),
                    message: "rollback refused".to_string(),
                });
            }
            sim.running = snapshot.config.clone();
            sim.committed_checksum = None;
            sim.restores += 1;
            Ok(())
        })
    }
}
