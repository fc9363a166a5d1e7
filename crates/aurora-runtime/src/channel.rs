//! Device channels: how payloads reach devices.
//!
//! One channel serves each transport. The orchestrator never talks to a device except
//! through [`DeviceChannel`].

use async_trait::async_trait;
use aurora_core::{ConfigPayload, ConfigSnapshot, Transport};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// What a device reports when its configuration is read back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    pub device: String,
    /// Running configuration.
    pub config: String,
    /// Checksum of the last payload the device committed, if it tracks one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

#[derive(Debug, Error)]
pub enum ChannelError {
    /// The device refused the operation. Nothing was changed.
    #[error("device '{device}' rejected the request: {message}")]
    Rejected { device: String, message: String },

    #[error("device '{0}' is unreachable")]
    Unreachable(String),

    /// No answer in time; the device may or may not have acted.
    #[error("{operation} on '{device}' timed out")]
    Timeout {
        device: String,
        operation: &'static str,
    },

    #[error("no channel registered for {0}")]
    NoChannel(Transport),
}

impl ChannelError {
    /// Whether the device may have changed despite the error.
    pub fn may_have_changed(&self) -> bool {
        matches!(self, ChannelError::Timeout { .. })
    }
}

/// A management session to devices over one transport.
///
/// `restore` must be idempotent: restoring the same snapshot twice leaves the device in
/// the same state as restoring it once.
#[async_trait]
pub trait DeviceChannel: Send + Sync {
    async fn apply(&self, payload: &ConfigPayload) -> Result<(), ChannelError>;

    async fn readback(&self, device: &str) -> Result<DeviceState, ChannelError>;

    async fn restore(&self, snapshot: &ConfigSnapshot) -> Result<(), ChannelError>;
}

/// Channels by transport.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    channels: HashMap<Transport, Arc<dyn DeviceChannel>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One channel for every transport.
    pub fn uniform(channel: Arc<dyn DeviceChannel>) -> Self {
        let mut registry = Self::new();
        for transport in Transport::PREFERENCE {
            registry.register(transport, channel.clone());
        }
        registry
    }

    pub fn register(&mut self, transport: Transport, channel: Arc<dyn DeviceChannel>) {
        self.channels.insert(transport, channel);
    }

    pub fn get(&self, transport: Transport) -> Result<Arc<dyn DeviceChannel>, ChannelError> {
        self.channels
            .get(&transport)
            .cloned()
            .ok_or(ChannelError::NoChannel(transport))
    }
}
