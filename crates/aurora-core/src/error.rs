//! Pipeline error taxonomy.
//!
//! Internal stages return [`PipelineError`]. At the processor boundary every error is
//! translated into an [`ErrorReport`] placed on the response, never propagated.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::{PipelineState, ServiceType, Vendor};

/// Errors raised by pipeline stages.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The extraction provider failed to produce raw fields.
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    /// Required fields for the service type are missing.
    #[error("intent incomplete: {missing}")]
    IntentIncomplete { missing: String },

    /// Two extracted requirements are mutually exclusive.
    #[error("intent conflict: {detail}")]
    IntentConflict { detail: String },

    /// A device name did not resolve against the inventory.
    #[error("unknown device '{device}'")]
    UnknownDevice { device: String },

    /// Discovery could not reach enough devices after retries.
    #[error("device '{device}' unreachable: {cause}")]
    DeviceUnreachable { device: String, cause: String },

    /// No template set exists for the device's vendor, model version and service.
    #[error(
        "no {service_type} template for device '{device}' ({vendor} model {model_version})"
    )]
    UnsupportedVendorService {
        device: String,
        vendor: Vendor,
        model_version: String,
        service_type: ServiceType,
    },

    /// A shared identifier does not resolve to one value across devices.
    #[error("inconsistent {field} across devices: {detail}")]
    InconsistentIdentifier { field: String, detail: String },

    /// A generated payload failed syntax or integrity checks.
    #[error("malformed payload for '{device}': {cause}")]
    PayloadMalformed { device: String, cause: String },

    /// No rollback snapshot could be obtained for a device.
    #[error("no rollback snapshot available for '{device}'")]
    SnapshotUnavailable { device: String },

    /// Applying or confirming a payload failed.
    #[error("apply failed on '{device}': {cause}")]
    ApplyFailure { device: String, cause: String },

    /// Restoring one or more devices failed; they are in an unknown state.
    #[error("rollback failed on {}: {cause}", devices.join(", "))]
    RollbackFailure { devices: Vec<String>, cause: String },

    /// The request was cancelled by the caller.
    #[error("processing cancelled")]
    Cancelled,

    /// An operator rejected the pending deployment.
    #[error("deployment rejected by {by}: {reason}")]
    ApprovalRejected { by: String, reason: String },
}

/// Serializable category of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ExtractionFailed,
    IntentIncompleteError,
    IntentConflictError,
    UnknownDeviceError,
    DeviceUnreachableError,
    UnsupportedVendorServiceError,
    InconsistentIdentifierError,
    PayloadMalformedError,
    SnapshotUnavailable,
    ApplyFailure,
    RollbackFailure,
    Cancelled,
    ApprovalRejected,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::ExtractionFailed(_) => ErrorKind::ExtractionFailed,
            PipelineError::IntentIncomplete { .. } => ErrorKind::IntentIncompleteError,
            PipelineError::IntentConflict { .. } => ErrorKind::IntentConflictError,
            PipelineError::UnknownDevice { .. } => ErrorKind::UnknownDeviceError,
            PipelineError::DeviceUnreachable { .. } => ErrorKind::DeviceUnreachableError,
            PipelineError::UnsupportedVendorService { .. } => {
                ErrorKind::UnsupportedVendorServiceError
            }
            PipelineError::InconsistentIdentifier { .. } => ErrorKind::InconsistentIdentifierError,
            PipelineError::PayloadMalformed { .. } => ErrorKind::PayloadMalformedError,
            PipelineError::SnapshotUnavailable { .. } => ErrorKind::SnapshotUnavailable,
            PipelineError::ApplyFailure { .. } => ErrorKind::ApplyFailure,
            PipelineError::RollbackFailure { .. } => ErrorKind::RollbackFailure,
            PipelineError::Cancelled => ErrorKind::Cancelled,
            PipelineError::ApprovalRejected { .. } => ErrorKind::ApprovalRejected,
        }
    }

    /// The device the error concerns, if it concerns exactly one.
    pub fn device(&self) -> Option<&str> {
        match self {
            PipelineError::UnknownDevice { device }
            | PipelineError::DeviceUnreachable { device, .. }
            | PipelineError::UnsupportedVendorService { device, .. }
            | PipelineError::PayloadMalformed { device, .. }
            | PipelineError::SnapshotUnavailable { device }
            | PipelineError::ApplyFailure { device, .. } => Some(device),
            PipelineError::RollbackFailure { devices, .. } if devices.len() == 1 => {
                devices.first().map(String::as_str)
            }
            _ => None,
        }
    }

    /// Fatal errors leave devices in an unknown state and need manual remediation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::RollbackFailure { .. })
    }

    /// Local errors are caused by the request itself and are never retried.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            PipelineError::IntentIncomplete { .. }
                | PipelineError::IntentConflict { .. }
                | PipelineError::UnknownDevice { .. }
        )
    }

    /// Structured report of this error as raised at `stage`.
    pub fn report(&self, stage: PipelineState) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            stage,
            device: self.device().map(str::to_string),
            message: self.to_string(),
            fatal: self.is_fatal(),
        }
    }
}

/// User-visible error description carried on the response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    /// The state being entered when the error occurred.
    pub stage: PipelineState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    pub message: String,
    #[serde(default)]
    pub fatal: bool,
}
