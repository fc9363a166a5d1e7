//! Validation findings.

use aurora_core::IntentField;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Categories of validation findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    // Local defects
    /// Payload body no longer matches the checksum taken at generation.
    ChecksumMismatch,
    /// Payload is not well-formed for its declared format.
    Malformed,

    // Semantic findings
    /// A bound value disagrees with the requested value.
    SemanticMismatch,
    /// A requested value is absent from the rendered payload.
    MissingValue,
    /// The device's template has no path for a requested field.
    NotExpressible,
    /// A requested SLO tighter than the network can reasonably promise.
    AggressiveSlo,

    // Deployment safety
    /// The device cannot perform an auto-reverting commit.
    NoSafeCommit,
    /// Some devices of the service are left out of this deployment.
    PartialDeployment,

    // Impact
    /// The change touches devices or interfaces used by other services.
    SharedInfrastructure,
    /// The change touches a device carrying production services.
    ProductionOverlap,
}

/// One validation finding, bound to a device when it concerns one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub kind: FindingKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    pub message: String,
}

impl Finding {
    pub fn new(kind: FindingKind, device: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            kind,
            device: device.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn checksum_mismatch(device: &str) -> Self {
        Self::new(
            FindingKind::ChecksumMismatch,
            Some(device),
            format!("payload for '{}' does not match its checksum", device),
        )
    }

    pub fn malformed(device: &str, cause: &str) -> Self {
        Self::new(
            FindingKind::Malformed,
            Some(device),
            format!("payload for '{}' is malformed: {}", device, cause),
        )
    }

    pub fn semantic_mismatch(device: &str, field: IntentField, requested: &str, bound: &[&str]) -> Self {
        Self::new(
            FindingKind::SemanticMismatch,
            Some(device),
            format!(
                "{} on '{}' is bound to {:?} but {} was requested",
                field, device, bound, requested
            ),
        )
    }

    pub fn missing_value(device: &str, field: IntentField, expected: &str) -> Self {
        Self::new(
            FindingKind::MissingValue,
            Some(device),
            format!(
                "requested {} {} does not appear in the payload for '{}'",
                field, expected, device
            ),
        )
    }

    pub fn not_expressible(device: &str, field: IntentField, template_id: &str) -> Self {
        Self::new(
            FindingKind::NotExpressible,
            Some(device),
            format!(
                "template {} used for '{}' cannot express {}",
                template_id, device, field
            ),
        )
    }

    pub fn aggressive_slo(latency_ms: f64) -> Self {
        Self::new(
            FindingKind::AggressiveSlo,
            None,
            format!("latency objective of {} ms is below 10 ms", latency_ms),
        )
    }

    pub fn no_safe_commit(device: &str) -> Self {
        Self::new(
            FindingKind::NoSafeCommit,
            Some(device),
            format!("'{}' does not support confirmed commit", device),
        )
    }

    pub fn partial_deployment(skipped: &[String]) -> Self {
        Self::new(
            FindingKind::PartialDeployment,
            None,
            format!("deploying without {}", skipped.join(", ")),
        )
    }

    pub fn shared_infrastructure(device: &str, services: &[&str]) -> Self {
        Self::new(
            FindingKind::SharedInfrastructure,
            Some(device),
            format!("'{}' also carries {}", device, services.join(", ")),
        )
    }

    pub fn production_overlap(devices: &[&str]) -> Self {
        Self::new(
            FindingKind::ProductionOverlap,
            None,
            format!("production services affected on {}", devices.join(", ")),
        )
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}
