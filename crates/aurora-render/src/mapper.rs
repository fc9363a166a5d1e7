//! Path mapping: binds a normalized intent onto each device's vendor template.
//!
//! Mapping is where every device-state dependent decision is made. The generator only
//! renders what the mapper hands it.

use aurora_core::{
    DeviceRecord, FieldBinding, IntentField, Inventory, ModelDiscoveryResult, NormalizedIntent,
    PipelineError, SchemaStore, TemplateSelection, TemplateSet, Transport, DEVICE_SCOPE,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// A device left out of the mapping, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedDevice {
    pub device: String,
    pub reason: String,
}

/// Selections for every mapped device, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct MappingOutcome {
    pub selections: Vec<TemplateSelection>,
    /// Optional (transit) devices that could not be mapped.
    pub skipped: Vec<SkippedDevice>,
}

pub struct PathMapper {
    schema: Arc<dyn SchemaStore>,
}

impl PathMapper {
    pub fn new(schema: Arc<dyn SchemaStore>) -> Self {
        Self { schema }
    }

    /// Select a template per device and bind the intent's values to vendor paths.
    ///
    /// Endpoint devices without a usable template fail the whole mapping; transit devices
    /// are skipped. The cross-device identifier check runs only after every device is
    /// bound.
    pub fn map(
        &self,
        intent: &NormalizedIntent,
        discovery: &[ModelDiscoveryResult],
        inventory: &dyn Inventory,
    ) -> Result<MappingOutcome, PipelineError> {
        let endpoints = intent.endpoint_devices();
        let service_asn = service_asn(intent, inventory);
        let mut outcome = MappingOutcome::default();

        for result in discovery {
            let required = endpoints.contains(result.device.as_str());
            if !result.reachable {
                if required {
                    return Err(PipelineError::DeviceUnreachable {
                        device: result.device.clone(),
                        cause: result.reason.clone().unwrap_or_else(|| "unreachable".to_string()),
                    });
                }
                outcome.skipped.push(SkippedDevice {
                    device: result.device.clone(),
                    reason: "unreachable during discovery".to_string(),
                });
                continue;
            }

            match self.select(intent, result) {
                Ok((template, transports)) => {
                    let record = inventory.lookup(&result.device).map_err(|_| {
                        PipelineError::UnknownDevice {
                            device: result.device.clone(),
                        }
                    })?;
                    outcome
                        .selections
                        .push(bind(intent, &template, transports, &record, service_asn.as_deref()));
                }
                Err(err) if required => return Err(err),
                Err(err) => {
                    tracing::warn!(device = %result.device, error = %err, "Skipping transit device");
                    outcome.skipped.push(SkippedDevice {
                        device: result.device.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        let catalog: BTreeMap<&str, TemplateSet> = outcome
            .selections
            .iter()
            .filter_map(|s| {
                self.schema
                    .templates(s.vendor, &s.model_version, s.service_type)
                    .map(|t| (s.device.as_str(), t))
            })
            .collect();
        check_shared_identifiers(&outcome.selections, &catalog)?;

        tracing::debug!(
            service_id = %intent.service_id,
            mapped = outcome.selections.len(),
            skipped = outcome.skipped.len(),
            "Mapping complete"
        );
        Ok(outcome)
    }

    fn select(
        &self,
        intent: &NormalizedIntent,
        result: &ModelDiscoveryResult,
    ) -> Result<(TemplateSet, BTreeSet<Transport>), PipelineError> {
        let unsupported = |model_version: &str| PipelineError::UnsupportedVendorService {
            device: result.device.clone(),
            vendor: result.vendor,
            model_version: model_version.to_string(),
            service_type: intent.service_type,
        };

        let model_version = result
            .model_version
            .as_deref()
            .ok_or_else(|| unsupported("unknown"))?;
        let template = self
            .schema
            .templates(result.vendor, model_version, intent.service_type)
            .ok_or_else(|| unsupported(model_version))?;

        let transports: BTreeSet<Transport> = result
            .transports
            .intersection(&template.transports)
            .copied()
            .collect();
        if transports.is_empty() {
            return Err(unsupported(model_version));
        }
        Ok((template, transports))
    }
}

/// The service's AS number: requested explicitly, else the first endpoint that has one.
fn service_asn(intent: &NormalizedIntent, inventory: &dyn Inventory) -> Option<String> {
    if let Some(asn) = intent.value(IntentField::AsNumber) {
        return Some(asn.to_string());
    }
    intent
        .endpoints
        .iter()
        .filter_map(|e| inventory.lookup(&e.device).ok())
        .find_map(|r| r.bgp_asn)
        .map(|asn| asn.to_string())
}

/// Numeric index derived from the service id, used for default RD/RT values.
fn service_index(service_id: &str) -> u32 {
    let digest = Sha256::digest(service_id.as_bytes());
    u32::from(u16::from_be_bytes([digest[0], digest[1]])) % 65_000 + 1
}

fn logical_values(
    field: IntentField,
    intent: &NormalizedIntent,
    record: &DeviceRecord,
    service_asn: Option<&str>,
) -> Vec<String> {
    let derived = || service_asn.map(|asn| format!("{}:{}", asn, service_index(&intent.service_id)));
    match field {
        IntentField::ServiceId | IntentField::Description => vec![intent.service_id.clone()],
        IntentField::Interface => intent
            .interfaces_on(&record.name)
            .into_iter()
            .filter(|i| *i != DEVICE_SCOPE)
            .map(str::to_string)
            .collect(),
        IntentField::AsNumber => intent
            .value(field)
            .map(str::to_string)
            .or_else(|| record.bgp_asn.map(|asn| asn.to_string()))
            .into_iter()
            .collect(),
        IntentField::RouteDistinguisher | IntentField::RouteTarget => intent
            .value(field)
            .map(str::to_string)
            .or_else(derived)
            .into_iter()
            .collect(),
        IntentField::Protocol => intent
            .value(field)
            .map(|v| v.split(',').map(str::to_string).collect())
            .unwrap_or_default(),
        _ => intent.value(field).map(str::to_string).into_iter().collect(),
    }
}

fn bind(
    intent: &NormalizedIntent,
    template: &TemplateSet,
    transports: BTreeSet<Transport>,
    record: &DeviceRecord,
    service_asn: Option<&str>,
) -> TemplateSelection {
    let mut bindings = Vec::new();
    for path in &template.paths {
        for value in logical_values(path.field, intent, record, service_asn) {
            bindings.push(FieldBinding {
                field: path.field,
                path: path.path.clone(),
                value: path.encoding.encode(&value),
                encoding: path.encoding.clone(),
            });
        }
    }

    let unmapped: Vec<&str> = requested_fields(intent)
        .into_iter()
        .filter(|f| template.path_for(*f).is_none())
        .map(|f| f.as_str())
        .collect();
    let notes = (!unmapped.is_empty())
        .then(|| format!("{} has no path for: {}", template.id, unmapped.join(", ")));

    TemplateSelection {
        device: record.name.clone(),
        vendor: template.vendor,
        model_version: template.model_version.clone(),
        service_type: template.service_type,
        template_id: template.id.clone(),
        namespace: template.namespace.clone(),
        transports,
        bindings,
        command_template: template.cli.clone(),
        notes,
    }
}

/// Fields the intent explicitly asks for.
pub(crate) fn requested_fields(intent: &NormalizedIntent) -> Vec<IntentField> {
    [&intent.routing_policy, &intent.qos_policy, &intent.security_policy]
        .into_iter()
        .flatten()
        .flat_map(|policy| policy.keys().copied())
        .collect()
}

/// Every shared identifier must decode to one logical value across all devices.
fn check_shared_identifiers(
    selections: &[TemplateSelection],
    templates: &BTreeMap<&str, TemplateSet>,
) -> Result<(), PipelineError> {
    let mut seen: BTreeMap<IntentField, BTreeMap<String, Vec<&str>>> = BTreeMap::new();

    for selection in selections {
        let Some(template) = templates.get(selection.device.as_str()) else {
            continue;
        };
        for binding in selection.bindings.iter().filter(|b| b.field.is_shared_identifier()) {
            let encoding = template
                .path_for(binding.field)
                .map(|p| &p.encoding)
                .ok_or_else(|| PipelineError::InconsistentIdentifier {
                    field: binding.field.to_string(),
                    detail: format!("'{}' bound without a template path", selection.device),
                })?;
            let logical = encoding.decode(&binding.value).ok_or_else(|| {
                PipelineError::InconsistentIdentifier {
                    field: binding.field.to_string(),
                    detail: format!(
                        "'{}' carries '{}' which does not decode",
                        selection.device, binding.value
                    ),
                }
            })?;
            seen.entry(binding.field)
                .or_default()
                .entry(logical)
                .or_default()
                .push(selection.device.as_str());
        }
    }

    for (field, values) in seen {
        if values.len() > 1 {
            let detail = values
                .iter()
                .map(|(value, devices)| format!("{} on {}", value, devices.join("/")))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(PipelineError::InconsistentIdentifier {
                field: field.to_string(),
                detail,
            });
        }
    }
    Ok(())
}
