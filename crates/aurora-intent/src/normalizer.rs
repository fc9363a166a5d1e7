//! Raw fields to normalized intent.

use aurora_core::{
    DEVICE_SCOPE, Endpoint, IntentField, Inventory, InventoryError, NormalizedIntent,
    PipelineError, PolicyKind, PolicyMap, PolicyRule, RawFields, ServiceType,
};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Service markers in detection priority order.
const MARKER_PRIORITY: &[(&str, ServiceType)] = &[
    ("l3vpn", ServiceType::L3vpn),
    ("evpn", ServiceType::Evpn),
    ("security", ServiceType::Security),
    ("qos", ServiceType::Qos),
    ("routing", ServiceType::Routing),
];

/// Parameters that imply a service type when no marker names one.
const PARAM_HINTS: &[(IntentField, ServiceType)] = &[
    (IntentField::Vni, ServiceType::Evpn),
    (IntentField::Vrf, ServiceType::L3vpn),
    (IntentField::Acl, ServiceType::Security),
    (IntentField::Bandwidth, ServiceType::Qos),
    (IntentField::Latency, ServiceType::Qos),
    (IntentField::Jitter, ServiceType::Qos),
    (IntentField::Loss, ServiceType::Qos),
    (IntentField::Dscp, ServiceType::Qos),
    (IntentField::Protocol, ServiceType::Routing),
];

/// Converts raw fields into a validated [`NormalizedIntent`].
///
/// Normalization is a pure function of the raw fields and the inventory contents.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntentNormalizer;

impl IntentNormalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn normalize(
        &self,
        raw: &RawFields,
        inventory: &dyn Inventory,
    ) -> Result<NormalizedIntent, PipelineError> {
        let params = collect_params(raw)?;
        let service_type = detect_service_type(raw, &params)?;

        let devices = resolve_devices(&raw.devices, inventory)?;
        let endpoints = pair_endpoints(service_type, &devices, &raw.interfaces)?;
        if endpoints.len() < service_type.min_endpoints() {
            return Err(PipelineError::IntentIncomplete {
                missing: format!(
                    "{} needs at least {} endpoints, found {}",
                    service_type,
                    service_type.min_endpoints(),
                    endpoints.len()
                ),
            });
        }

        let transit_devices: Vec<String> = resolve_devices(&raw.transit_devices, inventory)?
            .into_iter()
            .filter(|d| !devices.contains(d))
            .collect();

        let mut policies: BTreeMap<PolicyKind, PolicyMap> = BTreeMap::new();
        for (field, value) in params {
            if let Some(kind) = field.policy_kind() {
                policies.entry(kind).or_default().insert(field, value);
            }
        }
        if service_type == ServiceType::Evpn {
            let mode = evpn_mode(raw)?;
            policies
                .entry(PolicyKind::Routing)
                .or_default()
                .insert(IntentField::EvpnMode, mode.to_string());
        }

        check_policy_rules(service_type, &policies)?;

        let service_id = match raw.service_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => derive_service_id(service_type, &endpoints, &policies),
        };

        let intent = NormalizedIntent {
            service_type,
            service_id,
            endpoints,
            transit_devices,
            routing_policy: policies.remove(&PolicyKind::Routing),
            qos_policy: policies.remove(&PolicyKind::Qos),
            security_policy: policies.remove(&PolicyKind::Security),
        };
        tracing::debug!(
            service_id = %intent.service_id,
            service_type = %intent.service_type,
            endpoints = intent.endpoints.len(),
            "Intent normalized"
        );
        Ok(intent)
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn check_range(field: IntentField, value: &str) -> Result<(), PipelineError> {
    let bounds = match field {
        IntentField::Mtu => Some((64, 9216)),
        IntentField::Vlan => Some((1, 4094)),
        IntentField::Vni => Some((1, 16_777_215)),
        IntentField::AsNumber => Some((1, u32::MAX as u64)),
        _ => None,
    };
    let Some((low, high)) = bounds else {
        return Ok(());
    };
    match value.parse::<u64>() {
        Ok(n) if (low..=high).contains(&n) => Ok(()),
        _ => Err(PipelineError::IntentConflict {
            detail: format!("{} {} is outside {}..={}", field, value, low, high),
        }),
    }
}

/// Reduce every parameter to one value, rejecting contradictions.
fn collect_params(raw: &RawFields) -> Result<BTreeMap<IntentField, String>, PipelineError> {
    let mut params = BTreeMap::new();
    for (key, values) in &raw.params {
        let Some(field) = IntentField::from_param_key(key) else {
            tracing::debug!(key = %key, "Ignoring unrecognized parameter");
            continue;
        };
        let mut distinct: Vec<String> = Vec::new();
        for value in values.iter().filter_map(value_to_string) {
            if !distinct.contains(&value) {
                distinct.push(value);
            }
        }
        if distinct.is_empty() {
            continue;
        }
        let value = if field.is_multi_valued() {
            distinct.sort();
            distinct.join(",")
        } else if distinct.len() > 1 {
            return Err(PipelineError::IntentConflict {
                detail: format!("conflicting values for {}: {}", field, distinct.join(", ")),
            });
        } else {
            distinct.remove(0)
        };
        check_range(field, &value)?;
        if let Some(previous) = params.insert(field, value.clone())
            && previous != value
            && !field.is_multi_valued()
        {
            return Err(PipelineError::IntentConflict {
                detail: format!("conflicting values for {}: {}, {}", field, previous, value),
            });
        }
    }
    Ok(params)
}

fn detect_service_type(
    raw: &RawFields,
    params: &BTreeMap<IntentField, String>,
) -> Result<ServiceType, PipelineError> {
    if let Some(explicit) = raw.service_type.as_deref().filter(|s| !s.trim().is_empty()) {
        return explicit
            .parse()
            .map_err(|e: String| PipelineError::IntentIncomplete { missing: e });
    }
    let markers = &raw.service_markers;
    if let Some((_, service)) = MARKER_PRIORITY.iter().find(|(m, _)| markers.contains(*m)) {
        return Ok(*service);
    }
    PARAM_HINTS
        .iter()
        .find(|(field, _)| params.contains_key(field))
        .map(|(_, service)| *service)
        .ok_or_else(|| PipelineError::IntentIncomplete {
            missing: "service type could not be determined".to_string(),
        })
}

fn evpn_mode(raw: &RawFields) -> Result<&'static str, PipelineError> {
    let markers = &raw.service_markers;
    let l2 = markers.contains("evpn-l2");
    let l3 = markers.contains("evpn-l3");
    let irb = markers.contains("evpn-irb");
    match (l2, l3, irb) {
        (true, true, false) => Err(PipelineError::IntentConflict {
            detail: "both L2 and L3 EVPN requested without an IRB qualifier".to_string(),
        }),
        (_, _, true) => Ok("irb"),
        (false, true, false) => Ok("l3"),
        _ => Ok("l2"),
    }
}

/// Canonical names in first-appearance order, duplicates removed.
fn resolve_devices(
    names: &[String],
    inventory: &dyn Inventory,
) -> Result<Vec<String>, PipelineError> {
    let mut resolved: Vec<String> = Vec::new();
    for name in names {
        let record = inventory.lookup(name).map_err(|e| match e {
            InventoryError::UnknownDevice(device) => PipelineError::UnknownDevice { device },
            other => PipelineError::UnknownDevice {
                device: format!("{} ({})", name, other),
            },
        })?;
        if !resolved.contains(&record.name) {
            resolved.push(record.name);
        }
    }
    Ok(resolved)
}

fn pair_endpoints(
    service_type: ServiceType,
    devices: &[String],
    interfaces: &[String],
) -> Result<Vec<Endpoint>, PipelineError> {
    if devices.is_empty() && !interfaces.is_empty() {
        return Err(PipelineError::IntentIncomplete {
            missing: format!("device for interface(s) {}", interfaces.join(", ")),
        });
    }
    // A single device may carry several attachment interfaces
    if let [device] = devices
        && interfaces.len() > 1
    {
        return Ok(interfaces
            .iter()
            .map(|i| Endpoint::new(device.clone(), i.clone()))
            .collect());
    }
    if interfaces.len() > devices.len() {
        return Err(PipelineError::IntentConflict {
            detail: format!(
                "{} interfaces given for {} devices",
                interfaces.len(),
                devices.len()
            ),
        });
    }
    devices
        .iter()
        .enumerate()
        .map(|(i, device)| match interfaces.get(i) {
            Some(interface) => Ok(Endpoint::new(device.clone(), interface.clone())),
            None if service_type.is_vpn_class() => Err(PipelineError::IntentIncomplete {
                missing: format!("attachment interface for endpoint {}", device),
            }),
            None => Ok(Endpoint::new(device.clone(), DEVICE_SCOPE)),
        })
        .collect()
}

fn check_policy_rules(
    service_type: ServiceType,
    policies: &BTreeMap<PolicyKind, PolicyMap>,
) -> Result<(), PipelineError> {
    for kind in [PolicyKind::Routing, PolicyKind::Qos, PolicyKind::Security] {
        let present = policies.get(&kind).is_some_and(|p| !p.is_empty());
        if present && service_type.policy_rule(kind) == PolicyRule::Forbidden {
            let fields: Vec<&str> = policies[&kind].keys().map(|f| f.as_str()).collect();
            return Err(PipelineError::IntentConflict {
                detail: format!(
                    "{} is not allowed for {} (found {})",
                    kind,
                    service_type,
                    fields.join(", ")
                ),
            });
        }
    }

    let required = service_type.required_fields();
    let satisfied = required.iter().any(|field| {
        field
            .policy_kind()
            .and_then(|kind| policies.get(&kind))
            .is_some_and(|p| p.contains_key(field))
    });
    if !satisfied {
        let names: Vec<&str> = required.iter().map(|f| f.as_str()).collect();
        return Err(PipelineError::IntentIncomplete {
            missing: format!("{} requires {}", service_type, names.join(" or ")),
        });
    }
    Ok(())
}

fn derive_service_id(
    service_type: ServiceType,
    endpoints: &[Endpoint],
    policies: &BTreeMap<PolicyKind, PolicyMap>,
) -> String {
    let mut canonical = String::from(service_type.slug());
    for endpoint in endpoints {
        canonical.push_str(&format!("|{}:{}", endpoint.device, endpoint.interface));
    }
    for (field, value) in policies.values().flatten() {
        canonical.push_str(&format!("|{}={}", field, value));
    }
    let digest = format!("{:x}", Sha256::digest(canonical.as_bytes()));
    format!("{}-{}", service_type.slug(), &digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use aurora_core::StaticInventory;
    use serde_json::json;

    fn inventory() -> StaticInventory {
        StaticInventory::from_yaml(
            r#"
devices:
  - { name: PE1, aliases: [pe1-nyc], vendor: juniper, address: 10.0.0.1 }
  - { name: PE2, vendor: cisco, address: 10.0.0.2 }
  - { name: P1, vendor: cisco, address: 10.0.0.9 }
"#,
        )
        .unwrap()
    }

    fn l3vpn_raw() -> RawFields {
        let mut raw = RawFields::default();
        raw.service_markers.insert("l3vpn".into());
        raw.devices = vec!["pe1-nyc".into(), "PE2".into()];
        raw.interfaces = vec!["ge-0/0/1".into(), "Gi0/0/0/1".into()];
        raw.push_param("vrf", json!("CUST_A"));
        raw.push_param("mtu", json!(9000));
        raw.push_param("as", json!(65000));
        raw
    }

    #[test]
    fn normalizes_l3vpn_and_resolves_aliases() {
        let intent = IntentNormalizer::new()
            .normalize(&l3vpn_raw(), &inventory())
            .unwrap();
        assert_eq!(intent.service_type, ServiceType::L3vpn);
        assert_eq!(intent.endpoints[0], Endpoint::new("PE1", "ge-0/0/1"));
        assert_eq!(intent.endpoints[1], Endpoint::new("PE2", "Gi0/0/0/1"));
        assert_eq!(intent.value(IntentField::Vrf), Some("CUST_A"));
        assert_eq!(intent.value(IntentField::AsNumber), Some("65000"));
        assert!(intent.service_id.starts_with("l3vpn-"));
        assert!(intent.security_policy.is_none());
    }

    #[test]
    fn deterministic_service_id() {
        let a = IntentNormalizer::new().normalize(&l3vpn_raw(), &inventory()).unwrap();
        let b = IntentNormalizer::new().normalize(&l3vpn_raw(), &inventory()).unwrap();
        assert_eq!(a, b);

        let mut other = l3vpn_raw();
        other.params.insert("mtu".into(), vec![json!(1500)]);
        let c = IntentNormalizer::new().normalize(&other, &inventory()).unwrap();
        assert_ne!(a.service_id, c.service_id);
    }

    #[test]
    fn unknown_device_fails() {
        let mut raw = l3vpn_raw();
        raw.devices.push("PE7".into());
        raw.interfaces.push("ge-0/0/7".into());
        let err = IntentNormalizer::new().normalize(&raw, &inventory()).unwrap_err();
        assert!(matches!(err, PipelineError::UnknownDevice { device } if device == "PE7"));
    }

    #[test]
    fn vpn_needs_two_endpoints_with_interfaces() {
        let mut raw = l3vpn_raw();
        raw.devices.truncate(1);
        raw.interfaces.truncate(1);
        let err = IntentNormalizer::new().normalize(&raw, &inventory()).unwrap_err();
        assert!(matches!(err, PipelineError::IntentIncomplete { .. }));

        let mut raw = l3vpn_raw();
        raw.interfaces.truncate(1);
        let err = IntentNormalizer::new().normalize(&raw, &inventory()).unwrap_err();
        assert!(err.to_string().contains("attachment interface for endpoint PE2"));
    }

    #[test]
    fn interfaces_without_devices_are_incomplete() {
        let mut raw = l3vpn_raw();
        raw.devices.clear();
        let err = IntentNormalizer::new().normalize(&raw, &inventory()).unwrap_err();
        assert!(matches!(err, PipelineError::IntentIncomplete { .. }), "{err:?}");
        assert!(err.to_string().contains("device for interface(s) ge-0/0/1, Gi0/0/0/1"));

        // More interfaces than devices is still a contradiction
        let mut raw = l3vpn_raw();
        raw.interfaces.push("ge-0/0/9".into());
        let err = IntentNormalizer::new().normalize(&raw, &inventory()).unwrap_err();
        assert!(matches!(err, PipelineError::IntentConflict { .. }));
    }

    #[test]
    fn contradictory_values_conflict() {
        let mut raw = l3vpn_raw();
        raw.push_param("mtu", json!(1500));
        let err = IntentNormalizer::new().normalize(&raw, &inventory()).unwrap_err();
        assert!(matches!(err, PipelineError::IntentConflict { .. }));
    }

    #[test]
    fn evpn_l2_and_l3_without_irb_conflict() {
        let mut raw = l3vpn_raw();
        raw.service_markers = ["evpn", "evpn-l2", "evpn-l3"].map(String::from).into();
        raw.params.remove("vrf");
        raw.push_param("vni", json!(10100));
        let err = IntentNormalizer::new().normalize(&raw, &inventory()).unwrap_err();
        assert!(matches!(err, PipelineError::IntentConflict { .. }));

        raw.service_markers.insert("evpn-irb".into());
        let intent = IntentNormalizer::new().normalize(&raw, &inventory()).unwrap();
        assert_eq!(intent.value(IntentField::EvpnMode), Some("irb"));
    }

    #[test]
    fn forbidden_policy_conflicts() {
        let mut raw = l3vpn_raw();
        raw.push_param("acl", json!("EDGE_IN"));
        let err = IntentNormalizer::new().normalize(&raw, &inventory()).unwrap_err();
        assert!(err.to_string().contains("security_policy is not allowed for L3VPN"));
    }

    #[test]
    fn missing_required_key_is_incomplete() {
        let mut raw = l3vpn_raw();
        raw.params.remove("vrf");
        let err = IntentNormalizer::new().normalize(&raw, &inventory()).unwrap_err();
        assert!(err.to_string().contains("L3VPN requires vrf"));
    }

    #[test]
    fn qos_defaults_to_device_scope() {
        let mut raw = RawFields::default();
        raw.service_markers.insert("qos".into());
        raw.devices = vec!["PE2".into()];
        raw.push_param("bandwidth", json!(500));
        let intent = IntentNormalizer::new().normalize(&raw, &inventory()).unwrap();
        assert_eq!(intent.endpoints, vec![Endpoint::new("PE2", "*")]);
        assert_eq!(intent.value(IntentField::Bandwidth), Some("500"));
    }

    #[test]
    fn transit_devices_are_resolved() {
        let mut raw = l3vpn_raw();
        raw.transit_devices = vec!["p1".into()];
        let intent = IntentNormalizer::new().normalize(&raw, &inventory()).unwrap();
        assert_eq!(intent.transit_devices, vec!["P1"]);
        assert_eq!(intent.devices(), vec!["PE1", "PE2", "P1"]);
    }

    #[test]
    fn out_of_range_mtu_conflicts() {
        let mut raw = l3vpn_raw();
        raw.params.insert("mtu".into(), vec![json!(70000)]);
        let err = IntentNormalizer::new().normalize(&raw, &inventory()).unwrap_err();
        assert!(err.to_string().contains("mtu 70000"));
    }
}
