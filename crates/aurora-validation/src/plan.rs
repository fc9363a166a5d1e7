//! Post-deployment verification and commit strategy.

use aurora_core::{
    CONFIRMED_COMMIT, CommitPlan, IntentField, ModelDiscoveryResult, NormalizedIntent,
    ServiceType, TemplateSelection, VerificationPlan,
};

/// Checks to run once the service is deployed.
pub fn verification_plan(intent: &NormalizedIntent) -> VerificationPlan {
    let devices = intent.devices().join(", ");
    let attachments = intent
        .endpoints
        .iter()
        .map(|e| format!("{}:{}", e.device, e.interface))
        .collect::<Vec<_>>()
        .join(", ");
    let value = |field| intent.value(field);

    let mut checks = Vec::new();
    let mut telemetry = Vec::new();

    match intent.service_type {
        ServiceType::L3vpn => {
            checks.push(format!("BGP VPNv4 sessions established on {}", devices));
            if let Some(vrf) = value(IntentField::Vrf) {
                checks.push(format!("VRF {} holds routes from every endpoint", vrf));
            }
            checks.push(format!("Attachment circuits up: {}", attachments));
            if let Some(mtu) = value(IntentField::Mtu) {
                checks.push(format!("MTU {} passes end to end without fragmentation", mtu));
            }
            telemetry.extend(["bgp neighbor state", "vrf route count", "interface oper-status"]);
        }
        ServiceType::Evpn => {
            if let Some(vni) = value(IntentField::Vni) {
                checks.push(format!("EVPN instance for VNI {} up on {}", vni, devices));
            }
            checks.push("MAC addresses learned across all endpoints".to_string());
            if value(IntentField::EvpnMode) == Some("irb") {
                checks.push("IRB gateway answers on every endpoint".to_string());
            }
            telemetry.extend(["evpn mac table size", "vxlan tunnel state", "interface oper-status"]);
        }
        ServiceType::Qos => {
            checks.push(format!("Policy {} attached on {}", intent.service_id, attachments));
            if let Some(bw) = value(IntentField::Bandwidth) {
                checks.push(format!("Shaped rate of {} Mbps observed under load", bw));
            }
            if let Some(latency) = value(IntentField::Latency) {
                checks.push(format!("One-way latency stays below {} ms", latency));
            }
            if let Some(jitter) = value(IntentField::Jitter) {
                checks.push(format!("Jitter stays below {} ms", jitter));
            }
            if let Some(loss) = value(IntentField::Loss) {
                checks.push(format!("Packet loss stays below {}%", loss));
            }
            telemetry.extend(["queue drops", "interface utilization"]);
            if value(IntentField::Latency).is_some() {
                telemetry.push("probe latency");
            }
        }
        ServiceType::Security => {
            if let Some(acl) = value(IntentField::Acl) {
                checks.push(format!("ACL {} applied ingress on {}", acl, attachments));
            }
            if value(IntentField::FilterPrivate).is_some() {
                checks.push("RFC 1918 sources are dropped".to_string());
            }
            telemetry.push("acl hit counters");
        }
        ServiceType::Routing => {
            for protocol in value(IntentField::Protocol).into_iter().flat_map(|p| p.split(',')) {
                checks.push(format!("{} adjacency established on {}", protocol, devices));
            }
            if let Some(asn) = value(IntentField::AsNumber) {
                checks.push(format!("BGP runs as AS {}", asn));
            }
            telemetry.extend(["routing table size", "protocol adjacency state"]);
        }
    }

    if value(IntentField::Bfd).is_some() {
        checks.push("BFD sessions up".to_string());
        telemetry.push("bfd session state");
    }

    VerificationPlan {
        checks,
        telemetry: telemetry.into_iter().map(str::to_string).collect(),
    }
}

/// Confirmed commit when every mapped device supports it, else commit and verify by
/// readback.
pub fn commit_plan(
    selections: &[TemplateSelection],
    discovery: &[ModelDiscoveryResult],
    rollback_timeout_secs: u64,
) -> CommitPlan {
    let confirmed = !selections.is_empty()
        && selections.iter().all(|s| {
            discovery
                .iter()
                .find(|d| d.device == s.device)
                .is_some_and(|d| d.capability_flags.contains(CONFIRMED_COMMIT))
        });
    CommitPlan {
        strategy: if confirmed {
            CONFIRMED_COMMIT.to_string()
        } else {
            "commit-with-readback".to_string()
        },
        confirmed_commit: confirmed,
        rollback_timeout_secs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aurora_core::Endpoint;
    use std::collections::BTreeMap;

    #[test]
    fn routing_plan_lists_every_protocol() {
        let intent = NormalizedIntent {
            service_type: ServiceType::Routing,
            service_id: "routing-1".to_string(),
            endpoints: vec![Endpoint::new("PE1", "*")],
            transit_devices: Vec::new(),
            routing_policy: Some(BTreeMap::from([
                (IntentField::Protocol, "bgp,ospf".to_string()),
                (IntentField::Bfd, "true".to_string()),
            ])),
            qos_policy: None,
            security_policy: None,
        };
        let plan = verification_plan(&intent);
        assert!(plan.checks.contains(&"bgp adjacency established on PE1".to_string()));
        assert!(plan.checks.contains(&"ospf adjacency established on PE1".to_string()));
        assert!(plan.telemetry.contains(&"bfd session state".to_string()));
    }

    #[test]
    fn commit_plan_without_selections_is_not_confirmed() {
        let plan = commit_plan(&[], &[], 300);
        assert!(!plan.confirmed_commit);
        assert_eq!(plan.strategy, "commit-with-readback");
        assert_eq!(plan.rollback_timeout_secs, 300);
    }
}
