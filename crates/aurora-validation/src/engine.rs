//! Whole-request validation: syntax, semantics, deployment safety and blast radius.

use aurora_core::{
    CONFIRMED_COMMIT, ConfigPayload, DEVICE_SCOPE, IntentField, Inventory, ModelDiscoveryResult,
    NormalizedIntent, PayloadFormat, RiskAssessment, TemplateSelection,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::finding::Finding;
use crate::scorer::RiskScorer;
use crate::syntax::{Parsed, parse};

/// Requested values that must be visible at their vendor path in the payload.
const CHECKED_FIELDS: [IntentField; 8] = [
    IntentField::Mtu,
    IntentField::Vrf,
    IntentField::Vni,
    IntentField::RouteTarget,
    IntentField::RouteDistinguisher,
    IntentField::AsNumber,
    IntentField::Bandwidth,
    IntentField::Acl,
];

const AGGRESSIVE_LATENCY_MS: f64 = 10.0;

/// Everything validation looks at for one request.
#[derive(Debug, Clone, Copy)]
pub struct AssessmentRequest<'a> {
    pub intent: &'a NormalizedIntent,
    pub discovery: &'a [ModelDiscoveryResult],
    pub selections: &'a [TemplateSelection],
    pub payloads: &'a [ConfigPayload],
    /// Devices of the service left out of this deployment.
    pub skipped: &'a [String],
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub risk: RiskAssessment,
    pub findings: Vec<Finding>,
}

impl Assessment {
    pub fn is_blocked(&self) -> bool {
        self.risk.blocked
    }
}

pub struct ValidationEngine {
    scorer: Arc<dyn RiskScorer>,
}

impl ValidationEngine {
    pub fn new(scorer: Arc<dyn RiskScorer>) -> Self {
        Self { scorer }
    }

    pub fn validate(&self, request: &AssessmentRequest<'_>, inventory: &dyn Inventory) -> Assessment {
        let mut findings = Vec::new();

        let mut parsed: BTreeMap<&str, Parsed> = BTreeMap::new();
        for payload in request.payloads {
            if !payload.checksum_matches() {
                findings.push(Finding::checksum_mismatch(payload.device()));
            }
            match parse(payload) {
                Ok(p) => {
                    parsed.insert(payload.device(), p);
                }
                Err(cause) => findings.push(Finding::malformed(payload.device(), &cause)),
            }
        }

        for selection in request.selections {
            let payload = request.payloads.iter().find(|p| p.device() == selection.device);
            if let (Some(payload), Some(parsed)) = (payload, parsed.get(selection.device.as_str())) {
                semantic_findings(request.intent, selection, payload, parsed, &mut findings);
            }
        }

        if let Some(latency) = request
            .intent
            .value(IntentField::Latency)
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|ms| *ms < AGGRESSIVE_LATENCY_MS)
        {
            findings.push(Finding::aggressive_slo(latency));
        }

        for selection in request.selections {
            let safe = request
                .discovery
                .iter()
                .find(|d| d.device == selection.device)
                .is_some_and(|d| d.capability_flags.contains(CONFIRMED_COMMIT));
            if !safe {
                findings.push(Finding::no_safe_commit(&selection.device));
            }
        }

        if !request.skipped.is_empty() {
            findings.push(Finding::partial_deployment(request.skipped));
        }

        let blast_radius = impact_findings(request, inventory, &mut findings);

        let mut risk = RiskAssessment::new();
        risk.blast_radius = blast_radius;
        for finding in &findings {
            self.scorer.apply(&mut risk, finding);
        }

        tracing::info!(
            service_id = %request.intent.service_id,
            risk_level = %risk.risk_level,
            findings = findings.len(),
            blocked = risk.blocked,
            "Validation complete"
        );
        Assessment { risk, findings }
    }
}

fn semantic_findings(
    intent: &NormalizedIntent,
    selection: &TemplateSelection,
    payload: &ConfigPayload,
    parsed: &Parsed,
    findings: &mut Vec<Finding>,
) {
    let device = selection.device.as_str();
    for field in CHECKED_FIELDS {
        let Some(requested) = intent.value(field) else {
            continue;
        };
        let bound = selection.values_of(field);
        if bound.is_empty() {
            findings.push(Finding::not_expressible(device, field, &selection.template_id));
            continue;
        }
        let decoded = selection
            .bindings
            .iter()
            .filter(|b| b.field == field)
            .any(|b| b.logical_value().as_deref() == Some(requested));
        if !decoded {
            findings.push(Finding::semantic_mismatch(device, field, requested, &bound));
            continue;
        }

        let present = match payload.format() {
            PayloadFormat::CommandLines => bound.iter().all(|b| payload.body().contains(b)),
            PayloadFormat::Markup | PayloadFormat::StructuredData => selection
                .bindings
                .iter()
                .filter(|b| b.field == field)
                .all(|b| parsed.contains(&b.path, &b.value)),
        };
        if !present {
            findings.push(Finding::missing_value(device, field, requested));
        }
    }
}

/// Services whose configuration intersects the devices and interfaces this change touches.
fn impact_findings(
    request: &AssessmentRequest<'_>,
    inventory: &dyn Inventory,
    findings: &mut Vec<Finding>,
) -> BTreeSet<String> {
    let intent = request.intent;
    let mut radius = BTreeSet::new();
    let mut production = Vec::new();

    for selection in request.selections {
        let Ok(record) = inventory.lookup(&selection.device) else {
            continue;
        };
        let mut touched = intent.interfaces_on(&selection.device);
        if touched.is_empty() {
            touched.push(DEVICE_SCOPE);
        }

        let affected: Vec<&str> = record
            .services
            .iter()
            .filter(|s| s.service_id != intent.service_id)
            .filter(|s| touched.iter().any(|i| s.overlaps(i)))
            .map(|s| s.service_id.as_str())
            .collect();
        if affected.is_empty() {
            continue;
        }

        radius.extend(affected.iter().map(|s| s.to_string()));
        findings.push(Finding::shared_infrastructure(&selection.device, &affected));
        if record
            .services
            .iter()
            .any(|s| s.production && s.service_id != intent.service_id)
        {
            production.push(selection.device.as_str());
        }
    }

    // Escalation applies on top of everything else, so it goes last
    if !production.is_empty() {
        findings.push(Finding::production_overlap(&production));
    }
    radius
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::FindingKind;
    use crate::scorer::CategoricalScorer;
    use aurora_core::{
        DeviceRecord, DiscoverySource, Endpoint, FieldBinding, RiskLevel, ServiceBinding,
        ServiceType, StaticInventory, Transport, ValueEncoding, Vendor,
    };
    use std::collections::BTreeMap;

    const MTU_PATH: &str = "configuration/interfaces/interface/mtu";
    const VRF_PATH: &str = "configuration/routing-instances/instance/name";

    fn intent() -> NormalizedIntent {
        NormalizedIntent {
            service_type: ServiceType::L3vpn,
            service_id: "l3vpn-0000beef".to_string(),
            endpoints: vec![Endpoint::new("PE1", "ge-0/0/1"), Endpoint::new("PE2", "ge-0/0/2")],
            transit_devices: Vec::new(),
            routing_policy: Some(BTreeMap::from([
                (IntentField::Vrf, "CUST-A".to_string()),
                (IntentField::Mtu, "9000".to_string()),
            ])),
            qos_policy: None,
            security_policy: None,
        }
    }

    fn selection(device: &str, mtu: &str) -> TemplateSelection {
        TemplateSelection {
            device: device.to_string(),
            vendor: Vendor::Juniper,
            model_version: "21.4".to_string(),
            service_type: ServiceType::L3vpn,
            template_id: "junos-21.4-l3vpn".to_string(),
            namespace: "http://yang.juniper.net/junos/conf/root".to_string(),
            transports: [Transport::Netconf].into(),
            bindings: vec![
                FieldBinding {
                    field: IntentField::Mtu,
                    path: MTU_PATH.to_string(),
                    value: mtu.to_string(),
                    encoding: ValueEncoding::Plain,
                },
                FieldBinding {
                    field: IntentField::Vrf,
                    path: VRF_PATH.to_string(),
                    value: "CUST-A".to_string(),
                    encoding: ValueEncoding::Plain,
                },
            ],
            command_template: Vec::new(),
            notes: None,
        }
    }

    fn payload(device: &str, mtu: &str) -> ConfigPayload {
        let body = format!(
            "<config xmlns=\"urn:ietf:params:xml:ns:netconf:base:1.0\">\n\
             <configuration xmlns=\"http://yang.juniper.net/junos/conf/root\">\
             <interfaces><interface><mtu>{}</mtu></interface></interfaces>\
             <routing-instances><instance><name>CUST-A</name></instance></routing-instances>\
             </configuration>\n</config>\n",
            mtu
        );
        ConfigPayload::new(device, Transport::Netconf, PayloadFormat::Markup, body)
    }

    fn discovered(device: &str, confirmed: bool) -> ModelDiscoveryResult {
        let mut flags = BTreeSet::from(["candidate-config".to_string()]);
        if confirmed {
            flags.insert(CONFIRMED_COMMIT.to_string());
        }
        ModelDiscoveryResult {
            device: device.to_string(),
            vendor: Vendor::Juniper,
            reachable: true,
            transports: [Transport::Netconf].into(),
            os_version: Some("21.4R3".to_string()),
            model_version: Some("21.4".to_string()),
            capability_flags: flags,
            models: BTreeSet::new(),
            source: Some(DiscoverySource::LiveProbe),
            attempts: 1,
            reason: None,
        }
    }

    fn inventory(services: Vec<ServiceBinding>) -> StaticInventory {
        let record = |name: &str, services: Vec<ServiceBinding>| DeviceRecord {
            name: name.to_string(),
            aliases: Vec::new(),
            vendor: Vendor::Juniper,
            address: format!("{}.lab", name),
            credentials_ref: None,
            prior_config_snapshot: None,
            bgp_asn: Some(65000),
            services,
        };
        StaticInventory::new(vec![record("PE1", services), record("PE2", Vec::new())]).unwrap()
    }

    fn engine() -> ValidationEngine {
        ValidationEngine::new(Arc::new(CategoricalScorer))
    }

    struct Case {
        intent: NormalizedIntent,
        selections: Vec<TemplateSelection>,
        payloads: Vec<ConfigPayload>,
        discovery: Vec<ModelDiscoveryResult>,
        skipped: Vec<String>,
    }

    impl Case {
        fn clean() -> Self {
            Self {
                intent: intent(),
                selections: vec![selection("PE1", "9000"), selection("PE2", "9000")],
                payloads: vec![payload("PE1", "9000"), payload("PE2", "9000")],
                discovery: vec![discovered("PE1", true), discovered("PE2", true)],
                skipped: Vec::new(),
            }
        }

        fn run(&self, inventory: &StaticInventory) -> Assessment {
            let request = AssessmentRequest {
                intent: &self.intent,
                discovery: &self.discovery,
                selections: &self.selections,
                payloads: &self.payloads,
                skipped: &self.skipped,
            };
            engine().validate(&request, inventory)
        }
    }

    fn kinds(assessment: &Assessment) -> Vec<FindingKind> {
        assessment.findings.iter().map(|f| f.kind).collect()
    }

    #[test]
    fn clean_request_is_low_risk() {
        let assessment = Case::clean().run(&inventory(Vec::new()));
        assert_eq!(assessment.risk.risk_level, RiskLevel::Low);
        assert!(assessment.findings.is_empty(), "{:?}", assessment.findings);
        assert!(assessment.risk.blast_radius.is_empty());
    }

    #[test]
    fn value_missing_from_body_is_high() {
        let mut case = Case::clean();
        case.payloads[1] = payload("PE2", "1500");
        let assessment = case.run(&inventory(Vec::new()));
        assert_eq!(assessment.risk.risk_level, RiskLevel::High);
        assert_eq!(kinds(&assessment), vec![FindingKind::MissingValue]);
        assert_eq!(assessment.findings[0].device.as_deref(), Some("PE2"));
    }

    #[test]
    fn binding_disagreeing_with_intent_is_high() {
        let mut case = Case::clean();
        case.selections[0] = selection("PE1", "1500");
        case.payloads[0] = payload("PE1", "1500");
        let assessment = case.run(&inventory(Vec::new()));
        assert_eq!(kinds(&assessment), vec![FindingKind::SemanticMismatch]);
        assert!(assessment.risk.requires_human_approval());
    }

    #[test]
    fn encoded_values_are_compared_after_decoding() {
        let route_target = |value: &str| FieldBinding {
            field: IntentField::RouteTarget,
            path: "configuration/routing-instances/instance/vrf-target/community".to_string(),
            value: value.to_string(),
            encoding: ValueEncoding::Prefixed("target:".to_string()),
        };
        let mut case = Case::clean();
        case.intent
            .routing_policy
            .as_mut()
            .unwrap()
            .insert(IntentField::RouteTarget, "65000:100".to_string());

        case.selections[0].bindings.push(route_target("target:165000:100"));
        let assessment = case.run(&inventory(Vec::new()));
        let mismatch = assessment
            .findings
            .iter()
            .find(|f| f.kind == FindingKind::SemanticMismatch)
            .unwrap();
        assert_eq!(mismatch.device.as_deref(), Some("PE1"));

        case.selections[0].bindings.pop();
        case.selections[0].bindings.push(route_target("target:65000:100"));
        let assessment = case.run(&inventory(Vec::new()));
        assert!(!kinds(&assessment).contains(&FindingKind::SemanticMismatch));
    }

    #[test]
    fn tampered_body_blocks_deployment() {
        let mut case = Case::clean();
        let mut raw = serde_json::to_value(&case.payloads[0]).unwrap();
        raw["body"] = serde_json::Value::String(payload("PE1", "1500").body().to_string());
        case.payloads[0] = serde_json::from_value(raw).unwrap();

        let assessment = case.run(&inventory(Vec::new()));
        assert!(assessment.is_blocked());
        assert_eq!(assessment.risk.risk_level, RiskLevel::Critical);
        assert_eq!(kinds(&assessment)[0], FindingKind::ChecksumMismatch);
    }

    #[test]
    fn malformed_payload_blocks_deployment() {
        let mut case = Case::clean();
        case.payloads[0] =
            ConfigPayload::new("PE1", Transport::Netconf, PayloadFormat::Markup, "<config><mtu>9000</config>");
        let assessment = case.run(&inventory(Vec::new()));
        assert!(assessment.is_blocked());
        assert_eq!(kinds(&assessment), vec![FindingKind::Malformed]);
    }

    #[test]
    fn blast_radius_covers_overlapping_services_only() {
        let services = vec![
            ServiceBinding {
                service_id: "svc-voice".to_string(),
                interface: "ge-0/0/1".to_string(),
                production: false,
            },
            ServiceBinding {
                service_id: "svc-other-port".to_string(),
                interface: "ge-0/0/7".to_string(),
                production: false,
            },
        ];
        let assessment = Case::clean().run(&inventory(services));
        assert_eq!(
            assessment.risk.blast_radius,
            BTreeSet::from(["svc-voice".to_string()])
        );
        assert_eq!(assessment.risk.risk_level, RiskLevel::Low);
        assert_eq!(kinds(&assessment), vec![FindingKind::SharedInfrastructure]);
    }

    #[test]
    fn production_device_in_blast_radius_escalates() {
        let services = vec![ServiceBinding {
            service_id: "svc-core".to_string(),
            interface: DEVICE_SCOPE.to_string(),
            production: true,
        }];
        let mut case = Case::clean();
        case.discovery[1] = discovered("PE2", false);
        let assessment = case.run(&inventory(services));
        assert_eq!(
            kinds(&assessment),
            vec![
                FindingKind::NoSafeCommit,
                FindingKind::SharedInfrastructure,
                FindingKind::ProductionOverlap
            ]
        );
        assert_eq!(assessment.risk.risk_level, RiskLevel::High);
    }

    #[test]
    fn aggressive_latency_and_partial_deployment() {
        let mut case = Case::clean();
        case.intent.qos_policy = Some(BTreeMap::from([(IntentField::Latency, "5".to_string())]));
        case.skipped = vec!["P1".to_string()];
        let assessment = case.run(&inventory(Vec::new()));
        assert_eq!(
            kinds(&assessment),
            vec![FindingKind::AggressiveSlo, FindingKind::PartialDeployment]
        );
        assert_eq!(assessment.risk.risk_level, RiskLevel::High);
    }
}
