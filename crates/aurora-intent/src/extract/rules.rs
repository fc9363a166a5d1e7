//! Pattern-based extraction.

use async_trait::async_trait;
use aurora_core::{IntentField, RawFields};
use regex::{Captures, Regex, RegexBuilder};
use serde_json::Value;

use super::Extractor;
use crate::error::ExtractError;

const DEVICE_PATTERNS: &[&str] = &[
    // site-role-index style hostnames, e.g. nyc-core-01
    r"\b[a-z]{2,}-[a-z0-9]+-[a-z]*\d+[a-z0-9]*\b",
    r"\b(?:PE|CE|P|RR)[1-9]\d*\b",
];

const INTERFACE_PATTERNS: &[&str] = &[
    r"\b((?:xe|ge|et)-\d+/\d+/\d+(?:\.\d+)?)\b",
    r"\b((?:GigabitEthernet|TenGigE|HundredGigE|Gi|Te|Hu)\d+(?:/\d+){2,3})\b",
    r"\b((?:Ethernet|eth)\d+(?:/\d+)*)\b",
    r"\bport\s+(\d+/\d+/\d+)\b",
];

const MARKERS: &[(&str, &str)] = &[
    (r"\b(?:l3vpn|l3-vpn|layer[ -]?3 vpn|vpnv4|vpnv6)\b", "l3vpn"),
    (r"\b(?:evpn|vxlan|e-lan|mac-vrf)\b", "evpn"),
    (r"\b(?:l2|layer[ -]?2)\b", "evpn-l2"),
    (r"\b(?:l3|layer[ -]?3)\b", "evpn-l3"),
    (r"\b(?:irb|symmetric|asymmetric)\b", "evpn-irb"),
    (r"\b(?:acl|access[ -]list|firewall|security)\b", "security"),
    (r"\b(?:qos|quality of service|class of service|cos)\b", "qos"),
    (r"\b(?:routing|bgp|ebgp|ibgp|ospf|isis|is-is)\b", "routing"),
];

const PROTOCOLS: &[(&str, &str)] = &[
    (r"\b[ei]?bgp\b", "bgp"),
    (r"\bospf(?:v[23])?\b", "ospf"),
    (r"\bis-?is\b", "isis"),
    (r"\bldp\b", "ldp"),
    (r"\brsvp(?:-te)?\b", "rsvp"),
    (r"\b(?:segment[ -]routing|sr-mpls|srv6)\b", "segment-routing"),
    (r"\bstatic\s+rout", "static"),
];

#[derive(Debug, Clone, Copy)]
enum ValueKind {
    Integer,
    Decimal,
    Text,
    Lowercase,
    /// Group 1 is the amount, group 2 the unit; normalized to Mbps.
    Bandwidth,
    Flag(&'static str),
}

const PARAMS: &[(IntentField, &str, ValueKind)] = &[
    (IntentField::Mtu, r"\bmtu\s*[:=]?\s*(\d+)", ValueKind::Integer),
    (IntentField::Vlan, r"\bvlan(?:[ -]id)?\s*[:=]?\s*(\d+)", ValueKind::Integer),
    (IntentField::Vni, r"\bvni\s*[:=]?\s*(\d+)", ValueKind::Integer),
    (
        IntentField::AsNumber,
        r"\b(?:asn?|as[ -]number|autonomous[ -]system)\s*[:=]?\s*(\d+)\b",
        ValueKind::Integer,
    ),
    (
        IntentField::RouteDistinguisher,
        r"\b(?:rd|route[ -]distinguisher)\s*[:=]?\s*(\d+(?:\.\d+){0,3}:\d+)",
        ValueKind::Text,
    ),
    (
        IntentField::RouteTarget,
        r"\b(?:rt|route[ -]target)\s*[:=]?\s*(?:target:)?(\d+(?:\.\d+){0,3}:\d+)",
        ValueKind::Text,
    ),
    (
        IntentField::Vrf,
        r"\bvrf(?:[ -]name)?\s*[:=]?\s+([A-Za-z0-9_][A-Za-z0-9_.-]*)",
        ValueKind::Text,
    ),
    (
        IntentField::Bandwidth,
        r"(\d+(?:\.\d+)?)\s*(gbps|mbps|kbps)\b",
        ValueKind::Bandwidth,
    ),
    (
        IntentField::Latency,
        r"(\d+(?:\.\d+)?)\s*ms\s+(?:of\s+)?(?:latency|delay|rtt)\b",
        ValueKind::Decimal,
    ),
    (
        IntentField::Latency,
        r"\b(?:latency|delay|rtt)\s*(?:of|under|below|<=?|:)?\s*(\d+(?:\.\d+)?)\s*ms\b",
        ValueKind::Decimal,
    ),
    (
        IntentField::Jitter,
        r"(\d+(?:\.\d+)?)\s*ms\s+(?:of\s+)?jitter\b",
        ValueKind::Decimal,
    ),
    (
        IntentField::Jitter,
        r"\bjitter\s*(?:of|under|below|<=?|:)?\s*(\d+(?:\.\d+)?)\s*ms\b",
        ValueKind::Decimal,
    ),
    (
        IntentField::Loss,
        r"(\d+(?:\.\d+)?)\s*%\s*(?:packet\s+)?loss\b",
        ValueKind::Decimal,
    ),
    (
        IntentField::Loss,
        r"\b(?:packet\s+)?loss\s*(?:of|under|below|<=?|:)?\s*(\d+(?:\.\d+)?)\s*%",
        ValueKind::Decimal,
    ),
    (
        IntentField::Dscp,
        r"\bdscp\s*[:=]?\s*([a-z]{2}\d{0,2}|\d{1,2})\b",
        ValueKind::Lowercase,
    ),
    (
        IntentField::Acl,
        r"\b(?:acl|access[ -]list)\s*[:=]?\s+([A-Za-z][A-Za-z0-9_-]*)",
        ValueKind::Text,
    ),
    (IntentField::Bfd, r"\bbfd\b", ValueKind::Flag("true")),
    (
        IntentField::Auth,
        r"\bauth(?:entication)?\b",
        ValueKind::Flag("keychain-default"),
    ),
    (
        IntentField::FilterPrivate,
        r"\brfc\s?1918\b|\bprivate\s+(?:address(?:es)?|ranges?|prefix(?:es)?|networks?)\b",
        ValueKind::Flag("true"),
    ),
];

struct ParamRule {
    field: IntentField,
    pattern: Regex,
    kind: ValueKind,
}

impl ParamRule {
    fn value(&self, caps: &Captures<'_>) -> Option<Value> {
        let text = || caps.get(1).map(|m| m.as_str());
        match self.kind {
            ValueKind::Integer => text()?.parse::<u64>().ok().map(Value::from),
            ValueKind::Decimal => text()?.parse::<f64>().ok().map(number),
            ValueKind::Text => {
                let value = text()?.trim_end_matches(['.', '-']);
                (!value.is_empty()).then(|| Value::from(value))
            }
            ValueKind::Lowercase => text().map(|v| Value::from(v.to_ascii_lowercase())),
            ValueKind::Bandwidth => {
                let amount = text()?.parse::<f64>().ok()?;
                let unit = caps.get(2)?.as_str().to_ascii_lowercase();
                let mbps = match unit.as_str() {
                    "gbps" => amount * 1000.0,
                    "kbps" => amount / 1000.0,
                    _ => amount,
                };
                Some(number(mbps))
            }
            ValueKind::Flag(value) => Some(Value::from(value)),
        }
    }
}

/// Whole numbers as integers so `9000` never renders as `9000.0`.
fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value >= 0.0 && value < u64::MAX as f64 {
        Value::from(value as u64)
    } else {
        Value::from(value)
    }
}

fn overlaps(spans: &[(usize, usize)], start: usize, end: usize) -> bool {
    spans.iter().any(|&(s, e)| start < e && s < end)
}

fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// Deterministic regex extraction of devices, interfaces, service markers and parameters.
///
/// Every value seen is kept, so contradictions such as two different MTUs reach the
/// normalizer intact.
pub struct RuleBasedExtractor {
    devices: Vec<Regex>,
    interfaces: Vec<Regex>,
    transit: Regex,
    service_type: Regex,
    service_id: Regex,
    markers: Vec<(Regex, &'static str)>,
    protocols: Vec<(Regex, &'static str)>,
    params: Vec<ParamRule>,
}

impl RuleBasedExtractor {
    pub fn new() -> Result<Self, ExtractError> {
        Ok(Self {
            devices: DEVICE_PATTERNS
                .iter()
                .map(|p| compile(p))
                .collect::<Result<_, _>>()?,
            interfaces: INTERFACE_PATTERNS
                .iter()
                .map(|p| compile(p))
                .collect::<Result<_, _>>()?,
            transit: compile(r"\bvia\s+([A-Za-z0-9][A-Za-z0-9_.-]*[A-Za-z0-9])")?,
            service_type: compile(r"\bservice[ -]type\s*[:=]?\s*([a-z0-9-]+)")?,
            service_id: compile(r"\bservice[ -]id\s*[:=]?\s*([A-Za-z0-9][A-Za-z0-9_.:-]*)")?,
            markers: MARKERS
                .iter()
                .map(|(p, m)| compile(p).map(|re| (re, *m)))
                .collect::<Result<_, _>>()?,
            protocols: PROTOCOLS
                .iter()
                .map(|(p, name)| compile(p).map(|re| (re, *name)))
                .collect::<Result<_, _>>()?,
            params: PARAMS
                .iter()
                .map(|(field, p, kind)| {
                    compile(p).map(|pattern| ParamRule {
                        field: *field,
                        pattern,
                        kind: *kind,
                    })
                })
                .collect::<Result<_, _>>()?,
        })
    }

    /// Extract raw fields synchronously.
    pub fn scan(&self, text: &str) -> RawFields {
        let mut raw = RawFields::default();
        let mut claimed: Vec<(usize, usize)> = Vec::new();

        if let Some(m) = self.service_type.captures(text).and_then(|c| c.get(1)) {
            raw.service_type = Some(m.as_str().to_string());
            claimed.push((m.start(), m.end()));
        }
        if let Some(m) = self.service_id.captures(text).and_then(|c| c.get(1)) {
            raw.service_id = Some(m.as_str().trim_end_matches(['.', ':', '-']).to_string());
            claimed.push((m.start(), m.end()));
        }

        for rule in &self.params {
            for caps in rule.pattern.captures_iter(text) {
                let Some(whole) = caps.get(0) else { continue };
                // "mac-vrf" names an EVPN flavour, not a VRF
                if rule.field == IntentField::Vrf && text[..whole.start()].ends_with('-') {
                    continue;
                }
                let Some(value) = rule.value(&caps) else {
                    continue;
                };
                if let Some(m) = caps.get(1) {
                    claimed.push((m.start(), m.end()));
                }
                raw.push_param(rule.field.as_str(), value);
            }
        }

        let mut interfaces: Vec<(usize, usize, String)> = Vec::new();
        for pattern in &self.interfaces {
            for caps in pattern.captures_iter(text) {
                let Some(m) = caps.get(1) else { continue };
                if !overlaps(&claimed, m.start(), m.end()) {
                    interfaces.push((m.start(), m.end(), m.as_str().to_string()));
                }
            }
        }
        interfaces.sort_by_key(|(start, _, _)| *start);
        for (start, end, name) in interfaces {
            claimed.push((start, end));
            if !raw.interfaces.contains(&name) {
                raw.interfaces.push(name);
            }
        }

        for caps in self.transit.captures_iter(text) {
            let Some(m) = caps.get(1) else { continue };
            claimed.push((m.start(), m.end()));
            if !raw.transit_devices.iter().any(|d| d.eq_ignore_ascii_case(m.as_str())) {
                raw.transit_devices.push(m.as_str().to_string());
            }
        }

        let mut devices: Vec<(usize, String)> = Vec::new();
        for pattern in &self.devices {
            for m in pattern.find_iter(text) {
                if overlaps(&claimed, m.start(), m.end()) {
                    continue;
                }
                claimed.push((m.start(), m.end()));
                devices.push((m.start(), m.as_str().to_string()));
            }
        }
        devices.sort_by_key(|(start, _)| *start);
        for (_, name) in devices {
            if !raw.devices.iter().any(|d| d.eq_ignore_ascii_case(&name)) {
                raw.devices.push(name);
            }
        }

        for (pattern, marker) in &self.markers {
            if pattern.is_match(text) {
                raw.service_markers.insert((*marker).to_string());
            }
        }
        for (pattern, protocol) in &self.protocols {
            if pattern.is_match(text) {
                raw.push_param(IntentField::Protocol.as_str(), Value::from(*protocol));
            }
        }

        raw
    }
}

#[async_trait]
impl Extractor for RuleBasedExtractor {
    fn name(&self) -> &'static str {
        "rules"
    }

    async fn extract(&self, text: &str) -> Result<RawFields, ExtractError> {
        if text.trim().is_empty() {
            return Err(ExtractError::EmptyInput);
        }
        let raw = self.scan(text);
        tracing::debug!(
            devices = raw.devices.len(),
            interfaces = raw.interfaces.len(),
            params = raw.params.len(),
            "Rule-based extraction complete"
        );
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scan(text: &str) -> RawFields {
        RuleBasedExtractor::new().unwrap().scan(text)
    }

    fn param<'a>(raw: &'a RawFields, field: IntentField) -> &'a [Value] {
        raw.params.get(field.as_str()).map(Vec::as_slice).unwrap_or(&[])
    }

    #[test]
    fn l3vpn_request() {
        let raw = scan(
            "Create an L3VPN service-id cust-a-vpn1 between PE1 ge-0/0/1 and PE2 \
             GigabitEthernet0/0/0/1 with vrf CUST_A, rd 65000:100, rt 65000:100, AS 65000, \
             MTU 9000 and BFD.",
        );
        assert_eq!(raw.service_id.as_deref(), Some("cust-a-vpn1"));
        assert_eq!(raw.devices, vec!["PE1", "PE2"]);
        assert_eq!(raw.interfaces, vec!["ge-0/0/1", "GigabitEthernet0/0/0/1"]);
        assert!(raw.service_markers.contains("l3vpn"));
        assert_eq!(param(&raw, IntentField::Vrf), &[json!("CUST_A")]);
        assert_eq!(param(&raw, IntentField::RouteDistinguisher), &[json!("65000:100")]);
        assert_eq!(param(&raw, IntentField::RouteTarget), &[json!("65000:100")]);
        assert_eq!(param(&raw, IntentField::AsNumber), &[json!(65000)]);
        assert_eq!(param(&raw, IntentField::Mtu), &[json!(9000)]);
        assert_eq!(param(&raw, IntentField::Bfd), &[json!("true")]);
    }

    #[test]
    fn contradictory_values_are_kept() {
        let raw = scan("EVPN PE1 PE2 mtu 1500 and mtu 9000");
        assert_eq!(param(&raw, IntentField::Mtu), &[json!(1500), json!(9000)]);
    }

    #[test]
    fn hostnames_and_transit_devices() {
        let raw = scan("EVPN from leaf-ams-01 Ethernet1 to leaf-ams-02 Ethernet2 via spine-ams-01 vni 10100");
        assert_eq!(raw.devices, vec!["leaf-ams-01", "leaf-ams-02"]);
        assert_eq!(raw.transit_devices, vec!["spine-ams-01"]);
        assert_eq!(raw.interfaces, vec!["Ethernet1", "Ethernet2"]);
        assert!(raw.service_markers.contains("evpn"));
    }

    #[test]
    fn evpn_flavour_markers() {
        let raw = scan("EVPN with both L2 and L3 between PE1 and PE2, mac-vrf blue");
        assert!(raw.service_markers.contains("evpn-l2"));
        assert!(raw.service_markers.contains("evpn-l3"));
        assert!(!raw.service_markers.contains("evpn-irb"));
        assert!(param(&raw, IntentField::Vrf).is_empty());
    }

    #[test]
    fn qos_slos() {
        let raw = scan("QoS on PE3 port 1/1/1: 2 Gbps, latency under 8ms, 2ms jitter, 0.5% loss, dscp EF");
        assert_eq!(raw.interfaces, vec!["1/1/1"]);
        assert_eq!(param(&raw, IntentField::Bandwidth), &[json!(2000)]);
        assert_eq!(param(&raw, IntentField::Latency), &[json!(8)]);
        assert_eq!(param(&raw, IntentField::Jitter), &[json!(2)]);
        assert_eq!(param(&raw, IntentField::Loss), &[json!(0.5)]);
        assert_eq!(param(&raw, IntentField::Dscp), &[json!("ef")]);
    }

    #[test]
    fn security_and_protocols() {
        let raw = scan("Apply acl EDGE_IN on CE1 ge-0/0/3 to block RFC1918 sources; keep ospf and bgp");
        assert_eq!(param(&raw, IntentField::Acl), &[json!("EDGE_IN")]);
        assert_eq!(param(&raw, IntentField::FilterPrivate), &[json!("true")]);
        assert_eq!(
            param(&raw, IntentField::Protocol),
            &[json!("bgp"), json!("ospf")]
        );
        assert!(raw.service_markers.contains("security"));
    }

    #[tokio::test]
    async fn empty_text_is_rejected() {
        let extractor = RuleBasedExtractor::new().unwrap();
        assert!(matches!(
            extractor.extract("   ").await,
            Err(ExtractError::EmptyInput)
        ));
    }
}
