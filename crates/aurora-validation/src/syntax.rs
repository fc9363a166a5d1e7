//! Well-formedness checks per payload format, and the standalone `validate` entry point.

use aurora_core::{ConfigPayload, PayloadFormat, RiskAssessment, RiskLevel, Vendor};
use quick_xml::Reader;
use quick_xml::events::Event;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::finding::{Finding, FindingKind};
use crate::scorer::{CategoricalScorer, RiskScorer};

/// A parsed payload: every leaf as `(slash path, value)`, plus the namespaces declared on
/// top-level elements.
#[derive(Debug, Default)]
pub(crate) struct Parsed {
    pub leaves: Vec<(String, String)>,
    pub namespaces: Vec<String>,
}

impl Parsed {
    pub fn contains(&self, path: &str, value: &str) -> bool {
        self.leaves.iter().any(|(p, v)| p == path && v == value)
    }
}

/// Check a payload is well-formed for its declared format.
pub(crate) fn parse(payload: &ConfigPayload) -> Result<Parsed, String> {
    let body = payload.body();
    if body.trim().is_empty() {
        return Err("empty body".to_string());
    }
    if let Some(placeholder) = unresolved_placeholder(body) {
        return Err(format!("unresolved placeholder {}", placeholder));
    }
    match payload.format() {
        PayloadFormat::Markup => parse_markup(body),
        PayloadFormat::StructuredData => parse_structured(body),
        PayloadFormat::CommandLines => check_command_lines(body).map(|_| Parsed::default()),
    }
}

fn unresolved_placeholder(body: &str) -> Option<&str> {
    body.match_indices('{').find_map(|(start, _)| {
        let rest = &body[start + 1..];
        let end = rest.find('}')?;
        let inner = &rest[..end];
        let name = inner.strip_prefix('?').unwrap_or(inner);
        let is_field = !name.is_empty() && name.chars().all(|c| c.is_ascii_lowercase() || c == '_');
        is_field.then(|| &body[start..start + end + 2])
    })
}

fn parse_markup(body: &str) -> Result<Parsed, String> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut parsed = Parsed::default();
    let mut stack: Vec<String> = Vec::new();
    let mut text: Option<String> = None;
    let mut roots = 0;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if stack.is_empty() {
                    roots += 1;
                }
                if stack.len() == 1 {
                    collect_namespace(&e, &mut parsed.namespaces);
                }
                stack.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                text = None;
            }
            Ok(Event::Empty(e)) => {
                if stack.is_empty() {
                    roots += 1;
                }
                if stack.len() == 1 {
                    collect_namespace(&e, &mut parsed.namespaces);
                }
            }
            Ok(Event::Text(t)) => {
                if stack.is_empty() {
                    return Err("text outside the root element".to_string());
                }
                text = Some(t.unescape().map_err(|e| e.to_string())?.into_owned());
            }
            Ok(Event::End(_)) => {
                if let Some(value) = text.take() {
                    parsed.leaves.push((stack[1..].join("/"), value));
                }
                stack.pop();
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(format!("at byte {}: {}", reader.buffer_position(), e)),
        }
    }

    if let Some(open) = stack.last() {
        return Err(format!("element <{}> is never closed", open));
    }
    if roots != 1 {
        return Err(format!("expected one root element, found {}", roots));
    }
    Ok(parsed)
}

fn collect_namespace(element: &quick_xml::events::BytesStart<'_>, out: &mut Vec<String>) {
    for attr in element.attributes().flatten() {
        if attr.key.as_ref() == b"xmlns" {
            out.push(String::from_utf8_lossy(&attr.value).into_owned());
        }
    }
}

fn parse_structured(body: &str) -> Result<Parsed, String> {
    let value: Value = serde_json::from_str(body).map_err(|e| e.to_string())?;
    let Value::Object(root) = &value else {
        return Err("top level is not an object".to_string());
    };

    let mut parsed = Parsed::default();
    for key in ["prefix", "namespace"] {
        if let Some(ns) = root.get(key).and_then(Value::as_str) {
            parsed.namespaces.push(ns.to_string());
        }
    }

    if let Some(updates) = root.get("update") {
        let updates = updates.as_array().ok_or("update is not an array")?;
        for update in updates {
            let path = update
                .get("path")
                .and_then(Value::as_str)
                .ok_or("update without a path")?;
            let val = update.get("val").ok_or("update without a val")?;
            flatten(&strip_keys(path.trim_start_matches('/')), val, &mut parsed.leaves);
        }
    } else if let Some(data) = root.get("ietf-restconf:data") {
        flatten("", data, &mut parsed.leaves);
    } else {
        flatten("", &value, &mut parsed.leaves);
    }
    Ok(parsed)
}

/// Drops `[key=value]` list predicates from a gNMI path. Key values may contain `/`.
fn strip_keys(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut depth = 0usize;
    for c in path.chars() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}/{}", prefix, key)
                };
                flatten(&path, child, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                flatten(prefix, item, out);
            }
        }
        Value::String(s) => out.push((prefix.to_string(), s.clone())),
        other => out.push((prefix.to_string(), other.to_string())),
    }
}

fn check_command_lines(body: &str) -> Result<(), String> {
    for (index, line) in body.lines().enumerate() {
        if line.chars().any(|c| c.is_control() && c != '\t' && c != '\r') {
            return Err(format!("line {} contains control characters", index + 1));
        }
    }
    Ok(())
}

/// Whether a top-level namespace belongs to the vendor's schema family.
fn vendor_namespace(vendor: Vendor, namespace: &str) -> bool {
    let prefixes: &[&str] = match vendor {
        Vendor::Cisco => &["http://cisco.com/ns/yang/", "http://openconfig.net/yang"],
        Vendor::Juniper => &["http://yang.juniper.net/"],
        Vendor::Nokia => &["urn:nokia.com:sros:", "urn:nokia.com:"],
        Vendor::Arista => &["http://openconfig.net/yang", "http://arista.com/yang"],
    };
    prefixes.iter().any(|p| namespace.starts_with(p))
}

/// Outcome of validating one payload on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub device: String,
    pub vendor: Vendor,
    pub format: PayloadFormat,
    pub valid: bool,
    pub risk_level: RiskLevel,
    pub findings: Vec<Finding>,
}

/// Validate a single payload against its format and the vendor's dialect, without running
/// the pipeline.
pub fn validate(vendor: Vendor, payload: &ConfigPayload) -> ValidationResult {
    let device = payload.device();
    let mut findings = Vec::new();

    if !payload.checksum_matches() {
        findings.push(Finding::checksum_mismatch(device));
    }

    match parse(payload) {
        Err(cause) => findings.push(Finding::malformed(device, &cause)),
        Ok(parsed) => {
            for ns in parsed.namespaces.iter().filter(|ns| !vendor_namespace(vendor, ns)) {
                findings.push(Finding::new(
                    FindingKind::Malformed,
                    Some(device),
                    format!("namespace {} is not a {} schema", ns, vendor),
                ));
            }
            if payload.format() == PayloadFormat::CommandLines && vendor == Vendor::Juniper {
                let foreign = payload
                    .body()
                    .lines()
                    .filter(|l| !l.trim().is_empty())
                    .position(|l| !(l.starts_with("set ") || l.starts_with("delete ")));
                if let Some(index) = foreign {
                    findings.push(Finding::new(
                        FindingKind::Malformed,
                        Some(device),
                        format!("line {} is not a Junos set/delete command", index + 1),
                    ));
                }
            }
        }
    }

    let scorer = CategoricalScorer;
    let mut assessment = RiskAssessment::new();
    for finding in &findings {
        scorer.apply(&mut assessment, finding);
    }

    ValidationResult {
        device: device.to_string(),
        vendor,
        format: payload.format(),
        valid: findings.is_empty(),
        risk_level: assessment.risk_level,
        findings,
    }
}
