//! Payload rendering.
//!
//! Rendering is a pure function of `(selection, intent)`: the same inputs always produce
//! byte-identical bodies and therefore identical checksums.

use aurora_core::{
    ConfigPayload, FieldBinding, GenerationConfig, IntentField, NormalizedIntent, PayloadFormat,
    PipelineError, TemplateSelection, Transport, Vendor,
};
use quick_xml::escape::escape;
use regex::Regex;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

const NETCONF_BASE: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";

/// `{field}` substitutes a value; `{?field}` only requires one to be bound.
const PLACEHOLDER: &str = r"\{(\??)([a-z_]+)\}";

/// Renders template selections into transport-native payloads.
#[derive(Debug, Clone)]
pub struct ConfigGenerator {
    preference: Vec<Transport>,
    overrides: BTreeMap<Vendor, Transport>,
    placeholder: Regex,
}

impl ConfigGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            preference: config.transport_preference.clone(),
            overrides: config.vendor_overrides.clone(),
            placeholder: Regex::new(PLACEHOLDER)?,
        })
    }

    /// Pick exactly one transport: the vendor override when usable, else the first usable
    /// transport in preference order.
    pub fn select_transport(&self, selection: &TemplateSelection) -> Result<Transport, PipelineError> {
        if let Some(transport) = self.overrides.get(&selection.vendor) {
            if selection.transports.contains(transport) {
                return Ok(*transport);
            }
            tracing::debug!(
                device = %selection.device,
                transport = %transport,
                "Vendor transport override not usable, falling back to preference order"
            );
        }
        self.preference
            .iter()
            .find(|t| selection.transports.contains(t))
            .copied()
            .ok_or_else(|| PipelineError::UnsupportedVendorService {
                device: selection.device.clone(),
                vendor: selection.vendor,
                model_version: selection.model_version.clone(),
                service_type: selection.service_type,
            })
    }

    pub fn generate(
        &self,
        selection: &TemplateSelection,
        intent: &NormalizedIntent,
    ) -> Result<ConfigPayload, PipelineError> {
        if selection.service_type != intent.service_type {
            return Err(PipelineError::PayloadMalformed {
                device: selection.device.clone(),
                cause: format!(
                    "selection is for {} but the intent is {}",
                    selection.service_type, intent.service_type
                ),
            });
        }

        let transport = self.select_transport(selection)?;
        let format = transport.native_format();
        let body = match (transport, format) {
            (_, PayloadFormat::Markup) => render_markup(selection),
            (Transport::Restconf, PayloadFormat::StructuredData) => render_restconf(selection)?,
            (_, PayloadFormat::StructuredData) => render_gnmi(selection)?,
            (_, PayloadFormat::CommandLines) => render_cli(&self.placeholder, selection),
        };

        let payload = ConfigPayload::new(&selection.device, transport, format, body);
        tracing::debug!(
            device = %selection.device,
            transport = %transport,
            checksum = %payload.checksum(),
            "Generated payload"
        );
        Ok(payload)
    }

    /// Render every selection, in order.
    pub fn generate_all(
        &self,
        selections: &[TemplateSelection],
        intent: &NormalizedIntent,
    ) -> Result<Vec<ConfigPayload>, PipelineError> {
        selections.iter().map(|s| self.generate(s, intent)).collect()
    }
}

// =============================================================================
// LIST ENTRIES
// =============================================================================

/// The attachment list of a template: one entry per bound interface.
#[derive(Debug)]
struct KeyedList<'a> {
    /// Path of the list node itself.
    path: &'a str,
    /// Bindings of each entry, key included, in binding order.
    entries: Vec<Vec<&'a FieldBinding>>,
}

impl KeyedList<'_> {
    fn relative<'b>(&self, binding: &'b FieldBinding) -> &'b str {
        binding.path.get(self.path.len() + 1..).unwrap_or_default()
    }
}

#[derive(Debug)]
enum Item<'a> {
    Leaf(&'a FieldBinding),
    List(KeyedList<'a>),
}

/// Bindings in render order. Everything under the interface list node is grouped into
/// one entry per interface, placed where the first of those bindings appeared.
fn layout(selection: &TemplateSelection) -> Vec<Item<'_>> {
    let bindings = &selection.bindings;
    let keys: Vec<&FieldBinding> = bindings
        .iter()
        .filter(|b| b.field == IntentField::Interface)
        .collect();
    let Some(list_path) = keys
        .first()
        .copied()
        .and_then(|k| k.path.rsplit_once('/'))
        .map(|(list, _)| list)
    else {
        return bindings.iter().map(Item::Leaf).collect();
    };
    let inside = |b: &FieldBinding| {
        b.path
            .strip_prefix(list_path)
            .is_some_and(|rest| rest.starts_with('/'))
    };

    let mut items = Vec::new();
    let mut placed = false;
    for binding in bindings {
        if !inside(binding) {
            items.push(Item::Leaf(binding));
            continue;
        }
        if placed {
            continue;
        }
        placed = true;
        let entries = keys
            .iter()
            .map(|key| {
                bindings
                    .iter()
                    .filter(|b| inside(b))
                    .filter(|b| b.field != IntentField::Interface || std::ptr::eq(*b, *key))
                    .collect()
            })
            .collect();
        items.push(Item::List(KeyedList {
            path: list_path,
            entries,
        }));
    }
    items
}

// =============================================================================
// MARKUP
// =============================================================================

#[derive(Debug)]
struct Element {
    name: String,
    text: Option<String>,
    children: Vec<Element>,
}

impl Element {
    fn container(name: &str) -> Self {
        Self {
            name: name.to_string(),
            text: None,
            children: Vec::new(),
        }
    }

    fn leaf(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            text: Some(value.to_string()),
            children: Vec::new(),
        }
    }

    /// The first child container called `name`, created when missing.
    fn child_container(&mut self, name: &str) -> &mut Element {
        let index = match self
            .children
            .iter()
            .position(|c| c.name == name && c.text.is_none())
        {
            Some(index) => index,
            None => {
                self.children.push(Element::container(name));
                self.children.len() - 1
            }
        };
        &mut self.children[index]
    }

    fn descend(&mut self, segments: &[&str]) -> &mut Element {
        segments
            .iter()
            .fold(self, |node, name| node.child_container(name))
    }

    fn insert(&mut self, segments: &[&str], value: &str) {
        if let Some((leaf, parents)) = segments.split_last() {
            self.descend(parents).children.push(Element::leaf(leaf, value));
        }
    }

    /// Each entry becomes its own element, never merged with its siblings.
    fn insert_list(&mut self, list: &KeyedList<'_>) {
        let path = segments(list.path);
        let Some((name, parents)) = path.split_last() else {
            return;
        };
        let parent = self.descend(parents);
        for entry in &list.entries {
            let mut element = Element::container(name);
            for binding in entry {
                element.insert(&segments(list.relative(binding)), &binding.value);
            }
            parent.children.push(element);
        }
    }

    fn write(&self, out: &mut String, depth: usize, namespace: Option<&str>) {
        let indent = "  ".repeat(depth);
        let open = match namespace {
            Some(ns) => format!("{} xmlns=\"{}\"", self.name, escape(ns)),
            None => self.name.clone(),
        };
        match &self.text {
            Some(text) => {
                out.push_str(&format!("{}<{}>{}</{}>\n", indent, open, escape(text), self.name));
            }
            None => {
                out.push_str(&format!("{}<{}>\n", indent, open));
                for child in &self.children {
                    child.write(out, depth + 1, None);
                }
                out.push_str(&format!("{}</{}>\n", indent, self.name));
            }
        }
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn render_markup(selection: &TemplateSelection) -> String {
    let mut root = Element::container("config");
    for item in layout(selection) {
        match item {
            Item::Leaf(binding) => root.insert(&segments(&binding.path), &binding.value),
            Item::List(list) => root.insert_list(&list),
        }
    }

    let mut out = format!("<config xmlns=\"{}\">\n", NETCONF_BASE);
    for child in &root.children {
        child.write(&mut out, 1, Some(&selection.namespace));
    }
    out.push_str("</config>\n");
    out
}

// =============================================================================
// STRUCTURED DATA
// =============================================================================

/// List entries are addressed with a `[key=value]` predicate on the list node.
fn render_gnmi(selection: &TemplateSelection) -> Result<String, PipelineError> {
    let mut updates: Vec<Value> = Vec::new();
    for item in layout(selection) {
        match item {
            Item::Leaf(b) => updates.push(json!({ "path": format!("/{}", b.path), "val": b.value })),
            Item::List(list) => {
                for entry in &list.entries {
                    let Some(key) = entry.iter().find(|b| b.field == IntentField::Interface) else {
                        continue;
                    };
                    let key_name = list.relative(key);
                    let prefix = format!("/{}[{}={}]", list.path, key_name, key.value);
                    for b in entry {
                        updates.push(json!({
                            "path": format!("{}/{}", prefix, list.relative(b)),
                            "val": b.value,
                        }));
                    }
                }
            }
        }
    }
    let body = json!({
        "prefix": selection.namespace,
        "update": updates,
    });
    to_pretty(selection, &body)
}

/// Lists are arrays of entry objects, as RESTCONF JSON encodes them.
fn render_restconf(selection: &TemplateSelection) -> Result<String, PipelineError> {
    let mut data = Map::new();
    for item in layout(selection) {
        match item {
            Item::Leaf(binding) => insert_nested(&mut data, &segments(&binding.path), binding),
            Item::List(list) => insert_entries(&mut data, &list),
        }
    }
    let body = json!({
        "ietf-restconf:data": Value::Object(data),
        "namespace": selection.namespace,
    });
    to_pretty(selection, &body)
}

fn object_at<'m>(
    map: &'m mut Map<String, Value>,
    segments: &[&str],
) -> Option<&'m mut Map<String, Value>> {
    match segments.split_first() {
        None => Some(map),
        Some((head, rest)) => match map
            .entry((*head).to_string())
            .or_insert_with(|| Value::Object(Map::new()))
        {
            Value::Object(child) => object_at(child, rest),
            _ => None,
        },
    }
}

fn insert_entries(data: &mut Map<String, Value>, list: &KeyedList<'_>) {
    let path = segments(list.path);
    let Some((name, parents)) = path.split_last() else {
        return;
    };
    let entries: Vec<Value> = list
        .entries
        .iter()
        .map(|entry| {
            let mut object = Map::new();
            for binding in entry {
                insert_nested(&mut object, &segments(list.relative(binding)), binding);
            }
            Value::Object(object)
        })
        .collect();
    match object_at(data, parents) {
        Some(parent) => {
            parent.insert((*name).to_string(), Value::Array(entries));
        }
        None => tracing::warn!(path = %list.path, "Leaf and list share a path; entries dropped"),
    }
}

/// Repeated leaves become arrays.
fn insert_nested(map: &mut Map<String, Value>, segments: &[&str], binding: &FieldBinding) {
    let Some((leaf, parents)) = segments.split_last() else {
        return;
    };
    let Some(parent) = object_at(map, parents) else {
        tracing::warn!(path = %binding.path, "Leaf and container share a path; binding dropped");
        return;
    };
    let value = Value::String(binding.value.clone());
    match parent.get_mut(*leaf) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            parent.insert((*leaf).to_string(), value);
        }
    }
}

fn to_pretty(selection: &TemplateSelection, body: &Value) -> Result<String, PipelineError> {
    serde_json::to_string_pretty(body)
        .map(|s| s + "\n")
        .map_err(|e| PipelineError::PayloadMalformed {
            device: selection.device.clone(),
            cause: e.to_string(),
        })
}

// =============================================================================
// COMMAND LINES
// =============================================================================

type Values<'a> = BTreeMap<&'static str, Vec<&'a str>>;

/// `(presence_only, field)` for every placeholder on a line.
fn placeholders<'l>(re: &Regex, line: &'l str) -> Vec<(bool, &'l str)> {
    re.captures_iter(line)
        .filter_map(|c| Some((c.get(1)?.as_str() == "?", c.get(2)?.as_str())))
        .collect()
}

fn render_cli(re: &Regex, selection: &TemplateSelection) -> String {
    let mut values: Values<'_> = BTreeMap::new();
    for binding in &selection.bindings {
        values.entry(binding.field.as_str()).or_default().push(binding.value.as_str());
    }

    let mut lines = Vec::new();
    for block in &selection.command_template {
        let block_lines: Vec<&str> = block.lines().collect();
        let Some(header) = block_lines.first() else {
            continue;
        };
        // A multi-valued field in the header repeats the whole block once per value
        let repeated = placeholders(re, header)
            .into_iter()
            .find_map(|(_, name)| values.get_key_value(name).filter(|(_, v)| v.len() > 1));
        match repeated {
            Some((&name, all)) => {
                for value in all {
                    let mut single = values.clone();
                    single.insert(name, vec![value]);
                    render_block(re, &block_lines, &single, &mut lines);
                }
            }
            None => render_block(re, &block_lines, &values, &mut lines),
        }
    }

    let mut body = lines.join("\n");
    body.push('\n');
    body
}

/// A block whose header cannot be rendered is dropped entirely.
fn render_block(re: &Regex, block: &[&str], values: &Values<'_>, out: &mut Vec<String>) {
    for (index, line) in block.iter().enumerate() {
        let rendered = render_line(re, line, values);
        if index == 0 && rendered.is_empty() {
            return;
        }
        out.extend(rendered);
    }
}

/// No lines if any placeholder is unbound, else one line per value of the first
/// multi-valued placeholder.
fn render_line(re: &Regex, line: &str, values: &Values<'_>) -> Vec<String> {
    let names = placeholders(re, line);
    if names
        .iter()
        .any(|(_, name)| values.get(name).is_none_or(|v| v.is_empty()))
    {
        return Vec::new();
    }

    let expand = names
        .iter()
        .filter(|(presence, _)| !presence)
        .map(|(_, name)| *name)
        .find(|name| values.get(name).is_some_and(|v| v.len() > 1));

    let substitute = |chosen: Option<&str>| -> String {
        re.replace_all(line, |caps: &regex::Captures<'_>| {
            let presence = caps.get(1).is_some_and(|m| m.as_str() == "?");
            let name = caps.get(2).map_or("", |m| m.as_str());
            match chosen {
                _ if presence => String::new(),
                Some(value) if expand == Some(name) => value.to_string(),
                _ => values
                    .get(name)
                    .and_then(|v| v.first())
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
            }
        })
        .into_owned()
    };

    match expand.and_then(|name| values.get(name)) {
        Some(all) => all.iter().map(|v| substitute(Some(v))).collect(),
        None => vec![substitute(None)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{discovered, inventory, l3vpn_intent};
    use crate::mapper::PathMapper;
    use aurora_core::{Endpoint, ValueEncoding, content_checksum};
    use std::sync::Arc;

    fn selections(intent: &NormalizedIntent) -> Vec<TemplateSelection> {
        let mapper = PathMapper::new(Arc::new(crate::fixtures::CatalogStore::default()));
        let discovery = vec![
            discovered("PE1", Vendor::Juniper, "21.4"),
            discovered("PE2", Vendor::Cisco, "7.3"),
        ];
        mapper.map(intent, &discovery, &inventory()).unwrap().selections
    }

    fn generator() -> ConfigGenerator {
        ConfigGenerator::new(&GenerationConfig::default()).unwrap()
    }

    #[test]
    fn generation_is_idempotent() {
        let intent = l3vpn_intent("PE1", "PE2");
        let selections = selections(&intent);
        let first = generator().generate_all(&selections, &intent).unwrap();
        let second = generator().generate_all(&selections, &intent).unwrap();
        assert_eq!(first, second);
        for payload in &first {
            assert_eq!(payload.checksum(), content_checksum(payload.body()));
        }
    }

    #[test]
    fn netconf_is_preferred_and_rendered_as_markup() {
        let intent = l3vpn_intent("PE1", "PE2");
        let payload = generator().generate(&selections(&intent)[0], &intent).unwrap();
        assert_eq!(payload.transport(), Transport::Netconf);
        assert_eq!(payload.format(), PayloadFormat::Markup);

        let body = payload.body();
        assert!(body.starts_with("<config xmlns=\"urn:ietf:params:xml:ns:netconf:base:1.0\">"));
        assert!(body.contains("<configuration xmlns=\"http://yang.juniper.net/junos/conf/root\">"));
        assert!(body.contains("<mtu>9000</mtu>"));
        assert!(body.contains("<community>target:65000:100</community>"));
    }

    #[test]
    fn vendor_override_selects_cli() {
        let intent = l3vpn_intent("PE1", "PE2");
        let mut config = GenerationConfig::default();
        config.vendor_overrides.insert(Vendor::Cisco, Transport::Ssh);
        let payload = ConfigGenerator::new(&config)
            .unwrap()
            .generate(&selections(&intent)[1], &intent)
            .unwrap();
        assert_eq!(payload.format(), PayloadFormat::CommandLines);

        let body = payload.body();
        assert!(body.contains("vrf CUST-A\n"), "{body}");
        assert!(body.contains("  import route-target 65000:100\n"), "{body}");
        assert!(body.contains("interface GigabitEthernet0/0/0/2\n"), "{body}");
        assert!(body.contains(" mtu 9000\n"), "{body}");
        assert!(!body.contains('{'), "{body}");
        // No vlan, bandwidth or bfd were requested
        assert!(!body.contains("dot1q"), "{body}");
        assert!(!body.contains("fast-detect"), "{body}");
    }

    #[test]
    fn unusable_override_falls_back_to_preference() {
        let intent = l3vpn_intent("PE1", "PE2");
        let mut config = GenerationConfig::default();
        config.vendor_overrides.insert(Vendor::Juniper, Transport::Gnmi);
        let payload = ConfigGenerator::new(&config)
            .unwrap()
            .generate(&selections(&intent)[0], &intent)
            .unwrap();
        assert_eq!(payload.transport(), Transport::Netconf);
    }

    #[test]
    fn cli_lines_expand_multi_valued_fields() {
        let mut intent = l3vpn_intent("PE1", "PE2");
        intent
            .routing_policy
            .as_mut()
            .unwrap()
            .insert(IntentField::Protocol, "bgp,static".to_string());
        let mut config = GenerationConfig::default();
        config.vendor_overrides.insert(Vendor::Juniper, Transport::Ssh);
        let payload = ConfigGenerator::new(&config)
            .unwrap()
            .generate(&selections(&intent)[0], &intent)
            .unwrap();
        let body = payload.body();
        assert!(body.contains("set routing-instances CUST-A protocols bgp\n"), "{body}");
        assert!(body.contains("set routing-instances CUST-A protocols static\n"), "{body}");
    }

    #[test]
    fn structured_data_for_gnmi() {
        let intent = l3vpn_intent("PE1", "PE2");
        let mut selection = selections(&intent).remove(1);
        selection.transports.remove(&Transport::Netconf);
        let payload = generator().generate(&selection, &intent).unwrap();
        assert_eq!(payload.transport(), Transport::Gnmi);

        let body: Value = serde_json::from_str(payload.body()).unwrap();
        let updates = body["update"].as_array().unwrap();
        assert!(updates.iter().any(|u| {
            u["path"] == "/interfaces/interface[interface-name=GigabitEthernet0/0/0/2]/mtu"
                && u["val"] == "9000"
        }));
    }

    fn two_attachments_on_pe1() -> NormalizedIntent {
        let mut intent = l3vpn_intent("PE1", "PE2");
        intent.endpoints.push(Endpoint::new("PE1", "ge-0/0/2"));
        intent
    }

    #[test]
    fn markup_emits_one_list_entry_per_interface() {
        let intent = two_attachments_on_pe1();
        let payload = generator().generate(&selections(&intent)[0], &intent).unwrap();
        let body = payload.body();

        assert_eq!(body.matches("<interface>").count(), 2, "{body}");
        assert_eq!(body.matches("<name>ge-0/0/1</name>").count(), 1, "{body}");
        assert_eq!(body.matches("<name>ge-0/0/2</name>").count(), 1, "{body}");
        assert_eq!(body.matches("<mtu>9000</mtu>").count(), 2, "{body}");
        // Each entry closes before the next opens
        let first = body.find("<name>ge-0/0/1</name>").unwrap();
        let second = body.find("<name>ge-0/0/2</name>").unwrap();
        assert!(body[first..second].contains("</interface>"), "{body}");
    }

    #[test]
    fn single_interface_markup_is_unchanged_in_shape() {
        let intent = l3vpn_intent("PE1", "PE2");
        let payload = generator().generate(&selections(&intent)[0], &intent).unwrap();
        let body = payload.body();
        assert_eq!(body.matches("<interface>").count(), 1, "{body}");
        assert_eq!(body.matches("<interfaces>").count(), 1, "{body}");
    }

    #[test]
    fn restconf_lists_are_arrays_of_entries() {
        let mut intent = l3vpn_intent("PE1", "PE2");
        intent.endpoints.push(Endpoint::new("PE2", "GigabitEthernet0/0/0/3"));
        let mut selection = selections(&intent).remove(1);
        selection.transports = [Transport::Restconf].into();
        let payload = generator().generate(&selection, &intent).unwrap();
        assert_eq!(payload.transport(), Transport::Restconf);

        let body: Value = serde_json::from_str(payload.body()).unwrap();
        let entries = body
            .pointer("/ietf-restconf:data/interfaces/interface")
            .and_then(Value::as_array)
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["interface-name"], "GigabitEthernet0/0/0/2");
        assert_eq!(entries[1]["interface-name"], "GigabitEthernet0/0/0/3");
        assert!(entries.iter().all(|e| e["mtu"] == "9000"));
    }

    #[test]
    fn gnmi_updates_are_keyed_per_interface() {
        let mut intent = l3vpn_intent("PE1", "PE2");
        intent.endpoints.push(Endpoint::new("PE2", "GigabitEthernet0/0/0/3"));
        let mut selection = selections(&intent).remove(1);
        selection.transports.remove(&Transport::Netconf);
        let payload = generator().generate(&selection, &intent).unwrap();

        let body: Value = serde_json::from_str(payload.body()).unwrap();
        let paths: Vec<&str> = body["update"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|u| u["path"].as_str())
            .filter(|p| p.ends_with("/mtu"))
            .collect();
        assert_eq!(
            paths,
            [
                "/interfaces/interface[interface-name=GigabitEthernet0/0/0/2]/mtu",
                "/interfaces/interface[interface-name=GigabitEthernet0/0/0/3]/mtu",
            ]
        );
    }

    #[test]
    fn restconf_nests_and_collects_repeated_leaves() {
        let mut selection = TemplateSelection {
            device: "PE3".to_string(),
            vendor: Vendor::Arista,
            model_version: "4.28".to_string(),
            service_type: aurora_core::ServiceType::Routing,
            template_id: "eos-4.28-routing".to_string(),
            namespace: "http://openconfig.net/yang".to_string(),
            transports: [Transport::Restconf].into(),
            bindings: Vec::new(),
            command_template: Vec::new(),
            notes: None,
        };
        for protocol in ["bgp", "ospf"] {
            selection.bindings.push(FieldBinding {
                field: IntentField::Protocol,
                path: "network-instances/network-instance/protocols/protocol/identifier".to_string(),
                value: protocol.to_string(),
                encoding: ValueEncoding::Plain,
            });
        }
        let mut intent = l3vpn_intent("PE1", "PE2");
        intent.service_type = aurora_core::ServiceType::Routing;

        let payload = generator().generate(&selection, &intent).unwrap();
        let body: Value = serde_json::from_str(payload.body()).unwrap();
        assert_eq!(
            body.pointer("/ietf-restconf:data/network-instances/network-instance/protocols/protocol/identifier"),
            Some(&json!(["bgp", "ospf"]))
        );
    }

    #[test]
    fn markup_escapes_values() {
        let intent = l3vpn_intent("PE1", "PE2");
        let mut selection = selections(&intent).remove(0);
        selection.bindings.push(FieldBinding {
            field: IntentField::Auth,
            path: "configuration/protocols/bgp/group/authentication-key-chain".to_string(),
            value: "a<b&c".to_string(),
            encoding: ValueEncoding::Plain,
        });
        let payload = generator().generate(&selection, &intent).unwrap();
        assert!(payload.body().contains("a&lt;b&amp;c"));
    }
}
