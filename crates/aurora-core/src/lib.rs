use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// Configuration types shared across all Aurora crates
pub mod config;
pub mod error;
pub mod inventory;
pub mod schema;

pub use config::{
    AuroraConfig, ConfigError, DeploymentConfig, DiscoveryConfig, ExtractionConfig, GenerationConfig,
    HistoryConfig, ModelApi, ModelProviderConfig, ObservabilityConfig, ProviderKind,
};
pub use error::{ErrorKind, ErrorReport, PipelineError};
pub use inventory::{DeviceRecord, Inventory, InventoryError, ServiceBinding, StaticInventory};
pub use schema::{
    CONFIRMED_COMMIT, CapabilitySet, FieldPath, SchemaError, SchemaStore, TemplateCatalog, TemplateSet,
    ValueEncoding,
};

/// Interface scope used when a service applies to the whole device.
pub const DEVICE_SCOPE: &str = "*";

// =============================================================================
// SERVICE TYPES AND INTENT FIELDS
// =============================================================================

/// The fixed set of services the pipeline knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ServiceType {
    #[serde(rename = "L3VPN")]
    L3vpn,
    #[serde(rename = "EVPN")]
    Evpn,
    #[serde(rename = "QoS")]
    Qos,
    #[serde(rename = "Security")]
    Security,
    #[serde(rename = "Routing")]
    Routing,
}

impl ServiceType {
    pub const ALL: [ServiceType; 5] = [
        ServiceType::L3vpn,
        ServiceType::Evpn,
        ServiceType::Qos,
        ServiceType::Security,
        ServiceType::Routing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::L3vpn => "L3VPN",
            ServiceType::Evpn => "EVPN",
            ServiceType::Qos => "QoS",
            ServiceType::Security => "Security",
            ServiceType::Routing => "Routing",
        }
    }

    /// Lowercase form used in identifiers and template ids.
    pub fn slug(&self) -> &'static str {
        match self {
            ServiceType::L3vpn => "l3vpn",
            ServiceType::Evpn => "evpn",
            ServiceType::Qos => "qos",
            ServiceType::Security => "security",
            ServiceType::Routing => "routing",
        }
    }

    /// VPN-class services connect sites and need an attachment per endpoint.
    pub fn is_vpn_class(&self) -> bool {
        matches!(self, ServiceType::L3vpn | ServiceType::Evpn)
    }

    /// Minimum number of endpoints for the service to be meaningful.
    pub fn min_endpoints(&self) -> usize {
        if self.is_vpn_class() { 2 } else { 1 }
    }

    /// Whether a policy mapping is required, forbidden or optional for this service.
    pub fn policy_rule(&self, kind: PolicyKind) -> PolicyRule {
        use PolicyKind::*;
        use PolicyRule::*;
        match (self, kind) {
            (ServiceType::L3vpn, Routing) => Required,
            (ServiceType::L3vpn, Security) => Forbidden,
            (ServiceType::Evpn, Routing) => Required,
            (ServiceType::Evpn, Security) => Forbidden,
            (ServiceType::Qos, Qos) => Required,
            (ServiceType::Qos, Routing) => Forbidden,
            (ServiceType::Security, Security) => Required,
            (ServiceType::Security, Qos) => Forbidden,
            (ServiceType::Routing, Routing) => Required,
            (ServiceType::Routing, Qos) => Forbidden,
            _ => Optional,
        }
    }

    /// Fields that must be present (any one of them) for the service to be complete.
    pub fn required_fields(&self) -> &'static [IntentField] {
        match self {
            ServiceType::L3vpn => &[IntentField::Vrf],
            ServiceType::Evpn => &[IntentField::Vni],
            ServiceType::Qos => &[
                IntentField::Bandwidth,
                IntentField::Latency,
                IntentField::Jitter,
                IntentField::Loss,
                IntentField::Dscp,
            ],
            ServiceType::Security => &[IntentField::Acl],
            ServiceType::Routing => &[IntentField::Protocol],
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l3vpn" | "l3-vpn" | "vpnv4" | "vpnv6" => Ok(ServiceType::L3vpn),
            "evpn" | "evpn-vxlan" | "vxlan" => Ok(ServiceType::Evpn),
            "qos" => Ok(ServiceType::Qos),
            "security" | "acl" | "firewall" => Ok(ServiceType::Security),
            "routing" | "bgp" | "ospf" | "isis" => Ok(ServiceType::Routing),
            other => Err(format!("unrecognized service type '{}'", other)),
        }
    }
}

/// The three optional policy mappings of a normalized intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Routing,
    Qos,
    Security,
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyKind::Routing => write!(f, "routing_policy"),
            PolicyKind::Qos => write!(f, "qos_policy"),
            PolicyKind::Security => write!(f, "security_policy"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyRule {
    Required,
    Forbidden,
    Optional,
}

/// Vendor-neutral field names. Policy keys and mapper bindings share this vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentField {
    ServiceId,
    Description,
    Interface,
    Vrf,
    RouteDistinguisher,
    RouteTarget,
    AsNumber,
    Vni,
    Mtu,
    Vlan,
    Bfd,
    Auth,
    Protocol,
    EvpnMode,
    Bandwidth,
    Latency,
    Jitter,
    Loss,
    Dscp,
    Acl,
    FilterPrivate,
}

impl IntentField {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentField::ServiceId => "service_id",
            IntentField::Description => "description",
            IntentField::Interface => "interface",
            IntentField::Vrf => "vrf",
            IntentField::RouteDistinguisher => "route_distinguisher",
            IntentField::RouteTarget => "route_target",
            IntentField::AsNumber => "as_number",
            IntentField::Vni => "vni",
            IntentField::Mtu => "mtu",
            IntentField::Vlan => "vlan",
            IntentField::Bfd => "bfd",
            IntentField::Auth => "auth",
            IntentField::Protocol => "protocol",
            IntentField::EvpnMode => "evpn_mode",
            IntentField::Bandwidth => "bandwidth",
            IntentField::Latency => "latency",
            IntentField::Jitter => "jitter",
            IntentField::Loss => "loss",
            IntentField::Dscp => "dscp",
            IntentField::Acl => "acl",
            IntentField::FilterPrivate => "filter_private",
        }
    }

    /// Which policy mapping holds this field; `None` for derived fields.
    pub fn policy_kind(&self) -> Option<PolicyKind> {
        match self {
            IntentField::ServiceId | IntentField::Description | IntentField::Interface => None,
            IntentField::Vrf
            | IntentField::RouteDistinguisher
            | IntentField::RouteTarget
            | IntentField::AsNumber
            | IntentField::Vni
            | IntentField::Mtu
            | IntentField::Vlan
            | IntentField::Bfd
            | IntentField::Auth
            | IntentField::Protocol
            | IntentField::EvpnMode => Some(PolicyKind::Routing),
            IntentField::Bandwidth
            | IntentField::Latency
            | IntentField::Jitter
            | IntentField::Loss
            | IntentField::Dscp => Some(PolicyKind::Qos),
            IntentField::Acl | IntentField::FilterPrivate => Some(PolicyKind::Security),
        }
    }

    /// Identifiers that must resolve to one logical value across every device of a service.
    pub fn is_shared_identifier(&self) -> bool {
        matches!(
            self,
            IntentField::RouteDistinguisher
                | IntentField::RouteTarget
                | IntentField::AsNumber
                | IntentField::Vni
        )
    }

    /// Fields where several distinct extracted values are merged instead of conflicting.
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, IntentField::Protocol)
    }

    /// Map a loosely named extraction key onto a field.
    pub fn from_param_key(key: &str) -> Option<Self> {
        let field = match key.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "vrf" | "vrf_name" => IntentField::Vrf,
            "rd" | "route_distinguisher" => IntentField::RouteDistinguisher,
            "rt" | "route_target" | "route_targets" => IntentField::RouteTarget,
            "as" | "asn" | "as_number" | "autonomous_system" => IntentField::AsNumber,
            "vni" => IntentField::Vni,
            "mtu" => IntentField::Mtu,
            "vlan" => IntentField::Vlan,
            "bfd" => IntentField::Bfd,
            "auth" | "authentication" => IntentField::Auth,
            "protocol" | "protocols" => IntentField::Protocol,
            "evpn_mode" => IntentField::EvpnMode,
            "bandwidth" | "bandwidth_mbps" => IntentField::Bandwidth,
            "latency" | "latency_ms" => IntentField::Latency,
            "jitter" | "jitter_ms" => IntentField::Jitter,
            "loss" | "loss_pct" => IntentField::Loss,
            "dscp" => IntentField::Dscp,
            "acl" | "access_list" | "filter" => IntentField::Acl,
            "filter_private" => IntentField::FilterPrivate,
            _ => return None,
        };
        Some(field)
    }
}

impl fmt::Display for IntentField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// RAW AND NORMALIZED INTENT
// =============================================================================

/// Loosely typed candidate values extracted from intent text. Never validated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFields {
    /// Explicit service type string, when the text names one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
    /// Service keywords spotted in the text (e.g. "l3vpn", "evpn-l2", "qos").
    #[serde(default)]
    pub service_markers: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    /// Device names in order of first appearance.
    #[serde(default)]
    pub devices: Vec<String>,
    /// Interface names in order of first appearance.
    #[serde(default)]
    pub interfaces: Vec<String>,
    /// Devices the service passes through but does not terminate on.
    #[serde(default)]
    pub transit_devices: Vec<String>,
    /// Every value seen for each parameter, contradictions included.
    #[serde(default)]
    pub params: BTreeMap<String, Vec<serde_json::Value>>,
}

impl RawFields {
    pub fn push_param(&mut self, key: &str, value: serde_json::Value) {
        let values = self.params.entry(key.to_string()).or_default();
        if !values.contains(&value) {
            values.push(value);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub device: String,
    pub interface: String,
}

impl Endpoint {
    pub fn new(device: impl Into<String>, interface: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            interface: interface.into(),
        }
    }
}

pub type PolicyMap = BTreeMap<IntentField, String>;

/// Vendor-neutral structured representation of an intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedIntent {
    pub service_type: ServiceType,
    pub service_id: String,
    pub endpoints: Vec<Endpoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transit_devices: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_policy: Option<PolicyMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qos_policy: Option<PolicyMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_policy: Option<PolicyMap>,
}

impl NormalizedIntent {
    pub fn policy(&self, kind: PolicyKind) -> Option<&PolicyMap> {
        match kind {
            PolicyKind::Routing => self.routing_policy.as_ref(),
            PolicyKind::Qos => self.qos_policy.as_ref(),
            PolicyKind::Security => self.security_policy.as_ref(),
        }
    }

    /// Explicitly requested value of a policy field.
    pub fn value(&self, field: IntentField) -> Option<&str> {
        let kind = field.policy_kind()?;
        self.policy(kind)?.get(&field).map(String::as_str)
    }

    /// Distinct devices in first-appearance order: endpoints first, then transit.
    pub fn devices(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.endpoints
            .iter()
            .map(|e| e.device.as_str())
            .chain(self.transit_devices.iter().map(String::as_str))
            .filter(|d| seen.insert(d.to_string()))
            .map(str::to_string)
            .collect()
    }

    pub fn endpoint_devices(&self) -> BTreeSet<&str> {
        self.endpoints.iter().map(|e| e.device.as_str()).collect()
    }

    pub fn interfaces_on(&self, device: &str) -> Vec<&str> {
        self.endpoints
            .iter()
            .filter(|e| e.device == device)
            .map(|e| e.interface.as_str())
            .collect()
    }

    /// A copy of this intent limited to the given devices.
    pub fn restricted_to(&self, devices: &BTreeSet<String>) -> NormalizedIntent {
        NormalizedIntent {
            endpoints: self
                .endpoints
                .iter()
                .filter(|e| devices.contains(&e.device))
                .cloned()
                .collect(),
            transit_devices: self
                .transit_devices
                .iter()
                .filter(|d| devices.contains(*d))
                .cloned()
                .collect(),
            ..self.clone()
        }
    }
}

// =============================================================================
// VENDORS, TRANSPORTS AND DISCOVERY
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    Cisco,
    Juniper,
    Nokia,
    Arista,
}

impl Vendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::Cisco => "cisco",
            Vendor::Juniper => "juniper",
            Vendor::Nokia => "nokia",
            Vendor::Arista => "arista",
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Vendor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cisco" | "iosxr" | "ios-xr" => Ok(Vendor::Cisco),
            "juniper" | "junos" => Ok(Vendor::Juniper),
            "nokia" | "sros" | "sr-os" => Ok(Vendor::Nokia),
            "arista" | "eos" => Ok(Vendor::Arista),
            other => Err(format!("unknown vendor '{}'", other)),
        }
    }
}

/// Device management transports, declared in default preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Transport {
    #[serde(rename = "NETCONF", alias = "netconf")]
    Netconf,
    #[serde(rename = "gNMI", alias = "gnmi")]
    Gnmi,
    #[serde(rename = "RESTCONF", alias = "restconf")]
    Restconf,
    #[serde(rename = "SSH", alias = "ssh")]
    Ssh,
}

impl Transport {
    pub const PREFERENCE: [Transport; 4] = [
        Transport::Netconf,
        Transport::Gnmi,
        Transport::Restconf,
        Transport::Ssh,
    ];

    /// The payload format this transport carries natively.
    pub fn native_format(&self) -> PayloadFormat {
        match self {
            Transport::Netconf => PayloadFormat::Markup,
            Transport::Gnmi | Transport::Restconf => PayloadFormat::StructuredData,
            Transport::Ssh => PayloadFormat::CommandLines,
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Netconf => write!(f, "NETCONF"),
            Transport::Gnmi => write!(f, "gNMI"),
            Transport::Restconf => write!(f, "RESTCONF"),
            Transport::Ssh => write!(f, "SSH"),
        }
    }
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "netconf" => Ok(Transport::Netconf),
            "gnmi" => Ok(Transport::Gnmi),
            "restconf" => Ok(Transport::Restconf),
            "ssh" | "cli" | "ssh-cli" => Ok(Transport::Ssh),
            other => Err(format!("unknown transport '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PayloadFormat {
    /// XML, as carried by NETCONF.
    Markup,
    /// JSON, as carried by gNMI and RESTCONF.
    StructuredData,
    /// Line-oriented CLI commands.
    CommandLines,
}

impl fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadFormat::Markup => write!(f, "markup"),
            PayloadFormat::StructuredData => write!(f, "structured-data"),
            PayloadFormat::CommandLines => write!(f, "command-lines"),
        }
    }
}

impl FromStr for PayloadFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markup" | "xml" => Ok(PayloadFormat::Markup),
            "structured-data" | "json" => Ok(PayloadFormat::StructuredData),
            "command-lines" | "cli" => Ok(PayloadFormat::CommandLines),
            other => Err(format!("unknown payload format '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverySource {
    LiveProbe,
    Cache,
}

/// Discovery outcome for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDiscoveryResult {
    pub device: String,
    pub vendor: Vendor,
    pub reachable: bool,
    #[serde(default)]
    pub transports: BTreeSet<Transport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    #[serde(default)]
    pub capability_flags: BTreeSet<String>,
    #[serde(default)]
    pub models: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<DiscoverySource>,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ModelDiscoveryResult {
    pub fn unreachable(device: &str, vendor: Vendor, attempts: u32, reason: impl Into<String>) -> Self {
        Self {
            device: device.to_string(),
            vendor,
            reachable: false,
            transports: BTreeSet::new(),
            os_version: None,
            model_version: None,
            capability_flags: BTreeSet::new(),
            models: BTreeSet::new(),
            source: None,
            attempts,
            reason: Some(reason.into()),
        }
    }
}

// =============================================================================
// MAPPING AND PAYLOADS
// =============================================================================

/// One intent field bound to a vendor schema path with its encoded value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldBinding {
    pub field: IntentField,
    pub path: String,
    pub value: String,
    #[serde(default)]
    pub encoding: ValueEncoding,
}

impl FieldBinding {
    /// The intent value this binding was encoded from, if `value` is in its encoding.
    pub fn logical_value(&self) -> Option<String> {
        self.encoding.decode(&self.value)
    }
}

/// The template chosen for one device, with every intent value bound to a vendor path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSelection {
    pub device: String,
    pub vendor: Vendor,
    pub model_version: String,
    pub service_type: ServiceType,
    pub template_id: String,
    pub namespace: String,
    /// Transports usable for this device: discovered and supported by the template.
    pub transports: BTreeSet<Transport>,
    pub bindings: Vec<FieldBinding>,
    /// Command-form template lines with `{field}` placeholders.
    #[serde(default)]
    pub command_template: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl TemplateSelection {
    pub fn values_of(&self, field: IntentField) -> Vec<&str> {
        self.bindings
            .iter()
            .filter(|b| b.field == field)
            .map(|b| b.value.as_str())
            .collect()
    }
}

/// SHA-256 hex digest of a rendered payload body.
pub fn content_checksum(body: &str) -> String {
    format!("{:x}", Sha256::digest(body.as_bytes()))
}

/// A rendered configuration payload. Immutable once generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPayload {
    device: String,
    transport: Transport,
    format: PayloadFormat,
    body: String,
    checksum: String,
}

impl ConfigPayload {
    pub fn new(
        device: impl Into<String>,
        transport: Transport,
        format: PayloadFormat,
        body: impl Into<String>,
    ) -> Self {
        let body = body.into();
        let checksum = content_checksum(&body);
        Self {
            device: device.into(),
            transport,
            format,
            body,
            checksum,
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn format(&self) -> PayloadFormat {
        self.format
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// True when the body still matches the checksum taken at generation time.
    pub fn checksum_matches(&self) -> bool {
        content_checksum(&self.body) == self.checksum
    }
}

// =============================================================================
// RISK
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// One level up, saturating at CRITICAL.
    pub fn escalated(&self) -> RiskLevel {
        match self {
            RiskLevel::Low => RiskLevel::Medium,
            RiskLevel::Medium => RiskLevel::High,
            RiskLevel::High | RiskLevel::Critical => RiskLevel::Critical,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
            RiskLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Risk of a proposed change. The level only ever rises.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default)]
    pub blast_radius: BTreeSet<String>,
    /// Set when a local defect makes the change undeployable regardless of approval.
    #[serde(default)]
    pub blocked: bool,
}

impl RiskAssessment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finding; the level becomes the maximum of the current and given level.
    pub fn record(&mut self, level: RiskLevel, reason: impl Into<String>) {
        self.risk_level = self.risk_level.max(level);
        self.reasons.push(reason.into());
    }

    /// Raise the level by one step.
    pub fn escalate(&mut self, reason: impl Into<String>) {
        let next = self.risk_level.escalated();
        self.record(next, reason);
    }

    pub fn block(&mut self, reason: impl Into<String>) {
        self.blocked = true;
        self.record(RiskLevel::Critical, reason);
    }

    /// HIGH and above always wait for an operator, whatever the caller asked for.
    pub fn requires_human_approval(&self) -> bool {
        self.risk_level >= RiskLevel::High
    }
}

// =============================================================================
// PIPELINE STATE AND RESPONSE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Received,
    Normalized,
    Discovered,
    Mapped,
    Generated,
    Validated,
    AwaitingApproval,
    Deploying,
    Deployed,
    RolledBack,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Deployed | PipelineState::RolledBack | PipelineState::Failed
        )
    }

    /// Edges of the processing state machine. Any non-terminal state may fail.
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        if self.is_terminal() {
            return false;
        }
        if next == Failed {
            return true;
        }
        matches!(
            (self, next),
            (Received, Normalized)
                | (Normalized, Discovered)
                | (Discovered, Mapped)
                | (Mapped, Generated)
                | (Generated, Validated)
                | (Validated, AwaitingApproval)
                | (Validated, Deploying)
                | (AwaitingApproval, Deploying)
                | (Deploying, Deployed)
                | (Deploying, RolledBack)
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineState::Received => "RECEIVED",
            PipelineState::Normalized => "NORMALIZED",
            PipelineState::Discovered => "DISCOVERED",
            PipelineState::Mapped => "MAPPED",
            PipelineState::Generated => "GENERATED",
            PipelineState::Validated => "VALIDATED",
            PipelineState::AwaitingApproval => "AWAITING_APPROVAL",
            PipelineState::Deploying => "DEPLOYING",
            PipelineState::Deployed => "DEPLOYED",
            PipelineState::RolledBack => "ROLLED_BACK",
            PipelineState::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: PipelineState,
    pub to: PipelineState,
    pub at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    Readback,
    Inventory,
    History,
}

/// Device configuration captured before the first apply of an attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub device: String,
    pub config: String,
    pub source: SnapshotSource,
    pub captured_at: chrono::DateTime<chrono::Utc>,
}

/// Per-device deployment progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceOutcome {
    pub device: String,
    pub applied: bool,
    pub confirmed: bool,
    pub rolled_back: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentStatus {
    pub state: PipelineState,
    /// The last state completed before the pipeline stopped.
    pub stage_reached: PipelineState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
    #[serde(default)]
    pub devices: Vec<DeviceOutcome>,
    /// Devices left out of the deployment (unreachable or optional and unsupported).
    #[serde(default)]
    pub skipped_devices: Vec<String>,
    /// Devices in an unknown state after a failed rollback.
    #[serde(default)]
    pub manual_intervention: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<String>,
}

impl Default for DeploymentStatus {
    fn default() -> Self {
        Self {
            state: PipelineState::Received,
            stage_reached: PipelineState::Received,
            error: None,
            devices: Vec::new(),
            skipped_devices: Vec::new(),
            manual_intervention: Vec::new(),
            approval_id: None,
        }
    }
}

/// Post-deployment checks an operator (or automation) should run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationPlan {
    pub checks: Vec<String>,
    #[serde(default)]
    pub telemetry: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitPlan {
    pub strategy: String,
    pub confirmed_commit: bool,
    pub rollback_timeout_secs: u64,
}

/// Everything produced while processing one intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentResponse {
    pub attempt_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    pub intent_summary: String,
    pub risk_assessment: RiskAssessment,
    #[serde(default)]
    pub model_discovery: Vec<ModelDiscoveryResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_intent: Option<NormalizedIntent>,
    #[serde(default)]
    pub mapping_table: Vec<TemplateSelection>,
    #[serde(default)]
    pub configuration_payloads: Vec<ConfigPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_plan: Option<VerificationPlan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_plan: Option<CommitPlan>,
    pub deployment_status: DeploymentStatus,
    #[serde(default)]
    pub transitions: Vec<StateTransition>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl IntentResponse {
    pub fn new(intent_text: &str) -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            service_id: None,
            intent_summary: summarize(intent_text),
            risk_assessment: RiskAssessment::new(),
            model_discovery: Vec::new(),
            normalized_intent: None,
            mapping_table: Vec::new(),
            configuration_payloads: Vec::new(),
            verification_plan: None,
            commit_plan: None,
            deployment_status: DeploymentStatus::default(),
            transitions: Vec::new(),
            created_at: chrono::Utc::now(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.deployment_status.state
    }
}

const SUMMARY_LIMIT: usize = 200;

/// Single-line summary of the intent text, truncated on a char boundary.
pub fn summarize(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= SUMMARY_LIMIT {
        return flat;
    }
    let mut out: String = flat.chars().take(SUMMARY_LIMIT).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent() -> NormalizedIntent {
        let mut routing = PolicyMap::new();
        routing.insert(IntentField::Vrf, "CUST_A".to_string());
        routing.insert(IntentField::Mtu, "9000".to_string());
        NormalizedIntent {
            service_type: ServiceType::L3vpn,
            service_id: "l3vpn-cust-a".to_string(),
            endpoints: vec![
                Endpoint::new("PE1", "ge-0/0/1"),
                Endpoint::new("PE2", "GigabitEthernet0/0/0/1"),
                Endpoint::new("PE1", "ge-0/0/2"),
            ],
            transit_devices: vec!["P1".to_string()],
            routing_policy: Some(routing),
            qos_policy: None,
            security_policy: None,
        }
    }

    #[test]
    fn devices_are_distinct_in_first_appearance_order() {
        assert_eq!(intent().devices(), vec!["PE1", "PE2", "P1"]);
        assert_eq!(intent().interfaces_on("PE1"), vec!["ge-0/0/1", "ge-0/0/2"]);
    }

    #[test]
    fn value_reads_from_owning_policy() {
        let intent = intent();
        assert_eq!(intent.value(IntentField::Mtu), Some("9000"));
        assert_eq!(intent.value(IntentField::Acl), None);
        assert_eq!(intent.value(IntentField::ServiceId), None);
    }

    #[test]
    fn risk_never_decreases() {
        let mut risk = RiskAssessment::new();
        risk.record(RiskLevel::High, "semantic mismatch");
        risk.record(RiskLevel::Low, "shared device");
        assert_eq!(risk.risk_level, RiskLevel::High);
        risk.escalate("production service on device");
        assert_eq!(risk.risk_level, RiskLevel::Critical);
        risk.escalate("again");
        assert_eq!(risk.risk_level, RiskLevel::Critical);
        assert_eq!(risk.reasons.len(), 4);
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for terminal in [
            PipelineState::Deployed,
            PipelineState::RolledBack,
            PipelineState::Failed,
        ] {
            assert!(!terminal.can_transition_to(PipelineState::Failed));
            assert!(!terminal.can_transition_to(PipelineState::Deploying));
        }
        assert!(PipelineState::Validated.can_transition_to(PipelineState::AwaitingApproval));
        assert!(!PipelineState::Received.can_transition_to(PipelineState::Deploying));
    }

    #[test]
    fn payload_checksum_tracks_body() {
        let payload = ConfigPayload::new("PE1", Transport::Ssh, PayloadFormat::CommandLines, "vrf A\n");
        assert!(payload.checksum_matches());
        assert_eq!(payload.checksum(), content_checksum("vrf A\n"));

        let mut tampered = serde_json::to_value(&payload).unwrap();
        tampered["body"] = serde_json::json!("vrf B\n");
        let tampered: ConfigPayload = serde_json::from_value(tampered).unwrap();
        assert!(!tampered.checksum_matches());
    }

    #[test]
    fn summary_is_single_line_and_bounded() {
        assert_eq!(summarize("a\n  b\tc"), "a b c");
        let long = "x".repeat(500);
        assert_eq!(summarize(&long).chars().count(), SUMMARY_LIMIT + 3);
    }

    #[test]
    fn service_type_policy_table() {
        assert_eq!(
            ServiceType::L3vpn.policy_rule(PolicyKind::Security),
            PolicyRule::Forbidden
        );
        assert_eq!(ServiceType::L3vpn.policy_rule(PolicyKind::Qos), PolicyRule::Optional);
        assert_eq!(ServiceType::Qos.policy_rule(PolicyKind::Qos), PolicyRule::Required);
        assert_eq!("vpnv4".parse::<ServiceType>(), Ok(ServiceType::L3vpn));
        assert!("frobnicate".parse::<ServiceType>().is_err());
    }
}
