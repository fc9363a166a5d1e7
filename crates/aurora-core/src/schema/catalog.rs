//! Built-in template catalog.
//!
//! Covers Cisco IOS-XR, Juniper Junos, Nokia SR OS and Arista EOS (OpenConfig). Not
//! every vendor carries every service; lookups for a missing combination return `None`.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use super::{CapabilitySet, CONFIRMED_COMMIT, FieldPath, TemplateSet, ValueEncoding, compare_versions};
use crate::{IntentField, ServiceType, Transport, Vendor};

use IntentField as F;

type PathTable = &'static [(IntentField, &'static str)];

const L3VPN_FIELDS: &[IntentField] = &[
    F::Description,
    F::Vrf,
    F::RouteDistinguisher,
    F::RouteTarget,
    F::AsNumber,
    F::Interface,
    F::Mtu,
    F::Vlan,
    F::Bfd,
    F::Auth,
    F::Protocol,
    F::Bandwidth,
    F::Dscp,
];

const EVPN_FIELDS: &[IntentField] = &[
    F::Description,
    F::Vni,
    F::Vlan,
    F::RouteDistinguisher,
    F::RouteTarget,
    F::AsNumber,
    F::Interface,
    F::Mtu,
    F::EvpnMode,
    F::Bfd,
];

const QOS_FIELDS: &[IntentField] = &[
    F::Description,
    F::Interface,
    F::Bandwidth,
    F::Latency,
    F::Jitter,
    F::Loss,
    F::Dscp,
];

const SECURITY_FIELDS: &[IntentField] = &[F::Description, F::Interface, F::Acl, F::FilterPrivate];

const ROUTING_FIELDS: &[IntentField] = &[
    F::Description,
    F::Protocol,
    F::AsNumber,
    F::Vrf,
    F::Interface,
    F::Mtu,
    F::Bfd,
    F::Auth,
];

fn service_fields(service: ServiceType) -> &'static [IntentField] {
    match service {
        ServiceType::L3vpn => L3VPN_FIELDS,
        ServiceType::Evpn => EVPN_FIELDS,
        ServiceType::Qos => QOS_FIELDS,
        ServiceType::Security => SECURITY_FIELDS,
        ServiceType::Routing => ROUTING_FIELDS,
    }
}

const CISCO_PATHS: PathTable = &[
    (F::Description, "interfaces/interface/description"),
    (F::Interface, "interfaces/interface/interface-name"),
    (F::Mtu, "interfaces/interface/mtu"),
    (F::Vlan, "interfaces/interface/encapsulation/dot1q/vlan-id"),
    (F::Vrf, "vrfs/vrf/vrf-name"),
    (F::RouteTarget, "vrfs/vrf/address-family/ipv4/unicast/import/route-target/value"),
    (F::RouteDistinguisher, "router/bgp/as/vrfs/vrf/rd/value"),
    (F::AsNumber, "router/bgp/as/as-number"),
    (F::Bfd, "router/bgp/as/bfd/fast-detect"),
    (F::Auth, "router/bgp/as/neighbor-groups/neighbor-group/keychain"),
    (F::Protocol, "router/protocols/protocol/name"),
    (F::Vni, "evpn/evis/evi/vni"),
    (F::EvpnMode, "evpn/evis/evi/mode"),
    (F::Bandwidth, "policy-maps/policy-map/class/police/rate-mbps"),
    (F::Latency, "policy-maps/policy-map/class/sla/latency-ms"),
    (F::Jitter, "policy-maps/policy-map/class/sla/jitter-ms"),
    (F::Loss, "policy-maps/policy-map/class/sla/loss-pct"),
    (F::Dscp, "policy-maps/policy-map/class/set/dscp"),
    (F::Acl, "ipv4/access-lists/access-list/access-list-name"),
    (F::FilterPrivate, "ipv4/access-lists/access-list/deny-rfc1918"),
];

const JUNIPER_PATHS: PathTable = &[
    (F::Description, "configuration/interfaces/interface/description"),
    (F::Interface, "configuration/interfaces/interface/name"),
    (F::Mtu, "configuration/interfaces/interface/mtu"),
    (F::Vlan, "configuration/interfaces/interface/unit/vlan-id"),
    (F::Vrf, "configuration/routing-instances/instance/name"),
    (F::RouteDistinguisher, "configuration/routing-instances/instance/route-distinguisher/rd-type"),
    (F::RouteTarget, "configuration/routing-instances/instance/vrf-target/community"),
    (F::AsNumber, "configuration/routing-options/autonomous-system/as-number"),
    (F::Vni, "configuration/routing-instances/instance/vxlan/vni"),
    (F::EvpnMode, "configuration/routing-instances/instance/instance-type"),
    (F::Bfd, "configuration/protocols/bgp/group/bfd-liveness-detection/enabled"),
    (F::Auth, "configuration/protocols/bgp/group/authentication-key-chain"),
    (F::Protocol, "configuration/routing-instances/instance/protocols/name"),
    (F::Bandwidth, "configuration/class-of-service/interfaces/interface/shaping-rate-mbps"),
    (F::Dscp, "configuration/class-of-service/classifiers/dscp/code-point"),
    (F::Acl, "configuration/firewall/family/inet/filter/name"),
    (F::FilterPrivate, "configuration/firewall/family/inet/filter/term/deny-rfc1918"),
];

const NOKIA_PATHS: PathTable = &[
    (F::Description, "configure/service/customer-service/description"),
    (F::Interface, "configure/service/customer-service/interface/sap/sap-id"),
    (F::Mtu, "configure/service/customer-service/service-mtu"),
    (F::Vlan, "configure/service/customer-service/interface/sap/vlan"),
    (F::Vrf, "configure/service/customer-service/service-name"),
    (F::RouteDistinguisher, "configure/service/customer-service/bgp-ipvpn/mpls/route-distinguisher"),
    (F::RouteTarget, "configure/service/customer-service/bgp-ipvpn/mpls/vrf-target/community"),
    (F::AsNumber, "configure/router/autonomous-system"),
    (F::Vni, "configure/service/customer-service/vxlan/vni"),
    (F::EvpnMode, "configure/service/customer-service/bgp-evpn/mode"),
    (F::Bfd, "configure/service/customer-service/bfd-liveness"),
    (F::Auth, "configure/router/bgp/auth-keychain"),
    (F::Protocol, "configure/router/protocol"),
    (F::Bandwidth, "configure/qos/sap-ingress/policer/rate-mbps"),
    (F::Latency, "configure/qos/sla-profile/latency-ms"),
    (F::Jitter, "configure/qos/sla-profile/jitter-ms"),
    (F::Loss, "configure/qos/sla-profile/loss-pct"),
    (F::Dscp, "configure/qos/sap-ingress/dscp"),
];

const ARISTA_PATHS: PathTable = &[
    (F::Description, "interfaces/interface/config/description"),
    (F::Interface, "interfaces/interface/name"),
    (F::Mtu, "interfaces/interface/config/mtu"),
    (F::Vlan, "interfaces/interface/subinterfaces/subinterface/vlan/vlan-id"),
    (F::Vrf, "network-instances/network-instance/name"),
    (F::RouteDistinguisher, "network-instances/network-instance/config/route-distinguisher"),
    (F::RouteTarget, "network-instances/network-instance/inter-instance-policies/route-target"),
    (F::AsNumber, "network-instances/network-instance/protocols/protocol/bgp/global/config/as"),
    (F::Vni, "network-instances/network-instance/vxlan/vni"),
    (F::EvpnMode, "network-instances/network-instance/evpn/mode"),
    (F::Bfd, "bfd/interfaces/interface/config/enabled"),
    (F::Auth, "network-instances/network-instance/protocols/protocol/bgp/neighbors/auth-password"),
    (F::Protocol, "network-instances/network-instance/protocols/protocol/identifier"),
    (F::Bandwidth, "qos/scheduler-policies/scheduler-policy/rate-mbps"),
    (F::Latency, "qos/scheduler-policies/scheduler-policy/latency-ms"),
    (F::Jitter, "qos/scheduler-policies/scheduler-policy/jitter-ms"),
    (F::Loss, "qos/scheduler-policies/scheduler-policy/loss-pct"),
    (F::Dscp, "qos/classifiers/classifier/dscp"),
];

fn path_table(vendor: Vendor) -> PathTable {
    match vendor {
        Vendor::Cisco => CISCO_PATHS,
        Vendor::Juniper => JUNIPER_PATHS,
        Vendor::Nokia => NOKIA_PATHS,
        Vendor::Arista => ARISTA_PATHS,
    }
}

fn encoding(vendor: Vendor, field: IntentField) -> ValueEncoding {
    match (vendor, field) {
        (Vendor::Juniper | Vendor::Nokia, F::RouteTarget) => {
            ValueEncoding::Prefixed("target:".to_string())
        }
        _ => ValueEncoding::Plain,
    }
}

fn cli_blocks(vendor: Vendor, service: ServiceType) -> &'static [&'static str] {
    match (vendor, service) {
        (Vendor::Cisco, ServiceType::L3vpn) => &[
            "vrf {vrf}\n address-family ipv4 unicast\n  import route-target {route_target}\n  export route-target {route_target}",
            "interface {interface}\n description {description}\n vrf {vrf}\n mtu {mtu}\n encapsulation dot1q {vlan}\n service-policy output bw-{bandwidth}m\n set dscp {dscp}",
            "router bgp {as_number}\n bfd fast-detect{?bfd}\n keychain {auth}\n vrf {vrf}\n  rd {route_distinguisher}\n  redistribute {protocol}",
        ],
        (Vendor::Cisco, ServiceType::Evpn) => &[
            "evpn\n evi {vni}\n  mode {evpn_mode}\n  bgp\n   rd {route_distinguisher}\n   route-target {route_target}",
            "interface {interface}\n description {description}\n mtu {mtu}\n encapsulation dot1q {vlan}",
            "router bgp {as_number}\n bfd fast-detect{?bfd}",
        ],
        (Vendor::Cisco, ServiceType::Qos) => &[
            "policy-map {description}\n class class-default\n  police rate {bandwidth} mbps\n  sla latency {latency}\n  sla jitter {jitter}\n  sla loss {loss}\n  set dscp {dscp}",
            "interface {interface}\n service-policy output {description}",
        ],
        (Vendor::Cisco, ServiceType::Security) => &[
            "ipv4 access-list {acl}\n 10 remark {description}\n 20 deny ipv4 10.0.0.0/8 any{?filter_private}\n 30 deny ipv4 172.16.0.0/12 any{?filter_private}\n 40 deny ipv4 192.168.0.0/16 any{?filter_private}\n 100 permit ipv4 any any",
            "interface {interface}\n ipv4 access-group {acl} ingress",
        ],
        (Vendor::Cisco, ServiceType::Routing) => &[
            "router bgp {as_number}\n bfd fast-detect{?bfd}\n keychain {auth}\n vrf {vrf}\n redistribute {protocol}",
            "interface {interface}\n description {description}\n mtu {mtu}",
        ],
        (Vendor::Juniper, ServiceType::L3vpn) => &[
            "set routing-instances {vrf} instance-type vrf\nset routing-instances {vrf} route-distinguisher {route_distinguisher}\nset routing-instances {vrf} vrf-target {route_target}\nset routing-instances {vrf} protocols {protocol}",
            "set interfaces {interface} description {description}\nset interfaces {interface} mtu {mtu}\nset interfaces {interface} unit 0 vlan-id {vlan}\nset routing-instances {vrf} interface {interface}\nset class-of-service interfaces {interface} shaping-rate {bandwidth}m",
            "set routing-options autonomous-system {as_number}\nset protocols bgp group {vrf} bfd-liveness-detection minimum-interval 300{?bfd}\nset protocols bgp group {vrf} authentication-key-chain {auth}\nset class-of-service classifiers dscp {description} code-points {dscp}",
        ],
        (Vendor::Juniper, ServiceType::Evpn) => &[
            "set routing-instances {description} instance-type {evpn_mode}\nset routing-instances {description} vxlan vni {vni}\nset routing-instances {description} route-distinguisher {route_distinguisher}\nset routing-instances {description} vrf-target {route_target}\nset routing-instances {description} vlan-id {vlan}",
            "set interfaces {interface} mtu {mtu}\nset routing-instances {description} interface {interface}",
            "set routing-options autonomous-system {as_number}\nset protocols bgp group evpn bfd-liveness-detection minimum-interval 300{?bfd}",
        ],
        (Vendor::Juniper, ServiceType::Security) => &[
            "set firewall family inet filter {acl} term deny-private from source-address 10.0.0.0/8{?filter_private}\nset firewall family inet filter {acl} term deny-private from source-address 172.16.0.0/12{?filter_private}\nset firewall family inet filter {acl} term deny-private from source-address 192.168.0.0/16{?filter_private}\nset firewall family inet filter {acl} term deny-private then discard{?filter_private}\nset firewall family inet filter {acl} term default then accept",
            "set interfaces {interface} description {description}\nset interfaces {interface} unit 0 family inet filter input {acl}",
        ],
        (Vendor::Juniper, ServiceType::Routing) => &[
            "set routing-options autonomous-system {as_number}\nset routing-instances {vrf} protocols {protocol}\nset protocols bgp group {description} bfd-liveness-detection minimum-interval 300{?bfd}\nset protocols bgp group {description} authentication-key-chain {auth}",
            "set interfaces {interface} description {description}\nset interfaces {interface} mtu {mtu}",
        ],
        (Vendor::Arista, ServiceType::L3vpn) => &[
            "vrf instance {vrf}",
            "interface {interface}\n description {description}\n vrf {vrf}\n mtu {mtu}\n encapsulation dot1q vlan {vlan}\n shape rate {bandwidth} mbps\n set dscp {dscp}",
            "router bgp {as_number}\n vrf {vrf}\n  rd {route_distinguisher}\n  route-target import evpn {route_target}\n  route-target export evpn {route_target}\n  redistribute {protocol}\n neighbor default bfd{?bfd}\n neighbor default password {auth}",
        ],
        (Vendor::Arista, ServiceType::Evpn) => &[
            "interface Vxlan1\n vxlan vlan {vlan} vni {vni}",
            "interface {interface}\n description {description}\n mtu {mtu}\n switchport access vlan {vlan}",
            "router bgp {as_number}\n vlan {vlan}\n  rd {route_distinguisher}\n  route-target both {route_target}\n  redistribute learned{?evpn_mode}\n neighbor default bfd{?bfd}",
        ],
        (Vendor::Arista, ServiceType::Qos) => &[
            "policy-map type quality-of-service {description}\n class class-default\n  police rate {bandwidth} mbps\n  set dscp {dscp}",
            "interface {interface}\n service-policy type qos input {description}",
        ],
        (Vendor::Arista, ServiceType::Routing) => &[
            "router bgp {as_number}\n vrf {vrf}\n redistribute {protocol}\n neighbor default bfd{?bfd}\n neighbor default password {auth}",
            "interface {interface}\n description {description}\n mtu {mtu}",
        ],
        _ => &[],
    }
}

struct Entry {
    vendor: Vendor,
    model_version: &'static str,
    os_name: &'static str,
    namespace: &'static str,
    transports: &'static [Transport],
    services: &'static [ServiceType],
}

const ENTRIES: &[Entry] = &[
    Entry {
        vendor: Vendor::Cisco,
        model_version: "7.3",
        os_name: "iosxr",
        namespace: "http://cisco.com/ns/yang/Cisco-IOS-XR-um-cfg",
        transports: &[Transport::Netconf, Transport::Gnmi, Transport::Ssh],
        services: &[
            ServiceType::L3vpn,
            ServiceType::Evpn,
            ServiceType::Qos,
            ServiceType::Security,
            ServiceType::Routing,
        ],
    },
    Entry {
        vendor: Vendor::Cisco,
        model_version: "7.9",
        os_name: "iosxr",
        namespace: "http://cisco.com/ns/yang/Cisco-IOS-XR-um-cfg-79",
        transports: &[Transport::Netconf, Transport::Gnmi, Transport::Ssh],
        services: &[ServiceType::L3vpn, ServiceType::Evpn, ServiceType::Routing],
    },
    Entry {
        vendor: Vendor::Juniper,
        model_version: "21.4",
        os_name: "junos",
        namespace: "http://yang.juniper.net/junos/conf/root",
        transports: &[Transport::Netconf, Transport::Ssh],
        services: &[
            ServiceType::L3vpn,
            ServiceType::Evpn,
            ServiceType::Routing,
            ServiceType::Security,
        ],
    },
    Entry {
        vendor: Vendor::Nokia,
        model_version: "21.10",
        os_name: "sros",
        namespace: "urn:nokia.com:sros:ns:yang:sr:conf",
        transports: &[Transport::Netconf, Transport::Gnmi],
        services: &[ServiceType::L3vpn, ServiceType::Evpn, ServiceType::Qos],
    },
    Entry {
        vendor: Vendor::Arista,
        model_version: "4.28",
        os_name: "eos",
        namespace: "http://openconfig.net/yang",
        transports: &[Transport::Gnmi, Transport::Restconf, Transport::Ssh],
        services: &[
            ServiceType::L3vpn,
            ServiceType::Evpn,
            ServiceType::Routing,
            ServiceType::Qos,
        ],
    },
];

/// In-memory template catalog.
#[derive(Debug, Clone)]
pub struct TemplateCatalog {
    templates: Vec<TemplateSet>,
}

impl TemplateCatalog {
    pub fn new(templates: Vec<TemplateSet>) -> Self {
        Self { templates }
    }

    /// Catalog with the built-in vendor templates.
    pub fn builtin() -> Self {
        let mut templates = Vec::new();
        for entry in ENTRIES {
            let table = path_table(entry.vendor);
            for &service in entry.services {
                let paths = service_fields(service)
                    .iter()
                    .filter_map(|&field| {
                        table.iter().find(|(f, _)| *f == field).map(|(_, path)| FieldPath {
                            field,
                            path: (*path).to_string(),
                            encoding: encoding(entry.vendor, field),
                        })
                    })
                    .collect();
                templates.push(TemplateSet {
                    id: format!("{}-{}-{}", entry.os_name, entry.model_version, service.slug()),
                    vendor: entry.vendor,
                    model_version: entry.model_version.to_string(),
                    service_type: service,
                    namespace: entry.namespace.to_string(),
                    transports: entry.transports.iter().copied().collect(),
                    paths,
                    cli: cli_blocks(entry.vendor, service)
                        .iter()
                        .map(|b| (*b).to_string())
                        .collect(),
                });
            }
        }
        Self { templates }
    }

    pub fn model_versions(&self, vendor: Vendor) -> Vec<String> {
        let versions: BTreeSet<&str> = self
            .templates
            .iter()
            .filter(|t| t.vendor == vendor)
            .map(|t| t.model_version.as_str())
            .collect();
        versions.into_iter().map(str::to_string).collect()
    }

    pub fn find(
        &self,
        vendor: Vendor,
        model_version: &str,
        service_type: ServiceType,
    ) -> Option<TemplateSet> {
        self.templates
            .iter()
            .find(|t| {
                t.vendor == vendor
                    && t.model_version == model_version
                    && t.service_type == service_type
            })
            .cloned()
    }

    pub fn resolve_model_version(&self, vendor: Vendor, os_version: &str) -> Option<String> {
        self.model_versions(vendor)
            .into_iter()
            .filter(|v| compare_versions(v, os_version) != Ordering::Greater)
            .max_by(|a, b| compare_versions(a, b))
    }

    /// Capabilities a device of this vendor reports by default.
    pub fn default_capabilities(vendor: Vendor, os_version: &str) -> CapabilitySet {
        let entry = ENTRIES.iter().find(|e| e.vendor == vendor);
        let transports = entry
            .map(|e| e.transports.iter().copied().collect())
            .unwrap_or_default();
        let models = entry
            .map(|e| BTreeSet::from([e.namespace.to_string()]))
            .unwrap_or_default();
        let mut flags = BTreeSet::from(["candidate-config".to_string()]);
        if vendor != Vendor::Arista {
            flags.insert(CONFIRMED_COMMIT.to_string());
        }
        CapabilitySet {
            vendor,
            os_version: os_version.to_string(),
            transports,
            models,
            flags,
        }
    }
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
