use async_trait::async_trait;
use aurora_core::{
    CapabilitySet, DeviceRecord, DiscoverySource, Endpoint, IntentField, ModelDiscoveryResult,
    NormalizedIntent, SchemaError, SchemaStore, ServiceType, StaticInventory, TemplateCatalog,
    TemplateSet, Vendor,
};
use std::collections::BTreeMap;

#[derive(Default)]
pub struct CatalogStore {
    catalog: TemplateCatalog,
}

#[async_trait]
impl SchemaStore for CatalogStore {
    fn revision(&self) -> u64 {
        1
    }

    async fn capabilities(&self, device: &DeviceRecord) -> Result<CapabilitySet, SchemaError> {
        Ok(TemplateCatalog::default_capabilities(device.vendor, "99"))
    }

    fn model_versions(&self, vendor: Vendor) -> Vec<String> {
        self.catalog.model_versions(vendor)
    }

    fn templates(
        &self,
        vendor: Vendor,
        model_version: &str,
        service_type: ServiceType,
    ) -> Option<TemplateSet> {
        self.catalog.find(vendor, model_version, service_type)
    }
}

fn record(name: &str, vendor: Vendor, asn: u32) -> DeviceRecord {
    DeviceRecord {
        name: name.to_string(),
        aliases: Vec::new(),
        vendor,
        address: format!("{}.lab", name.to_lowercase()),
        credentials_ref: None,
        prior_config_snapshot: None,
        bgp_asn: Some(asn),
        services: Vec::new(),
    }
}

pub fn inventory() -> StaticInventory {
    StaticInventory::new(vec![
        record("PE1", Vendor::Juniper, 65000),
        record("PE2", Vendor::Cisco, 65000),
        record("PE3", Vendor::Arista, 65001),
        record("P1", Vendor::Nokia, 65000),
    ])
    .unwrap()
}

pub fn interface_of(device: &str) -> &'static str {
    match device {
        "PE1" => "ge-0/0/1",
        "PE2" => "GigabitEthernet0/0/0/2",
        "PE3" => "Ethernet3",
        _ => "1/1/1",
    }
}

pub fn discovered(device: &str, vendor: Vendor, model_version: &str) -> ModelDiscoveryResult {
    let caps = TemplateCatalog::default_capabilities(vendor, model_version);
    ModelDiscoveryResult {
        device: device.to_string(),
        vendor,
        reachable: true,
        transports: caps.transports,
        os_version: Some(model_version.to_string()),
        model_version: Some(model_version.to_string()),
        capability_flags: caps.flags,
        models: caps.models,
        source: Some(DiscoverySource::LiveProbe),
        attempts: 1,
        reason: None,
    }
}

pub fn l3vpn_intent(a: &str, b: &str) -> NormalizedIntent {
    let routing = BTreeMap::from([
        (IntentField::Vrf, "CUST-A".to_string()),
        (IntentField::RouteDistinguisher, "65000:100".to_string()),
        (IntentField::RouteTarget, "65000:100".to_string()),
        (IntentField::AsNumber, "65000".to_string()),
        (IntentField::Mtu, "9000".to_string()),
    ]);
    NormalizedIntent {
        service_type: ServiceType::L3vpn,
        service_id: "l3vpn-test0001".to_string(),
        endpoints: vec![
            Endpoint::new(a, interface_of(a)),
            Endpoint::new(b, interface_of(b)),
        ],
        transit_devices: Vec::new(),
        routing_policy: Some(routing),
        qos_policy: None,
        security_policy: None,
    }
}
