//! Concurrent capability probing and model version resolution.

use aurora_core::{
    CapabilitySet, DeviceRecord, DiscoveryConfig, DiscoverySource, Inventory, InventoryError,
    ModelDiscoveryResult, NormalizedIntent, PipelineError, SchemaStore,
};
use futures::future::join_all;
use std::sync::Arc;

use crate::cache::CapabilityCache;

pub struct ModelDiscovery {
    schema: Arc<dyn SchemaStore>,
    cache: Arc<CapabilityCache>,
    config: DiscoveryConfig,
}

impl ModelDiscovery {
    pub fn new(
        schema: Arc<dyn SchemaStore>,
        cache: Arc<CapabilityCache>,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            schema,
            cache,
            config,
        }
    }

    /// Discover every device of the intent: endpoints first, then transit devices.
    pub async fn discover(
        &self,
        intent: &NormalizedIntent,
        inventory: &dyn Inventory,
    ) -> Result<Vec<ModelDiscoveryResult>, PipelineError> {
        self.discover_devices(&intent.devices(), inventory).await
    }

    /// Probe devices concurrently. Results are positional: one per device, in input order.
    ///
    /// Fails only when no device at all is reachable.
    pub async fn discover_devices(
        &self,
        devices: &[String],
        inventory: &dyn Inventory,
    ) -> Result<Vec<ModelDiscoveryResult>, PipelineError> {
        let records = devices
            .iter()
            .map(|name| {
                inventory.lookup(name).map_err(|e| match e {
                    InventoryError::UnknownDevice(device) => PipelineError::UnknownDevice { device },
                    other => PipelineError::UnknownDevice {
                        device: format!("{} ({})", name, other),
                    },
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let revision = self.schema.revision();
        let results = join_all(records.into_iter().map(|r| self.probe(r, revision))).await;

        if !results.is_empty() && results.iter().all(|r| !r.reachable) {
            let causes: Vec<String> = results
                .iter()
                .map(|r| format!("{}: {}", r.device, r.reason.as_deref().unwrap_or("unreachable")))
                .collect();
            return Err(PipelineError::DeviceUnreachable {
                device: results[0].device.clone(),
                cause: format!("no device reachable ({})", causes.join("; ")),
            });
        }
        Ok(results)
    }

    async fn probe(&self, record: DeviceRecord, revision: u64) -> ModelDiscoveryResult {
        if let Some(capabilities) = self.cache.get(&record.name, revision) {
            tracing::debug!(device = %record.name, "Capability cache hit");
            return self.resolve(&record, capabilities, DiscoverySource::Cache, 0);
        }

        let timeout = self.config.probe_timeout();
        let mut last_error = String::new();
        for attempt in 1..=self.config.max_attempts {
            match tokio::time::timeout(timeout, self.schema.capabilities(&record)).await {
                Ok(Ok(capabilities)) => {
                    self.cache.insert(&record.name, capabilities.clone(), revision);
                    return self.resolve(&record, capabilities, DiscoverySource::LiveProbe, attempt);
                }
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => last_error = format!("probe timed out after {}ms", timeout.as_millis()),
            }
            tracing::debug!(
                device = %record.name,
                attempt,
                error = %last_error,
                "Capability probe failed"
            );
            if attempt < self.config.max_attempts {
                tokio::time::sleep(self.config.backoff_for(attempt)).await;
            }
        }

        tracing::warn!(
            device = %record.name,
            attempts = self.config.max_attempts,
            error = %last_error,
            "Device unreachable"
        );
        ModelDiscoveryResult::unreachable(
            &record.name,
            record.vendor,
            self.config.max_attempts,
            last_error,
        )
    }

    fn resolve(
        &self,
        record: &DeviceRecord,
        capabilities: CapabilitySet,
        source: DiscoverySource,
        attempts: u32,
    ) -> ModelDiscoveryResult {
        let mut reason = None;
        let model_version = if capabilities.vendor != record.vendor {
            reason = Some(format!(
                "device reports vendor {} but inventory lists {}",
                capabilities.vendor, record.vendor
            ));
            None
        } else {
            let version = self
                .schema
                .resolve_model_version(record.vendor, &capabilities.os_version);
            if version.is_none() {
                reason = Some(format!(
                    "no {} model version supports OS {}",
                    record.vendor, capabilities.os_version
                ));
            }
            version
        };

        ModelDiscoveryResult {
            device: record.name.clone(),
            vendor: record.vendor,
            reachable: true,
            transports: capabilities.transports,
            os_version: Some(capabilities.os_version),
            model_version,
            capability_flags: capabilities.flags,
            models: capabilities.models,
            source: Some(source),
            attempts,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use aurora_core::{
        SchemaError, ServiceType, StaticInventory, TemplateCatalog, TemplateSet, Vendor,
    };
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    #[derive(Clone, Copy)]
    enum Behaviour {
        Ok(&'static str),
        FailTimes(u32, &'static str),
        Hang,
        Down,
    }

    struct ScriptedStore {
        catalog: TemplateCatalog,
        behaviour: HashMap<String, Behaviour>,
        calls: Mutex<HashMap<String, u32>>,
        revision: AtomicU64,
    }

    impl ScriptedStore {
        fn new(behaviour: &[(&str, Behaviour)]) -> Self {
            Self {
                catalog: TemplateCatalog::builtin(),
                behaviour: behaviour.iter().map(|(d, b)| (d.to_string(), *b)).collect(),
                calls: Mutex::new(HashMap::new()),
                revision: AtomicU64::new(1),
            }
        }

        fn calls(&self, device: &str) -> u32 {
            self.calls.lock().unwrap().get(device).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl SchemaStore for ScriptedStore {
        fn revision(&self) -> u64 {
            self.revision.load(Ordering::SeqCst)
        }

        async fn capabilities(&self, device: &DeviceRecord) -> Result<CapabilitySet, SchemaError> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                let n = calls.entry(device.name.clone()).or_default();
                *n += 1;
                *n
            };
            match self.behaviour[&device.name] {
                Behaviour::Ok(os) => Ok(TemplateCatalog::default_capabilities(device.vendor, os)),
                Behaviour::FailTimes(n, os) if call > n => {
                    Ok(TemplateCatalog::default_capabilities(device.vendor, os))
                }
                Behaviour::FailTimes(..) | Behaviour::Down => {
                    Err(SchemaError::Unreachable(device.name.clone()))
                }
                Behaviour::Hang => {
                    futures::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }

        fn model_versions(&self, vendor: Vendor) -> Vec<String> {
            self.catalog.model_versions(vendor)
        }

        fn templates(&self, vendor: Vendor, version: &str, service: ServiceType) -> Option<TemplateSet> {
            self.catalog.find(vendor, version, service)
        }
    }

    fn inventory() -> StaticInventory {
        StaticInventory::from_yaml(
            r#"
devices:
  - { name: PE1, vendor: juniper, address: 10.0.0.1 }
  - { name: PE2, vendor: cisco, address: 10.0.0.2 }
  - { name: PE3, vendor: nokia, address: 10.0.0.3 }
"#,
        )
        .unwrap()
    }

    fn discovery(store: Arc<ScriptedStore>) -> ModelDiscovery {
        let config = DiscoveryConfig {
            probe_timeout_ms: 100,
            max_attempts: 3,
            backoff_ms: 10,
            cache_ttl_secs: 60,
        };
        ModelDiscovery::new(store, Arc::new(CapabilityCache::new(config.cache_ttl())), config)
    }

    fn names(devices: &[&str]) -> Vec<String> {
        devices.iter().map(|d| d.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn results_are_positional_and_versions_resolved() {
        let store = Arc::new(ScriptedStore::new(&[
            ("PE1", Behaviour::Ok("21.4R3")),
            ("PE2", Behaviour::Ok("7.5.2")),
        ]));
        let results = discovery(store)
            .discover_devices(&names(&["PE2", "PE1"]), &inventory())
            .await
            .unwrap();
        assert_eq!(results[0].device, "PE2");
        assert_eq!(results[0].model_version.as_deref(), Some("7.3"));
        assert_eq!(results[1].device, "PE1");
        assert_eq!(results[1].model_version.as_deref(), Some("21.4"));
        assert_eq!(results[1].source, Some(DiscoverySource::LiveProbe));
    }

    #[tokio::test(start_paused = true)]
    async fn one_unreachable_device_does_not_abort_the_others() {
        let store = Arc::new(ScriptedStore::new(&[
            ("PE1", Behaviour::Ok("21.4")),
            ("PE2", Behaviour::Hang),
        ]));
        let results = discovery(store.clone())
            .discover_devices(&names(&["PE1", "PE2"]), &inventory())
            .await
            .unwrap();
        assert!(results[0].reachable);
        assert!(!results[1].reachable);
        assert_eq!(results[1].attempts, 3);
        assert!(results[1].reason.as_deref().unwrap().contains("timed out"));
        assert_eq!(store.calls("PE2"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let store = Arc::new(ScriptedStore::new(&[("PE1", Behaviour::FailTimes(2, "21.4"))]));
        let results = discovery(store.clone())
            .discover_devices(&names(&["PE1"]), &inventory())
            .await
            .unwrap();
        assert!(results[0].reachable);
        assert_eq!(results[0].attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn all_unreachable_fails() {
        let store = Arc::new(ScriptedStore::new(&[
            ("PE1", Behaviour::Down),
            ("PE2", Behaviour::Down),
        ]));
        let err = discovery(store)
            .discover_devices(&names(&["PE1", "PE2"]), &inventory())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::DeviceUnreachable { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn second_discovery_uses_cache_until_revision_changes() {
        let store = Arc::new(ScriptedStore::new(&[("PE1", Behaviour::Ok("21.4"))]));
        let discovery = discovery(store.clone());
        discovery.discover_devices(&names(&["PE1"]), &inventory()).await.unwrap();
        let cached = discovery.discover_devices(&names(&["PE1"]), &inventory()).await.unwrap();
        assert_eq!(cached[0].source, Some(DiscoverySource::Cache));
        assert_eq!(store.calls("PE1"), 1);

        store.revision.store(2, Ordering::SeqCst);
        let fresh = discovery.discover_devices(&names(&["PE1"]), &inventory()).await.unwrap();
        assert_eq!(fresh[0].source, Some(DiscoverySource::LiveProbe));
        assert_eq!(store.calls("PE1"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_os_is_reachable_without_model() {
        let store = Arc::new(ScriptedStore::new(&[("PE2", Behaviour::Ok("6.1"))]));
        let results = discovery(store)
            .discover_devices(&names(&["PE2"]), &inventory())
            .await
            .unwrap();
        assert!(results[0].reachable);
        assert!(results[0].model_version.is_none());
        assert!(results[0].reason.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn probe_timeout_is_bounded() {
        let store = Arc::new(ScriptedStore::new(&[
            ("PE1", Behaviour::Ok("21.4")),
            ("PE3", Behaviour::Hang),
        ]));
        let started = tokio::time::Instant::now();
        discovery(store)
            .discover_devices(&names(&["PE1", "PE3"]), &inventory())
            .await
            .unwrap();
        // three 100ms timeouts plus 10ms and 20ms of backoff
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(330), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(400), "{elapsed:?}");
    }
}
