//! Per-attempt rollback snapshots.

use aurora_core::ConfigSnapshot;
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

type AttemptKey = (String, Uuid);

/// Pre-change device configuration, keyed by `(service_id, attempt_id)`.
///
/// Each attempt only ever sees its own entries, so concurrent deployments of unrelated
/// services cannot overwrite each other's rollback data.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    attempts: RwLock<HashMap<AttemptKey, BTreeMap<String, ConfigSnapshot>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the first snapshot taken for a device; later saves for the same attempt are
    /// ignored.
    pub fn save(&self, service_id: &str, attempt_id: Uuid, snapshot: ConfigSnapshot) {
        let mut attempts = self.attempts.write().unwrap_or_else(PoisonError::into_inner);
        attempts
            .entry((service_id.to_string(), attempt_id))
            .or_default()
            .entry(snapshot.device.clone())
            .or_insert(snapshot);
    }

    pub fn get(&self, service_id: &str, attempt_id: Uuid, device: &str) -> Option<ConfigSnapshot> {
        let attempts = self.attempts.read().unwrap_or_else(PoisonError::into_inner);
        attempts
            .get(&(service_id.to_string(), attempt_id))
            .and_then(|devices| devices.get(device))
            .cloned()
    }

    pub fn snapshots(&self, service_id: &str, attempt_id: Uuid) -> Vec<ConfigSnapshot> {
        let attempts = self.attempts.read().unwrap_or_else(PoisonError::into_inner);
        attempts
            .get(&(service_id.to_string(), attempt_id))
            .map(|devices| devices.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop an attempt's snapshots and return them.
    pub fn take(&self, service_id: &str, attempt_id: Uuid) -> Vec<ConfigSnapshot> {
        let mut attempts = self.attempts.write().unwrap_or_else(PoisonError::into_inner);
        attempts
            .remove(&(service_id.to_string(), attempt_id))
            .map(|devices| devices.into_values().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aurora_core::SnapshotSource;

    fn snapshot(device: &str, config: &str) -> ConfigSnapshot {
        ConfigSnapshot {
            device: device.to_string(),
            config: config.to_string(),
            source: SnapshotSource::Readback,
            captured_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn attempts_are_isolated() {
        let store = SnapshotStore::new();
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
        store.save("svc", first, snapshot("PE1", "before first"));
        store.save("svc", second, snapshot("PE1", "before second"));

        assert_eq!(store.get("svc", first, "PE1").unwrap().config, "before first");
        assert_eq!(store.get("svc", second, "PE1").unwrap().config, "before second");
        assert!(store.get("other", first, "PE1").is_none());
    }

    #[test]
    fn first_snapshot_wins() {
        let store = SnapshotStore::new();
        let attempt = Uuid::new_v4();
        store.save("svc", attempt, snapshot("PE1", "original"));
        store.save("svc", attempt, snapshot("PE1", "after apply"));
        assert_eq!(store.get("svc", attempt, "PE1").unwrap().config, "original");

        assert_eq!(store.take("svc", attempt).len(), 1);
        assert!(store.snapshots("svc", attempt).is_empty());
    }
}
