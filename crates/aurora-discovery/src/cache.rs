//! Capability cache shared by concurrent requests.
//!
//! Readers take a cheap snapshot (`Arc` clone) and never wait on a writer for longer than
//! the pointer swap. Writers copy the map, update their key and publish the new map; the
//! last writer for a device wins.

use aurora_core::CapabilitySet;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CacheEntry {
    capabilities: CapabilitySet,
    revision: u64,
    stored_at: Instant,
}

#[derive(Debug)]
pub struct CapabilityCache {
    ttl: Duration,
    entries: RwLock<Arc<HashMap<String, CacheEntry>>>,
}

impl CapabilityCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    fn snapshot(&self) -> Arc<HashMap<String, CacheEntry>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Fresh capabilities for `device`, or `None` if absent, expired, or recorded under a
    /// different schema revision.
    pub fn get(&self, device: &str, revision: u64) -> Option<CapabilitySet> {
        let snapshot = self.snapshot();
        let entry = snapshot.get(device)?;
        if entry.revision != revision || entry.stored_at.elapsed() >= self.ttl {
            return None;
        }
        Some(entry.capabilities.clone())
    }

    /// Store fresh capabilities. Entries that expired or belong to another schema revision
    /// are dropped from the published map at the same time.
    pub fn insert(&self, device: &str, capabilities: CapabilitySet, revision: u64) {
        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut next: HashMap<String, CacheEntry> = guard
            .iter()
            .filter(|(_, e)| e.revision == revision && e.stored_at.elapsed() < self.ttl)
            .map(|(k, e)| (k.clone(), e.clone()))
            .collect();
        next.insert(
            device.to_string(),
            CacheEntry {
                capabilities,
                revision,
                stored_at: Instant::now(),
            },
        );
        *guard = Arc::new(next);
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aurora_core::{TemplateCatalog, Vendor};

    fn caps() -> CapabilitySet {
        TemplateCatalog::default_capabilities(Vendor::Juniper, "21.4R1")
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = CapabilityCache::new(Duration::from_secs(60));
        cache.insert("PE1", caps(), 1);
        assert!(cache.get("PE1", 1).is_some());

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.get("PE1", 1).is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("PE1", 1).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn insert_prunes_expired_and_outdated_entries() {
        let cache = CapabilityCache::new(Duration::from_secs(60));
        cache.insert("PE1", caps(), 1);
        tokio::time::advance(Duration::from_secs(61)).await;

        cache.insert("PE2", caps(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("PE2", 1).is_some());

        cache.insert("PE3", caps(), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("PE3", 2).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn revision_change_invalidates() {
        let cache = CapabilityCache::new(Duration::from_secs(60));
        cache.insert("PE1", caps(), 1);
        assert!(cache.get("PE1", 2).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn last_writer_wins() {
        let cache = CapabilityCache::new(Duration::from_secs(60));
        let mut older = caps();
        older.os_version = "20.1".to_string();
        cache.insert("PE1", older, 1);
        cache.insert("PE1", caps(), 1);
        assert_eq!(cache.get("PE1", 1).unwrap().os_version, "21.4R1");
        assert_eq!(cache.len(), 1);
    }
}
