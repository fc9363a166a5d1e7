//! History storage backends.

use async_trait::async_trait;
use aurora_core::HistoryConfig;
use aurora_core::config::HistoryBackend;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::error::HistoryError;
use crate::record::{AttemptRecord, HistoryFilter};

/// Trait for history storage backends.
#[async_trait]
pub trait HistoryStorage: Send + Sync {
    async fn store(&self, record: AttemptRecord) -> Result<(), HistoryError>;

    /// Matching records in recording order.
    async fn query(&self, filter: HistoryFilter) -> Result<Vec<AttemptRecord>, HistoryError>;

    async fn get(&self, record_id: Uuid) -> Result<Option<AttemptRecord>, HistoryError>;
}

/// Create a storage backend from configuration.
pub fn create_storage(config: &HistoryConfig) -> Result<Arc<dyn HistoryStorage>, HistoryError> {
    if !config.enabled {
        return Ok(Arc::new(NullStorage));
    }
    match config.backend {
        HistoryBackend::Memory => Ok(Arc::new(MemoryStorage::new())),
        HistoryBackend::File => Ok(Arc::new(FileStorage::open(config.file_path())?)),
    }
}

/// Keeps records in memory.
#[derive(Default)]
pub struct MemoryStorage {
    records: RwLock<Vec<AttemptRecord>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_error<E: std::fmt::Display>(e: E) -> HistoryError {
    HistoryError::Storage(format!("history lock poisoned: {}", e))
}

#[async_trait]
impl HistoryStorage for MemoryStorage {
    async fn store(&self, record: AttemptRecord) -> Result<(), HistoryError> {
        self.records.write().map_err(lock_error)?.push(record);
        Ok(())
    }

    async fn query(&self, filter: HistoryFilter) -> Result<Vec<AttemptRecord>, HistoryError> {
        let records = self.records.read().map_err(lock_error)?;
        Ok(filter.apply(records.iter()))
    }

    async fn get(&self, record_id: Uuid) -> Result<Option<AttemptRecord>, HistoryError> {
        let records = self.records.read().map_err(lock_error)?;
        Ok(records.iter().find(|r| r.record_id == record_id).cloned())
    }
}

/// Appends records to a JSON Lines file and keeps an in-memory index for queries.
pub struct FileStorage {
    path: PathBuf,
    records: RwLock<Vec<AttemptRecord>>,
}

impl FileStorage {
    /// Open (or create) the file, loading any records already in it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, HistoryError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut records = Vec::new();
        if path.exists() {
            let reader = BufReader::new(std::fs::File::open(&path)?);
            for (index, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<AttemptRecord>(&line) {
                    Ok(record) => records.push(record),
                    Err(e) => tracing::warn!(
                        path = %path.display(),
                        line = index + 1,
                        error = %e,
                        "Skipping unreadable history record"
                    ),
                }
            }
        }

        tracing::debug!(path = %path.display(), records = records.len(), "History file opened");
        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HistoryStorage for FileStorage {
    async fn store(&self, record: AttemptRecord) -> Result<(), HistoryError> {
        let json = serde_json::to_string(&record)?;
        let mut records = self.records.write().map_err(lock_error)?;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", json)?;

        records.push(record);
        Ok(())
    }

    async fn query(&self, filter: HistoryFilter) -> Result<Vec<AttemptRecord>, HistoryError> {
        let records = self.records.read().map_err(lock_error)?;
        Ok(filter.apply(records.iter()))
    }

    async fn get(&self, record_id: Uuid) -> Result<Option<AttemptRecord>, HistoryError> {
        let records = self.records.read().map_err(lock_error)?;
        Ok(records.iter().find(|r| r.record_id == record_id).cloned())
    }
}

/// Drops every record.
pub struct NullStorage;

#[async_trait]
impl HistoryStorage for NullStorage {
    async fn store(&self, _record: AttemptRecord) -> Result<(), HistoryError> {
        Ok(())
    }

    async fn query(&self, _filter: HistoryFilter) -> Result<Vec<AttemptRecord>, HistoryError> {
        Ok(Vec::new())
    }

    async fn get(&self, _record_id: Uuid) -> Result<Option<AttemptRecord>, HistoryError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aurora_core::{IntentResponse, PipelineState};

    fn record(service: &str, state: PipelineState) -> AttemptRecord {
        let mut response = IntentResponse::new("test intent");
        response.service_id = Some(service.to_string());
        response.deployment_status.state = state;
        AttemptRecord::new(response, Vec::new())
    }

    #[tokio::test]
    async fn file_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.jsonl");

        let first = record("svc-a", PipelineState::Deployed);
        {
            let storage = FileStorage::open(&path).unwrap();
            storage.store(first.clone()).await.unwrap();
            storage.store(record("svc-b", PipelineState::Failed)).await.unwrap();
        }

        let reopened = FileStorage::open(&path).unwrap();
        let all = reopened.query(HistoryFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0], first);
        assert_eq!(reopened.get(first.record_id).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn unreadable_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let good = serde_json::to_string(&record("svc-a", PipelineState::Deployed)).unwrap();
        std::fs::write(&path, format!("{}\n{{not json\n\n", good)).unwrap();

        let storage = FileStorage::open(&path).unwrap();
        assert_eq!(storage.query(HistoryFilter::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn query_filters_and_pages() {
        let storage = MemoryStorage::new();
        for state in [
            PipelineState::Failed,
            PipelineState::RolledBack,
            PipelineState::Deployed,
        ] {
            storage.store(record("svc-a", state)).await.unwrap();
        }
        storage.store(record("svc-b", PipelineState::Deployed)).await.unwrap();

        let deployed = storage
            .query(HistoryFilter {
                state: Some(PipelineState::Deployed),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(deployed.len(), 2);

        let paged = storage
            .query(HistoryFilter {
                offset: Some(1),
                limit: Some(1),
                ..HistoryFilter::for_service("svc-a")
            })
            .await
            .unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].state, PipelineState::RolledBack);

        let future = storage
            .query(HistoryFilter {
                since: Some(chrono::Utc::now() + chrono::Duration::hours(1)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(future.is_empty());
    }

    #[tokio::test]
    async fn disabled_config_drops_records() {
        let config = HistoryConfig {
            enabled: false,
            ..Default::default()
        };
        let storage = create_storage(&config).unwrap();
        storage.store(record("svc-a", PipelineState::Deployed)).await.unwrap();
        assert!(storage.query(HistoryFilter::default()).await.unwrap().is_empty());
    }
}
