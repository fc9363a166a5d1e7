//! Deployment history facade.

use aurora_core::{ConfigSnapshot, HistoryConfig, IntentResponse};
use std::sync::Arc;

use crate::error::HistoryError;
use crate::record::{AttemptRecord, HistoryFilter};
use crate::storage::{HistoryStorage, MemoryStorage, NullStorage, create_storage};

/// Records deployment attempts and answers questions about earlier ones.
pub struct DeploymentHistory {
    storage: Arc<dyn HistoryStorage>,
    echo: bool,
}

impl DeploymentHistory {
    /// Create a history from configuration.
    pub fn new(config: &HistoryConfig) -> Result<Self, HistoryError> {
        Ok(Self {
            storage: create_storage(config)?,
            echo: config.enabled && config.stdout,
        })
    }

    /// Create a history with a custom storage backend.
    pub fn with_storage(storage: Arc<dyn HistoryStorage>) -> Self {
        Self {
            storage,
            echo: false,
        }
    }

    /// In-memory history, used when nothing is configured.
    pub fn in_memory() -> Self {
        Self::with_storage(Arc::new(MemoryStorage::new()))
    }

    /// History that records nothing.
    pub fn disabled() -> Self {
        Self::with_storage(Arc::new(NullStorage))
    }

    /// Record the outcome of one attempt together with its rollback snapshots.
    pub async fn record(
        &self,
        response: &IntentResponse,
        snapshots: Vec<ConfigSnapshot>,
    ) -> Result<AttemptRecord, HistoryError> {
        let record = AttemptRecord::new(response.clone(), snapshots);

        tracing::debug!(
            attempt_id = %record.attempt_id,
            service_id = ?record.service_id,
            state = %record.state,
            risk = %response.risk_assessment.risk_level,
            "Recording deployment attempt"
        );

        if self.echo {
            println!(
                "[HISTORY] {} {} {} risk={}",
                record.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                record.service_id.as_deref().unwrap_or("-"),
                record.state,
                response.risk_assessment.risk_level,
            );
        }

        self.storage.store(record.clone()).await?;
        Ok(record)
    }

    pub async fn query(&self, filter: HistoryFilter) -> Result<Vec<AttemptRecord>, HistoryError> {
        self.storage.query(filter).await
    }

    /// The most recent attempt recorded for a service.
    pub async fn latest_for_service(
        &self,
        service_id: &str,
    ) -> Result<Option<AttemptRecord>, HistoryError> {
        let records = self.storage.query(HistoryFilter::for_service(service_id)).await?;
        Ok(records.into_iter().max_by_key(|r| r.recorded_at))
    }

    /// The most recent snapshot of a device taken by any attempt on the service.
    pub async fn latest_snapshot(
        &self,
        service_id: &str,
        device: &str,
    ) -> Result<Option<ConfigSnapshot>, HistoryError> {
        let records = self.storage.query(HistoryFilter::for_service(service_id)).await?;
        Ok(records
            .iter()
            .rev()
            .find_map(|r| r.snapshot_for(device))
            .cloned())
    }
}
