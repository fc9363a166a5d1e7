//! History records and filters.

use aurora_core::{ConfigSnapshot, IntentResponse, PipelineState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One deployment attempt, as it ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub record_id: Uuid,
    pub attempt_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    /// Terminal state, or AWAITING_APPROVAL for a parked attempt.
    pub state: PipelineState,
    pub recorded_at: DateTime<Utc>,
    /// Pre-change configuration captured for rollback.
    #[serde(default)]
    pub snapshots: Vec<ConfigSnapshot>,
    pub response: IntentResponse,
}

impl AttemptRecord {
    pub fn new(response: IntentResponse, snapshots: Vec<ConfigSnapshot>) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            attempt_id: response.attempt_id,
            service_id: response.service_id.clone(),
            state: response.state(),
            recorded_at: Utc::now(),
            snapshots,
            response,
        }
    }

    pub fn snapshot_for(&self, device: &str) -> Option<&ConfigSnapshot> {
        self.snapshots.iter().find(|s| s.device == device)
    }
}

/// Filter for querying history. Results keep recording order.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub service_id: Option<String>,
    pub state: Option<PipelineState>,
    /// Recorded at or after.
    pub since: Option<DateTime<Utc>>,
    /// Recorded at or before.
    pub until: Option<DateTime<Utc>>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl HistoryFilter {
    pub fn for_service(service_id: &str) -> Self {
        Self {
            service_id: Some(service_id.to_string()),
            ..Default::default()
        }
    }

    /// Whether a record passes every criterion except paging.
    pub fn matches(&self, record: &AttemptRecord) -> bool {
        if let Some(service_id) = &self.service_id {
            if record.service_id.as_ref() != Some(service_id) {
                return false;
            }
        }
        if let Some(state) = self.state {
            if record.state != state {
                return false;
            }
        }
        if let Some(since) = self.since {
            if record.recorded_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if record.recorded_at > until {
                return false;
            }
        }
        true
    }

    /// Apply the filter and paging to records in recording order.
    pub fn apply<'a>(&self, records: impl IntoIterator<Item = &'a AttemptRecord>) -> Vec<AttemptRecord> {
        records
            .into_iter()
            .filter(|r| self.matches(r))
            .skip(self.offset.unwrap_or(0))
            .take(self.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}
