//! Operator approval of held deployments.
//!
//! An attempt that validation leaves at HIGH risk, or whose caller did not ask for
//! automatic deployment, parks in AWAITING_APPROVAL. The manager keeps it until an
//! operator decides or its TTL runs out.
//!
//! ## Approval Flow
//!
//! 1. `process` stops at AWAITING_APPROVAL and returns the approval ID
//! 2. An operator reviews the response (risk, payloads, blast radius)
//! 3. `approve` resumes deployment; `reject` ends the attempt as FAILED
//!
//! CRITICAL assessments can only be rejected.

use aurora_core::{IntentResponse, NormalizedIntent, RiskLevel};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;
use uuid::Uuid;

/// Upper bound for configured TTLs, keeps expiry arithmetic in range.
const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 3600;

/// How long decided and expired requests stay readable before cleanup drops them.
const DEFAULT_RETENTION_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApprovalError {
    #[error("approval '{0}' not found")]
    NotFound(String),

    #[error("approval '{0}' has expired")]
    Expired(String),

    #[error("approval '{id}' was already {status:?}")]
    AlreadyDecided { id: String, status: ApprovalStatus },

    #[error("approval '{0}' carries CRITICAL risk and cannot be approved")]
    CriticalRisk(String),
}

/// A held deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub service_id: String,
    pub attempt_id: Uuid,
    pub risk_level: RiskLevel,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<String>,
    pub reason: Option<String>,
    /// The response as it stood when the attempt was held.
    pub response: IntentResponse,
    /// The intent narrowed to the devices that will be deployed.
    pub intent: NormalizedIntent,
}

impl ApprovalRequest {
    pub fn new(response: IntentResponse, intent: NormalizedIntent, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            service_id: intent.service_id.clone(),
            attempt_id: response.attempt_id,
            risk_level: response.risk_assessment.risk_level,
            status: ApprovalStatus::Pending,
            created_at: now,
            expires_at: now + ttl,
            decided_at: None,
            decided_by: None,
            reason: None,
            response,
            intent,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending && !self.is_expired()
    }

    /// When the request stopped being actionable, if it has.
    fn settled_at(&self) -> Option<DateTime<Utc>> {
        if self.is_pending() {
            return None;
        }
        Some(self.decided_at.unwrap_or(self.expires_at))
    }

    fn decide(&mut self, status: ApprovalStatus, by: &str, reason: Option<String>) {
        self.status = status;
        self.decided_at = Some(Utc::now());
        self.decided_by = Some(by.to_string());
        self.reason = reason;
    }

    fn expire(&mut self) {
        self.status = ApprovalStatus::Expired;
        self.decided_at = Some(Utc::now());
    }
}

/// In-memory store of held deployments.
pub struct ApprovalManager {
    requests: RwLock<HashMap<String, ApprovalRequest>>,
    ttl: Duration,
    retention: Duration,
}

impl ApprovalManager {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            requests: RwLock::new(HashMap::new()),
            ttl: Duration::seconds(ttl_secs.min(MAX_TTL_SECS) as i64),
            retention: Duration::hours(DEFAULT_RETENTION_HOURS),
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Drop requests that were decided or expired more than `max_age` ago.
    /// Pending requests are always kept.
    pub fn cleanup(&self, max_age: Duration) {
        let cutoff = Utc::now() - max_age;
        let mut requests = self.requests.write().unwrap_or_else(PoisonError::into_inner);
        let before = requests.len();
        requests.retain(|_, r| r.settled_at().is_none_or(|at| at > cutoff));
        let removed = before - requests.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = requests.len(), "Cleaned up settled approvals");
        }
    }

    /// Hold a validated attempt for review.
    pub fn create(&self, response: IntentResponse, intent: NormalizedIntent) -> ApprovalRequest {
        self.cleanup(self.retention);
        let request = ApprovalRequest::new(response, intent, self.ttl);
        tracing::info!(
            approval_id = %request.id,
            service_id = %request.service_id,
            risk_level = %request.risk_level,
            expires_at = %request.expires_at,
            "Deployment awaiting approval"
        );
        self.requests
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(request.id.clone(), request.clone());
        request
    }

    pub fn get(&self, id: &str) -> Option<ApprovalRequest> {
        let mut requests = self.requests.write().unwrap_or_else(PoisonError::into_inner);
        let request = requests.get_mut(id)?;
        if request.status == ApprovalStatus::Pending && request.is_expired() {
            request.expire();
        }
        Some(request.clone())
    }

    /// Pending requests, oldest first. Requests past their TTL are marked expired.
    pub fn list_pending(&self) -> Vec<ApprovalRequest> {
        self.cleanup(self.retention);
        let mut requests = self.requests.write().unwrap_or_else(PoisonError::into_inner);
        for request in requests.values_mut() {
            if request.status == ApprovalStatus::Pending && request.is_expired() {
                request.expire();
            }
        }
        let mut pending: Vec<ApprovalRequest> = requests
            .values()
            .filter(|r| r.status == ApprovalStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.created_at);
        pending
    }

    pub fn approve(
        &self,
        id: &str,
        by: &str,
        reason: Option<String>,
    ) -> Result<ApprovalRequest, ApprovalError> {
        self.decide(id, ApprovalStatus::Approved, by, reason)
    }

    pub fn reject(
        &self,
        id: &str,
        by: &str,
        reason: Option<String>,
    ) -> Result<ApprovalRequest, ApprovalError> {
        self.decide(id, ApprovalStatus::Rejected, by, reason)
    }

    fn decide(
        &self,
        id: &str,
        status: ApprovalStatus,
        by: &str,
        reason: Option<String>,
    ) -> Result<ApprovalRequest, ApprovalError> {
        let mut requests = self.requests.write().unwrap_or_else(PoisonError::into_inner);
        let request = requests
            .get_mut(id)
            .ok_or_else(|| ApprovalError::NotFound(id.to_string()))?;

        if request.status == ApprovalStatus::Pending && request.is_expired() {
            request.expire();
        }
        match request.status {
            ApprovalStatus::Pending => {}
            ApprovalStatus::Expired => return Err(ApprovalError::Expired(id.to_string())),
            decided => {
                return Err(ApprovalError::AlreadyDecided {
                    id: id.to_string(),
                    status: decided,
                });
            }
        }
        if status == ApprovalStatus::Approved
            && (request.risk_level == RiskLevel::Critical || request.response.risk_assessment.blocked)
        {
            return Err(ApprovalError::CriticalRisk(id.to_string()));
        }

        request.decide(status, by, reason);
        tracing::info!(
            approval_id = %id,
            service_id = %request.service_id,
            status = ?status,
            by,
            "Approval decided"
        );
        Ok(request.clone())
    }
}
