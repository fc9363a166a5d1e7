//! The intent processor: drives one attempt through the state machine.
//!
//! ```text
//! RECEIVED → NORMALIZED → DISCOVERED → MAPPED → GENERATED → VALIDATED
//!     → AWAITING_APPROVAL | DEPLOYING → DEPLOYED | ROLLED_BACK | FAILED
//! ```
//!
//! Errors never leave this module: every entry point returns a complete
//! [`IntentResponse`] with the state reached and a structured error report.

use aurora_core::{
    AuroraConfig, ConfigPayload, ConfigSnapshot, DeploymentConfig, DeviceOutcome, Inventory,
    IntentResponse, NormalizedIntent, PipelineError, PipelineState, RiskLevel, SchemaStore,
    SnapshotSource,
};
use aurora_discovery::{CapabilityCache, ModelDiscovery};
use aurora_history::{DeploymentHistory, HistoryError};
use aurora_intent::{ExtractError, Extractor, IntentNormalizer, build_extractor};
use aurora_render::{ConfigGenerator, PathMapper};
use aurora_validation::{
    Assessment, AssessmentRequest, CategoricalScorer, FindingKind, RiskScorer, ValidationEngine,
    commit_plan, verification_plan,
};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::approval::{ApprovalError, ApprovalManager, ApprovalRequest};
use crate::channel::{ChannelError, ChannelRegistry};
use crate::snapshot::SnapshotStore;
use crate::state::StateMachine;

/// Errors building a processor. Processing itself never fails.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("extractor setup failed: {0}")]
    Extractor(#[from] ExtractError),

    #[error("history setup failed: {0}")]
    History(#[from] HistoryError),

    #[error("invalid template placeholder pattern: {0}")]
    Template(String),
}

/// One attempt in flight: the response being built and the machine driving it.
struct Attempt {
    response: IntentResponse,
    machine: StateMachine,
}

impl Attempt {
    fn new(text: &str) -> Self {
        Self {
            response: IntentResponse::new(text),
            machine: StateMachine::new(),
        }
    }

    fn resume(response: IntentResponse) -> Self {
        let machine = StateMachine::resume(response.transitions.clone());
        Self { response, machine }
    }

    fn advance(&mut self, next: PipelineState) {
        if let Err(e) = self.machine.advance(next) {
            tracing::error!(attempt_id = %self.response.attempt_id, error = %e, "Rejected state change");
        }
        self.sync();
    }

    /// Record `error` against the stage being entered and stop as FAILED.
    fn fail(&mut self, error: &PipelineError) {
        let stage = self.machine.next_stage();
        tracing::warn!(
            attempt_id = %self.response.attempt_id,
            stage = %stage,
            kind = %error.kind(),
            error = %error,
            "Intent processing failed"
        );
        self.response.deployment_status.error = Some(error.report(stage));
        self.advance(PipelineState::Failed);
    }

    fn sync(&mut self) {
        let status = &mut self.response.deployment_status;
        status.state = self.machine.state();
        status.stage_reached = self.machine.stage_reached();
        self.response.transitions = self.machine.transitions().to_vec();
    }
}

/// Output of the stages before the deployment decision.
struct Prepared {
    /// The intent limited to the devices that will be configured.
    intent: NormalizedIntent,
    assessment: Assessment,
}

/// Why one device did not end up confirmed.
struct DeviceFailure {
    /// The device acknowledged the apply.
    acknowledged: bool,
    /// The device may have changed without acknowledging it.
    in_doubt: bool,
    cause: String,
}

impl DeviceFailure {
    fn after_ack(cause: String) -> Self {
        Self {
            acknowledged: true,
            in_doubt: false,
            cause,
        }
    }

    fn touched(&self) -> bool {
        self.acknowledged || self.in_doubt
    }
}

/// Turns intent text into deployed configuration.
///
/// Holds only shared read-mostly state (schema store, capability cache, channels), so
/// one processor serves concurrent requests.
pub struct IntentProcessor {
    extractor: Arc<dyn Extractor>,
    normalizer: IntentNormalizer,
    discovery: ModelDiscovery,
    mapper: PathMapper,
    generator: ConfigGenerator,
    validation: ValidationEngine,
    channels: ChannelRegistry,
    snapshots: SnapshotStore,
    approvals: ApprovalManager,
    history: DeploymentHistory,
    deployment: DeploymentConfig,
}

impl IntentProcessor {
    pub fn new(
        config: &AuroraConfig,
        schema: Arc<dyn SchemaStore>,
        channels: ChannelRegistry,
    ) -> Result<Self, ProcessorError> {
        let cache = Arc::new(CapabilityCache::new(config.discovery.cache_ttl()));
        let generator = ConfigGenerator::new(&config.generation)
            .map_err(|e| ProcessorError::Template(e.to_string()))?;

        Ok(Self {
            extractor: build_extractor(&config.extraction, None)?,
            normalizer: IntentNormalizer::new(),
            discovery: ModelDiscovery::new(schema.clone(), cache, config.discovery.clone()),
            mapper: PathMapper::new(schema),
            generator,
            validation: ValidationEngine::new(Arc::new(CategoricalScorer)),
            channels,
            snapshots: SnapshotStore::new(),
            approvals: ApprovalManager::new(config.deployment.approval_ttl_secs),
            history: DeploymentHistory::new(&config.history)?,
            deployment: config.deployment.clone(),
        })
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn RiskScorer>) -> Self {
        self.validation = ValidationEngine::new(scorer);
        self
    }

    pub fn with_history(mut self, history: DeploymentHistory) -> Self {
        self.history = history;
        self
    }

    pub fn history(&self) -> &DeploymentHistory {
        &self.history
    }

    pub fn pending_approvals(&self) -> Vec<ApprovalRequest> {
        self.approvals.list_pending()
    }

    /// Process one intent. Each call is a new attempt; nothing is resumed.
    pub async fn process(
        &self,
        text: &str,
        inventory: &dyn Inventory,
        approve_deployment: bool,
    ) -> IntentResponse {
        self.process_with_cancel(text, inventory, approve_deployment, &CancellationToken::new())
            .await
    }

    /// Process one intent, stopping when `cancel` fires.
    ///
    /// Before DEPLOYING a cancellation leaves no trace on any device. During DEPLOYING the
    /// device in progress finishes its apply and confirmation, then every touched device
    /// is rolled back.
    pub async fn process_with_cancel(
        &self,
        text: &str,
        inventory: &dyn Inventory,
        approve_deployment: bool,
        cancel: &CancellationToken,
    ) -> IntentResponse {
        let mut attempt = Attempt::new(text);
        tracing::info!(
            attempt_id = %attempt.response.attempt_id,
            provider = self.extractor.name(),
            approve = approve_deployment,
            "Processing intent"
        );

        let prepared = match self.prepare(text, inventory, cancel, &mut attempt).await {
            Ok(prepared) => prepared,
            Err(error) => {
                attempt
                    .response
                    .risk_assessment
                    .record(RiskLevel::High, "processing error: manual review required");
                attempt.fail(&error);
                return self.conclude(attempt).await;
            }
        };

        if prepared.assessment.is_blocked() {
            let finding = prepared.assessment.findings.iter().find(|f| {
                matches!(f.kind, FindingKind::Malformed | FindingKind::ChecksumMismatch)
            });
            attempt.fail(&PipelineError::PayloadMalformed {
                device: finding.and_then(|f| f.device.clone()).unwrap_or_default(),
                cause: finding
                    .map(|f| f.message.clone())
                    .unwrap_or_else(|| "deployment blocked by validation".to_string()),
            });
            return self.conclude(attempt).await;
        }

        if attempt.response.risk_assessment.requires_human_approval() || !approve_deployment {
            attempt.advance(PipelineState::AwaitingApproval);
            let request = self.approvals.create(attempt.response.clone(), prepared.intent);
            attempt.response.deployment_status.approval_id = Some(request.id);
            return self.conclude(attempt).await;
        }

        if cancel.is_cancelled() {
            attempt.fail(&PipelineError::Cancelled);
            return self.conclude(attempt).await;
        }

        self.deploy(&mut attempt, &prepared.intent, inventory, cancel).await;
        self.conclude(attempt).await
    }

    /// Approve a held attempt and deploy it.
    pub async fn approve(
        &self,
        approval_id: &str,
        approved_by: &str,
        inventory: &dyn Inventory,
    ) -> Result<IntentResponse, ApprovalError> {
        let request = self.approvals.approve(approval_id, approved_by, None)?;
        let mut attempt = Attempt::resume(request.response);
        attempt.response.deployment_status.approval_id = Some(request.id);

        self.deploy(&mut attempt, &request.intent, inventory, &CancellationToken::new())
            .await;
        Ok(self.conclude(attempt).await)
    }

    /// Reject a held attempt; it ends as FAILED.
    pub async fn reject(
        &self,
        approval_id: &str,
        rejected_by: &str,
        reason: Option<String>,
    ) -> Result<IntentResponse, ApprovalError> {
        let request = self.approvals.reject(approval_id, rejected_by, reason.clone())?;
        let mut attempt = Attempt::resume(request.response);
        attempt.response.deployment_status.approval_id = Some(request.id);

        attempt.fail(&PipelineError::ApprovalRejected {
            by: rejected_by.to_string(),
            reason: reason.unwrap_or_else(|| "no reason given".to_string()),
        });
        Ok(self.conclude(attempt).await)
    }

    // -------------------------------------------------------------------------
    // Stages up to VALIDATED
    // -------------------------------------------------------------------------

    async fn prepare(
        &self,
        text: &str,
        inventory: &dyn Inventory,
        cancel: &CancellationToken,
        attempt: &mut Attempt,
    ) -> Result<Prepared, PipelineError> {
        ensure_live(cancel)?;
        let raw = self
            .extractor
            .extract(text)
            .await
            .map_err(|e| PipelineError::ExtractionFailed(e.to_string()))?;
        let intent = self.normalizer.normalize(&raw, inventory)?;
        attempt.response.service_id = Some(intent.service_id.clone());
        attempt.response.normalized_intent = Some(intent.clone());
        attempt.advance(PipelineState::Normalized);

        ensure_live(cancel)?;
        let discovery = self.discovery.discover(&intent, inventory).await?;
        attempt.response.model_discovery = discovery.clone();
        let reachable: BTreeSet<String> = discovery
            .iter()
            .filter(|d| d.reachable)
            .map(|d| d.device.clone())
            .collect();
        let effective = intent.restricted_to(&reachable);
        if effective.endpoints.len() < intent.service_type.min_endpoints() {
            let lost = discovery
                .iter()
                .find(|d| !d.reachable && intent.endpoint_devices().contains(d.device.as_str()));
            return Err(PipelineError::DeviceUnreachable {
                device: lost.map(|d| d.device.clone()).unwrap_or_default(),
                cause: format!(
                    "{} of {} endpoints reachable, {} needs {}",
                    effective.endpoints.len(),
                    intent.endpoints.len(),
                    intent.service_type,
                    intent.service_type.min_endpoints()
                ),
            });
        }
        attempt.advance(PipelineState::Discovered);

        ensure_live(cancel)?;
        let mapping = self.mapper.map(&effective, &discovery, inventory)?;
        attempt.response.mapping_table = mapping.selections.clone();
        attempt.response.deployment_status.skipped_devices =
            mapping.skipped.iter().map(|s| s.device.clone()).collect();
        attempt.advance(PipelineState::Mapped);

        ensure_live(cancel)?;
        attempt.response.configuration_payloads =
            self.generator.generate_all(&mapping.selections, &effective)?;
        attempt.advance(PipelineState::Generated);

        ensure_live(cancel)?;
        let request = AssessmentRequest {
            intent: &effective,
            discovery: &discovery,
            selections: &mapping.selections,
            payloads: &attempt.response.configuration_payloads,
            skipped: &attempt.response.deployment_status.skipped_devices,
        };
        let assessment = self.validation.validate(&request, inventory);
        attempt.response.risk_assessment = assessment.risk.clone();
        attempt.response.verification_plan = Some(verification_plan(&effective));
        attempt.response.commit_plan = Some(commit_plan(
            &mapping.selections,
            &discovery,
            self.deployment.rollback_timeout_secs,
        ));
        attempt.advance(PipelineState::Validated);

        Ok(Prepared {
            intent: effective,
            assessment,
        })
    }

    // -------------------------------------------------------------------------
    // DEPLOYING
    // -------------------------------------------------------------------------

    async fn deploy(
        &self,
        attempt: &mut Attempt,
        intent: &NormalizedIntent,
        inventory: &dyn Inventory,
        cancel: &CancellationToken,
    ) {
        attempt.advance(PipelineState::Deploying);
        let service_id = intent.service_id.as_str();
        let attempt_id = attempt.response.attempt_id;
        let payloads = attempt.response.configuration_payloads.clone();

        if let Some(drifted) = payloads.iter().find(|p| !p.checksum_matches()) {
            attempt.fail(&PipelineError::PayloadMalformed {
                device: drifted.device().to_string(),
                cause: "body no longer matches the checksum taken at generation".to_string(),
            });
            return;
        }

        for payload in &payloads {
            match self.capture_snapshot(service_id, payload, inventory).await {
                Ok(snapshot) => self.snapshots.save(service_id, attempt_id, snapshot),
                Err(e) => {
                    attempt.fail(&e);
                    return;
                }
            }
        }

        let mut touched: Vec<&ConfigPayload> = Vec::new();
        let mut failure = None;
        for payload in &payloads {
            if cancel.is_cancelled() {
                failure = Some(PipelineError::Cancelled);
                break;
            }

            let device = payload.device();
            let mut outcome = DeviceOutcome {
                device: device.to_string(),
                ..Default::default()
            };
            match self.apply_and_confirm(payload).await {
                Ok(()) => {
                    outcome.applied = true;
                    outcome.confirmed = true;
                    touched.push(payload);
                    tracing::info!(service_id, device, "Payload applied and confirmed");
                }
                Err(device_failure) => {
                    outcome.applied = device_failure.acknowledged;
                    outcome.error = Some(device_failure.cause.clone());
                    if device_failure.touched() {
                        touched.push(payload);
                    }
                    failure = Some(PipelineError::ApplyFailure {
                        device: device.to_string(),
                        cause: device_failure.cause,
                    });
                }
            }
            attempt.response.deployment_status.devices.push(outcome);
            if failure.is_some() {
                break;
            }
        }

        match failure {
            None => attempt.advance(PipelineState::Deployed),
            Some(error) => self.roll_back(attempt, service_id, &touched, error).await,
        }
    }

    /// Pre-change configuration: live readback, then the inventory record, then the
    /// latest history record for the service.
    async fn capture_snapshot(
        &self,
        service_id: &str,
        payload: &ConfigPayload,
        inventory: &dyn Inventory,
    ) -> Result<ConfigSnapshot, PipelineError> {
        let device = payload.device();
        let snapshot = |config: String, source| ConfigSnapshot {
            device: device.to_string(),
            config,
            source,
            captured_at: chrono::Utc::now(),
        };

        let readback = match self.channels.get(payload.transport()) {
            Ok(channel) => {
                bounded(
                    self.deployment.readback_timeout(),
                    device,
                    "readback",
                    channel.readback(device),
                )
                .await
            }
            Err(e) => Err(e),
        };
        match readback {
            Ok(state) => return Ok(snapshot(state.config, SnapshotSource::Readback)),
            Err(e) => tracing::warn!(device, error = %e, "Readback before apply failed"),
        }

        if let Some(config) = inventory
            .lookup(device)
            .ok()
            .and_then(|record| record.prior_config_snapshot)
        {
            return Ok(snapshot(config, SnapshotSource::Inventory));
        }

        match self.history.latest_snapshot(service_id, device).await {
            Ok(Some(previous)) => return Ok(snapshot(previous.config, SnapshotSource::History)),
            Ok(None) => {}
            Err(e) => tracing::warn!(device, error = %e, "History lookup failed"),
        }

        Err(PipelineError::SnapshotUnavailable {
            device: device.to_string(),
        })
    }

    async fn apply_and_confirm(&self, payload: &ConfigPayload) -> Result<(), DeviceFailure> {
        let device = payload.device();
        let channel = self.channels.get(payload.transport()).map_err(|e| DeviceFailure {
            acknowledged: false,
            in_doubt: false,
            cause: e.to_string(),
        })?;

        bounded(self.deployment.apply_timeout(), device, "apply", channel.apply(payload))
            .await
            .map_err(|e| DeviceFailure {
                acknowledged: false,
                in_doubt: e.may_have_changed(),
                cause: e.to_string(),
            })?;

        let state = bounded(
            self.deployment.readback_timeout(),
            device,
            "readback",
            channel.readback(device),
        )
        .await
        .map_err(|e| DeviceFailure::after_ack(format!("confirmation readback failed: {}", e)))?;

        if state.checksum.as_deref() != Some(payload.checksum()) {
            return Err(DeviceFailure::after_ack(format!(
                "readback reports checksum {} but {} was applied",
                state.checksum.as_deref().unwrap_or("none"),
                payload.checksum()
            )));
        }
        Ok(())
    }

    /// Restore touched devices in reverse order. Every device is attempted even after a
    /// restore fails.
    async fn roll_back(
        &self,
        attempt: &mut Attempt,
        service_id: &str,
        touched: &[&ConfigPayload],
        failure: PipelineError,
    ) {
        let attempt_id = attempt.response.attempt_id;
        tracing::warn!(
            service_id,
            error = %failure,
            devices = touched.len(),
            "Deployment failed, rolling back"
        );

        let mut stuck = Vec::new();
        let mut causes = Vec::new();
        for payload in touched.iter().rev() {
            let device = payload.device();
            let restored = match (
                self.snapshots.get(service_id, attempt_id, device),
                self.channels.get(payload.transport()),
            ) {
                (Some(snapshot), Ok(channel)) => {
                    bounded(
                        self.deployment.restore_timeout(),
                        device,
                        "restore",
                        channel.restore(&snapshot),
                    )
                    .await
                }
                (None, _) => Err(ChannelError::Rejected {
                    device: device.to_string(),
                    message: "no snapshot captured".to_string(),
                }),
                (_, Err(e)) => Err(e),
            };

            match restored {
                Ok(()) => {
                    if let Some(outcome) = attempt
                        .response
                        .deployment_status
                        .devices
                        .iter_mut()
                        .find(|o| o.device == device)
                    {
                        outcome.rolled_back = true;
                    }
                    tracing::info!(service_id, device, "Device restored");
                }
                Err(e) => {
                    tracing::error!(service_id, device, error = %e, "Rollback failed");
                    stuck.push(device.to_string());
                    causes.push(e.to_string());
                }
            }
        }

        if stuck.is_empty() {
            let stage = attempt.machine.next_stage();
            attempt.response.deployment_status.error = Some(failure.report(stage));
            attempt.advance(PipelineState::RolledBack);
        } else {
            attempt.response.deployment_status.manual_intervention = stuck.clone();
            attempt.fail(&PipelineError::RollbackFailure {
                devices: stuck,
                cause: format!("{} (after: {})", causes.join("; "), failure),
            });
        }
    }

    /// Record the attempt and hand back its response.
    async fn conclude(&self, mut attempt: Attempt) -> IntentResponse {
        attempt.sync();
        let response = attempt.response;
        let snapshots = match &response.service_id {
            Some(service_id) => self.snapshots.take(service_id, response.attempt_id),
            None => Vec::new(),
        };
        if let Err(e) = self.history.record(&response, snapshots).await {
            tracing::warn!(attempt_id = %response.attempt_id, error = %e, "Failed to record attempt");
        }

        tracing::info!(
            attempt_id = %response.attempt_id,
            service_id = ?response.service_id,
            state = %response.state(),
            risk_level = %response.risk_assessment.risk_level,
            "Intent processed"
        );
        response
    }
}

fn ensure_live(cancel: &CancellationToken) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

/// Run a channel call with a time limit; running out of time is a [`ChannelError::Timeout`].
async fn bounded<T>(
    limit: Duration,
    device: &str,
    operation: &'static str,
    call: impl Future<Output = Result<T, ChannelError>>,
) -> Result<T, ChannelError> {
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or_else(|_| {
            Err(ChannelError::Timeout {
                device: device.to_string(),
                operation,
            })
        })
}
