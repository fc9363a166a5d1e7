//! # aurora-runtime
//!
//! Runs intents end to end: the processing state machine, operator approvals,
//! per-attempt rollback snapshots and the device channels payloads travel over.
//!
//! ## Example
//!
//! ```ignore
//! use aurora_runtime::{ChannelRegistry, IntentProcessor, LabNetwork};
//!
//! let lab = Arc::new(LabNetwork::from_file("lab.yaml")?);
//! let processor = IntentProcessor::new(&config, lab.clone(), ChannelRegistry::uniform(lab))?;
//! let response = processor.process(text, &inventory, true).await;
//! ```

pub mod approval;
pub mod channel;
pub mod lab;
pub mod orchestrator;
pub mod snapshot;
pub mod state;

pub use approval::{ApprovalError, ApprovalManager, ApprovalRequest, ApprovalStatus};
pub use channel::{ChannelError, ChannelRegistry, DeviceChannel, DeviceState};
pub use lab::{Faults, LabDevice, LabError, LabNetwork};
pub use orchestrator::{IntentProcessor, ProcessorError};
pub use snapshot::SnapshotStore;
pub use state::{InvalidTransition, StateMachine};

pub use tokio_util::sync::CancellationToken;
