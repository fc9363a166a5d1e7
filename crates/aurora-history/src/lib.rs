//! # aurora-history
//!
//! Persisted deployment attempts.
//!
//! Every processed intent leaves one [`AttemptRecord`] holding the full response and the
//! state it ended in. Records are used for audit and as the last-resort source of rollback
//! snapshots for later attempts on the same service.
//!
//! | Backend | Behaviour |
//! |---------|-----------|
//! | `memory` | Process-local, lost on exit |
//! | `file` | JSON Lines, reloaded when opened |
//! | disabled | Records are dropped |

pub mod error;
pub mod history;
pub mod record;
pub mod storage;

pub use error::HistoryError;
pub use history::DeploymentHistory;
pub use record::{AttemptRecord, HistoryFilter};
pub use storage::{FileStorage, HistoryStorage, MemoryStorage, NullStorage, create_storage};
