//! Run driver
//!
//! - [`context`] - collaborators and settings passed to every component
//! - [`coordinator`] - the sync, manual-match and status entry points
//! - [`summary`] - run summary and error classification

pub mod context;
pub mod coordinator;
pub mod summary;

pub use context::{RunClock, SyncContext};
pub use coordinator::{
    pi_project_label, ManualMatchRow, SessionStatus, SyncCoordinator, SyncOptions,
};
pub use summary::{RunError, RunErrorType, RunSummary, Severity};
