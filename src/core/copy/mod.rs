//! Synchronized copy into existing projects
//!
//! - [`orchestrator`] - the copy/poll/move/verify/cleanup workflow
//! - [`duplicates`] - destination snapshot and `_NNN` subject renames
//! - [`report`] - per-copy outcome

pub mod duplicates;
pub mod orchestrator;
pub mod report;

pub use duplicates::DestinationIndex;
pub use orchestrator::CopyOrchestrator;
pub use report::{MissingItem, MoveFailure, SubjectRename, SyncReport};
