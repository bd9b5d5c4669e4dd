//! Imaging platform integration
//!
//! - [`StoragePlatform`] - the operations the engine relies on
//! - [`FlywheelClient`] - HTTP implementation
//! - [`MemoryPlatform`] - in-memory implementation for tests

pub mod flywheel;
pub mod memory;
pub mod traits;

pub use flywheel::FlywheelClient;
pub use memory::{CopyBehaviour, MemoryPlatform};
pub use traits::{
    ConflictMode, FileRef, JobRequest, ProjectCopyRequest, StoragePlatform, TagTarget,
};
