//! External system integrations for wbhi-sync.
//!
//! - [`platform`] - imaging platform (Flywheel) access
//! - [`registry`] - consent registry (REDCap) access
//!
//! Both sides are traits so the engine can run against the in-memory
//! implementations in tests:
//!
//! ```rust
//! use std::sync::Arc;
//! use wbhi_sync::adapters::platform::{MemoryPlatform, StoragePlatform};
//! use wbhi_sync::adapters::registry::{ConsentRegistry, MemoryRegistry};
//!
//! let platform: Arc<dyn StoragePlatform> = Arc::new(MemoryPlatform::new());
//! let registry: Arc<dyn ConsentRegistry> = Arc::new(MemoryRegistry::new(Vec::new()));
//! # let _ = (platform, registry);
//! ```

pub mod platform;
pub mod registry;
