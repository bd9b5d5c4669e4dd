//! Core reconciliation and transfer logic for wbhi-sync.
//!
//! # Modules
//!
//! - [`header`] - DICOM header extraction into typed fields
//! - [`matching`] - registry snapshot and session-to-record matching
//! - [`identity`] - WBHI-ID generation and per-run uniqueness
//! - [`state`] - tag-encoded session state and retry backoff
//! - [`copy`] - synchronized copy of acquisitions between projects
//! - [`deid`] - de-identified export gating and job submission
//! - [`sync`] - run context, coordinator and summary
//!
//! # Run Workflow
//!
//! 1. **Snapshot**: export all consent records once per run
//! 2. **PI copy**: copy each site's new sessions into per-PI projects
//! 3. **Select**: keep sessions old enough, not skipped and due for a check
//! 4. **Match**: compare header fields against the snapshot
//! 5. **Identify**: reuse or generate a WBHI-ID per consent record
//! 6. **Import**: write new IDs back to the registry in one batch
//! 7. **Finalize**: rename subjects, tag sessions and move them to pre-deid
//! 8. **Export**: submit de-identification jobs for untagged sessions
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wbhi_sync::adapters::platform::FlywheelClient;
//! use wbhi_sync::adapters::registry::RedcapClient;
//! use wbhi_sync::config::load_config;
//! use wbhi_sync::core::sync::{SyncContext, SyncCoordinator, SyncOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("wbhi.toml")?;
//! let platform = Arc::new(FlywheelClient::new(&config.platform)?);
//! let registry = Arc::new(RedcapClient::new(&config.registry)?);
//!
//! let ctx = SyncContext::new(platform, registry, config);
//! let mut coordinator = SyncCoordinator::new(ctx);
//! let summary = coordinator.run(&SyncOptions::default()).await?;
//!
//! println!("Matched: {}", summary.sessions_matched);
//! println!("Deferred: {}", summary.sessions_deferred);
//! # Ok(())
//! # }
//! ```

pub mod copy;
pub mod deid;
pub mod header;
pub mod identity;
pub mod matching;
pub mod state;
pub mod sync;

#[cfg(test)]
pub(crate) mod test_support;
