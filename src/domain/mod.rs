//! Domain models and types for wbhi-sync.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Strongly-typed identifiers** ([`ContainerId`], [`SiteId`], [`WbhiId`])
//! - **Platform models** ([`Project`], [`Subject`], [`Session`], [`Acquisition`])
//! - **Registry models** ([`ConsentRecord`])
//! - **Header fields** ([`DicomHeaderFields`])
//! - **Tag vocabulary** ([`tags`])
//! - **Error types** ([`WbhiError`], [`PlatformError`], [`RegistryError`], [`CopyJobError`])
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, WbhiError>`]:
//!
//! ```rust
//! use wbhi_sync::domain::{WbhiError, Result};
//!
//! fn example() -> Result<()> {
//!     let config = wbhi_sync::config::load_config("wbhi.toml")?;
//!     Ok(())
//! }
//! ```

pub mod consent;
pub mod errors;
pub mod header;
pub mod ids;
pub mod result;
pub mod session;
pub mod tags;

// Re-export commonly used types for convenience
pub use consent::{ConsentRecord, ImportResponse};
pub use errors::{CopyJobError, ExtractionError, PlatformError, RegistryError, WbhiError};
pub use header::{AmPm, DicomHeaderFields};
pub use ids::{ContainerId, SiteId, WbhiId};
pub use result::Result;
pub use session::{
    first_acquisition, Acquisition, CopyStatus, FileEntry, Project, Session, Subject, ViewRow,
};
