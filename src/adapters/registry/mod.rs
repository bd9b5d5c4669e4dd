//! Consent registry integration
//!
//! - [`ConsentRegistry`] - export and import of consent records
//! - [`RedcapClient`] - REDCap HTTP implementation
//! - [`MemoryRegistry`] - in-memory implementation for tests

pub mod memory;
pub mod redcap;
pub mod traits;

pub use memory::MemoryRegistry;
pub use redcap::RedcapClient;
pub use traits::ConsentRegistry;
