//! Session-to-consent matching
//!
//! - [`RegistrySnapshot`] - registry export indexed by site and MRI date
//! - [`MatchEngine`] - the matching predicate

pub mod engine;
pub mod snapshot;

pub use engine::MatchEngine;
pub use snapshot::RegistrySnapshot;
