//! Consent registry abstraction

use crate::domain::consent::{ConsentRecord, ImportResponse};
use crate::domain::Result;
use async_trait::async_trait;

/// Consent registry operations used by the sync engine
///
/// Errors come back as [`crate::domain::WbhiError::Registry`].
#[async_trait]
pub trait ConsentRegistry: Send + Sync {
    /// Exports every record, in registry order
    async fn export_records(&self) -> Result<Vec<ConsentRecord>>;

    /// Imports (upserts) records by participant ID
    ///
    /// The caller decides whether the returned count is acceptable.
    async fn import_records(&self, records: &[ConsentRecord]) -> Result<ImportResponse>;
}
