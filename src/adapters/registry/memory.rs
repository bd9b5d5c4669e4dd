//! In-memory consent registry

use super::traits::ConsentRegistry;
use crate::domain::consent::{ConsentRecord, ImportResponse};
use crate::domain::{RegistryError, Result};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct State {
    records: Vec<ConsentRecord>,
    imports: Vec<Vec<ConsentRecord>>,
    forced_count: Option<usize>,
    unavailable: bool,
}

/// In-memory registry that upserts by participant ID
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    state: Mutex<State>,
}

impl MemoryRegistry {
    pub fn new(records: Vec<ConsentRecord>) -> Self {
        Self {
            state: Mutex::new(State {
                records,
                ..State::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Makes every later import report `count` regardless of what was stored
    pub fn force_import_count(&self, count: usize) {
        self.lock().forced_count = Some(count);
    }

    /// Makes every request fail with a connection error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    pub fn records(&self) -> Vec<ConsentRecord> {
        self.lock().records.clone()
    }

    pub fn record(&self, participant_id: &str) -> Option<ConsentRecord> {
        self.lock()
            .records
            .iter()
            .find(|r| r.participant_id() == participant_id)
            .cloned()
    }

    /// Batches received by `import_records`, in order
    pub fn imports(&self) -> Vec<Vec<ConsentRecord>> {
        self.lock().imports.clone()
    }
}

#[async_trait]
impl ConsentRegistry for MemoryRegistry {
    async fn export_records(&self) -> Result<Vec<ConsentRecord>> {
        let state = self.lock();
        if state.unavailable {
            return Err(RegistryError::ConnectionFailed("registry unavailable".to_string()).into());
        }
        Ok(state.records.clone())
    }

    async fn import_records(&self, records: &[ConsentRecord]) -> Result<ImportResponse> {
        let mut state = self.lock();
        if state.unavailable {
            return Err(RegistryError::ConnectionFailed("registry unavailable".to_string()).into());
        }
        state.imports.push(records.to_vec());

        if let Some(count) = state.forced_count {
            return Ok(ImportResponse { count });
        }

        for record in records {
            let existing = state
                .records
                .iter()
                .position(|r| r.participant_id() == record.participant_id());
            match existing {
                Some(idx) => state.records[idx] = record.clone(),
                None => state.records.push(record.clone()),
            }
        }
        Ok(ImportResponse {
            count: records.len(),
        })
    }
}
