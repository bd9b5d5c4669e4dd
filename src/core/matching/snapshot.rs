//! Indexed registry snapshot
//!
//! The registry is exported once per run. Records are indexed by
//! `(site, mri_date)` so each session only looks at the handful of records
//! scheduled at its site on its study date.

use crate::domain::consent::{ConsentRecord, FIELD_MRI_DATE, FIELD_SITE, MRI_DATE_FORMAT};
use crate::domain::ids::WbhiId;
use chrono::NaiveDate;
use std::collections::HashMap;

/// Registry records in export order plus a `(site, mri_date)` index
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    records: Vec<ConsentRecord>,
    by_site_date: HashMap<(String, NaiveDate), Vec<usize>>,
}

impl RegistrySnapshot {
    /// Builds the snapshot; records without a parseable `mri_date` are kept
    /// but never indexed
    pub fn new(records: Vec<ConsentRecord>) -> Self {
        let mut by_site_date: HashMap<(String, NaiveDate), Vec<usize>> = HashMap::new();
        let mut unscheduled = 0usize;
        for (idx, record) in records.iter().enumerate() {
            match NaiveDate::parse_from_str(record.field(FIELD_MRI_DATE), MRI_DATE_FORMAT) {
                Ok(date) => by_site_date
                    .entry((record.field(FIELD_SITE).to_string(), date))
                    .or_default()
                    .push(idx),
                Err(_) => unscheduled += 1,
            }
        }
        tracing::debug!(
            records = records.len(),
            unscheduled = unscheduled,
            "Indexed registry snapshot"
        );
        Self {
            records,
            by_site_date,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record(&self, idx: usize) -> Option<&ConsentRecord> {
        self.records.get(idx)
    }

    pub fn records(&self) -> &[ConsentRecord] {
        &self.records
    }

    /// Record indices scheduled at `site` on `date`, most recently exported first
    pub fn candidates(&self, site: &str, date: NaiveDate) -> impl Iterator<Item = usize> + '_ {
        self.by_site_date
            .get(&(site.to_string(), date))
            .into_iter()
            .flat_map(|indices| indices.iter().rev().copied())
    }

    /// Index of the record with this participant ID
    pub fn find_by_participant(&self, participant_id: &str) -> Option<usize> {
        self.records
            .iter()
            .position(|r| r.participant_id() == participant_id)
    }

    /// Identifiers already stored in the registry
    pub fn existing_ids(&self) -> impl Iterator<Item = WbhiId> + '_ {
        self.records.iter().filter_map(ConsentRecord::rid)
    }

    /// Writes a committed identifier back into the snapshot
    pub fn set_rid(&mut self, idx: usize, id: &WbhiId) {
        if let Some(record) = self.records.get_mut(idx) {
            record.set_rid(id);
        }
    }
}
