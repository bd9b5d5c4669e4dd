//! Consent matching predicate

use super::snapshot::RegistrySnapshot;
use crate::domain::consent::{
    self, ConsentRecord, CONSENT_COMPLETE, CONSENT_GIVEN, FIELD_CONSENT, FIELD_CONSENT_COMPLETE,
    FIELD_MRI_AM_PM, FIELD_MRI_SUBJECT, FIELD_SITE, OPERATOR_OTHER,
};
use crate::domain::header::DicomHeaderFields;
use crate::domain::ids::SiteId;
use std::collections::HashSet;

/// Pairs extracted header fields with consent records
#[derive(Debug, Clone)]
pub struct MatchEngine {
    sites: HashSet<SiteId>,
}

impl MatchEngine {
    /// Creates an engine that only accepts records from `sites`
    pub fn new(sites: impl IntoIterator<Item = SiteId>) -> Self {
        Self {
            sites: sites.into_iter().collect(),
        }
    }

    /// Returns the indices of every qualifying record, most recently exported
    /// first
    ///
    /// More than one match is legal; it is logged and left to the caller.
    pub fn find_matches(&self, fields: &DicomHeaderFields, snapshot: &RegistrySnapshot) -> Vec<usize> {
        let matches: Vec<usize> = snapshot
            .candidates(fields.site.as_str(), fields.study_date)
            .filter(|&idx| {
                snapshot
                    .record(idx)
                    .is_some_and(|record| self.record_matches(record, fields))
            })
            .collect();

        if matches.len() > 1 {
            let participants: Vec<&str> = matches
                .iter()
                .filter_map(|&idx| snapshot.record(idx).map(ConsentRecord::participant_id))
                .collect();
            tracing::warn!(
                site = %fields.site,
                study_date = %fields.study_date,
                participants = ?participants,
                "Header fields match more than one consent record"
            );
        }
        matches
    }

    /// Full predicate for a single record
    ///
    /// The snapshot index already narrows on site and date; both are checked
    /// again here so the predicate stands on its own.
    pub fn record_matches(&self, record: &ConsentRecord, fields: &DicomHeaderFields) -> bool {
        let site = record.field(FIELD_SITE);
        if record.field(FIELD_CONSENT) != CONSENT_GIVEN
            || record.field(FIELD_CONSENT_COMPLETE) != CONSENT_COMPLETE
            || site != fields.site.as_str()
            || !self.sites.contains(&fields.site)
        {
            return false;
        }

        let scheduled = chrono::NaiveDate::parse_from_str(
            record.field(consent::FIELD_MRI_DATE),
            consent::MRI_DATE_FORMAT,
        );
        if scheduled.ok() != Some(fields.study_date) {
            return false;
        }

        if consent::am_pm_from_code(record.field(FIELD_MRI_AM_PM)) != Some(fields.am_pm.as_str()) {
            return false;
        }

        if record.field(FIELD_MRI_SUBJECT).to_lowercase() != fields.sub_id {
            return false;
        }

        let operator = record.field(&consent::operator_field(&fields.site));
        operator.to_lowercase() == fields.pi_id
            || (operator == OPERATOR_OTHER
                && record
                    .field(&consent::operator_other_field(&fields.site))
                    .to_lowercase()
                    == fields.pi_id)
    }
}
