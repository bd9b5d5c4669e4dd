//! Consent registry records
//!
//! Registry rows are flat string maps (REDCap "flat" export). Field names that
//! the engine depends on are collected here; everything else is carried through
//! untouched so an import writes back exactly what was exported.

use crate::domain::ids::{SiteId, WbhiId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Participant ID field (record key)
pub const FIELD_PARTICIPANT_ID: &str = "participant_id";
/// Previously assigned de-identified ID
pub const FIELD_RID: &str = "rid";
/// Informed-consent flag
pub const FIELD_CONSENT: &str = "icf_consent";
/// Consent instrument completion status
pub const FIELD_CONSENT_COMPLETE: &str = "consent_complete";
/// Site of the scheduled scan
pub const FIELD_SITE: &str = "site";
/// Scheduled MRI date (`%Y-%m-%d`)
pub const FIELD_MRI_DATE: &str = "mri_date";
/// Scheduled MRI time of day code
pub const FIELD_MRI_AM_PM: &str = "mri_ampm";
/// Subject token entered at the scanner
pub const FIELD_MRI_SUBJECT: &str = "mri";

/// `icf_consent` value meaning consent was given
pub const CONSENT_GIVEN: &str = "1";
/// `consent_complete` value meaning the instrument is complete
pub const CONSENT_COMPLETE: &str = "2";
/// Operator field value meaning "other, see free text"
pub const OPERATOR_OTHER: &str = "99";
/// Date format of `mri_date`
pub const MRI_DATE_FORMAT: &str = "%Y-%m-%d";

/// Maps the registry's `mri_ampm` code to the header AM/PM flag
pub fn am_pm_from_code(code: &str) -> Option<&'static str> {
    match code.trim() {
        "1" => Some("am"),
        "2" => Some("pm"),
        _ => None,
    }
}

/// Site-specific operator (PI) field name, e.g. `mri_pi_ucsd`
pub fn operator_field(site: &SiteId) -> String {
    format!("mri_pi_{}", site.as_str())
}

/// Free-text companion of the operator field, e.g. `mri_pi_ucsd_other`
pub fn operator_other_field(site: &SiteId) -> String {
    format!("mri_pi_{}_other", site.as_str())
}

/// One consent registry row
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsentRecord {
    fields: BTreeMap<String, String>,
}

impl ConsentRecord {
    /// Creates an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field, returning the record for chaining
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Field value, empty string when absent
    pub fn field(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }

    /// Participant ID (record key)
    pub fn participant_id(&self) -> &str {
        self.field(FIELD_PARTICIPANT_ID)
    }

    /// Previously assigned identifier, if non-blank
    pub fn rid(&self) -> Option<WbhiId> {
        WbhiId::new(self.field(FIELD_RID)).ok()
    }

    /// Records the assigned identifier
    pub fn set_rid(&mut self, id: &WbhiId) {
        self.fields
            .insert(FIELD_RID.to_string(), id.as_str().to_string());
    }

    /// All fields
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }
}

/// Response of a registry import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResponse {
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rid_blank_is_none() {
        let record = ConsentRecord::new().with_field(FIELD_RID, "   ");
        assert!(record.rid().is_none());

        let record = ConsentRecord::new();
        assert!(record.rid().is_none());
    }

    #[test]
    fn test_set_rid() {
        let mut record = ConsentRecord::new().with_field(FIELD_PARTICIPANT_ID, "101");
        record.set_rid(&WbhiId::new("UABC123").unwrap());
        assert_eq!(record.rid().unwrap().as_str(), "UABC123");
        assert_eq!(record.participant_id(), "101");
    }

    #[test]
    fn test_operator_field_names() {
        let site = SiteId::new("ucsd").unwrap();
        assert_eq!(operator_field(&site), "mri_pi_ucsd");
        assert_eq!(operator_other_field(&site), "mri_pi_ucsd_other");
    }

    #[test]
    fn test_am_pm_lookup() {
        assert_eq!(am_pm_from_code("1"), Some("am"));
        assert_eq!(am_pm_from_code("2"), Some("pm"));
        assert_eq!(am_pm_from_code(""), None);
    }

    #[test]
    fn test_record_serializes_flat() {
        let record = ConsentRecord::new()
            .with_field(FIELD_PARTICIPANT_ID, "7")
            .with_field(FIELD_SITE, "ucsd");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["participant_id"], "7");
        assert_eq!(json["site"], "ucsd");

        let back: ConsentRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
