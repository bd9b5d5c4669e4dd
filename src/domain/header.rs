//! Identity fields extracted from a DICOM header

use crate::domain::ids::SiteId;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Half of the day a study started in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmPm {
    Am,
    Pm,
}

impl AmPm {
    /// Classifies a DICOM `StudyTime` (`HHMMSS[.ffffff]`)
    ///
    /// Returns `None` when the value is not numeric.
    pub fn from_study_time(study_time: &str) -> Option<Self> {
        let value: f64 = study_time.trim().parse().ok()?;
        if value < 120000.0 {
            Some(AmPm::Am)
        } else {
            Some(AmPm::Pm)
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AmPm::Am => "am",
            AmPm::Pm => "pm",
        }
    }
}

impl fmt::Display for AmPm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity fields of one acquisition
///
/// Tokens are case-folded at extraction time so matching can compare them
/// directly against case-folded registry values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DicomHeaderFields {
    pub site: SiteId,
    /// Operator / principal investigator token
    pub pi_id: String,
    /// Subject token typed at the scanner
    pub sub_id: String,
    pub study_date: NaiveDate,
    pub am_pm: AmPm,
    pub series_datetime: NaiveDateTime,
}
