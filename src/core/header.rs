//! DICOM header extraction
//!
//! Reads the header metadata the file-classifier gear attaches to DICOM
//! files (`info.header.dicom`) and turns it into [`DicomHeaderFields`].
//! Extraction never touches the platform; a failure only means the session
//! is skipped until the classifier has caught up.

use crate::config::{HeaderTokenRule, SiteConfig};
use crate::domain::errors::ExtractionError;
use crate::domain::header::{AmPm, DicomHeaderFields};
use crate::domain::session::{Acquisition, FileEntry};
use crate::domain::tags;
use crate::domain::{Result, WbhiError};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde_json::{Map, Value};

const DICOM_FILE_TYPE: &str = "dicom";
const DICOM_DATE_FORMAT: &str = "%Y%m%d";
const DICOM_TIME_FORMAT: &str = "%H%M%S";

const KEY_STUDY_DATE: &str = "StudyDate";
const KEY_STUDY_TIME: &str = "StudyTime";
const KEY_SERIES_DATE: &str = "SeriesDate";
const KEY_SERIES_TIME: &str = "SeriesTime";

/// Compiled token rule
#[derive(Debug, Clone)]
struct TokenRule {
    key: String,
    pattern: Option<Regex>,
}

impl TokenRule {
    fn compile(rule: &HeaderTokenRule) -> Result<Self> {
        let pattern = rule
            .pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| {
                WbhiError::Configuration(format!("Invalid pattern for {}: {e}", rule.key))
            })?;
        Ok(Self {
            key: rule.key.clone(),
            pattern,
        })
    }

    /// Case-folded token, or `MissingField` when absent or not matched
    fn apply(&self, header: &Map<String, Value>) -> std::result::Result<String, ExtractionError> {
        let raw = text_value(header, &self.key)?;
        let token = match &self.pattern {
            Some(re) => re
                .captures(&raw)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .ok_or_else(|| ExtractionError::MissingField(self.key.clone()))?,
            None => raw,
        };
        let token = token.trim().to_lowercase();
        if token.is_empty() {
            return Err(ExtractionError::MissingField(self.key.clone()));
        }
        Ok(token)
    }
}

/// Header extractor for one site
///
/// Built once per site so the token patterns are compiled once per run.
#[derive(Debug, Clone)]
pub struct HeaderExtractor {
    site: SiteConfig,
    pi: TokenRule,
    subject: TokenRule,
}

impl HeaderExtractor {
    /// Compiles the site's header rules
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a token pattern does not compile.
    pub fn new(site: &SiteConfig) -> Result<Self> {
        Ok(Self {
            pi: TokenRule::compile(&site.pi)?,
            subject: TokenRule::compile(&site.subject)?,
            site: site.clone(),
        })
    }

    /// Extracts identity fields from an acquisition's first DICOM file
    pub fn extract(
        &self,
        acquisition: &Acquisition,
    ) -> std::result::Result<DicomHeaderFields, ExtractionError> {
        let dicom = acquisition
            .files
            .iter()
            .find(|f| f.file_type.as_deref() == Some(DICOM_FILE_TYPE))
            .ok_or(ExtractionError::NoDicoms)?;

        let header = classified_header(dicom).ok_or(ExtractionError::ClassifierNotRun)?;

        let study_date = parse_date(header, KEY_STUDY_DATE)?;
        let am_pm = AmPm::from_study_time(&text_value(header, KEY_STUDY_TIME)?)
            .ok_or_else(|| ExtractionError::MissingField(KEY_STUDY_TIME.to_string()))?;
        let series_datetime = NaiveDateTime::new(
            parse_date(header, KEY_SERIES_DATE)?,
            parse_time(header, KEY_SERIES_TIME)?,
        );

        Ok(DicomHeaderFields {
            site: self.site.id.clone(),
            pi_id: self.pi.apply(header)?,
            sub_id: self.subject.apply(header)?,
            study_date,
            am_pm,
            series_datetime,
        })
    }
}

fn classified_header(file: &FileEntry) -> Option<&Map<String, Value>> {
    if !file.has_tag(tags::FILE_CLASSIFIER) {
        return None;
    }
    file.info.get("header")?.get("dicom")?.as_object()
}

/// Reads a header value as text
///
/// Multi-valued elements use their first value.
fn text_value(header: &Map<String, Value>, key: &str) -> std::result::Result<String, ExtractionError> {
    let missing = || ExtractionError::MissingField(key.to_string());
    let value = match header.get(key).ok_or_else(missing)? {
        Value::Array(values) => values.first().ok_or_else(missing)?,
        other => other,
    };
    match value {
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(missing()),
    }
}

fn parse_date(header: &Map<String, Value>, key: &str) -> std::result::Result<NaiveDate, ExtractionError> {
    let raw = text_value(header, key)?;
    NaiveDate::parse_from_str(&raw, DICOM_DATE_FORMAT)
        .map_err(|_| ExtractionError::MissingField(key.to_string()))
}

fn parse_time(header: &Map<String, Value>, key: &str) -> std::result::Result<NaiveTime, ExtractionError> {
    let raw = text_value(header, key)?;
    // Fractional seconds are dropped
    let whole = raw.split('.').next().unwrap_or_default();
    NaiveTime::parse_from_str(whole, DICOM_TIME_FORMAT)
        .map_err(|_| ExtractionError::MissingField(key.to_string()))
}
