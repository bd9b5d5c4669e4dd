//! Fixtures shared by the engine's unit tests

use crate::adapters::platform::MemoryPlatform;
use crate::adapters::registry::MemoryRegistry;
use crate::config::WbhiConfig;
use crate::core::sync::{RunClock, SyncContext};
use crate::domain::consent::*;
use crate::domain::session::FileEntry;
use chrono::{TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;

pub const CONFIG: &str = r#"
[platform]
base_url = "https://flywheel.test/api"
api_key = "key"

[registry]
api_url = "https://redcap.test/api/"
api_token = "token"

[[sites]]
id = "ucsd"
prefix = "U"
pi = { key = "ReferringPhysicianName" }
subject = { key = "PatientID" }

[matching]
ignore_until_n_days_old = 3

[copy]
poll_interval_seconds = 1
wait_timeout_seconds = 5

[deid]
submit_delay_ms = 10
"#;

pub fn config() -> WbhiConfig {
    let config: WbhiConfig = toml::from_str(CONFIG).unwrap();
    config.validate().unwrap();
    config
}

/// 2024-03-20 12:00 UTC
pub fn clock() -> RunClock {
    RunClock::fixed(Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap())
}

pub fn context(platform: &Arc<MemoryPlatform>, registry: &Arc<MemoryRegistry>) -> SyncContext {
    SyncContext::new(platform.clone(), registry.clone(), config()).with_clock(clock())
}

/// Classified DICOM file for a scan at `study_date` (`YYYYMMDD`) and `study_time`
pub fn dicom(patient: &str, physician: &str, study_date: &str, study_time: &str) -> FileEntry {
    FileEntry {
        name: format!("{patient}_{study_time}.dicom.zip"),
        file_type: Some("dicom".to_string()),
        tags: vec!["file-classifier".to_string()],
        info: json!({
            "header": {
                "dicom": {
                    "PatientID": patient,
                    "ReferringPhysicianName": physician,
                    "StudyDate": study_date,
                    "StudyTime": study_time,
                    "SeriesDate": study_date,
                    "SeriesTime": study_time,
                }
            }
        }),
    }
}

/// Consented, complete record scheduled at `ucsd`
pub fn consent(pid: &str, mri_date: &str, am_pm: &str, subject: &str, pi: &str) -> ConsentRecord {
    ConsentRecord::new()
        .with_field(FIELD_PARTICIPANT_ID, pid)
        .with_field(FIELD_CONSENT, CONSENT_GIVEN)
        .with_field(FIELD_CONSENT_COMPLETE, CONSENT_COMPLETE)
        .with_field(FIELD_SITE, "ucsd")
        .with_field(FIELD_MRI_DATE, mri_date)
        .with_field(FIELD_MRI_AM_PM, am_pm)
        .with_field(FIELD_MRI_SUBJECT, subject)
        .with_field("mri_pi_ucsd", pi)
        .with_field(FIELD_RID, "")
}
