//! Shared fixtures for integration tests

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;
use wbhi_sync::adapters::platform::MemoryPlatform;
use wbhi_sync::adapters::registry::MemoryRegistry;
use wbhi_sync::config::{parse_config, WbhiConfig};
use wbhi_sync::core::sync::{RunClock, SyncContext};
use wbhi_sync::domain::consent::*;
use wbhi_sync::domain::session::FileEntry;
use wbhi_sync::domain::ContainerId;

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
pi = { key = "ReferringPhysicianName", pattern = "^([A-Za-z0-9]+)" }
subject = { key = "PatientID" }

[matching]
ignore_until_n_days_old = 3

[copy]
poll_interval_seconds = 1
wait_timeout_seconds = 5

[deid]
submit_delay_ms = 10

[logging]
local_enabled = false
"#;

pub fn config() -> WbhiConfig {
    parse_config(CONFIG).unwrap()
}

pub fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

/// Runs happen on 2024-03-20 at noon unless a test moves the clock
pub fn clock() -> RunClock {
    RunClock::fixed(at(2024, 3, 20, 12))
}

/// Projects every run expects, with the export gear registered
pub struct Fixture {
    pub platform: Arc<MemoryPlatform>,
    pub registry: Arc<MemoryRegistry>,
    pub inbound: ContainerId,
    pub pre_deid: ContainerId,
    pub deid: ContainerId,
}

impl Fixture {
    pub fn new(records: Vec<ConsentRecord>) -> Self {
        let platform = Arc::new(MemoryPlatform::new());
        let inbound = platform.add_project("ucsd", "Inbound Data");
        let pre_deid = platform.add_project("wbhi", "pre-deid");
        let deid = platform.add_project("wbhi", "deid");
        platform.add_gear("gears/deid-export");
        Self {
            platform,
            registry: Arc::new(MemoryRegistry::new(records)),
            inbound,
            pre_deid,
            deid,
        }
    }

    pub fn context(&self) -> SyncContext {
        SyncContext::new(self.platform.clone(), self.registry.clone(), config()).with_clock(clock())
    }

    /// Inbound subject with one session scanned on 2024-03-10 and one
    /// classified acquisition
    pub fn scanned_session(
        &self,
        subject_label: &str,
        session_label: &str,
        physician: &str,
        study_time: &str,
    ) -> (ContainerId, ContainerId) {
        let subject = self.platform.add_subject(&self.inbound, subject_label);
        let session = self.session_for(&subject, session_label, physician, study_time);
        (subject, session)
    }

    pub fn session_for(
        &self,
        subject: &ContainerId,
        session_label: &str,
        physician: &str,
        study_time: &str,
    ) -> ContainerId {
        let label = self
            .platform
            .subject(subject)
            .map(|s| s.label)
            .unwrap_or_default();
        let session = self
            .platform
            .add_session(subject, session_label, Some(at(2024, 3, 10, 9)), &[]);
        self.platform.add_acquisition(
            &session,
            "T1w",
            Some(at(2024, 3, 10, 9)),
            vec![dicom(&label, physician, "20240310", study_time)],
        );
        session
    }
}

/// Classified DICOM file
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

/// Consented, complete record for a morning scan on 2024-03-10 at `ucsd`
pub fn consent(pid: &str, subject: &str, pi: &str) -> ConsentRecord {
    ConsentRecord::new()
        .with_field(FIELD_PARTICIPANT_ID, pid)
        .with_field(FIELD_CONSENT, CONSENT_GIVEN)
        .with_field(FIELD_CONSENT_COMPLETE, CONSENT_COMPLETE)
        .with_field(FIELD_SITE, "ucsd")
        .with_field(FIELD_MRI_DATE, "2024-03-10")
        .with_field(FIELD_MRI_AM_PM, "1")
        .with_field(FIELD_MRI_SUBJECT, subject)
        .with_field("mri_pi_ucsd", pi)
        .with_field(FIELD_RID, "")
}
