//! Platform container models
//!
//! Projects, subjects, sessions and acquisitions as read from the imaging
//! platform. These are snapshots: the engine only mutates them through the
//! platform adapter (tags, labels, project membership).

use crate::domain::ids::ContainerId;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Status of a project-level smart copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CopyStatus {
    /// Project was not created by a copy
    #[default]
    None,
    /// Copy is still running
    InProgress,
    /// Copy finished successfully
    Completed,
    /// Copy failed
    Failed,
}

/// A platform project (`<group>/<label>`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ContainerId,
    pub group: String,
    pub label: String,
    #[serde(default)]
    pub copy_status: CopyStatus,
}

impl Project {
    /// Lookup path of the project, e.g. `ucsd/Inbound Data`
    pub fn path(&self) -> String {
        format!("{}/{}", self.group, self.label)
    }
}

/// A subject within a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: ContainerId,
    pub project: ContainerId,
    pub label: String,
}

/// An imaging session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: ContainerId,
    pub project: ContainerId,
    pub subject: ContainerId,
    pub label: String,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Session {
    /// Whether the session carries `tag`
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Calendar date of the session in UTC
    pub fn date(&self) -> Option<NaiveDate> {
        self.timestamp.map(|ts| ts.date_naive())
    }
}

/// A file attached to an acquisition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub file_type: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub info: serde_json::Value,
}

impl FileEntry {
    /// Whether the file carries `tag`
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// An acquisition within a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acquisition {
    pub id: ContainerId,
    pub session: ContainerId,
    pub label: String,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub files: Vec<FileEntry>,
}

impl Acquisition {
    /// Whether the acquisition carries `tag`
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Returns the acquisition with the earliest timestamp
///
/// Acquisitions without a timestamp sort last.
pub fn first_acquisition(acquisitions: &[Acquisition]) -> Option<&Acquisition> {
    acquisitions
        .iter()
        .min_by_key(|acq| (acq.timestamp.is_none(), acq.timestamp))
}

/// One row of a bulk data-view read over a project
///
/// A single view read replaces walking every subject and session, which times
/// out on large projects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewRow {
    pub subject_label: String,
    pub session_label: String,
    pub session_timestamp: Option<DateTime<Utc>>,
    pub acquisition_label: Option<String>,
}

impl ViewRow {
    /// Session date in UTC
    pub fn session_date(&self) -> Option<NaiveDate> {
        self.session_timestamp.map(|ts| ts.date_naive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn acq(id: &str, ts: Option<DateTime<Utc>>) -> Acquisition {
        Acquisition {
            id: ContainerId::new(id).unwrap(),
            session: ContainerId::new("ses").unwrap(),
            label: id.to_string(),
            timestamp: ts,
            tags: vec![],
            files: vec![],
        }
    }

    #[test]
    fn test_first_acquisition_by_timestamp() {
        let early = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let acqs = vec![acq("b", Some(late)), acq("none", None), acq("a", Some(early))];

        assert_eq!(first_acquisition(&acqs).unwrap().label, "a");
        assert!(first_acquisition(&[]).is_none());
    }

    #[test]
    fn test_project_path() {
        let project = Project {
            id: ContainerId::new("p1").unwrap(),
            group: "ucsd".to_string(),
            label: "Inbound Data".to_string(),
            copy_status: CopyStatus::None,
        };
        assert_eq!(project.path(), "ucsd/Inbound Data");
    }

    #[test]
    fn test_session_date_is_utc() {
        let session = Session {
            id: ContainerId::new("s1").unwrap(),
            project: ContainerId::new("p1").unwrap(),
            subject: ContainerId::new("sub1").unwrap(),
            label: "ses".to_string(),
            timestamp: Some(Utc.with_ymd_and_hms(2024, 3, 1, 23, 30, 0).unwrap()),
            tags: vec!["wbhi".to_string()],
        };
        assert_eq!(session.date(), NaiveDate::from_ymd_opt(2024, 3, 1));
        assert!(session.has_tag("wbhi"));
        assert!(!session.has_tag("deid"));
    }
}
