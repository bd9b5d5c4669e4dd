//! Destination snapshot and duplicate-subject disambiguation
//!
//! Two people can be scanned under the same subject label at a site. When a
//! destination subject already holds a session with the same label but a
//! different date, the incoming subject is renamed `<label>_NNN` so the copy
//! does not merge two people.

use crate::domain::session::ViewRow;
use chrono::NaiveDate;
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// Subjects, sessions and acquisitions present in a destination project
///
/// Built from a single bulk view read.
#[derive(Debug, Clone, Default)]
pub struct DestinationIndex {
    subjects: HashSet<String>,
    session_dates: HashMap<(String, String), HashSet<Option<NaiveDate>>>,
    acquisitions: HashSet<(String, String, String)>,
}

impl DestinationIndex {
    pub fn from_rows(rows: &[ViewRow]) -> Self {
        let mut index = Self::default();
        for row in rows {
            index.subjects.insert(row.subject_label.clone());
            index
                .session_dates
                .entry((row.subject_label.clone(), row.session_label.clone()))
                .or_default()
                .insert(row.session_date());
            if let Some(acquisition) = &row.acquisition_label {
                index.acquisitions.insert((
                    row.subject_label.clone(),
                    row.session_label.clone(),
                    acquisition.clone(),
                ));
            }
        }
        index
    }

    pub fn has_subject(&self, label: &str) -> bool {
        self.subjects.contains(label)
    }

    /// Whether `subject` already has a session labelled `session` on another date
    pub fn has_conflicting_session(
        &self,
        subject: &str,
        session: &str,
        date: Option<NaiveDate>,
    ) -> bool {
        self.session_dates
            .get(&(subject.to_string(), session.to_string()))
            .is_some_and(|dates| dates.iter().any(|d| *d != date))
    }

    pub fn contains_acquisition(&self, subject: &str, session: &str, acquisition: &str) -> bool {
        self.acquisitions.contains(&(
            subject.to_string(),
            session.to_string(),
            acquisition.to_string(),
        ))
    }

    /// Next free `<base>_NNN` label
    ///
    /// One past the highest existing three-digit suffix, starting at `_001`.
    pub fn next_duplicate_label(&self, base: &str) -> String {
        let pattern = format!(r"^{}_(\d{{3}})$", regex::escape(base));
        let highest = Regex::new(&pattern)
            .ok()
            .map(|re| {
                self.subjects
                    .iter()
                    .filter_map(|label| re.captures(label))
                    .filter_map(|c| c.get(1)?.as_str().parse::<u32>().ok())
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0);
        format!("{base}_{:03}", highest + 1)
    }

    /// Records a label assigned during the current batch
    pub fn reserve_subject(&mut self, label: &str) {
        self.subjects.insert(label.to_string());
    }

    pub fn subject_count(&self) -> usize {
        self.subjects.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn row(subject: &str, session: &str, day: u32, acq: Option<&str>) -> ViewRow {
        ViewRow {
            subject_label: subject.to_string(),
            session_label: session.to_string(),
            session_timestamp: Some(Utc.with_ymd_and_hms(2024, 3, day, 9, 0, 0).unwrap()),
            acquisition_label: acq.map(str::to_string),
        }
    }

    fn date(day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2024, 3, day)
    }

    #[test]
    fn test_conflict_requires_same_label_other_date() {
        let index = DestinationIndex::from_rows(&[row("sub01", "ses01", 1, Some("T1w"))]);

        assert!(index.has_conflicting_session("sub01", "ses01", date(5)));
        assert!(!index.has_conflicting_session("sub01", "ses01", date(1)));
        assert!(!index.has_conflicting_session("sub01", "ses02", date(5)));
        assert!(!index.has_conflicting_session("sub02", "ses01", date(5)));
        assert!(index.contains_acquisition("sub01", "ses01", "T1w"));
    }

    #[test]
    fn test_duplicate_labels_increment() {
        let mut index = DestinationIndex::from_rows(&[row("sub01", "ses01", 1, None)]);

        let first = index.next_duplicate_label("sub01");
        assert_eq!(first, "sub01_001");
        index.reserve_subject(&first);

        assert_eq!(index.next_duplicate_label("sub01"), "sub01_002");
    }

    #[test]
    fn test_duplicate_labels_use_highest_suffix() {
        let index = DestinationIndex::from_rows(&[
            row("sub01", "ses01", 1, None),
            row("sub01_004", "ses01", 2, None),
            row("sub01_x", "ses01", 2, None),
            row("sub010_009", "ses01", 2, None),
        ]);
        assert_eq!(index.next_duplicate_label("sub01"), "sub01_005");
    }

    #[test]
    fn test_labels_with_regex_characters() {
        let index = DestinationIndex::from_rows(&[row("a.b_001", "s", 1, None)]);
        assert_eq!(index.next_duplicate_label("a.b"), "a.b_002");
        assert_eq!(index.next_duplicate_label("a+b"), "a+b_001");
    }
}
