//! Outcome of one synchronized copy

use crate::domain::ids::ContainerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of a synchronized copy into one destination project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    /// Destination project path
    pub destination: String,

    /// When the copy started
    pub started_at: DateTime<Utc>,

    /// Number of source acquisitions requested
    pub requested: usize,

    /// Acquisitions found in the destination afterwards
    pub verified: usize,

    /// Source subjects renamed to avoid merging two people
    pub renamed_subjects: Vec<SubjectRename>,

    /// Requested acquisitions not found in the destination
    pub missing: Vec<MissingItem>,

    /// Session moves that failed and were skipped
    pub move_failures: Vec<MoveFailure>,

    /// Duration in milliseconds
    pub duration_ms: u64,
}

/// A source subject renamed before copying
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRename {
    pub subject: ContainerId,
    pub from: String,
    pub to: String,
}

/// An acquisition that did not arrive in the destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingItem {
    pub acquisition: ContainerId,
    /// `subject/session/acquisition` labels
    pub path: String,
}

/// A session that could not be moved out of the temporary project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveFailure {
    pub session: ContainerId,
    pub path: String,
    pub reason: String,
}

impl SyncReport {
    pub fn new(destination: impl Into<String>, requested: usize) -> Self {
        Self {
            destination: destination.into(),
            started_at: Utc::now(),
            requested,
            verified: 0,
            renamed_subjects: Vec::new(),
            missing: Vec::new(),
            move_failures: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn record_verified(&mut self) {
        self.verified += 1;
    }

    pub fn record_missing(&mut self, item: MissingItem) {
        self.missing.push(item);
    }

    pub fn record_move_failure(&mut self, failure: MoveFailure) {
        self.move_failures.push(failure);
    }

    pub fn record_rename(&mut self, rename: SubjectRename) {
        self.renamed_subjects.push(rename);
    }

    pub fn set_duration(&mut self, duration_ms: u64) {
        self.duration_ms = duration_ms;
    }

    /// Every requested acquisition arrived
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.verified == self.requested
    }

    /// Logs the report
    pub fn log(&self) {
        tracing::info!(
            destination = %self.destination,
            requested = self.requested,
            verified = self.verified,
            renamed = self.renamed_subjects.len(),
            move_failures = self.move_failures.len(),
            duration_ms = self.duration_ms,
            "Synchronized copy finished"
        );
        for item in &self.missing {
            tracing::warn!(
                destination = %self.destination,
                acquisition_id = %item.acquisition,
                path = %item.path,
                "Acquisition missing from destination after copy"
            );
        }
    }
}
