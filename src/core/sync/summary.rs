//! Run summary and reporting
//!
//! Tracks what a run did and separates fatal errors from partial failures so
//! the CLI can pick an exit code.

use crate::core::copy::SyncReport;
use crate::core::deid::DeidReport;
use std::time::Duration;
use uuid::Uuid;

/// Summary of one run
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Correlates log lines of one run
    pub run_id: Uuid,

    /// Sites processed
    pub sites: usize,

    /// Sessions considered for registry matching
    pub sessions_checked: usize,

    /// Sessions matched to a consent record
    pub sessions_matched: usize,

    /// Sessions that got a new retry marker
    pub sessions_deferred: usize,

    /// Sessions skipped because their header could not be read
    pub extraction_skips: usize,

    /// Identifiers generated this run
    pub ids_generated: usize,

    /// Completed synchronized copies
    pub copies: Vec<SyncReport>,

    /// De-identification pass outcome, when it ran
    pub deid: Option<DeidReport>,

    /// Duration of the run
    pub duration: Duration,

    /// Errors encountered during the run
    pub errors: Vec<RunError>,

    /// Stopped early by a shutdown signal
    pub interrupted: bool,
}

impl RunSummary {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            sites: 0,
            sessions_checked: 0,
            sessions_matched: 0,
            sessions_deferred: 0,
            extraction_skips: 0,
            ids_generated: 0,
            copies: Vec::new(),
            deid: None,
            duration: Duration::from_secs(0),
            errors: Vec::new(),
            interrupted: false,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn add_error(&mut self, error: RunError) {
        self.errors.push(error);
    }

    pub fn add_copy(&mut self, report: SyncReport) {
        self.copies.push(report);
    }

    /// No errors of any kind
    pub fn is_successful(&self) -> bool {
        self.errors.is_empty()
    }

    /// Any error that stopped a whole batch or pass
    pub fn has_fatal_errors(&self) -> bool {
        self.errors.iter().any(|e| e.severity == Severity::Fatal)
    }

    /// Most severe error kind, used for the exit code
    pub fn worst_error(&self) -> Option<&RunError> {
        self.errors
            .iter()
            .max_by_key(|e| (e.severity == Severity::Fatal, e.error_type.rank()))
    }

    /// Log the summary
    pub fn log_summary(&self) {
        tracing::info!(
            run_id = %self.run_id,
            sites = self.sites,
            sessions_checked = self.sessions_checked,
            sessions_matched = self.sessions_matched,
            sessions_deferred = self.sessions_deferred,
            extraction_skips = self.extraction_skips,
            ids_generated = self.ids_generated,
            copies = self.copies.len(),
            interrupted = self.interrupted,
            duration_secs = self.duration.as_secs(),
            "Run completed"
        );

        if !self.errors.is_empty() {
            tracing::warn!(
                run_id = %self.run_id,
                error_count = self.errors.len(),
                fatal = self.has_fatal_errors(),
                "Run completed with errors"
            );
            for error in &self.errors {
                tracing::warn!(
                    error_type = ?error.error_type,
                    severity = ?error.severity,
                    message = %error.message,
                    context = error.context.as_deref().unwrap_or(""),
                    "Run error"
                );
            }
        }
    }
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}

/// Kind of run error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunErrorType {
    /// Platform or registry unreachable
    Connection,
    /// Platform request rejected
    Platform,
    /// Registry request rejected or import count mismatch
    Registry,
    /// Smart copy failed or timed out
    CopyJob,
    /// Configuration problem found at run time
    Configuration,
    /// Anything else
    Unknown,
}

impl RunErrorType {
    fn rank(&self) -> u8 {
        match self {
            RunErrorType::Unknown => 0,
            RunErrorType::Platform => 1,
            RunErrorType::Registry => 2,
            RunErrorType::CopyJob => 3,
            RunErrorType::Connection => 4,
            RunErrorType::Configuration => 5,
        }
    }
}

/// Whether an error stopped a batch or only one item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// One item failed, the rest of its batch went ahead
    Partial,
    /// A whole batch or pass was abandoned
    Fatal,
}

/// Run error with context
#[derive(Debug, Clone)]
pub struct RunError {
    pub error_type: RunErrorType,
    pub severity: Severity,
    pub message: String,
    /// Optional context (e.g. site, project path)
    pub context: Option<String>,
}

impl RunError {
    pub fn new(error_type: RunErrorType, severity: Severity, message: String) -> Self {
        Self {
            error_type,
            severity,
            message,
            context: None,
        }
    }

    /// Classifies a crate error
    pub fn from_error(error: &crate::domain::WbhiError, severity: Severity) -> Self {
        use crate::domain::{PlatformError, RegistryError, WbhiError};

        let error_type = match error {
            WbhiError::Platform(PlatformError::ConnectionFailed(_))
            | WbhiError::Platform(PlatformError::Timeout(_))
            | WbhiError::Registry(RegistryError::ConnectionFailed(_)) => RunErrorType::Connection,
            WbhiError::Platform(_) => RunErrorType::Platform,
            WbhiError::Registry(_) => RunErrorType::Registry,
            WbhiError::CopyJob(_) => RunErrorType::CopyJob,
            WbhiError::Configuration(_) => RunErrorType::Configuration,
            _ => RunErrorType::Unknown,
        };
        Self::new(error_type, severity, error.to_string())
    }

    pub fn with_context(mut self, context: String) -> Self {
        self.context = Some(context);
        self
    }
}
