//! Domain error types
//!
//! This module defines the error hierarchy for wbhi-sync. All errors are
//! domain-specific and don't expose third-party types.

use thiserror::Error;

/// Main wbhi-sync error type
///
/// This is the primary error type used throughout the application.
/// It wraps specific error types and provides context for error handling.
#[derive(Debug, Error)]
pub enum WbhiError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Storage platform errors
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Consent registry errors
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Smart-copy job failed or never finished
    #[error("Copy job error: {0}")]
    CopyJob(#[from] CopyJobError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

/// Storage platform errors
///
/// Errors that occur when talking to the imaging platform. `Conflict` is kept
/// separate because a session move that collides with an existing session is
/// recoverable.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Failed to connect to the platform
    #[error("Failed to connect to platform: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Container not found
    #[error("Container not found: {0}")]
    NotFound(String),

    /// Target already exists (HTTP 409/422 on move)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid response from server
    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),

    /// Server error (5xx)
    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    /// Client error (4xx)
    #[error("Client error: {status} - {message}")]
    ClientError { status: u16, message: String },

    /// Timeout
    #[error("Request timeout: {0}")]
    Timeout(String),
}

impl PlatformError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PlatformError::ConnectionFailed(_)
                | PlatformError::ServerError { .. }
                | PlatformError::Timeout(_)
        )
    }
}

/// Consent registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Failed to connect to the registry
    #[error("Failed to connect to registry: {0}")]
    ConnectionFailed(String),

    /// Registry rejected the request
    #[error("Registry request failed: {status} - {message}")]
    RequestFailed { status: u16, message: String },

    /// Invalid response body
    #[error("Invalid response from registry: {0}")]
    InvalidResponse(String),

    /// Import acknowledged fewer (or more) records than submitted
    #[error("Registry imported {imported} of {submitted} records")]
    ImportCountMismatch { submitted: usize, imported: usize },

    /// Record lookup failed
    #[error("Record not found: {0}")]
    RecordNotFound(String),
}

/// Smart-copy job errors
///
/// Fatal for the batch being copied: nothing in the batch may be marked complete.
#[derive(Debug, Error)]
pub enum CopyJobError {
    /// The platform reported the copy job as failed
    #[error("Smart copy into {project} failed")]
    Failed { project: String },

    /// The copy job did not finish within the configured wait
    #[error("Smart copy into {project} did not complete within {waited_secs}s")]
    TimedOut { project: String, waited_secs: u64 },
}

/// Header extraction failures
///
/// Non-fatal: the session is skipped for this cycle and stays eligible.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    /// Acquisition has no DICOM file
    #[error("acquisition contains no DICOM files")]
    NoDicoms,

    /// File classifier has not populated header metadata yet
    #[error("file classifier has not been run")]
    ClassifierNotRun,

    /// A required header key is missing or unparseable
    #[error("DICOM header is missing field {0}")]
    MissingField(String),
}

impl ExtractionError {
    /// Short code used in logs and summaries
    pub fn code(&self) -> &'static str {
        match self {
            ExtractionError::NoDicoms => "NO_DICOMS",
            ExtractionError::ClassifierNotRun => "FILE_CLASSIFIER_NOT_RUN",
            ExtractionError::MissingField(_) => "MISSING_DICOM_FIELDS",
        }
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for WbhiError {
    fn from(err: std::io::Error) -> Self {
        WbhiError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for WbhiError {
    fn from(err: serde_json::Error) -> Self {
        WbhiError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for WbhiError {
    fn from(err: toml::de::Error) -> Self {
        WbhiError::Configuration(format!("TOML parse error: {err}"))
    }
}
