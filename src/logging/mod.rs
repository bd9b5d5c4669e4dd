//! Logging and observability
//!
//! Structured `tracing` output to the console and, optionally, to rotating
//! JSON files. The macros below keep the field names of recurring events
//! consistent so log queries stay simple.
//!
//! # Example
//!
//! ```no_run
//! use wbhi_sync::logging::init_logging;
//! use wbhi_sync::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!(site = "ucsd", "Starting sync");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log a session that was skipped for this cycle
///
/// ```no_run
/// use wbhi_sync::log_session_skipped;
///
/// log_session_skipped!("65f0c0ffee", "FILE_CLASSIFIER_NOT_RUN");
/// ```
#[macro_export]
macro_rules! log_session_skipped {
    ($session_id:expr, $reason:expr) => {
        tracing::warn!(
            session_id = %$session_id,
            reason = %$reason,
            "Skipping session"
        );
    };
}

/// Log a change of a session's matching state
///
/// ```no_run
/// use wbhi_sync::log_state_transition;
///
/// log_state_transition!("65f0c0ffee", "unchecked", "retry_1_20240302");
/// ```
#[macro_export]
macro_rules! log_state_transition {
    ($session_id:expr, $from:expr, $to:expr) => {
        tracing::info!(
            session_id = %$session_id,
            from = %$from,
            to = %$to,
            "Session state changed"
        );
    };
}

/// Log an error with context
///
/// ```no_run
/// use wbhi_sync::log_error_with_context;
/// use wbhi_sync::domain::WbhiError;
///
/// let error = WbhiError::Configuration("Invalid config".to_string());
/// log_error_with_context!(&error, "Failed to load configuration");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        );
    };
}

/// Log a retry attempt
///
/// ```no_run
/// use wbhi_sync::log_retry_attempt;
///
/// log_retry_attempt!(2, 3, "Connection timeout");
/// ```
#[macro_export]
macro_rules! log_retry_attempt {
    ($attempt:expr, $max_attempts:expr, $reason:expr) => {
        tracing::warn!(
            attempt = $attempt,
            max_attempts = $max_attempts,
            reason = %$reason,
            "Retrying operation"
        );
    };
}
