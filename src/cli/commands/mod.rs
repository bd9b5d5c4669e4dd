//! CLI command implementations
//!
//! Exit codes shared by every command:
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | success |
//! | 1 | run finished with recorded errors |
//! | 2 | configuration error |
//! | 4 | platform or registry unreachable |
//! | 5 | fatal error |
//! | 130 | interrupted by a shutdown signal |

pub mod init;
pub mod manual_match;
pub mod status;
pub mod sync;
pub mod validate;

use crate::adapters::platform::FlywheelClient;
use crate::adapters::registry::RedcapClient;
use crate::config::WbhiConfig;
use crate::core::sync::{RunError, RunErrorType, RunSummary, Severity, SyncContext};
use crate::domain::{Result, WbhiError};
use std::sync::Arc;

pub(crate) const EXIT_OK: i32 = 0;
pub(crate) const EXIT_PARTIAL: i32 = 1;
pub(crate) const EXIT_CONFIG: i32 = 2;
pub(crate) const EXIT_CONNECTION: i32 = 4;
pub(crate) const EXIT_FATAL: i32 = 5;
pub(crate) const EXIT_INTERRUPTED: i32 = 130;

/// Builds the HTTP clients and the run context from a loaded configuration
pub(crate) fn connect(config: WbhiConfig) -> Result<SyncContext> {
    let platform = Arc::new(FlywheelClient::new(&config.platform)?);
    let registry = Arc::new(RedcapClient::new(&config.registry)?);
    Ok(SyncContext::new(platform, registry, config))
}

/// Exit code for an error that aborted a command
pub(crate) fn exit_code_for(error: &WbhiError) -> i32 {
    match RunError::from_error(error, Severity::Fatal).error_type {
        RunErrorType::Configuration => EXIT_CONFIG,
        RunErrorType::Connection => EXIT_CONNECTION,
        _ if matches!(error, WbhiError::Validation(_)) => EXIT_CONFIG,
        _ => EXIT_FATAL,
    }
}

/// Exit code for a run that produced a summary
pub(crate) fn exit_code_for_summary(summary: &RunSummary) -> i32 {
    if summary.interrupted {
        EXIT_INTERRUPTED
    } else if summary.is_successful() {
        EXIT_OK
    } else {
        EXIT_PARTIAL
    }
}

/// Prints the operator-facing run summary
pub(crate) fn print_summary(summary: &RunSummary) {
    println!();
    println!("📊 Run Summary ({})", summary.run_id);
    println!("  Sites: {}", summary.sites);
    println!("  Sessions checked: {}", summary.sessions_checked);
    println!("  Sessions matched: {}", summary.sessions_matched);
    println!("  Sessions deferred: {}", summary.sessions_deferred);
    println!("  Header extraction skips: {}", summary.extraction_skips);
    println!("  WBHI-IDs generated: {}", summary.ids_generated);
    for report in &summary.copies {
        println!(
            "  Copy into {}: {}/{} verified, {} subject(s) renamed",
            report.destination,
            report.verified,
            report.requested,
            report.renamed_subjects.len()
        );
    }
    if let Some(deid) = &summary.deid {
        println!(
            "  De-identification: {} checked, {} tagged, {} submitted, {} gave up",
            deid.checked,
            deid.newly_tagged,
            deid.submitted,
            deid.gave_up.len()
        );
    }
    println!("  Duration: {:.2}s", summary.duration.as_secs_f64());

    if !summary.errors.is_empty() {
        println!();
        println!("⚠️  Errors encountered:");
        for error in &summary.errors {
            println!(
                "  - {:?} ({:?}): {}",
                error.error_type, error.severity, error.message
            );
            if let Some(context) = &error.context {
                println!("    Context: {context}");
            }
        }
    }
    println!();
}
