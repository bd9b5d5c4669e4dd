//! Manual-match command implementation
//!
//! Applies operator-resolved matches from a CSV file with one
//! `site,participant_id,subject_label` row per line.

use super::{connect, exit_code_for, exit_code_for_summary, print_summary, EXIT_CONFIG};
use crate::config::load_config;
use crate::core::sync::SyncCoordinator;
use clap::Args;
use std::fs;
use tokio::sync::watch;

/// Arguments for the manual-match command
#[derive(Args, Debug)]
pub struct ManualMatchArgs {
    /// CSV file of `site,participant_id,subject_label` rows
    #[arg(long, value_name = "PATH")]
    pub csv: String,

    /// Log the planned changes without making them
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the de-identification export pass
    #[arg(long)]
    pub skip_deid: bool,
}

impl ManualMatchArgs {
    /// Execute the manual-match command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!(csv = %self.csv, "Starting manual match");

        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load configuration: {e}");
                return Ok(EXIT_CONFIG);
            }
        };
        if self.dry_run {
            config.application.dry_run = true;
        }

        let rows = match fs::read_to_string(&self.csv) {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(error = %e, csv = %self.csv, "Failed to read match file");
                eprintln!("Failed to read {}: {e}", self.csv);
                return Ok(EXIT_CONFIG);
            }
        };

        let ctx = match connect(config) {
            Ok(ctx) => ctx,
            Err(e) => {
                eprintln!("Failed to initialize clients: {e}");
                return Ok(exit_code_for(&e));
            }
        };

        let mut coordinator = SyncCoordinator::new(ctx).with_shutdown(shutdown_signal);
        let summary = match coordinator.manual_match(&rows, self.skip_deid).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Manual match failed");
                eprintln!("Manual match failed: {e}");
                return Ok(exit_code_for(&e));
            }
        };

        print_summary(&summary);
        Ok(exit_code_for_summary(&summary))
    }
}
