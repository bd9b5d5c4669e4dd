//! Sync command implementation
//!
//! Runs the full pass: PI copies, registry matching, moves into pre-deid and
//! the de-identification export.

use super::{connect, exit_code_for, exit_code_for_summary, print_summary, EXIT_CONFIG};
use crate::config::load_config;
use crate::core::sync::{SyncCoordinator, SyncOptions};
use crate::domain::SiteId;
use clap::Args;
use tokio::sync::watch;

/// Arguments for the sync command
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Only process these sites (repeatable); default is every configured site
    #[arg(short, long = "site", value_name = "SITE")]
    pub sites: Vec<String>,

    /// Read everything and log the planned changes without making them
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the de-identification export pass
    #[arg(long)]
    pub skip_deid: bool,

    /// Seed for WBHI-ID generation, for reproducible test runs
    #[arg(long, hide = true)]
    pub seed: Option<u64>,
}

impl SyncArgs {
    /// Execute the sync command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting sync command");

        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                eprintln!("Failed to load configuration: {e}");
                return Ok(EXIT_CONFIG);
            }
        };

        if self.dry_run {
            tracing::info!("Enabling dry-run mode from CLI");
            config.application.dry_run = true;
        }

        let sites = match self
            .sites
            .iter()
            .map(SiteId::new)
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(sites) => sites,
            Err(e) => {
                eprintln!("Invalid --site value: {e}");
                return Ok(EXIT_CONFIG);
            }
        };

        if config.application.dry_run {
            println!("🔍 DRY RUN MODE - nothing will be tagged, copied, moved or imported");
            println!();
        }

        let ctx = match connect(config) {
            Ok(ctx) => ctx,
            Err(e) => {
                tracing::error!(error = %e, "Failed to create clients");
                eprintln!("Failed to initialize clients: {e}");
                return Ok(exit_code_for(&e));
            }
        };

        let mut coordinator = SyncCoordinator::new(ctx).with_shutdown(shutdown_signal);
        if let Some(seed) = self.seed {
            coordinator = coordinator.with_seed(seed);
        }

        println!("🚀 Starting sync...");
        let options = SyncOptions {
            sites,
            skip_deid: self.skip_deid,
        };
        let summary = match coordinator.run(&options).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Sync failed");
                eprintln!("Sync failed: {e}");
                return Ok(exit_code_for(&e));
            }
        };

        print_summary(&summary);
        let code = exit_code_for_summary(&summary);
        match code {
            0 => println!("✅ Sync completed successfully!"),
            130 => {
                println!("⚠️  Sync interrupted. Tags record progress; run again to resume.");
                tracing::info!("Sync interrupted by user signal");
            }
            _ => println!("⚠️  Sync completed with errors"),
        }
        Ok(code)
    }
}
