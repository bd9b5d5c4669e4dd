//! Status command implementation
//!
//! Lists every inbound session with its tag-derived state and whether the
//! next run would try it.

use super::{connect, exit_code_for, EXIT_CONFIG};
use crate::config::load_config;
use crate::core::sync::SyncCoordinator;
use crate::domain::SiteId;
use clap::Args;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Only show these sites (repeatable)
    #[arg(short, long = "site", value_name = "SITE")]
    pub sites: Vec<String>,
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking inbound session status");

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(EXIT_CONFIG);
            }
        };

        let sites = match self
            .sites
            .iter()
            .map(SiteId::new)
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(sites) => sites,
            Err(e) => {
                println!("❌ Invalid --site value: {e}");
                return Ok(EXIT_CONFIG);
            }
        };

        let coordinator = match connect(config) {
            Ok(ctx) => SyncCoordinator::new(ctx),
            Err(e) => {
                println!("❌ Failed to initialize clients");
                println!("   Error: {e}");
                return Ok(exit_code_for(&e));
            }
        };

        let rows = match coordinator.status(&sites).await {
            Ok(rows) => rows,
            Err(e) => {
                println!("❌ Failed to list inbound sessions");
                println!("   Error: {e}");
                return Ok(exit_code_for(&e));
            }
        };

        if rows.is_empty() {
            println!("No sessions waiting in any inbound project.");
            return Ok(0);
        }

        println!("📊 {} inbound session(s):", rows.len());
        println!();
        println!(
            "{:<10} {:<20} {:<24} {:<24} {:<20}",
            "Site", "Subject", "Session", "State", "This run"
        );
        println!("{}", "-".repeat(100));
        for row in rows {
            println!(
                "{:<10} {:<20} {:<24} {:<24} {:<20}",
                row.site.as_str(),
                row.subject,
                row.session,
                row.state.to_string(),
                row.eligibility.to_string()
            );
        }
        println!();
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_args_defaults() {
        let args = StatusArgs { sites: Vec::new() };
        assert!(args.sites.is_empty());
    }
}
