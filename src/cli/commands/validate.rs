//! Validate config command implementation
//!
//! Loads the configuration the same way `sync` does and prints what it
//! resolved to.

use super::EXIT_CONFIG;
use crate::config::{load_config, WbhiConfig};
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // load_config validates before returning
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Configuration is invalid");
                println!("   Error: {e}");
                return Ok(EXIT_CONFIG);
            }
        };

        println!("✅ Configuration is valid");
        println!();
        print_config_summary(&config);
        Ok(0)
    }
}

fn print_config_summary(config: &WbhiConfig) {
    println!("Configuration Summary:");
    println!("  Log Level: {}", config.application.log_level);
    println!("  Dry Run: {}", config.application.dry_run);
    println!("  Platform: {}", config.platform.base_url);
    println!("  Registry: {}", config.registry.api_url);
    println!("  Sites:");
    for site in &config.sites {
        println!(
            "    - {} (prefix {}, inbound '{}', pi from {}, subject from {})",
            site.id,
            site.prefix,
            site.inbound_path(),
            site.pi.key,
            site.subject.key
        );
    }
    println!(
        "  Matching: ignore sessions younger than {} day(s), {}-character IDs",
        config.matching.ignore_until_n_days_old, config.matching.id_suffix_length
    );
    println!(
        "  Copy: temp group '{}', poll every {}s, give up after {}s",
        config.copy.temp_group,
        config.copy.poll_interval_seconds,
        config.copy.wait_timeout_seconds
    );
    println!(
        "  Export: {} -> {} via {}",
        config.deid.pre_deid_project, config.deid.deid_project, config.deid.gear_path
    );
    println!();
}
