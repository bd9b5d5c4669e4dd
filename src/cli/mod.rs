//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for wbhi-sync using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// wbhi-sync - imaging session reconciliation and de-identified transfer
#[derive(Parser, Debug)]
#[command(name = "wbhi-sync")]
#[command(version, about, long_about = None)]
#[command(author = "WBHI Sync Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "wbhi.toml", env = "WBHI_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "WBHI_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Copy, match and move new sessions, then export matched ones
    Sync(commands::sync::SyncArgs),

    /// Apply operator-resolved matches from a CSV file
    ManualMatch(commands::manual_match::ManualMatchArgs),

    /// Show the matching state of inbound sessions
    Status(commands::status::StatusArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}

impl Commands {
    /// Whether the command reads a configuration file
    pub fn needs_config(&self) -> bool {
        !matches!(self, Commands::Init(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_sync() {
        let cli = Cli::parse_from(["wbhi-sync", "sync"]);
        assert_eq!(cli.config, "wbhi.toml");
        assert!(matches!(cli.command, Commands::Sync(_)));
    }

    #[test]
    fn test_cli_parse_with_config() {
        let cli = Cli::parse_from(["wbhi-sync", "--config", "custom.toml", "sync"]);
        assert_eq!(cli.config, "custom.toml");
    }

    #[test]
    fn test_cli_parse_with_log_level() {
        let cli = Cli::parse_from(["wbhi-sync", "--log-level", "debug", "sync"]);
        assert_eq!(cli.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_cli_parse_validate_config() {
        let cli = Cli::parse_from(["wbhi-sync", "validate-config"]);
        assert!(matches!(cli.command, Commands::ValidateConfig(_)));
    }

    #[test]
    fn test_cli_parse_status() {
        let cli = Cli::parse_from(["wbhi-sync", "status", "--site", "ucsd"]);
        assert!(matches!(cli.command, Commands::Status(_)));
    }

    #[test]
    fn test_cli_parse_init() {
        let cli = Cli::parse_from(["wbhi-sync", "init"]);
        assert!(!cli.command.needs_config());
    }
}
