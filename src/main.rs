// WBHI Sync - Imaging session reconciliation and de-identified transfer
// Copyright (c) 2025 WBHI Sync Contributors
// Licensed under the MIT License

use clap::Parser;
use std::process;
use tokio::sync::watch;
use wbhi_sync::cli::{Cli, Commands};
use wbhi_sync::config::{load_config, LoggingConfig};
use wbhi_sync::logging::init_logging;

#[tokio::main]
async fn main() {
    // Optional: a missing .env is not an error
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // File logging follows the config when it loads; otherwise console only.
    // Commands report config errors themselves.
    let loaded = if cli.command.needs_config() {
        load_config(&cli.config).ok()
    } else {
        None
    };
    let (config_level, logging_config) = match &loaded {
        Some(config) => (config.application.log_level.clone(), config.logging.clone()),
        None => (
            "info".to_string(),
            LoggingConfig {
                local_enabled: false,
                ..LoggingConfig::default()
            },
        ),
    };
    let log_level = cli.log_level.clone().unwrap_or(config_level);
    let logging_guard = match init_logging(&log_level, &logging_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(5);
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "wbhi-sync - imaging session reconciliation"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(listen_for_shutdown(shutdown_tx));

    let exit_code = match execute_command(&cli, shutdown_rx).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command execution failed");
            eprintln!("Error: {e}");
            5
        }
    };

    drop(logging_guard);
    process::exit(exit_code);
}

/// Sends `true` on the first SIGINT or SIGTERM
async fn listen_for_shutdown(shutdown_tx: watch::Sender<bool>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
                    }
                    _ = sigterm.recv() => {
                        tracing::info!("Received SIGTERM, initiating graceful shutdown...");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler, listening for Ctrl+C only");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                    return;
                }
                tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            return;
        }
        tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
    }

    println!("\n⚠️  Shutdown signal received, finishing the current site...");
    let _ = shutdown_tx.send(true);
}

async fn execute_command(cli: &Cli, shutdown_signal: watch::Receiver<bool>) -> anyhow::Result<i32> {
    match &cli.command {
        Commands::Sync(args) => args.execute(&cli.config, shutdown_signal).await,
        Commands::ManualMatch(args) => args.execute(&cli.config, shutdown_signal).await,
        Commands::Status(args) => args.execute(&cli.config).await,
        Commands::ValidateConfig(args) => args.execute(&cli.config).await,
        Commands::Init(args) => args.execute().await,
    }
}
