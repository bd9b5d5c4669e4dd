// WBHI Sync - Imaging session reconciliation and de-identified transfer
// Copyright (c) 2025 WBHI Sync Contributors
// Licensed under the MIT License

//! # wbhi-sync
//!
//! Reconciles imaging sessions arriving at participating sites with the
//! consent registry, assigns each consented participant a stable WBHI-ID and
//! moves matched sessions through a de-identified export.
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Matching, identity, retry state, synchronized copy, export
//! - [`adapters`] - Imaging platform and consent registry integrations
//! - [`domain`] - Identifiers, platform and registry models, errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## State
//!
//! The engine keeps no database. Everything a later run needs is written as
//! tags on platform containers (`wbhi`, `retry_<n>_<YYYYMMDD>`,
//! `copied_<project>`, `deid`) or as the WBHI-ID on the consent record, so a
//! run that stops part-way is resumed by running it again.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wbhi_sync::adapters::platform::FlywheelClient;
//! use wbhi_sync::adapters::registry::RedcapClient;
//! use wbhi_sync::config::load_config;
//! use wbhi_sync::core::sync::{SyncContext, SyncCoordinator, SyncOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("wbhi.toml")?;
//!     let platform = Arc::new(FlywheelClient::new(&config.platform)?);
//!     let registry = Arc::new(RedcapClient::new(&config.registry)?);
//!
//!     let mut coordinator = SyncCoordinator::new(SyncContext::new(platform, registry, config));
//!     let summary = coordinator.run(&SyncOptions::default()).await?;
//!
//!     println!("Matched {} session(s)", summary.sessions_matched);
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Library code returns [`domain::WbhiError`]; the binary maps it to an exit
//! code.
//!
//! ```rust,no_run
//! use wbhi_sync::domain::WbhiError;
//!
//! fn example() -> Result<(), WbhiError> {
//!     let config = wbhi_sync::config::load_config("wbhi.toml")?;
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
