//! Configuration management for wbhi-sync.
//!
//! TOML configuration with `${VAR_NAME}` substitution, `WBHI_<SECTION>_<KEY>`
//! environment overrides, defaults for optional settings and validation on
//! load.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use wbhi_sync::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("wbhi.toml")?;
//!
//! println!("Platform: {}", config.platform.base_url);
//! for site in &config.sites {
//!     println!("Site {} ({})", site.id, site.inbound_path());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - log level, dry run
//! - [`PlatformConfig`] - imaging platform URL, API key, retries
//! - [`RegistryConfig`] - consent registry URL and token
//! - [`SiteConfig`] - per-site ID prefix, inbound project and header rules
//! - [`MatchingConfig`] - age floor and identifier length
//! - [`CopyConfig`] - temporary group and copy polling
//! - [`DeidConfig`] - export gear and projects
//! - [`LoggingConfig`] - local JSON log files
//!
//! # Example Configuration
//!
//! ```toml
//! [platform]
//! base_url = "https://flywheel.example.edu/api"
//! api_key = "${WBHI_FW_API_KEY}"
//!
//! [registry]
//! api_url = "https://redcap.example.edu/api/"
//! api_token = "${WBHI_REDCAP_TOKEN}"
//!
//! [[sites]]
//! id = "ucsd"
//! prefix = "U"
//! pi = { key = "ReferringPhysicianName", pattern = "^([A-Za-z0-9]+)" }
//! subject = { key = "PatientID" }
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

// Re-export commonly used types
pub use loader::{load_config, parse_config};
pub use schema::{
    ApplicationConfig, CopyConfig, DeidConfig, HeaderTokenRule, LoggingConfig, MatchingConfig,
    PlatformConfig, RegistryConfig, RetryConfig, SiteConfig, WbhiConfig,
};
pub use secret::{secret_string, SecretString, SecretValue};
