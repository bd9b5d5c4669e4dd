//! Init command implementation
//!
//! Writes a starter configuration file.

use super::{EXIT_CONFIG, EXIT_FATAL};
use clap::Args;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path where to create the configuration file
    #[arg(short, long, default_value = "wbhi.toml")]
    pub output: String,

    /// Include every setting with comments
    #[arg(long)]
    pub with_examples: bool,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, "Initializing configuration file");

        println!("📝 Initializing wbhi-sync configuration");
        println!();

        if Path::new(&self.output).exists() && !self.force {
            println!("❌ Configuration file already exists: {}", self.output);
            println!("   Use --force to overwrite");
            return Ok(EXIT_CONFIG);
        }

        let config_content = if self.with_examples {
            Self::generate_config_with_examples()
        } else {
            Self::generate_minimal_config()
        };

        match fs::write(&self.output, config_content) {
            Ok(_) => {
                println!("✅ Configuration file created: {}", self.output);
                println!();
                println!("Next steps:");
                println!("  1. Edit {} with your sites and header rules", self.output);
                println!("  2. Put WBHI_FW_API_KEY and WBHI_REDCAP_TOKEN in a .env file");
                println!("  3. Validate configuration: wbhi-sync validate-config");
                println!("  4. Preview a run: wbhi-sync sync --dry-run");
                println!();
                Ok(0)
            }
            Err(e) => {
                println!("❌ Failed to write configuration file");
                println!("   Error: {e}");
                Ok(EXIT_FATAL)
            }
        }
    }

    fn generate_minimal_config() -> String {
        r#"# wbhi-sync configuration

[application]
log_level = "info"
dry_run = false

[platform]
base_url = "https://flywheel.example.edu/api"
api_key = "${WBHI_FW_API_KEY}"

[registry]
api_url = "https://redcap.example.edu/api/"
api_token = "${WBHI_REDCAP_TOKEN}"

[[sites]]
id = "ucsd"
prefix = "U"
pi = { key = "ReferringPhysicianName", pattern = "^([A-Za-z0-9]+)" }
subject = { key = "PatientID" }

[logging]
local_enabled = true
local_path = "/var/log/wbhi-sync"
local_rotation = "daily"
"#
        .to_string()
    }

    fn generate_config_with_examples() -> String {
        r#"# wbhi-sync configuration
#
# Reconciles imaging sessions with consent records and moves matched,
# de-identified data into the shared projects.
#
# Values of the form ${VAR} are read from the environment (or a .env file).
# Any scalar can also be overridden with WBHI_<SECTION>_<KEY>, for example
# WBHI_APPLICATION_DRY_RUN=true.

# ============================================================================
# Application Settings
# ============================================================================
[application]
# Log level (trace, debug, info, warn, error)
log_level = "info"

# Read everything, change nothing
dry_run = false

# ============================================================================
# Imaging Platform
# ============================================================================
[platform]
base_url = "https://flywheel.example.edu/api"
api_key = "${WBHI_FW_API_KEY}"

# Request timeout in seconds
timeout_seconds = 60

# Retries for connection failures, timeouts and 5xx responses
[platform.retry]
max_retries = 3
initial_delay_ms = 1000
max_delay_ms = 30000
backoff_multiplier = 2.0

# ============================================================================
# Consent Registry
# ============================================================================
[registry]
api_url = "https://redcap.example.edu/api/"
api_token = "${WBHI_REDCAP_TOKEN}"
timeout_seconds = 60

# ============================================================================
# Sites
# ============================================================================
# One block per site. The id is also the platform group holding the site's
# inbound project. The prefix is the first character of every WBHI-ID
# generated for the site and must be unique.
[[sites]]
id = "ucsd"
prefix = "U"
inbound_project = "Inbound Data"

# Where the PI token lives. With a pattern, the token is its first capture.
pi = { key = "ReferringPhysicianName", pattern = "^([A-Za-z0-9]+)" }

# Where the subject token (matched against the registry) lives
subject = { key = "PatientID" }

# [[sites]]
# id = "uw"
# prefix = "W"
# pi = { key = "InstitutionalDepartmentName" }
# subject = { key = "PatientName", pattern = "^WBHI_(\\w+)$" }

# ============================================================================
# Matching
# ============================================================================
[matching]
# Sessions younger than this many days wait for the next run
ignore_until_n_days_old = 3

# Length of the random part of a WBHI-ID (4-16)
id_suffix_length = 6

# ============================================================================
# Synchronized Copy
# ============================================================================
[copy]
# Group holding temporary copy projects
temp_group = "tmp"

# Seconds between copy status checks
poll_interval_seconds = 10

# Give up on a copy after this many seconds
wait_timeout_seconds = 7200

# ============================================================================
# De-identified Export
# ============================================================================
[deid]
gear_path = "gears/deid-export"
profile_file = "deid_profile.yaml"
pre_deid_project = "wbhi/pre-deid"
deid_project = "wbhi/deid"

# Submission attempts per session (1-10) and the pause between them
submit_attempts = 3
submit_delay_ms = 1000

# ============================================================================
# Logging
# ============================================================================
[logging]
# JSON log file for audit, in addition to the console
local_enabled = true
local_path = "/var/log/wbhi-sync"

# daily or hourly
local_rotation = "daily"
"#
        .to_string()
    }
}
