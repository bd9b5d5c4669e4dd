//! Configuration schema types
//!
//! This module defines the configuration structure for wbhi-sync.

use crate::config::SecretString;
use crate::domain::ids::SiteId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Main wbhi-sync configuration
///
/// This is the root configuration structure that maps to the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WbhiConfig {
    /// Application-level settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Imaging platform connection
    pub platform: PlatformConfig,

    /// Consent registry connection
    pub registry: RegistryConfig,

    /// Recognised sites
    pub sites: Vec<SiteConfig>,

    /// Matching and identifier settings
    #[serde(default)]
    pub matching: MatchingConfig,

    /// Smart-copy settings
    #[serde(default)]
    pub copy: CopyConfig,

    /// De-identification export settings
    #[serde(default)]
    pub deid: DeidConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl WbhiConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.platform.validate()?;
        self.registry.validate()?;

        if self.sites.is_empty() {
            return Err("at least one [[sites]] entry is required".to_string());
        }
        let mut ids = HashSet::new();
        let mut prefixes = HashSet::new();
        for site in &self.sites {
            site.validate()?;
            if !ids.insert(site.id.clone()) {
                return Err(format!("duplicate site id '{}'", site.id));
            }
            if !prefixes.insert(site.prefix) {
                return Err(format!(
                    "site '{}' reuses id prefix '{}'",
                    site.id, site.prefix
                ));
            }
        }

        self.matching.validate()?;
        self.copy.validate()?;
        self.deid.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Looks up a site by ID
    pub fn site(&self, id: &SiteId) -> Option<&SiteConfig> {
        self.sites.iter().find(|s| &s.id == id)
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Dry run mode (read everything, change nothing)
    #[serde(default)]
    pub dry_run: bool,
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            dry_run: false,
        }
    }
}

/// Retry configuration for HTTP requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Initial delay in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Maximum delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

/// Imaging platform configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Base URL of the platform API, e.g. `https://flywheel.example.edu/api`
    pub base_url: String,

    /// API key, stored securely in memory and zeroized on drop
    pub api_key: SecretString,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Retry configuration for transient failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl PlatformConfig {
    fn validate(&self) -> Result<(), String> {
        use secrecy::ExposeSecret;

        validate_url("platform.base_url", &self.base_url)?;
        if self.api_key.expose_secret().is_empty() {
            return Err("platform.api_key cannot be empty".to_string());
        }
        if self.timeout_seconds == 0 {
            return Err("platform.timeout_seconds must be > 0".to_string());
        }
        if self.retry.max_retries == 0 {
            return Err("platform.retry.max_retries must be > 0".to_string());
        }
        Ok(())
    }
}

/// Consent registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// REDCap API URL
    pub api_url: String,

    /// REDCap project API token
    pub api_token: SecretString,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl RegistryConfig {
    fn validate(&self) -> Result<(), String> {
        use secrecy::ExposeSecret;

        validate_url("registry.api_url", &self.api_url)?;
        if self.api_token.expose_secret().is_empty() {
            return Err("registry.api_token cannot be empty".to_string());
        }
        if self.timeout_seconds == 0 {
            return Err("registry.timeout_seconds must be > 0".to_string());
        }
        Ok(())
    }
}

/// Where a token lives in the DICOM header
///
/// `pattern`, when set, must contain one capture group; the token is the
/// first group of the first match. Without a pattern the whole value is used.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeaderTokenRule {
    /// DICOM keyword, e.g. `PatientID`
    pub key: String,

    /// Optional regex narrowing the value
    #[serde(default)]
    pub pattern: Option<String>,
}

impl HeaderTokenRule {
    fn validate(&self, name: &str) -> Result<(), String> {
        if self.key.trim().is_empty() {
            return Err(format!("{name}.key cannot be empty"));
        }
        if let Some(pattern) = &self.pattern {
            let re = Regex::new(pattern)
                .map_err(|e| format!("{name}.pattern is not a valid regex: {e}"))?;
            if re.captures_len() < 2 {
                return Err(format!("{name}.pattern must contain a capture group"));
            }
        }
        Ok(())
    }
}

/// Per-site configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Site ID, also the platform group
    pub id: SiteId,

    /// One-character WBHI-ID prefix
    pub prefix: char,

    /// Label of the site's inbound project
    #[serde(default = "default_inbound_project")]
    pub inbound_project: String,

    /// Where the operator (PI) token lives
    pub pi: HeaderTokenRule,

    /// Where the subject token lives
    pub subject: HeaderTokenRule,
}

impl SiteConfig {
    fn validate(&self) -> Result<(), String> {
        if !self.prefix.is_ascii_alphanumeric() {
            return Err(format!(
                "site '{}' prefix must be an ASCII letter or digit, got '{}'",
                self.id, self.prefix
            ));
        }
        if self.inbound_project.trim().is_empty() {
            return Err(format!("site '{}' inbound_project cannot be empty", self.id));
        }
        self.pi.validate(&format!("sites.{}.pi", self.id))?;
        self.subject.validate(&format!("sites.{}.subject", self.id))?;
        Ok(())
    }

    /// Lookup path of the inbound project
    pub fn inbound_path(&self) -> String {
        format!("{}/{}", self.id, self.inbound_project)
    }
}

/// Upper bound for `matching.ignore_until_n_days_old` (about ten years)
const MAX_IGNORE_DAYS: i64 = 3650;

/// Matching and identifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Sessions younger than this are not considered yet
    #[serde(default = "default_ignore_until_n_days_old")]
    pub ignore_until_n_days_old: i64,

    /// Length of the random WBHI-ID suffix
    #[serde(default = "default_id_suffix_length")]
    pub id_suffix_length: usize,
}

impl MatchingConfig {
    fn validate(&self) -> Result<(), String> {
        if self.ignore_until_n_days_old < 0 {
            return Err(format!(
                "matching.ignore_until_n_days_old must be >= 0, got {}",
                self.ignore_until_n_days_old
            ));
        }
        if self.ignore_until_n_days_old > MAX_IGNORE_DAYS {
            return Err(format!(
                "matching.ignore_until_n_days_old must be <= {MAX_IGNORE_DAYS}, got {}",
                self.ignore_until_n_days_old
            ));
        }
        if !(4..=16).contains(&self.id_suffix_length) {
            return Err(format!(
                "matching.id_suffix_length must be between 4 and 16, got {}",
                self.id_suffix_length
            ));
        }
        Ok(())
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            ignore_until_n_days_old: default_ignore_until_n_days_old(),
            id_suffix_length: default_id_suffix_length(),
        }
    }
}

/// Smart-copy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyConfig {
    /// Group that holds temporary copy projects
    #[serde(default = "default_temp_group")]
    pub temp_group: String,

    /// Seconds between copy-status checks
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,

    /// Maximum seconds to wait for a copy to complete
    #[serde(default = "default_wait_timeout_seconds")]
    pub wait_timeout_seconds: u64,
}

impl CopyConfig {
    fn validate(&self) -> Result<(), String> {
        if self.temp_group.trim().is_empty() {
            return Err("copy.temp_group cannot be empty".to_string());
        }
        if self.poll_interval_seconds == 0 {
            return Err("copy.poll_interval_seconds must be > 0".to_string());
        }
        if self.wait_timeout_seconds < self.poll_interval_seconds {
            return Err(format!(
                "copy.wait_timeout_seconds ({}) must be >= copy.poll_interval_seconds ({})",
                self.wait_timeout_seconds, self.poll_interval_seconds
            ));
        }
        Ok(())
    }
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            temp_group: default_temp_group(),
            poll_interval_seconds: default_poll_interval_seconds(),
            wait_timeout_seconds: default_wait_timeout_seconds(),
        }
    }
}

/// De-identification export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeidConfig {
    /// Lookup path of the export gear
    #[serde(default = "default_gear_path")]
    pub gear_path: String,

    /// De-identification profile file on the pre-deid project
    #[serde(default = "default_profile_file")]
    pub profile_file: String,

    /// Project matched sessions are moved into
    #[serde(default = "default_pre_deid_project")]
    pub pre_deid_project: String,

    /// Destination of the export
    #[serde(default = "default_deid_project")]
    pub deid_project: String,

    /// Job submission attempts
    #[serde(default = "default_submit_attempts")]
    pub submit_attempts: usize,

    /// Delay between submission attempts in milliseconds
    #[serde(default = "default_submit_delay_ms")]
    pub submit_delay_ms: u64,
}

impl DeidConfig {
    fn validate(&self) -> Result<(), String> {
        for (name, path) in [
            ("deid.gear_path", &self.gear_path),
            ("deid.pre_deid_project", &self.pre_deid_project),
            ("deid.deid_project", &self.deid_project),
        ] {
            if path.split('/').filter(|p| !p.is_empty()).count() != 2 {
                return Err(format!("{name} must look like '<group>/<label>', got '{path}'"));
            }
        }
        if self.profile_file.trim().is_empty() {
            return Err("deid.profile_file cannot be empty".to_string());
        }
        if self.submit_attempts == 0 || self.submit_attempts > 10 {
            return Err(format!(
                "deid.submit_attempts must be between 1 and 10, got {}",
                self.submit_attempts
            ));
        }
        Ok(())
    }
}

impl Default for DeidConfig {
    fn default() -> Self {
        Self {
            gear_path: default_gear_path(),
            profile_file: default_profile_file(),
            pre_deid_project: default_pre_deid_project(),
            deid_project: default_deid_project(),
            submit_attempts: default_submit_attempts(),
            submit_delay_ms: default_submit_delay_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable local file logging
    #[serde(default = "default_true")]
    pub local_enabled: bool,

    /// Local log file path
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Log rotation strategy
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "hourly"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: true,
            local_path: default_local_path(),
            local_rotation: default_local_rotation(),
        }
    }
}

fn validate_url(name: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{name} cannot be empty"));
    }
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(format!("{name} must start with http:// or https://"));
    }
    url::Url::parse(value).map_err(|e| format!("{name} is not a valid URL: {e}"))?;
    Ok(())
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout_seconds() -> u64 {
    60
}

fn default_max_retries() -> usize {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_inbound_project() -> String {
    "Inbound Data".to_string()
}

fn default_ignore_until_n_days_old() -> i64 {
    3
}

fn default_id_suffix_length() -> usize {
    6
}

fn default_temp_group() -> String {
    "tmp".to_string()
}

fn default_poll_interval_seconds() -> u64 {
    10
}

fn default_wait_timeout_seconds() -> u64 {
    7200
}

fn default_gear_path() -> String {
    "gears/deid-export".to_string()
}

fn default_profile_file() -> String {
    "deid_profile.yaml".to_string()
}

fn default_pre_deid_project() -> String {
    "wbhi/pre-deid".to_string()
}

fn default_deid_project() -> String {
    "wbhi/deid".to_string()
}

fn default_submit_attempts() -> usize {
    3
}

fn default_submit_delay_ms() -> u64 {
    1000
}

fn default_local_path() -> String {
    "/var/log/wbhi-sync".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secret_string;

    fn site(id: &str, prefix: char) -> SiteConfig {
        SiteConfig {
            id: SiteId::new(id).unwrap(),
            prefix,
            inbound_project: default_inbound_project(),
            pi: HeaderTokenRule {
                key: "ReferringPhysicianName".to_string(),
                pattern: None,
            },
            subject: HeaderTokenRule {
                key: "PatientID".to_string(),
                pattern: None,
            },
        }
    }

    fn config() -> WbhiConfig {
        WbhiConfig {
            application: ApplicationConfig::default(),
            platform: PlatformConfig {
                base_url: "https://flywheel.example.edu/api".to_string(),
                api_key: secret_string("fw-key".to_string()),
                timeout_seconds: 60,
                retry: RetryConfig::default(),
            },
            registry: RegistryConfig {
                api_url: "https://redcap.example.edu/api/".to_string(),
                api_token: secret_string("rc-token".to_string()),
                timeout_seconds: 60,
            },
            sites: vec![site("ucsd", 'U'), site("stanford", 'S')],
            matching: MatchingConfig::default(),
            copy: CopyConfig::default(),
            deid: DeidConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_application_config_validation() {
        let mut config = ApplicationConfig::default();
        assert!(config.validate().is_ok());

        config.log_level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_prefix_rejected() {
        let mut config = config();
        config.sites.push(site("ucb", 'U'));
        let err = config.validate().unwrap_err();
        assert!(err.contains("reuses id prefix"));
    }

    #[test]
    fn test_duplicate_site_rejected() {
        let mut config = config();
        config.sites.push(site("ucsd", 'X'));
        assert!(config.validate().unwrap_err().contains("duplicate site id"));
    }

    #[test]
    fn test_empty_sites_rejected() {
        let mut config = config();
        config.sites.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_header_rule_requires_capture_group() {
        let mut config = config();
        config.sites[0].pi.pattern = Some("^[a-z]+$".to_string());
        assert!(config.validate().unwrap_err().contains("capture group"));

        config.sites[0].pi.pattern = Some("^([a-z]+)\\^".to_string());
        assert!(config.validate().is_ok());

        config.sites[0].pi.pattern = Some("([a-z".to_string());
        assert!(config.validate().unwrap_err().contains("not a valid regex"));
    }

    #[test]
    fn test_platform_url_validation() {
        let mut config = config();
        config.platform.base_url = "flywheel.example.edu".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_copy_config_validation() {
        let mut copy = CopyConfig::default();
        assert!(copy.validate().is_ok());

        copy.wait_timeout_seconds = 5;
        assert!(copy.validate().is_err());

        copy.wait_timeout_seconds = 7200;
        copy.poll_interval_seconds = 0;
        assert!(copy.validate().is_err());
    }

    #[test]
    fn test_deid_paths_must_be_group_label() {
        let mut deid = DeidConfig::default();
        assert!(deid.validate().is_ok());

        deid.deid_project = "deid".to_string();
        assert!(deid.validate().is_err());
    }

    #[test]
    fn test_matching_config_validation() {
        let mut matching = MatchingConfig::default();
        assert!(matching.validate().is_ok());

        matching.id_suffix_length = 2;
        assert!(matching.validate().is_err());

        matching.id_suffix_length = 6;
        matching.ignore_until_n_days_old = -1;
        assert!(matching.validate().is_err());

        matching.ignore_until_n_days_old = 3650;
        assert!(matching.validate().is_ok());
        matching.ignore_until_n_days_old = i64::MAX;
        assert!(matching.validate().is_err());
    }

    #[test]
    fn test_logging_rotation_validation() {
        let mut logging = LoggingConfig::default();
        assert!(logging.validate().is_ok());

        logging.local_rotation = "hourly".to_string();
        assert!(logging.validate().is_ok());

        logging.local_rotation = "size".to_string();
        assert!(logging.validate().is_err());
    }

    #[test]
    fn test_site_lookup_and_paths() {
        let config = config();
        let ucsd = config.site(&SiteId::new("ucsd").unwrap()).unwrap();
        assert_eq!(ucsd.prefix, 'U');
        assert_eq!(ucsd.inbound_path(), "ucsd/Inbound Data");
        assert!(config.site(&SiteId::new("ucb").unwrap()).is_none());
    }

    #[test]
    fn test_default_values() {
        assert_eq!(default_log_level(), "info");
        assert_eq!(default_id_suffix_length(), 6);
        assert_eq!(default_temp_group(), "tmp");
        assert_eq!(default_wait_timeout_seconds(), 7200);
        assert_eq!(default_gear_path(), "gears/deid-export");
        assert_eq!(default_submit_attempts(), 3);
    }
}
