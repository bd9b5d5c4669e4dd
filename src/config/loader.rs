//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::WbhiConfig;
use super::secret::secret_string;
use crate::domain::errors::WbhiError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (`${VAR}` syntax)
/// 3. Parses the TOML into [`WbhiConfig`]
/// 4. Applies environment variable overrides (`WBHI_*` prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns [`WbhiError::Configuration`] if the file is missing or unreadable,
/// a referenced variable is unset, the TOML is malformed, or validation fails.
///
/// # Examples
///
/// ```no_run
/// use wbhi_sync::config::load_config;
///
/// let config = load_config("wbhi.toml").expect("Failed to load config");
/// println!("{} sites configured", config.sites.len());
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<WbhiConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(WbhiError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        WbhiError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    parse_config(&contents)
}

/// Parses configuration text, applying the same substitution, overrides and
/// validation as [`load_config`]
pub fn parse_config(contents: &str) -> Result<WbhiConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: WbhiConfig = toml::from_str(&contents)
        .map_err(|e| WbhiError::Configuration(format!("Failed to parse TOML: {}", e)))?;

    apply_env_overrides(&mut config);

    config.validate().map_err(|e| {
        WbhiError::Configuration(format!("Configuration validation failed: {}", e))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format `${VAR_NAME}`
///
/// Comment lines are left alone so documented placeholders do not have to be
/// set.
///
/// # Errors
///
/// Returns an error listing every referenced variable that is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| WbhiError::Configuration(format!("Invalid substitution pattern: {}", e)))?;
    let mut result = String::with_capacity(input.len());
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let processed = re.replace_all(line, |cap: &regex::Captures<'_>| {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                    String::new()
                }
            }
        });
        result.push_str(&processed);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(WbhiError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Applies environment variable overrides using the `WBHI_*` prefix
///
/// Variables follow the pattern `WBHI_<SECTION>_<KEY>`, for example
/// `WBHI_PLATFORM_API_KEY` or `WBHI_MATCHING_IGNORE_UNTIL_N_DAYS_OLD`.
/// Unparseable numeric values are ignored.
fn apply_env_overrides(config: &mut WbhiConfig) {
    // Application overrides
    if let Ok(val) = std::env::var("WBHI_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Some(val) = env_parsed("WBHI_APPLICATION_DRY_RUN") {
        config.application.dry_run = val;
    }

    // Platform overrides
    if let Ok(val) = std::env::var("WBHI_PLATFORM_BASE_URL") {
        config.platform.base_url = val;
    }
    if let Ok(val) = std::env::var("WBHI_PLATFORM_API_KEY") {
        config.platform.api_key = secret_string(val);
    }
    if let Some(val) = env_parsed("WBHI_PLATFORM_TIMEOUT_SECONDS") {
        config.platform.timeout_seconds = val;
    }

    // Registry overrides
    if let Ok(val) = std::env::var("WBHI_REGISTRY_API_URL") {
        config.registry.api_url = val;
    }
    if let Ok(val) = std::env::var("WBHI_REGISTRY_API_TOKEN") {
        config.registry.api_token = secret_string(val);
    }

    // Matching overrides
    if let Some(val) = env_parsed("WBHI_MATCHING_IGNORE_UNTIL_N_DAYS_OLD") {
        config.matching.ignore_until_n_days_old = val;
    }

    // Copy overrides
    if let Ok(val) = std::env::var("WBHI_COPY_TEMP_GROUP") {
        config.copy.temp_group = val;
    }
    if let Some(val) = env_parsed("WBHI_COPY_POLL_INTERVAL_SECONDS") {
        config.copy.poll_interval_seconds = val;
    }
    if let Some(val) = env_parsed("WBHI_COPY_WAIT_TIMEOUT_SECONDS") {
        config.copy.wait_timeout_seconds = val;
    }

    // Logging overrides
    if let Some(val) = env_parsed("WBHI_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = val;
    }
    if let Ok(val) = std::env::var("WBHI_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
[platform]
base_url = "https://flywheel.example.edu/api"
api_key = "fw-key"

[registry]
api_url = "https://redcap.example.edu/api/"
api_token = "rc-token"

[[sites]]
id = "ucsd"
prefix = "U"
pi = { key = "ReferringPhysicianName", pattern = "^([A-Za-z]+)" }
subject = { key = "PatientID" }
"#;

    #[test]
    fn test_substitute_env_vars() {
        std::env::set_var("WBHI_LOADER_TEST_VAR", "test_value");
        let input = "api_key = \"${WBHI_LOADER_TEST_VAR}\"";
        let result = substitute_env_vars(input).unwrap();
        assert_eq!(result, "api_key = \"test_value\"\n");
        std::env::remove_var("WBHI_LOADER_TEST_VAR");
    }

    #[test]
    fn test_substitute_env_vars_missing() {
        std::env::remove_var("WBHI_LOADER_MISSING_VAR");
        let input = "api_key = \"${WBHI_LOADER_MISSING_VAR}\"";
        let err = substitute_env_vars(input).unwrap_err();
        assert!(err.to_string().contains("WBHI_LOADER_MISSING_VAR"));
    }

    #[test]
    fn test_substitute_skips_comments() {
        std::env::remove_var("WBHI_LOADER_COMMENTED_VAR");
        let input = "# api_key = \"${WBHI_LOADER_COMMENTED_VAR}\"";
        assert!(substitute_env_vars(input).is_ok());
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent-wbhi.toml");
        assert!(matches!(result, Err(WbhiError::Configuration(_))));
    }

    #[test]
    fn test_load_config_valid() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(MINIMAL.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.sites.len(), 1);
        assert_eq!(config.sites[0].prefix, 'U');
        assert_eq!(config.sites[0].inbound_project, "Inbound Data");
        assert_eq!(config.registry.api_token.expose_secret(), "rc-token");
        assert_eq!(config.matching.id_suffix_length, 6);
        assert_eq!(config.deid.gear_path, "gears/deid-export");
    }

    #[test]
    fn test_parse_config_rejects_invalid() {
        let broken = MINIMAL.replace("prefix = \"U\"", "prefix = \"-\"");
        let err = parse_config(&broken).unwrap_err();
        assert!(err.to_string().contains("validation failed"));
    }

    #[test]
    fn test_parse_config_rejects_bad_toml() {
        assert!(parse_config("[platform\nbase_url = 1").is_err());
    }
}
