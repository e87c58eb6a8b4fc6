//! Configuration models for waypoint.
//!
//! All I^R (resolvable ignorance) is parameterized here.
//! The user resolves these unknowns at runtime via config file.

use crate::client::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for waypoint.
///
/// I^R resolved: All configurable parameters are explicit, every section optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Autocomplete endpoint
    #[serde(default)]
    pub places: PlacesConfig,

    /// Retry policy for the autocomplete endpoint
    #[serde(default)]
    pub retry: RetryConfig,

    /// Interaction controller settings
    #[serde(default)]
    pub autocomplete: AutocompleteConfig,

    /// Error log settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Autocomplete endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacesConfig {
    /// Full URL of the autocomplete endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// API key (may contain ${ENV_VAR} placeholders)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Extra headers to send; values may contain ${ENV_VAR} placeholders
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Per-attempt timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_endpoint() -> String {
    "http://localhost:3000/api/places/autocomplete".to_string()
}

fn default_api_key_env() -> String {
    "WAYPOINT_PLACES_API_KEY".to_string()
}

fn default_timeout_ms() -> u64 {
    8_000
}

impl Default for PlacesConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: None,
            api_key_env: default_api_key_env(),
            headers: HashMap::new(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl PlacesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Retry policy, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first (>= 1)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Cap on the un-jittered delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Growth factor between retries (> 1)
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Upper bound (exclusive) of the random jitter added to each delay
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    5_000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_max_jitter_ms() -> u64 {
    1_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_jitter_ms: default_max_jitter_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_factor: self.backoff_factor,
            max_jitter: Duration::from_millis(self.max_jitter_ms),
        }
    }
}

/// Interaction controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutocompleteConfig {
    /// Quiet period before a keystroke triggers a lookup
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// How many times the user may retry a failed lookup before the
    /// retry affordance is hidden
    #[serde(default = "default_max_manual_retries")]
    pub max_manual_retries: u32,
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_max_manual_retries() -> u32 {
    2
}

impl Default for AutocompleteConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            max_manual_retries: default_max_manual_retries(),
        }
    }
}

impl AutocompleteConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Error log configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Append classified errors as JSON lines to this file.
    /// When unset, errors go to the tracing subscriber only.
    #[serde(default)]
    pub error_log: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// B_i(file exists) → Result
    /// B_i(file is valid TOML) → Result
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if !(self.retry.backoff_factor > 1.0) {
            return Err(ConfigError::Invalid(format!(
                "retry.backoff_factor must be greater than 1 (got {})",
                self.retry.backoff_factor
            )));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(ConfigError::Invalid(
                "retry.max_delay_ms must not be below retry.base_delay_ms".to_string(),
            ));
        }
        if self.places.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "places.timeout_ms must be positive".to_string(),
            ));
        }
        if self.places.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "places.endpoint must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the API key from config or environment.
    ///
    /// Local proxies usually need no key, so absence is not an error.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = &self.places.api_key {
            return Some(expand_env_vars(key));
        }
        std::env::var(&self.places.api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
    }

    /// Headers with ${ENV_VAR} placeholders expanded.
    pub fn resolved_headers(&self) -> HashMap<String, String> {
        expand_headers(&self.places.headers)
    }
}

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax.
/// If the variable is not set, the placeholder is left unchanged.
pub fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let Ok(re) = regex::Regex::new(r"\$\{([^}]+)\}") else {
        return result;
    };

    for cap in re.captures_iter(s) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}

/// Expand environment variables in all headers.
pub fn expand_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
    headers
        .iter()
        .map(|(k, v)| (k.clone(), expand_env_vars(v)))
        .collect()
}

/// Configuration errors.
///
/// Epistemic origin:
/// - B_i falsified: File not found, parse error
/// - K_i violated: Values outside their valid range
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("waypoint.toml");
        std::fs::write(&path, "").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.places.timeout(), Duration::from_millis(8_000));
        assert_eq!(config.autocomplete.debounce(), Duration::from_millis(300));
        assert_eq!(config.autocomplete.max_manual_retries, 2);

        let policy = config.retry.policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(1_000));
        assert_eq!(policy.max_delay, Duration::from_millis(5_000));
        assert_eq!(policy.backoff_factor, 2.0);
    }

    #[test]
    fn test_partial_override() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("waypoint.toml");
        std::fs::write(
            &path,
            r#"
[places]
endpoint = "https://trips.example.com/api/places/autocomplete"
timeout_ms = 2000

[retry]
max_attempts = 5

[logging]
error_log = "logs/errors.jsonl"
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(
            config.places.endpoint,
            "https://trips.example.com/api/places/autocomplete"
        );
        assert_eq!(config.places.timeout_ms, 2_000);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 1_000);
        assert_eq!(
            config.logging.error_log,
            Some(PathBuf::from("logs/errors.jsonl"))
        );
    }

    #[test]
    fn test_rejects_invalid_retry() {
        let mut config = Config::default();
        config.retry.backoff_factor = 1.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_file_and_bad_toml() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("absent.toml");
        assert!(matches!(
            Config::from_file(&missing),
            Err(ConfigError::FileRead { .. })
        ));

        let bad = temp_dir.path().join("bad.toml");
        std::fs::write(&bad, "[retry\nmax_attempts = ").unwrap();
        assert!(matches!(
            Config::from_file(&bad),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_expand_env_vars_leaves_unknown_placeholders() {
        assert_eq!(
            expand_env_vars("Bearer ${WAYPOINT_TEST_SURELY_UNSET_VAR}"),
            "Bearer ${WAYPOINT_TEST_SURELY_UNSET_VAR}"
        );
        assert_eq!(expand_env_vars("plain"), "plain");
    }
}
