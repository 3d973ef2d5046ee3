//! Configuration loading from TOML files

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::projector::{EvalErrorPolicy, FieldProjector};
use crate::retry::RetryPolicy;
use crate::worker::WorkerConfig;

/// Built-in projection: output field → filter expression
const DEFAULT_LOOP_FILTERS: &[(&str, &str)] = &[
    ("last-updated", "dateTime"),
    ("current.barometer", "barometer"),
    ("current.altimeter", "altimeter"),
    ("current.pressure", "pressure"),
    ("current.outTemp", "outTemp"),
    ("current.dewpoint", "dewpoint"),
    ("current.windchill", "windchill"),
    ("current.heatindex", "heatindex"),
    ("current.appTemp", "appTemp"),
    ("current.outHumidity", "outHumidity"),
    ("current.humidex", "humidex"),
    ("current.radiation", "radiation"),
    ("current.UV", "UV"),
    ("current.windDir", "windDir"),
    ("current.windSpeed", "windSpeed"),
    ("current.rain", "rain"),
    ("current.rainRate", "rainRate"),
    ("current.cloudbase", "cloudbase"),
    ("current.soilMoist1", "soilMoist1"),
    ("current.soilTemp1", "soilTemp1"),
];

/// The built-in filter set as an owned map
pub fn default_loop_filters() -> BTreeMap<String, String> {
    DEFAULT_LOOP_FILTERS
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Poster configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Target URL (required)
    #[serde(deserialize_with = "deserialize_env_var")]
    pub endpoint: Option<String>,
    /// Credential sent base64-encoded in the `key` header (required)
    #[serde(deserialize_with = "deserialize_env_var")]
    pub key: Option<String>,
    /// Output field → filter expression, merged over the defaults
    pub loop_filters: BTreeMap<String, String>,
    /// Start from the built-in filter set
    pub default_filters: bool,
    /// Seconds between delivery attempts
    pub post_interval: f64,
    /// Backlog capacity; unbounded when unset
    pub max_backlog: Option<usize>,
    /// Discard samples older than this many seconds
    pub stale: Option<f64>,
    /// Per-request timeout in seconds
    pub timeout: f64,
    pub max_tries: u32,
    /// Seconds between retries
    pub retry_wait: f64,
    pub log_success: bool,
    pub log_failure: bool,
    pub skip_upload: bool,
    pub user_agent: String,
    pub eval_errors: EvalErrorPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            key: None,
            loop_filters: BTreeMap::new(),
            default_filters: true,
            post_interval: 2.0,
            max_backlog: None,
            stale: None,
            timeout: 10.0,
            max_tries: 3,
            retry_wait: 5.0,
            log_success: false,
            log_failure: true,
            skip_upload: false,
            user_agent: format!("weepost/{}", env!("CARGO_PKG_VERSION")),
            eval_errors: EvalErrorPolicy::default(),
        }
    }
}

/// Deserialize a string that may contain environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

fn seconds(name: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| anyhow::anyhow!("{name} must be a non-negative number of seconds, got {value}"))
}

/// The value as given; blank counts as missing.
fn required<'a>(name: &str, value: Option<&'a String>) -> Result<&'a str> {
    match value {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => anyhow::bail!("missing required option '{name}'"),
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./weepost.toml (current directory)
    /// 2. ~/.config/weepost/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("weepost.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "weepost") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Filters in effect: defaults (unless disabled) overridden by `loop_filters`
    pub fn effective_filters(&self) -> BTreeMap<String, String> {
        let mut filters = if self.default_filters {
            default_loop_filters()
        } else {
            BTreeMap::new()
        };
        filters.extend(self.loop_filters.clone());
        filters
    }

    /// Compile the effective filters. Any malformed expression is fatal.
    pub fn projector(&self) -> Result<FieldProjector> {
        let filters = self.effective_filters();
        let projector = FieldProjector::compile(
            filters.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            self.eval_errors,
        )?;
        Ok(projector)
    }

    /// Validate and convert into worker settings.
    pub fn worker_config(&self) -> Result<WorkerConfig> {
        let endpoint = required("endpoint", self.endpoint.as_ref())?.trim();
        let key = required("key", self.key.as_ref())?;
        anyhow::ensure!(
            endpoint.starts_with("http://") || endpoint.starts_with("https://"),
            "endpoint must be an http(s) URL, got {endpoint:?}"
        );
        anyhow::ensure!(self.max_tries >= 1, "max_tries must be at least 1");
        anyhow::ensure!(self.timeout > 0.0, "timeout must be positive");

        Ok(WorkerConfig {
            endpoint: endpoint.to_string(),
            key: key.to_string(),
            post_interval: seconds("post_interval", self.post_interval)?,
            stale: self.stale.map(|s| seconds("stale", s)).transpose()?,
            timeout: seconds("timeout", self.timeout)?,
            retry: RetryPolicy {
                max_tries: self.max_tries,
                wait: seconds("retry_wait", self.retry_wait)?,
            },
            log_success: self.log_success,
            log_failure: self.log_failure,
            skip_upload: self.skip_upload,
        })
    }

    pub fn backlog_capacity(&self) -> usize {
        self.max_backlog.unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> Config {
        toml::from_str(
            r#"
endpoint = "http://127.0.0.1/weewx/live.php"
key = "f38cxZ92m8EgX203Grnv-2"
"#,
        )
        .unwrap()
    }

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.post_interval, 2.0);
        assert_eq!(config.timeout, 10.0);
        assert_eq!(config.max_tries, 3);
        assert_eq!(config.retry_wait, 5.0);
        assert!(config.stale.is_none());
        assert_eq!(config.backlog_capacity(), usize::MAX);
        assert!(!config.log_success);
        assert!(config.log_failure);
        assert!(config.user_agent.starts_with("weepost/"));
    }

    #[test]
    fn default_filters_present() {
        let filters = Config::default().effective_filters();
        assert_eq!(filters.len(), 20);
        assert_eq!(filters["last-updated"], "dateTime");
        assert_eq!(filters["current.outTemp"], "outTemp");
    }

    #[test]
    fn user_filters_merge_over_defaults() {
        let config: Config = toml::from_str(
            r#"
[loop_filters]
"current.outTemp" = "(outTemp - 32) * 5 / 9"
"current.dewpointC" = "(dewpoint - 32) * 5 / 9"
"#,
        )
        .unwrap();
        let filters = config.effective_filters();
        assert_eq!(filters.len(), 21);
        assert_eq!(filters["current.outTemp"], "(outTemp - 32) * 5 / 9");
        assert_eq!(filters["current.barometer"], "barometer");
    }

    #[test]
    fn defaults_can_be_disabled() {
        let config: Config = toml::from_str(
            r#"
default_filters = false
[loop_filters]
t = "outTemp"
"#,
        )
        .unwrap();
        assert_eq!(config.effective_filters().len(), 1);
    }

    #[test]
    fn worker_config_from_minimal() {
        let wc = minimal().worker_config().unwrap();
        assert_eq!(wc.endpoint, "http://127.0.0.1/weewx/live.php");
        assert_eq!(wc.post_interval, Duration::from_secs(2));
        assert_eq!(wc.timeout, Duration::from_secs(10));
        assert_eq!(wc.retry.max_tries, 3);
        assert_eq!(wc.retry.wait, Duration::from_secs(5));
        assert!(wc.stale.is_none());
    }

    #[test]
    fn missing_endpoint_or_key_is_error() {
        let err = Config::default().worker_config().unwrap_err();
        assert!(err.to_string().contains("'endpoint'"));

        let config: Config = toml::from_str(r#"endpoint = "http://x/""#).unwrap();
        let err = config.worker_config().unwrap_err();
        assert!(err.to_string().contains("'key'"));
    }

    #[test]
    fn key_sent_verbatim() {
        let config = Config {
            endpoint: Some("  http://127.0.0.1/live  ".into()),
            key: Some(" abc ".into()),
            ..minimal()
        };
        let wc = config.worker_config().unwrap();
        assert_eq!(wc.key, " abc ");
        assert_eq!(wc.endpoint, "http://127.0.0.1/live");
    }

    #[test]
    fn blank_key_is_missing() {
        let config = Config {
            key: Some("   ".into()),
            ..minimal()
        };
        let err = config.worker_config().unwrap_err();
        assert!(err.to_string().contains("'key'"));
    }

    #[test]
    fn invalid_numbers_rejected() {
        let config = Config {
            max_tries: 0,
            ..minimal()
        };
        assert!(config.worker_config().is_err());

        let config = Config {
            retry_wait: -1.0,
            ..minimal()
        };
        assert!(config.worker_config().unwrap_err().to_string().contains("retry_wait"));

        let config = Config {
            endpoint: Some("ftp://host/".into()),
            ..minimal()
        };
        assert!(config.worker_config().is_err());
    }

    #[test]
    fn fractional_seconds() {
        let config = Config {
            post_interval: 0.5,
            stale: Some(30.0),
            ..minimal()
        };
        let wc = config.worker_config().unwrap();
        assert_eq!(wc.post_interval, Duration::from_millis(500));
        assert_eq!(wc.stale, Some(Duration::from_secs(30)));
    }

    #[test]
    fn malformed_filter_fails_projector() {
        let config: Config = toml::from_str(
            r#"
[loop_filters]
broken = "outTemp * (2"
"#,
        )
        .unwrap();
        let err = config.projector().unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn eval_errors_policy_parses() {
        let config: Config = toml::from_str(r#"eval_errors = "skip""#).unwrap();
        assert_eq!(config.eval_errors, EvalErrorPolicy::Skip);
        assert!(toml::from_str::<Config>(r#"eval_errors = "ignore""#).is_err());
    }

    #[test]
    fn expand_env_var_simple() {
        std::env::set_var("WEEPOST_TEST_KEY", "from-env");
        assert_eq!(
            expand_env_var("${WEEPOST_TEST_KEY}"),
            Some("from-env".to_string())
        );
        std::env::remove_var("WEEPOST_TEST_KEY");
    }

    #[test]
    fn expand_env_var_literal() {
        assert_eq!(expand_env_var("literal"), Some("literal".to_string()));
    }

    #[test]
    fn expand_env_var_missing() {
        assert_eq!(expand_env_var("${NONEXISTENT_VAR_12345}"), None);
    }

    #[test]
    fn from_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weepost.toml");
        std::fs::write(
            &path,
            r#"
endpoint = "https://example.com/live.php"
key = "k"
post_interval = 5
max_backlog = 100
stale = 60
log_success = true
"#,
        )
        .unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.backlog_capacity(), 100);
        assert_eq!(config.post_interval, 5.0);
        assert!(config.log_success);
    }

    #[test]
    fn from_file_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "endpoint = ").unwrap();
        let err = Config::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
