//! Configuration: TOML file under the XDG config dir, validated at startup.
//!
//! Identity (endpoint, container, credential) usually comes from CLI flags;
//! the file carries tuning defaults so repeated runs against the same
//! account don't need a wall of flags. Anything invalid is a startup error,
//! never a runtime one.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::controller::AimdOptions;
use crate::retry::RetryPolicy;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum retries per task after the first attempt.
    pub max_retries: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_secs: 0.25,
            max_delay_secs: 30,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            base_delay: Duration::from_secs_f64(cfg.base_delay_secs.max(0.0)),
            max_delay: Duration::from_secs(cfg.max_delay_secs),
        }
    }
}

/// Concurrency controller parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Lower bound on the adaptive concurrency limit.
    pub min_concurrency: usize,
    /// Upper bound on the adaptive concurrency limit.
    pub max_concurrency: usize,
    /// Concurrency limit at the start of a run.
    pub initial_concurrency: usize,
    /// Completed attempts per AIMD adjustment window.
    pub adjust_window: u32,
    /// Raise the limit while the window error rate stays below this.
    pub low_error_rate: f64,
    /// Lower the limit when the window error rate exceeds this.
    pub high_error_rate: f64,
    /// Additive raise as a fraction of the current limit.
    pub increase_fraction: f64,
    /// Multiplicative factor applied when backing off.
    pub decrease_factor: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        let d = AimdOptions::default();
        Self {
            min_concurrency: d.min_concurrency,
            max_concurrency: d.max_concurrency,
            initial_concurrency: d.initial_concurrency,
            adjust_window: d.adjust_window,
            low_error_rate: d.low_error_rate,
            high_error_rate: d.high_error_rate,
            increase_fraction: d.increase_fraction,
            decrease_factor: d.decrease_factor,
        }
    }
}

impl From<&ControllerConfig> for AimdOptions {
    fn from(cfg: &ControllerConfig) -> Self {
        Self {
            min_concurrency: cfg.min_concurrency,
            max_concurrency: cfg.max_concurrency,
            initial_concurrency: cfg.initial_concurrency,
            adjust_window: cfg.adjust_window,
            low_error_rate: cfg.low_error_rate,
            high_error_rate: cfg.high_error_rate,
            increase_fraction: cfg.increase_fraction,
            decrease_factor: cfg.decrease_factor,
        }
    }
}

/// Global configuration loaded from `~/.config/undel/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndelConfig {
    /// Default account endpoint; overridable with `--endpoint`.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Default container; overridable with `--container`.
    #[serde(default)]
    pub container: Option<String>,
    /// Timeout per restore call, in seconds.
    pub call_timeout_secs: u64,
    /// Interval between progress report lines, in seconds.
    pub report_interval_secs: u64,
    /// Concurrency controller tuning; built-in defaults if missing.
    #[serde(default)]
    pub controller: ControllerConfig,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for UndelConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            container: None,
            call_timeout_secs: 30,
            report_interval_secs: 2,
            controller: ControllerConfig::default(),
            retry: None,
        }
    }
}

impl UndelConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
            .as_ref()
            .map(RetryPolicy::from)
            .unwrap_or_default()
    }

    pub fn aimd_options(&self) -> AimdOptions {
        AimdOptions::from(&self.controller)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    /// Check tuning parameters; identity is validated separately once merged
    /// with CLI flags.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.controller;
        if c.min_concurrency == 0 {
            return Err(ConfigError::Invalid("min_concurrency must be at least 1".into()));
        }
        if c.min_concurrency > c.max_concurrency {
            return Err(ConfigError::Invalid(format!(
                "min_concurrency ({}) exceeds max_concurrency ({})",
                c.min_concurrency, c.max_concurrency
            )));
        }
        if c.adjust_window == 0 {
            return Err(ConfigError::Invalid("adjust_window must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&c.low_error_rate) || !(0.0..=1.0).contains(&c.high_error_rate) {
            return Err(ConfigError::Invalid("error rate thresholds must be within [0, 1]".into()));
        }
        if c.low_error_rate > c.high_error_rate {
            return Err(ConfigError::Invalid(
                "low_error_rate exceeds high_error_rate".into(),
            ));
        }
        if !(c.decrease_factor > 0.0 && c.decrease_factor < 1.0) {
            return Err(ConfigError::Invalid(
                "decrease_factor must be strictly between 0 and 1".into(),
            ));
        }
        if self.call_timeout_secs == 0 {
            return Err(ConfigError::Invalid("call_timeout_secs must be at least 1".into()));
        }
        if self.report_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "report_interval_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Startup configuration error. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("invalid endpoint {url:?}: {reason}")]
    InvalidEndpoint { url: String, reason: String },
    #[error("invalid container name {name:?}: {reason}")]
    InvalidContainer { name: String, reason: String },
}

/// Validate and parse a storage account endpoint:
/// `https://<account>.(blob|dfs).core.windows.net`.
pub fn validate_endpoint(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidEndpoint {
        url: raw.to_string(),
        reason: reason.to_string(),
    };
    let url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
    if url.scheme() != "https" {
        return Err(invalid("scheme must be https"));
    }
    let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
    let account = host
        .strip_suffix(".blob.core.windows.net")
        .or_else(|| host.strip_suffix(".dfs.core.windows.net"))
        .ok_or_else(|| invalid("host must be an *.blob.core.windows.net or *.dfs.core.windows.net account endpoint"))?;
    if !(3..=24).contains(&account.len())
        || !account.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Err(invalid(
            "account name must be 3-24 lowercase letters and digits",
        ));
    }
    if url.path() != "/" && !url.path().is_empty() {
        return Err(invalid("endpoint must not carry a path"));
    }
    Ok(url)
}

/// Validate a container name: 3-63 lowercase letters, digits and hyphens,
/// no leading or trailing hyphen.
pub fn validate_container_name(name: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidContainer {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    if !(3..=63).contains(&name.len()) {
        return Err(invalid("must be between 3 and 63 characters"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(invalid(
            "may only contain lowercase letters, digits and hyphens",
        ));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(invalid("must not start or end with a hyphen"));
    }
    Ok(())
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("undel")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<UndelConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = UndelConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: UndelConfig = toml::from_str(&data)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = UndelConfig::default();
        assert_eq!(cfg.call_timeout_secs, 30);
        assert_eq!(cfg.report_interval_secs, 2);
        assert_eq!(cfg.controller.min_concurrency, 10);
        assert_eq!(cfg.controller.max_concurrency, 600);
        assert_eq!(cfg.controller.initial_concurrency, 100);
        assert!(cfg.retry.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = UndelConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: UndelConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.call_timeout_secs, cfg.call_timeout_secs);
        assert_eq!(parsed.controller.max_concurrency, cfg.controller.max_concurrency);
        assert_eq!(parsed.controller.adjust_window, cfg.controller.adjust_window);
    }

    #[test]
    fn config_toml_custom_values() {
        let toml = r#"
            endpoint = "https://acct.dfs.core.windows.net"
            container = "backups"
            call_timeout_secs = 10
            report_interval_secs = 5

            [controller]
            min_concurrency = 2
            max_concurrency = 32
            initial_concurrency = 8
            adjust_window = 25
            low_error_rate = 0.01
            high_error_rate = 0.5
            increase_fraction = 0.2
            decrease_factor = 0.25

            [retry]
            max_retries = 3
            base_delay_secs = 0.5
            max_delay_secs = 15
        "#;
        let cfg: UndelConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.endpoint.as_deref(), Some("https://acct.dfs.core.windows.net"));
        assert_eq!(cfg.container.as_deref(), Some("backups"));
        assert_eq!(cfg.controller.max_concurrency, 32);
        let retry = cfg.retry_policy();
        assert_eq!(retry.max_retries, 3);
        assert_eq!(retry.base_delay, Duration::from_millis(500));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn config_file_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = UndelConfig::default();
        fs::write(&path, toml::to_string_pretty(&cfg).unwrap()).unwrap();
        let parsed: UndelConfig = toml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(parsed.validate().is_ok());
        assert_eq!(parsed.controller.initial_concurrency, cfg.controller.initial_concurrency);
    }

    #[test]
    fn invalid_bounds_are_rejected() {
        let mut cfg = UndelConfig::default();
        cfg.controller.min_concurrency = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = UndelConfig::default();
        cfg.controller.min_concurrency = 50;
        cfg.controller.max_concurrency = 10;
        assert!(cfg.validate().is_err());

        let mut cfg = UndelConfig::default();
        cfg.controller.decrease_factor = 1.0;
        assert!(cfg.validate().is_err());

        let mut cfg = UndelConfig::default();
        cfg.report_interval_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn endpoint_validation() {
        assert!(validate_endpoint("https://myaccount.dfs.core.windows.net").is_ok());
        assert!(validate_endpoint("https://myaccount.blob.core.windows.net").is_ok());
        assert!(validate_endpoint("http://myaccount.dfs.core.windows.net").is_err());
        assert!(validate_endpoint("https://example.com").is_err());
        assert!(validate_endpoint("https://My-Account.dfs.core.windows.net").is_err());
        assert!(validate_endpoint("https://ab.dfs.core.windows.net").is_err());
        assert!(validate_endpoint("not a url").is_err());
    }

    #[test]
    fn container_name_validation() {
        assert!(validate_container_name("backups").is_ok());
        assert!(validate_container_name("my-data-01").is_ok());
        assert!(validate_container_name("ab").is_err());
        assert!(validate_container_name("UPPER").is_err());
        assert!(validate_container_name("-leading").is_err());
        assert!(validate_container_name("trailing-").is_err());
        assert!(validate_container_name("under_score").is_err());
    }
}
