//! Server configuration.
//!
//! Values are layered with the precedence env > YAML file > defaults. The
//! YAML file is optional and named by `CONFIG_FILE`:
//!
//! ```yaml
//! port: 3001
//! k6Binary: /usr/local/bin/k6
//! scriptDir: /var/tmp/perf-tester
//! runTimeout: 30m
//! rateLimit:
//!   max: 100
//!   window: 15m
//! ```

use serde::Deserialize;
use std::env;
use std::fmt;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::runner::RunnerConfig;
use crate::utils::parse_duration_string;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Invalid value '{value}' for {key}: {message}")]
    InvalidValue {
        key: String,
        value: String,
        message: String,
    },
}

impl ConfigError {
    fn invalid(key: &str, value: &str, message: impl fmt::Display) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}', expected text or json", other)),
        }
    }
}

/// Runtime configuration for the API server.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_addr: IpAddr,
    pub port: u16,
    pub k6_binary: PathBuf,
    pub script_dir: PathBuf,
    pub run_timeout: Option<Duration>,
    /// Requests allowed per client IP and window on `/api` routes; 0 disables the limit.
    pub rate_limit_max: u32,
    pub rate_limit_window: Duration,
    pub max_body_bytes: usize,
    pub use_mock_metrics: bool,
    pub mock_delay: Duration,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            k6_binary: PathBuf::from("k6"),
            script_dir: PathBuf::from("temp"),
            run_timeout: None,
            rate_limit_max: 100,
            rate_limit_window: Duration::from_secs(15 * 60),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            use_mock_metrics: false,
            mock_delay: Duration::from_secs(3),
            log_format: LogFormat::Text,
        }
    }
}

/// Rate limit section of the YAML file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RateLimitFile {
    max: Option<u32>,
    window: Option<String>,
}

/// On-disk form of [`ServerConfig`]; every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ServerConfigFile {
    bind_addr: Option<String>,
    port: Option<u16>,
    k6_binary: Option<PathBuf>,
    script_dir: Option<PathBuf>,
    run_timeout: Option<String>,
    rate_limit: Option<RateLimitFile>,
    max_body_bytes: Option<usize>,
    use_mock_metrics: Option<bool>,
    mock_delay: Option<String>,
    log_format: Option<LogFormat>,
}

impl ServerConfig {
    /// Loads the configuration: defaults, then `CONFIG_FILE` if set, then
    /// environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match env::var("CONFIG_FILE") {
            Ok(path) if !path.trim().is_empty() => Self::from_yaml_file(path.trim())?,
            _ => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let file: ServerConfigFile = serde_yaml::from_str(content)?;
        let mut config = Self::default();

        if let Some(addr) = file.bind_addr {
            config.bind_addr = parse_ip("bindAddr", &addr)?;
        }
        if let Some(port) = file.port {
            config.port = port;
        }
        if let Some(binary) = file.k6_binary {
            config.k6_binary = binary;
        }
        if let Some(dir) = file.script_dir {
            config.script_dir = dir;
        }
        if let Some(timeout) = file.run_timeout {
            config.run_timeout = parse_optional_duration("runTimeout", &timeout)?;
        }
        if let Some(rate_limit) = file.rate_limit {
            if let Some(max) = rate_limit.max {
                config.rate_limit_max = max;
            }
            if let Some(window) = rate_limit.window {
                config.rate_limit_window = parse_duration("rateLimit.window", &window)?;
            }
        }
        if let Some(bytes) = file.max_body_bytes {
            config.max_body_bytes = bytes;
        }
        if let Some(mock) = file.use_mock_metrics {
            config.use_mock_metrics = mock;
        }
        if let Some(delay) = file.mock_delay {
            config.mock_delay = parse_duration("mockDelay", &delay)?;
        }
        if let Some(format) = file.log_format {
            config.log_format = format;
        }

        config.check()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(addr) = env_value("BIND_ADDR") {
            self.bind_addr = parse_ip("BIND_ADDR", &addr)?;
        }
        if let Some(port) = env_value("PORT") {
            self.port = port
                .parse()
                .map_err(|e| ConfigError::invalid("PORT", &port, e))?;
        }
        if let Some(binary) = env_value("K6_BINARY") {
            self.k6_binary = PathBuf::from(binary);
        }
        if let Some(dir) = env_value("SCRIPT_DIR") {
            self.script_dir = PathBuf::from(dir);
        }
        if let Some(timeout) = env_value("RUN_TIMEOUT") {
            self.run_timeout = parse_optional_duration("RUN_TIMEOUT", &timeout)?;
        }
        if let Some(max) = env_value("RATE_LIMIT_MAX") {
            self.rate_limit_max = max
                .parse()
                .map_err(|e| ConfigError::invalid("RATE_LIMIT_MAX", &max, e))?;
        }
        if let Some(window) = env_value("RATE_LIMIT_WINDOW") {
            self.rate_limit_window = parse_duration("RATE_LIMIT_WINDOW", &window)?;
        }
        if let Some(bytes) = env_value("MAX_BODY_BYTES") {
            self.max_body_bytes = bytes
                .parse()
                .map_err(|e| ConfigError::invalid("MAX_BODY_BYTES", &bytes, e))?;
        }
        if let Some(mock) = env_value("USE_MOCK_METRICS") {
            self.use_mock_metrics = mock.to_lowercase() == "true";
        }
        if let Some(delay) = env_value("MOCK_DELAY") {
            self.mock_delay = parse_duration("MOCK_DELAY", &delay)?;
        }
        if let Some(format) = env_value("LOG_FORMAT") {
            self.log_format = format
                .parse()
                .map_err(|e: String| ConfigError::invalid("LOG_FORMAT", &format, e))?;
        }

        self.check()
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.rate_limit_max > 0 && self.rate_limit_window.is_zero() {
            return Err(ConfigError::invalid(
                "rate limit window",
                "0s",
                "must be positive when a rate limit is set",
            ));
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::invalid(
                "max body bytes",
                "0",
                "must be positive",
            ));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            k6_binary: self.k6_binary.clone(),
            script_dir: self.script_dir.clone(),
            timeout: self.run_timeout,
        }
    }

    /// Logs the effective configuration.
    pub fn log_summary(&self) {
        info!(
            addr = %self.socket_addr(),
            k6_binary = %self.k6_binary.display(),
            script_dir = %self.script_dir.display(),
            run_timeout = ?self.run_timeout,
            rate_limit_max = self.rate_limit_max,
            rate_limit_window = ?self.rate_limit_window,
            max_body_bytes = self.max_body_bytes,
            use_mock_metrics = self.use_mock_metrics,
            "Server configuration"
        );
    }
}

fn env_value(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_ip(key: &str, value: &str) -> Result<IpAddr, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::invalid(key, value, e))
}

fn parse_duration(key: &str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration_string(value).map_err(|e| ConfigError::invalid(key, value, e))
}

/// "0", "none" and "off" disable the setting.
fn parse_optional_duration(key: &str, value: &str) -> Result<Option<Duration>, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "0" | "none" | "off" => Ok(None),
        _ => parse_duration(key, value).map(|d| if d.is_zero() { None } else { Some(d) }),
    }
}
