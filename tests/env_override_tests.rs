//! Integration tests for server configuration loading.
//!
//! Precedence is env > CONFIG_FILE > defaults.

use api_perf_tester::config::{ConfigError, LogFormat, ServerConfig};
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::NamedTempFile;

/// Clear all env vars that could affect config parsing.
/// Must be called at the start of every test to prevent leakage
/// from other tests (execution order is not guaranteed).
fn clean_env() {
    for var in [
        "CONFIG_FILE",
        "PORT",
        "BIND_ADDR",
        "K6_BINARY",
        "SCRIPT_DIR",
        "RUN_TIMEOUT",
        "RATE_LIMIT_MAX",
        "RATE_LIMIT_WINDOW",
        "MAX_BODY_BYTES",
        "USE_MOCK_METRICS",
        "MOCK_DELAY",
        "LOG_FORMAT",
    ] {
        env::remove_var(var);
    }
}

fn yaml_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_defaults_without_env_or_file() {
    clean_env();
    let config = ServerConfig::from_env().unwrap();

    assert_eq!(config, ServerConfig::default());
    assert_eq!(config.socket_addr().port(), 3001);

    println!("✅ Defaults used when nothing is configured");
}

#[test]
#[serial]
fn test_config_file_values_are_used() {
    clean_env();
    let file = yaml_file(
        r#"
port: 9000
scriptDir: /var/tmp/k6-scripts
rateLimit:
  max: 20
"#,
    );
    env::set_var("CONFIG_FILE", file.path());

    let config = ServerConfig::from_env().unwrap();
    assert_eq!(config.port, 9000);
    assert_eq!(config.script_dir, PathBuf::from("/var/tmp/k6-scripts"));
    assert_eq!(config.rate_limit_max, 20);
    assert_eq!(config.rate_limit_window, Duration::from_secs(900));

    clean_env();
    println!("✅ CONFIG_FILE values override defaults");
}

#[test]
#[serial]
fn test_env_overrides_config_file() {
    clean_env();
    let file = yaml_file(
        r#"
port: 9000
k6Binary: /opt/k6
runTimeout: 5m
logFormat: json
"#,
    );
    env::set_var("CONFIG_FILE", file.path());
    env::set_var("PORT", "9100");
    env::set_var("RUN_TIMEOUT", "off");
    env::set_var("LOG_FORMAT", "text");

    let config = ServerConfig::from_env().unwrap();
    assert_eq!(config.port, 9100);
    assert_eq!(config.k6_binary, PathBuf::from("/opt/k6"));
    assert_eq!(config.run_timeout, None);
    assert_eq!(config.log_format, LogFormat::Text);

    clean_env();
    println!("✅ Env vars take precedence over CONFIG_FILE");
}

#[test]
#[serial]
fn test_env_only_settings() {
    clean_env();
    env::set_var("BIND_ADDR", "127.0.0.1");
    env::set_var("RATE_LIMIT_MAX", "0");
    env::set_var("RATE_LIMIT_WINDOW", "1h");
    env::set_var("MAX_BODY_BYTES", "2048");
    env::set_var("USE_MOCK_METRICS", "TRUE");
    env::set_var("MOCK_DELAY", "500ms");

    let config = ServerConfig::from_env().unwrap();
    assert_eq!(config.socket_addr().to_string(), "127.0.0.1:3001");
    assert_eq!(config.rate_limit_max, 0);
    assert_eq!(config.rate_limit_window, Duration::from_secs(3600));
    assert_eq!(config.max_body_bytes, 2048);
    assert!(config.use_mock_metrics);
    assert_eq!(config.mock_delay, Duration::from_millis(500));

    clean_env();
}

#[test]
#[serial]
fn test_blank_env_values_are_ignored() {
    clean_env();
    env::set_var("PORT", "  ");
    env::set_var("K6_BINARY", "");

    let config = ServerConfig::from_env().unwrap();
    assert_eq!(config.port, 3001);
    assert_eq!(config.k6_binary, PathBuf::from("k6"));

    clean_env();
}

#[test]
#[serial]
fn test_invalid_env_value_names_the_variable() {
    clean_env();
    env::set_var("PORT", "seventy");

    let err = ServerConfig::from_env().unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { .. }), "got {:?}", err);
    assert!(err.to_string().contains("PORT"), "error was: {}", err);

    clean_env();
}

#[test]
#[serial]
fn test_missing_config_file_is_an_error() {
    clean_env();
    env::set_var("CONFIG_FILE", "/definitely/not/here.yaml");

    let err = ServerConfig::from_env().unwrap_err();
    assert!(matches!(err, ConfigError::FileRead { .. }), "got {:?}", err);

    clean_env();
}

#[test]
#[serial]
fn test_zero_window_with_limit_is_rejected() {
    clean_env();
    env::set_var("RATE_LIMIT_WINDOW", "0s");

    assert!(ServerConfig::from_env().is_err());

    clean_env();
}
