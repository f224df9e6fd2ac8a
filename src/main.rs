use tracing_subscriber::EnvFilter;

use api_perf_tester::config::{LogFormat, ServerConfig};
use api_perf_tester::metrics::register_metrics;
use api_perf_tester::server::serve;

/// Prints helpful configuration documentation.
fn print_config_help() {
    eprintln!("All settings are optional.");
    eprintln!();
    eprintln!("Server:");
    eprintln!("  PORT                    - Listen port (default: 3001)");
    eprintln!("  BIND_ADDR               - Listen address (default: 0.0.0.0)");
    eprintln!("  MAX_BODY_BYTES          - Request body limit in bytes (default: 10485760)");
    eprintln!("  RATE_LIMIT_MAX          - Requests per client IP and window on /api (default: 100, 0 disables)");
    eprintln!("  RATE_LIMIT_WINDOW       - Rate limit window: 30s, 15m, 1h (default: 15m)");
    eprintln!();
    eprintln!("Test execution:");
    eprintln!("  K6_BINARY               - Path or name of the k6 executable (default: k6)");
    eprintln!("  SCRIPT_DIR              - Directory for generated scripts (default: temp)");
    eprintln!("  RUN_TIMEOUT             - Kill k6 after this long, e.g. 30m (default: no limit)");
    eprintln!("  USE_MOCK_METRICS        - Return mock metrics instead of running k6: true or false (default: false)");
    eprintln!("  MOCK_DELAY              - Simulated run time in mock mode (default: 3s)");
    eprintln!();
    eprintln!("Other:");
    eprintln!("  CONFIG_FILE             - YAML file with the same settings (env vars take precedence)");
    eprintln!("  LOG_FORMAT              - text or json (default: text)");
    eprintln!("  RUST_LOG                - Log filter (default: info)");
    eprintln!("  METRIC_NAMESPACE        - Prometheus metric namespace (default: api_perf_tester)");
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = match ServerConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}\n", e);
            print_config_help();
            std::process::exit(1);
        }
    };

    init_tracing(config.log_format);
    register_metrics()?;
    config.log_summary();

    serve(config).await?;

    Ok(())
}
