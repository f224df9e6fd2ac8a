use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, TextEncoder,
};
use std::env;
use tracing::error;

lazy_static::lazy_static! {
    pub static ref METRIC_NAMESPACE: String =
        env::var("METRIC_NAMESPACE").unwrap_or_else(|_| "api_perf_tester".to_string());

    // === API Metrics ===

    pub static ref API_REQUESTS_TOTAL: IntCounterVec =
        IntCounterVec::new(
            Opts::new("api_requests_total", "Number of API requests by route and status code")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["route", "status"]
        ).expect("api_requests_total metric definition is valid");

    // === Test Run Metrics ===

    pub static ref TEST_RUNS_TOTAL: IntCounterVec =
        IntCounterVec::new(
            Opts::new("test_runs_total", "Number of load-test runs by outcome")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["outcome"]  // outcome: success, failed
        ).expect("test_runs_total metric definition is valid");

    pub static ref TEST_RUN_DURATION_SECONDS: Histogram =
        Histogram::with_opts(
            HistogramOpts::new(
                "test_run_duration_seconds",
                "Wall-clock duration of load-test runs in seconds"
            )
            .namespace(METRIC_NAMESPACE.as_str())
            .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0])
        ).expect("test_run_duration_seconds metric definition is valid");

    pub static ref TEST_RUNS_IN_FLIGHT: IntGauge =
        IntGauge::with_opts(
            Opts::new("test_runs_in_flight", "Number of load-test runs currently executing")
                .namespace(METRIC_NAMESPACE.as_str())
        ).expect("test_runs_in_flight metric definition is valid");
}

/// Registers all metrics with the default Prometheus registry.
///
/// Calling this more than once is harmless.
pub fn register_metrics() -> Result<(), prometheus::Error> {
    let registry = prometheus::default_registry();

    for collector in [
        Box::new(API_REQUESTS_TOTAL.clone()) as Box<dyn prometheus::core::Collector>,
        Box::new(TEST_RUNS_TOTAL.clone()),
        Box::new(TEST_RUN_DURATION_SECONDS.clone()),
        Box::new(TEST_RUNS_IN_FLIGHT.clone()),
    ] {
        match registry.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e),
        }
    }

    Ok(())
}

/// Gathers and encodes the default registry in the Prometheus text format.
pub fn gather_metrics_string() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::default_registry().gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return String::from("# ERROR ENCODING METRICS");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        error!(error = %e, "Metrics output was not valid UTF-8");
        String::from("# ERROR ENCODING METRICS TO UTF-8")
    })
}
