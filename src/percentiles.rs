//! Response-time percentiles using HDR Histogram.
//!
//! Values are recorded in microseconds so sub-millisecond k6 timings keep
//! their precision; statistics are reported back in milliseconds.

use hdrhistogram::Histogram;
use tracing::warn;

/// Highest trackable latency: one hour, in microseconds.
const MAX_LATENCY_US: u64 = 3_600_000_000;

/// Percentile statistics for a set of response times (milliseconds).
#[derive(Debug, Clone, PartialEq)]
pub struct PercentileStats {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

impl PercentileStats {
    /// Format statistics as a human-readable string.
    pub fn format(&self) -> String {
        format!(
            "count={}, min={:.2}ms, max={:.2}ms, mean={:.2}ms, p50={:.2}ms, p90={:.2}ms, p95={:.2}ms, p99={:.2}ms",
            self.count, self.min, self.max, self.mean, self.p50, self.p90, self.p95, self.p99,
        )
    }
}

/// Percentile tracker for a single run's response times.
pub struct PercentileTracker {
    /// Tracks 1µs to 1h with 3 significant digits.
    histogram: Histogram<u64>,
}

impl PercentileTracker {
    pub fn new() -> Result<Self, String> {
        let histogram = Histogram::new_with_bounds(1, MAX_LATENCY_US, 3)
            .map_err(|e| format!("failed to create histogram: {:?}", e))?;
        Ok(Self { histogram })
    }

    /// Record a response time in milliseconds.
    pub fn record_ms(&mut self, latency_ms: f64) {
        if !latency_ms.is_finite() || latency_ms < 0.0 {
            warn!(latency_ms = latency_ms, "Ignoring invalid latency sample");
            return;
        }

        let latency_us = ((latency_ms * 1000.0).round() as u64).clamp(1, MAX_LATENCY_US);

        if let Err(e) = self.histogram.record(latency_us) {
            warn!(
                latency_us = latency_us,
                error = ?e,
                "Failed to record latency in histogram"
            );
        }
    }

    pub fn is_empty(&self) -> bool {
        self.histogram.is_empty()
    }

    /// Current statistics, or `None` if nothing was recorded.
    pub fn stats(&self) -> Option<PercentileStats> {
        if self.histogram.is_empty() {
            return None;
        }

        let to_ms = |us: u64| us as f64 / 1000.0;

        Some(PercentileStats {
            count: self.histogram.len(),
            min: to_ms(self.histogram.min()),
            max: to_ms(self.histogram.max()),
            mean: self.histogram.mean() / 1000.0,
            p50: to_ms(self.histogram.value_at_quantile(0.50)),
            p90: to_ms(self.histogram.value_at_quantile(0.90)),
            p95: to_ms(self.histogram.value_at_quantile(0.95)),
            p99: to_ms(self.histogram.value_at_quantile(0.99)),
        })
    }
}
