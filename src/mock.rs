//! Mock metrics for running the dashboard without a k6 installation.

use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tracing::info;

use crate::dashboard::TestExecutor;
use crate::results::{MetricsSummary, TestMetrics, TimelinePoint, TIMELINE_BUCKET_SECS};
use crate::runner::RunError;
use crate::test_config::TestConfig;

/// Number of points in a mock timeline.
pub const MOCK_TIMELINE_POINTS: usize = 20;

/// Produces a plausible, randomly generated run result.
///
/// `errors` is drawn from a range far below the minimum request count, so
/// the summary is always consistent.
pub fn generate_mock_metrics<R: Rng>(rng: &mut R) -> TestMetrics {
    let total_requests = rng.gen_range(1000..11000u64);

    let summary = MetricsSummary {
        total_requests,
        success_rate: 95.0 + rng.gen::<f64>() * 5.0,
        avg_response_time: 100.0 + rng.gen::<f64>() * 200.0,
        p95_response_time: 200.0 + rng.gen::<f64>() * 300.0,
        rps: 50.0 + rng.gen::<f64>() * 100.0,
        errors: rng.gen_range(0..50u64).min(total_requests),
    };

    let timeline = (0..MOCK_TIMELINE_POINTS)
        .map(|i| TimelinePoint {
            timestamp: format!("{}s", i as i64 * TIMELINE_BUCKET_SECS),
            response_time: 80.0 + rng.gen::<f64>() * 150.0,
            rps: 40.0 + rng.gen::<f64>() * 80.0,
            errors: rng.gen_range(0..3u64),
        })
        .collect();

    TestMetrics { summary, timeline }
}

/// Executor that waits for a fixed delay and returns mock metrics.
#[derive(Debug, Clone)]
pub struct MockExecutor {
    delay: Duration,
}

impl MockExecutor {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}

#[async_trait]
impl TestExecutor for MockExecutor {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn execute(&self, config: &TestConfig) -> Result<TestMetrics, RunError> {
        info!(
            url = %config.url,
            vus = config.vus,
            delay_ms = self.delay.as_millis() as u64,
            "Simulating test run with mock metrics"
        );

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mut rng = rand::thread_rng();
        Ok(generate_mock_metrics(&mut rng))
    }
}
