//! Dashboard state: form submission, run lifecycle and notifications.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::config_validation::ValidationError;
use crate::display::{
    completion_notification, failure_notification, invalid_config_notification,
    invalid_json_notification,
};
use crate::results::TestMetrics;
use crate::runner::RunError;
use crate::test_config::TestConfig;

/// Something that can turn a test configuration into run results.
#[async_trait]
pub trait TestExecutor: Send + Sync {
    /// Short name for logs ("k6", "mock").
    fn name(&self) -> &'static str;

    async fn execute(&self, config: &TestConfig) -> Result<TestMetrics, RunError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationVariant {
    Default,
    Destructive,
}

/// A toast shown to the user after a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub variant: NotificationVariant,
}

/// Serializable view of the dashboard.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub state: RunState,
    pub active_runs: usize,
    pub last_test: Option<TestConfig>,
    pub metrics: Option<TestMetrics>,
    pub last_error: Option<String>,
}

/// Holds the last submitted configuration and the last run's results.
///
/// [`Dashboard::begin`] and [`Dashboard::complete`] bracket a run so callers
/// sharing the dashboard behind a lock need not hold it while k6 runs.
#[derive(Debug)]
pub struct Dashboard {
    state: RunState,
    /// Runs begun but not yet completed.
    active_runs: usize,
    last_test: Option<TestConfig>,
    metrics: Option<TestMetrics>,
    last_error: Option<String>,
}

impl Default for Dashboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Dashboard {
    pub fn new() -> Self {
        Self {
            state: RunState::Idle,
            active_runs: 0,
            last_test: None,
            metrics: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn last_test(&self) -> Option<&TestConfig> {
        self.last_test.as_ref()
    }

    pub fn metrics(&self) -> Option<&TestMetrics> {
        self.metrics.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    pub fn active_runs(&self) -> usize {
        self.active_runs
    }

    /// Validates `config` and marks a run as started.
    ///
    /// On error the dashboard is left untouched.
    pub fn begin(&mut self, config: &TestConfig) -> Result<(), ValidationError> {
        config.validate()?;

        self.state = RunState::Running;
        self.active_runs += 1;
        self.last_test = Some(config.clone());
        self.last_error = None;
        Ok(())
    }

    /// Records the outcome of a run started by [`Dashboard::begin`].
    ///
    /// The dashboard stays `Running` until every begun run has completed.
    pub fn complete(&mut self, result: &Result<TestMetrics, RunError>) -> Notification {
        self.active_runs = self.active_runs.saturating_sub(1);
        let (finished, notification) = match result {
            Ok(metrics) => {
                self.metrics = Some(metrics.clone());
                (RunState::Completed, completion_notification(metrics))
            }
            Err(e) => {
                self.last_error = Some(e.to_string());
                (RunState::Failed, failure_notification())
            }
        };
        if self.active_runs == 0 {
            self.state = finished;
        }
        notification
    }

    /// Submits the form: validate, run, and record the outcome.
    pub async fn run_test(
        &mut self,
        config: &TestConfig,
        executor: &dyn TestExecutor,
    ) -> Notification {
        // The form checks the JSON fields first and reports them separately.
        if let Err(e) = config.validate_json_fields() {
            warn!(error = %e, "Rejected submission with invalid JSON");
            return invalid_json_notification();
        }
        if let Err(e) = self.begin(config) {
            warn!(error = %e, "Rejected invalid submission");
            return invalid_config_notification(&e);
        }

        info!(executor = executor.name(), url = %config.url, "Running test from dashboard");
        let result = executor.execute(config).await;
        self.complete(&result)
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            state: self.state,
            active_runs: self.active_runs,
            last_test: self.last_test.clone(),
            metrics: self.metrics.clone(),
            last_error: self.last_error.clone(),
        }
    }
}
