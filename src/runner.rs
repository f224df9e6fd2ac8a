//! Runs generated scripts through the external k6 binary.
//!
//! Each run writes its script to a uniquely named file in the script
//! directory, invokes `k6 run --out json=<script>.json <script>`, and parses
//! the JSON-lines results file. Both files are removed when the run ends,
//! whatever the outcome.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::dashboard::TestExecutor;
use crate::load_models::{peak_target, total_stage_duration};
use crate::results::{parse_k6_output, ResultsParseError, TestMetrics};
use crate::script::{generate_k6_script, ScriptError};
use crate::test_config::TestConfig;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("Failed to generate k6 script: {0}")]
    Script(#[from] ScriptError),

    #[error("Failed to write k6 script: {0}")]
    ScriptWrite(#[source] std::io::Error),

    #[error("Failed to start {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("k6 exited with {status}: {stderr}")]
    ProcessFailed { status: String, stderr: String },

    #[error("k6 did not finish within {0:?}")]
    Timeout(Duration),

    #[error("Failed to read k6 results: {0}")]
    ResultsRead(#[source] std::io::Error),

    #[error("Failed to parse k6 results: {0}")]
    Parse(#[from] ResultsParseError),
}

impl RunError {
    /// Short, client-facing description of the failure class.
    pub fn summary(&self) -> &'static str {
        match self {
            RunError::Spawn { .. } | RunError::ProcessFailed { .. } | RunError::Timeout(_) => {
                "Failed to run k6 test"
            }
            RunError::Parse(_) => "Failed to parse k6 results",
            RunError::Script(_) | RunError::ScriptWrite(_) | RunError::ResultsRead(_) => {
                "Internal server error"
            }
        }
    }
}

/// Where to find k6 and where to put scripts.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub k6_binary: PathBuf,
    pub script_dir: PathBuf,
    /// `None` waits for k6 indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            k6_binary: PathBuf::from("k6"),
            script_dir: PathBuf::from("temp"),
            timeout: None,
        }
    }
}

/// Removes the k6 results file when dropped.
struct ResultsFile {
    path: PathBuf,
}

impl ResultsFile {
    fn for_script(script: &Path) -> Self {
        let mut path = script.as_os_str().to_owned();
        path.push(".json");
        Self {
            path: PathBuf::from(path),
        }
    }
}

impl Drop for ResultsFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed k6 results file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove k6 results file"
            ),
        }
    }
}

/// Executes test runs with the k6 binary.
#[derive(Debug, Clone)]
pub struct K6Runner {
    config: RunnerConfig,
}

impl K6Runner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Generates the script, runs k6 and aggregates its output.
    pub async fn run(&self, test: &TestConfig) -> Result<TestMetrics, RunError> {
        let script = generate_k6_script(test)?;

        tokio::fs::create_dir_all(&self.config.script_dir)
            .await
            .map_err(RunError::ScriptWrite)?;

        // Deleted on drop.
        let script_file = tempfile::Builder::new()
            .prefix("test-")
            .suffix(".js")
            .tempfile_in(&self.config.script_dir)
            .map_err(RunError::ScriptWrite)?;
        tokio::fs::write(script_file.path(), script)
            .await
            .map_err(RunError::ScriptWrite)?;

        let results_file = ResultsFile::for_script(script_file.path());

        let stages = test.test_type.stages(test.vus);
        let planned = if stages.is_empty() {
            test.duration.clone()
        } else {
            match total_stage_duration(&stages) {
                Ok(total) => format!("{}s", total.as_secs()),
                Err(e) => {
                    warn!(error = %e, "Could not compute staged run length");
                    test.duration.clone()
                }
            }
        };

        info!(
            script = %script_file.path().display(),
            url = %test.url,
            method = %test.normalized_method(),
            vus = test.vus,
            peak_vus = peak_target(&stages).unwrap_or(f64::from(test.vus)),
            planned = %planned,
            test_type = %test.test_type,
            "Starting k6 run"
        );

        let started = Instant::now();
        let output = self.invoke(script_file.path(), &results_file.path).await?;

        if !output.status.success() {
            return Err(RunError::ProcessFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let raw = match tokio::fs::read_to_string(&results_file.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No k6 results file, parsing stdout");
                String::from_utf8_lossy(&output.stdout).into_owned()
            }
            Err(e) => return Err(RunError::ResultsRead(e)),
        };

        let metrics = parse_k6_output(&raw)?;

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            total_requests = metrics.summary.total_requests,
            errors = metrics.summary.errors,
            p95_ms = metrics.summary.p95_response_time,
            "k6 run completed"
        );

        Ok(metrics)
    }

    async fn invoke(
        &self,
        script: &Path,
        results: &Path,
    ) -> Result<std::process::Output, RunError> {
        let mut out_arg = OsString::from("json=");
        out_arg.push(results);

        let mut command = Command::new(&self.config.k6_binary);
        command
            .arg("run")
            .arg("--out")
            .arg(out_arg)
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let spawn_error = |source| RunError::Spawn {
            binary: self.config.k6_binary.display().to_string(),
            source,
        };

        match self.config.timeout {
            Some(limit) => tokio::time::timeout(limit, command.output())
                .await
                .map_err(|_| RunError::Timeout(limit))?
                .map_err(spawn_error),
            None => command.output().await.map_err(spawn_error),
        }
    }
}

#[async_trait]
impl TestExecutor for K6Runner {
    fn name(&self) -> &'static str {
        "k6"
    }

    async fn execute(&self, config: &TestConfig) -> Result<TestMetrics, RunError> {
        self.run(config).await
    }
}
