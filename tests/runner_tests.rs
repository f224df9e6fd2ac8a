//! Integration tests for the k6 process runner.
//!
//! A small shell script stands in for the k6 binary. It receives the same
//! arguments k6 would (`run --out json=<results> <script>`) and writes canned
//! JSON-lines output to the results path.
//!
//! Tests are serialized: writing an executable while another thread forks
//! can make exec fail with ETXTBSY.

#![cfg(unix)]

use serial_test::serial;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

use api_perf_tester::load_models::TestType;
use api_perf_tester::runner::{K6Runner, RunError, RunnerConfig};
use api_perf_tester::test_config::TestConfig;

const K6_OUTPUT: &str = r#"{"type":"Metric","metric":"http_reqs","data":{"name":"http_reqs","type":"counter","contains":"default","thresholds":[],"submetrics":null}}
{"type":"Point","metric":"http_reqs","data":{"time":"2024-05-01T10:00:00.100000000+02:00","value":1,"tags":{"method":"GET","status":"200"}}}
{"type":"Point","metric":"http_req_duration","data":{"time":"2024-05-01T10:00:00.100000000+02:00","value":120.5,"tags":{"method":"GET","status":"200"}}}
{"type":"Point","metric":"http_req_failed","data":{"time":"2024-05-01T10:00:00.100000000+02:00","value":0,"tags":{"method":"GET","status":"200"}}}
{"type":"Point","metric":"http_reqs","data":{"time":"2024-05-01T10:00:07.100000000+02:00","value":1,"tags":{"method":"GET","status":"503"}}}
{"type":"Point","metric":"http_req_duration","data":{"time":"2024-05-01T10:00:07.100000000+02:00","value":80.5,"tags":{"method":"GET","status":"503"}}}
{"type":"Point","metric":"http_req_failed","data":{"time":"2024-05-01T10:00:07.100000000+02:00","value":1,"tags":{"method":"GET","status":"503"}}}
{"type":"Point","metric":"vus","data":{"time":"2024-05-01T10:00:07.200000000+02:00","value":2,"tags":null}}
"#;

/// Writes an executable shell script named `k6` into `dir`.
fn fake_k6(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("k6");
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A fake k6 that writes `K6_OUTPUT` to the `--out json=` path and copies
/// the script it was given to `captured.js`.
fn succeeding_k6(dir: &Path) -> PathBuf {
    let output = dir.join("canned.jsonl");
    fs::write(&output, K6_OUTPUT).unwrap();
    fake_k6(
        dir,
        &format!(
            r#"[ "$1" = "run" ] || exit 64
[ "$2" = "--out" ] || exit 64
out="${{3#json=}}"
cp "$4" "{captured}"
cp "{canned}" "$out""#,
            captured = dir.join("captured.js").display(),
            canned = output.display()
        ),
    )
}

fn runner(dir: &TempDir, binary: PathBuf, timeout: Option<Duration>) -> K6Runner {
    K6Runner::new(RunnerConfig {
        k6_binary: binary,
        script_dir: dir.path().join("scripts"),
        timeout,
    })
}

fn script_dir_entries(dir: &TempDir) -> Vec<String> {
    match fs::read_dir(dir.path().join("scripts")) {
        Ok(entries) => entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[tokio::test]
#[serial]
async fn test_successful_run_returns_metrics() {
    let dir = TempDir::new().unwrap();
    let binary = succeeding_k6(dir.path());
    let runner = runner(&dir, binary, None);

    let metrics = runner.run(&TestConfig::default()).await.unwrap();

    assert_eq!(metrics.summary.total_requests, 2);
    assert_eq!(metrics.summary.errors, 1);
    assert_eq!(metrics.summary.success_rate, 50.0);
    assert!((metrics.summary.avg_response_time - 100.5).abs() < 1e-9);
    assert!((metrics.summary.rps - 2.0 / 7.0).abs() < 1e-9);
    assert_eq!(metrics.timeline.len(), 2);
    assert_eq!(metrics.timeline[0].timestamp, "0s");
    assert_eq!(metrics.timeline[1].timestamp, "5s");
    assert!(metrics.is_consistent());

    println!("✅ Successful k6 run yields metrics");
}

#[tokio::test]
#[serial]
async fn test_k6_receives_generated_script() {
    let dir = TempDir::new().unwrap();
    let binary = succeeding_k6(dir.path());
    let runner = runner(&dir, binary, None);

    let config = TestConfig {
        vus: 42,
        method: "DELETE".to_string(),
        test_type: TestType::Spike,
        ..TestConfig::default()
    };
    runner.run(&config).await.unwrap();

    let script = fs::read_to_string(dir.path().join("captured.js")).unwrap();
    assert!(script.contains("vus: 42,"));
    assert!(script.contains("http.request(\"DELETE\""));
    assert!(script.contains("target: 84"));
}

#[tokio::test]
#[serial]
async fn test_temp_files_are_removed_after_success() {
    let dir = TempDir::new().unwrap();
    let binary = succeeding_k6(dir.path());
    let runner = runner(&dir, binary, None);

    runner.run(&TestConfig::default()).await.unwrap();

    assert!(
        script_dir_entries(&dir).is_empty(),
        "left behind: {:?}",
        script_dir_entries(&dir)
    );
}

#[tokio::test]
#[serial]
async fn test_non_zero_exit_is_process_failure() {
    let dir = TempDir::new().unwrap();
    let binary = fake_k6(dir.path(), "echo 'thresholds crossed' >&2\nexit 99");
    let runner = runner(&dir, binary, None);

    let err = runner.run(&TestConfig::default()).await.unwrap_err();
    match &err {
        RunError::ProcessFailed { stderr, .. } => assert_eq!(stderr, "thresholds crossed"),
        other => panic!("expected ProcessFailed, got {:?}", other),
    }
    assert_eq!(err.summary(), "Failed to run k6 test");
    assert!(script_dir_entries(&dir).is_empty());
}

#[tokio::test]
#[serial]
async fn test_unparseable_output_is_parse_error() {
    let dir = TempDir::new().unwrap();
    let binary = fake_k6(dir.path(), r#"echo 'not json' > "${3#json=}""#);
    let runner = runner(&dir, binary, None);

    let err = runner.run(&TestConfig::default()).await.unwrap_err();
    assert!(matches!(err, RunError::Parse(_)), "got {:?}", err);
    assert_eq!(err.summary(), "Failed to parse k6 results");

    // The results file written by the fake k6 is cleaned up too.
    assert!(script_dir_entries(&dir).is_empty());
}

#[tokio::test]
#[serial]
async fn test_stdout_is_used_without_results_file() {
    let dir = TempDir::new().unwrap();
    let canned = dir.path().join("canned.jsonl");
    fs::write(&canned, K6_OUTPUT).unwrap();
    let binary = fake_k6(dir.path(), &format!("cat \"{}\"", canned.display()));
    let runner = runner(&dir, binary, None);

    let metrics = runner.run(&TestConfig::default()).await.unwrap();
    assert_eq!(metrics.summary.total_requests, 2);
}

#[tokio::test]
#[serial]
async fn test_timeout_kills_hung_process() {
    let dir = TempDir::new().unwrap();
    let binary = fake_k6(dir.path(), "exec sleep 30");
    let runner = runner(&dir, binary, Some(Duration::from_millis(300)));

    let started = std::time::Instant::now();
    let err = runner.run(&TestConfig::default()).await.unwrap_err();

    assert!(matches!(err, RunError::Timeout(_)), "got {:?}", err);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(script_dir_entries(&dir).is_empty());
}

#[tokio::test]
#[serial]
async fn test_invalid_headers_fail_before_spawning() {
    let dir = TempDir::new().unwrap();
    let binary = fake_k6(dir.path(), "touch \"$0.ran\"");
    let runner = runner(&dir, binary, None);

    let config = TestConfig {
        headers: "{broken".to_string(),
        ..TestConfig::default()
    };
    let err = runner.run(&config).await.unwrap_err();

    assert!(matches!(err, RunError::Script(_)), "got {:?}", err);
    assert_eq!(err.summary(), "Internal server error");
    assert!(!dir.path().join("k6.ran").exists());
}

#[tokio::test]
#[serial]
async fn test_concurrent_runs_use_distinct_scripts() {
    let dir = TempDir::new().unwrap();
    let canned = dir.path().join("canned.jsonl");
    fs::write(&canned, K6_OUTPUT).unwrap();
    let log = dir.path().join("scripts.log");
    let binary = fake_k6(
        dir.path(),
        &format!(
            r#"echo "$4" >> "{log}"
sleep 0.3
cp "{canned}" "${{3#json=}}""#,
            log = log.display(),
            canned = canned.display()
        ),
    );
    let runner = runner(&dir, binary, None);

    let first_config = TestConfig::default();
    let second_config = TestConfig {
        vus: 20,
        ..TestConfig::default()
    };
    let (first, second) = tokio::join!(runner.run(&first_config), runner.run(&second_config));
    assert_eq!(first.unwrap().summary.total_requests, 2);
    assert_eq!(second.unwrap().summary.total_requests, 2);

    let scripts: Vec<String> = fs::read_to_string(&log)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    assert_eq!(scripts.len(), 2);
    assert_ne!(scripts[0], scripts[1]);
    for script in &scripts {
        let name = Path::new(script).file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("test-") && name.ends_with(".js"), "{}", name);
    }

    assert!(
        script_dir_entries(&dir).is_empty(),
        "left behind: {:?}",
        script_dir_entries(&dir)
    );
}
