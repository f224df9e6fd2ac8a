//! Integration tests for k6 script generation.
//!
//! The generated script must carry the requested VU count, duration and
//! method, and the stage list that belongs to the chosen test type.

use api_perf_tester::load_models::TestType;
use api_perf_tester::script::{generate_k6_script, ScriptError};
use api_perf_tester::test_config::TestConfig;

fn config_for(test_type: TestType, vus: u32) -> TestConfig {
    TestConfig {
        url: "https://api.example.com/orders".to_string(),
        method: "GET".to_string(),
        vus,
        duration: "2m".to_string(),
        test_type,
        ..TestConfig::default()
    }
}

/// The exact `stages` block expected in the script.
fn stage_block(stages: &[(&str, &str)]) -> String {
    let mut block = String::from("  stages: [\n");
    for (duration, target) in stages {
        block.push_str(&format!(
            "    {{ duration: \"{}\", target: {} }},\n",
            duration, target
        ));
    }
    block.push_str("  ],\n");
    block
}

#[test]
fn test_load_script_options() {
    let script = generate_k6_script(&config_for(TestType::Load, 25)).unwrap();

    assert!(script.starts_with("import http from 'k6/http';"));
    assert!(script.contains("import { check, sleep } from 'k6';"));
    assert!(script.contains("vus: 25,"));
    assert!(script.contains("duration: \"2m\","));
    assert!(!script.contains("stages:"));
    assert!(script.contains(r#"http.request("GET", "https://api.example.com/orders", payload, params);"#));

    println!("✅ Load test script carries vus, duration and method");
}

#[test]
fn test_soak_script_has_no_stages() {
    let script = generate_k6_script(&config_for(TestType::Soak, 5)).unwrap();
    assert!(script.contains("vus: 5,"));
    assert!(!script.contains("stages:"));
}

#[test]
fn test_spike_script_stages() {
    let script = generate_k6_script(&config_for(TestType::Spike, 10)).unwrap();

    let expected = stage_block(&[
        ("10s", "10"),
        ("1m", "10"),
        ("10s", "20"),
        ("3m", "20"),
        ("10s", "10"),
        ("3m", "10"),
        ("10s", "0"),
    ]);
    assert!(script.contains(&expected), "script was:\n{}", script);

    println!("✅ Spike stages double the base load");
}

#[test]
fn test_stress_script_stages() {
    let script = generate_k6_script(&config_for(TestType::Stress, 10)).unwrap();

    let expected = stage_block(&[
        ("2m", "10"),
        ("5m", "10"),
        ("2m", "15"),
        ("5m", "15"),
        ("2m", "20"),
        ("5m", "20"),
        ("10m", "0"),
    ]);
    assert!(script.contains(&expected), "script was:\n{}", script);
}

#[test]
fn test_method_is_upper_cased() {
    let config = TestConfig {
        method: "patch".to_string(),
        ..config_for(TestType::Load, 1)
    };
    let script = generate_k6_script(&config).unwrap();
    assert!(script.contains("http.request(\"PATCH\""));
}

#[test]
fn test_headers_become_an_object_literal() {
    let config = TestConfig {
        headers: r#"{"Authorization": "Bearer abc", "X-Trace": "1"}"#.to_string(),
        ..config_for(TestType::Load, 1)
    };
    let script = generate_k6_script(&config).unwrap();
    assert!(
        script.contains(r#"headers: {"Authorization":"Bearer abc","X-Trace":"1"},"#),
        "script was:\n{}",
        script
    );
}

#[test]
fn test_blank_headers_become_empty_object() {
    let config = TestConfig {
        headers: String::new(),
        ..config_for(TestType::Load, 1)
    };
    let script = generate_k6_script(&config).unwrap();
    assert!(script.contains("headers: {},"));
}

#[test]
fn test_body_is_sent_as_string_payload() {
    let config = TestConfig {
        method: "POST".to_string(),
        body: r#"{"title": "foo"}"#.to_string(),
        ..config_for(TestType::Load, 1)
    };
    let script = generate_k6_script(&config).unwrap();
    assert!(
        script.contains(r#"let payload = "{\"title\": \"foo\"}";"#),
        "script was:\n{}",
        script
    );
}

#[test]
fn test_blank_body_is_null_payload() {
    let script = generate_k6_script(&config_for(TestType::Load, 1)).unwrap();
    assert!(script.contains("let payload = null;"));
}

#[test]
fn test_checks_and_sleep() {
    let script = generate_k6_script(&config_for(TestType::Load, 1)).unwrap();
    assert!(script.contains("'status is 200': (r) => r.status === 200,"));
    assert!(script.contains("'response time < 500ms': (r) => r.timings.duration < 500,"));
    assert!(script.contains("sleep(1);"));
}

#[test]
fn test_headers_that_are_not_an_object_fail() {
    let config = TestConfig {
        headers: "[\"a\"]".to_string(),
        ..config_for(TestType::Load, 1)
    };
    assert!(matches!(
        generate_k6_script(&config),
        Err(ScriptError::Headers(_))
    ));
}
