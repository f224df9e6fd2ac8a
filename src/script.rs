//! k6 script generation.
//!
//! Renders a [`TestConfig`] into a k6 ES module. User-provided strings are
//! embedded as JSON string literals so quotes and newlines in URLs, header
//! values or bodies cannot break out of the generated source.

use std::fmt::Write;
use thiserror::Error;

use crate::config_validation::ValidationError;
use crate::load_models::Stage;
use crate::test_config::TestConfig;
use crate::utils::format_js_number;

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Invalid headers: {0}")]
    Headers(#[from] ValidationError),

    #[error("Failed to encode script value: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to render script: {0}")]
    Format(#[from] std::fmt::Error),
}

/// Generates the k6 script for `config`.
pub fn generate_k6_script(config: &TestConfig) -> Result<String, ScriptError> {
    let headers = serde_json::to_string(&config.parsed_headers()?)?;
    let payload = match config.body_payload() {
        Some(body) => serde_json::to_string(body)?,
        None => "null".to_string(),
    };
    let method = serde_json::to_string(&config.normalized_method())?;
    let url = serde_json::to_string(&config.url)?;
    let duration = serde_json::to_string(config.duration.trim())?;

    let mut script = String::new();

    writeln!(script, "import http from 'k6/http';")?;
    writeln!(script, "import {{ check, sleep }} from 'k6';")?;
    writeln!(script)?;
    writeln!(script, "export let options = {{")?;
    writeln!(script, "  vus: {},", config.vus)?;
    writeln!(script, "  duration: {},", duration)?;
    write_stages(&mut script, &config.test_type.stages(config.vus))?;
    writeln!(script, "}};")?;
    writeln!(script)?;
    writeln!(script, "export default function () {{")?;
    writeln!(script, "  let params = {{")?;
    writeln!(script, "    headers: {},", headers)?;
    writeln!(script, "  }};")?;
    writeln!(script)?;
    writeln!(script, "  let payload = {};", payload)?;
    writeln!(script)?;
    writeln!(
        script,
        "  let res = http.request({}, {}, payload, params);",
        method, url
    )?;
    writeln!(script)?;
    writeln!(script, "  check(res, {{")?;
    writeln!(script, "    'status is 200': (r) => r.status === 200,")?;
    writeln!(
        script,
        "    'response time < 500ms': (r) => r.timings.duration < 500,"
    )?;
    writeln!(script, "  }});")?;
    writeln!(script)?;
    writeln!(script, "  sleep(1);")?;
    writeln!(script, "}}")?;

    Ok(script)
}

fn write_stages(script: &mut String, stages: &[Stage]) -> Result<(), ScriptError> {
    if stages.is_empty() {
        return Ok(());
    }

    writeln!(script, "  stages: [")?;
    for stage in stages {
        writeln!(
            script,
            "    {{ duration: {}, target: {} }},",
            serde_json::to_string(&stage.duration)?,
            format_js_number(stage.target)
        )?;
    }
    writeln!(script, "  ],")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_models::TestType;

    #[test]
    fn load_script_has_no_stages() {
        let script = generate_k6_script(&TestConfig::default()).unwrap();
        assert!(script.contains("vus: 10,"));
        assert!(script.contains("duration: \"30s\","));
        assert!(!script.contains("stages"));
    }

    #[test]
    fn quotes_in_url_stay_inside_the_literal() {
        let config = TestConfig {
            url: "https://example.com/?q=\"');evil()//".to_string(),
            ..TestConfig::default()
        };
        let script = generate_k6_script(&config).unwrap();
        assert!(script.contains(r#""https://example.com/?q=\"');evil()//""#));
    }

    #[test]
    fn invalid_headers_are_rejected() {
        let config = TestConfig {
            headers: "{not json".to_string(),
            ..TestConfig::default()
        };
        assert!(matches!(
            generate_k6_script(&config),
            Err(ScriptError::Headers(_))
        ));
    }

    #[test]
    fn stress_targets_print_like_js_numbers() {
        let config = TestConfig {
            vus: 5,
            test_type: TestType::Stress,
            ..TestConfig::default()
        };
        let script = generate_k6_script(&config).unwrap();
        assert!(script.contains("{ duration: \"2m\", target: 7.5 },"));
        assert!(script.contains("{ duration: \"10m\", target: 0 },"));
    }
}
