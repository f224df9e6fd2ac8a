//! The test configuration submitted by the dashboard form.

use serde::{Deserialize, Deserializer, Serialize};

use crate::config_validation::{
    DurationValidator, HttpMethodValidator, JsonTextValidator, RangeValidator, UrlValidator,
    ValidationContext, ValidationResult,
};
use crate::load_models::TestType;

pub const DEFAULT_URL: &str = "https://jsonplaceholder.typicode.com/posts";
pub const DEFAULT_HEADERS: &str = r#"{"Content-Type": "application/json"}"#;
pub const MIN_VUS: u32 = 1;
pub const MAX_VUS: u32 = 1000;

/// Parameters of a single load-test run.
///
/// `headers` and `body` hold raw JSON text exactly as typed into the form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestConfig {
    pub url: String,

    #[serde(default = "default_method")]
    pub method: String,

    #[serde(default, deserialize_with = "raw_json_text")]
    pub headers: String,

    #[serde(default, deserialize_with = "raw_json_text")]
    pub body: String,

    #[serde(default = "default_vus")]
    pub vus: u32,

    #[serde(default = "default_duration")]
    pub duration: String,

    #[serde(default)]
    pub test_type: TestType,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_vus() -> u32 {
    10
}

fn default_duration() -> String {
    "30s".to_string()
}

/// Accepts either JSON text or an inline JSON value and keeps it as text.
fn raw_json_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(text)) => text,
        Some(other) => other.to_string(),
    })
}

impl Default for TestConfig {
    /// The form's initial values.
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            method: default_method(),
            headers: DEFAULT_HEADERS.to_string(),
            body: String::new(),
            vus: default_vus(),
            duration: default_duration(),
            test_type: TestType::default(),
        }
    }
}

impl TestConfig {
    /// Checks only the JSON text fields, the way the form does before submitting.
    pub fn validate_json_fields(&self) -> ValidationResult<()> {
        let mut ctx = ValidationContext::new();
        ctx.check(JsonTextValidator::validate_object(&self.headers, "headers").map(|_| ()));
        ctx.check(JsonTextValidator::validate(&self.body, "body").map(|_| ()));
        ctx.into_result()
    }

    /// Validates every field and reports all problems together.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut ctx = ValidationContext::new();
        ctx.check(UrlValidator::validate(&self.url));
        ctx.check(HttpMethodValidator::validate(&self.method));
        ctx.check(JsonTextValidator::validate_object(&self.headers, "headers").map(|_| ()));
        ctx.check(JsonTextValidator::validate(&self.body, "body").map(|_| ()));
        ctx.check(RangeValidator::validate_u64(
            u64::from(self.vus),
            u64::from(MIN_VUS),
            u64::from(MAX_VUS),
            "vus",
        ));
        ctx.check(DurationValidator::validate_positive(&self.duration));
        ctx.into_result()
    }

    /// Upper-cased HTTP method.
    pub fn normalized_method(&self) -> String {
        self.method.trim().to_uppercase()
    }

    /// Headers as a JSON object; blank text yields an empty object.
    pub fn parsed_headers(&self) -> ValidationResult<serde_json::Map<String, serde_json::Value>> {
        JsonTextValidator::validate_object(&self.headers, "headers")
    }

    /// Request payload, or `None` when the body is blank.
    pub fn body_payload(&self) -> Option<&str> {
        if self.body.trim().is_empty() {
            None
        } else {
            Some(self.body.as_str())
        }
    }
}
