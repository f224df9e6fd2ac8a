//! Field-level validation for submitted test configurations.
//!
//! Each validator checks one field and reports a [`ValidationError`] naming
//! that field. [`ValidationContext`] collects errors so a form submission can
//! report every problem at once.

use thiserror::Error;

use crate::utils::parse_duration_string;

/// Validation error with context about which field failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Field '{field}': {message}")]
    FieldError { field: String, message: String },

    #[error("Field '{field}': value {value} is out of range ({min} to {max})")]
    OutOfRange {
        field: String,
        value: String,
        min: String,
        max: String,
    },

    #[error("Field '{field}': invalid format - {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Field '{field}': invalid JSON - {message}")]
    InvalidJson { field: String, message: String },

    #[error("Field '{field}': invalid enum value '{value}'. Expected one of: {expected}")]
    InvalidEnum {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Multiple validation errors: {0}")]
    Multiple(String),
}

impl ValidationError {
    /// True when the error came from a JSON text field (headers or body).
    pub fn is_json_error(&self) -> bool {
        matches!(self, ValidationError::InvalidJson { .. })
    }
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Collects validation errors across several fields.
#[derive(Debug, Default)]
pub struct ValidationContext {
    errors: Vec<ValidationError>,
}

impl ValidationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a validation error.
    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Record the error of a validator result, if any.
    pub fn check(&mut self, result: ValidationResult<()>) {
        if let Err(e) = result {
            self.add_error(e);
        }
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Consume the context and return a result.
    ///
    /// A single error is returned as-is; several are folded into
    /// [`ValidationError::Multiple`].
    pub fn into_result(mut self) -> ValidationResult<()> {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(self.errors.remove(0)),
            _ => {
                let messages: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
                Err(ValidationError::Multiple(messages.join("; ")))
            }
        }
    }
}

/// Validator for target URLs.
pub struct UrlValidator;

impl UrlValidator {
    pub fn validate(url: &str) -> ValidationResult<()> {
        if url.trim().is_empty() {
            return Err(ValidationError::InvalidFormat {
                field: "url".to_string(),
                message: "URL cannot be empty".to_string(),
            });
        }

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ValidationError::InvalidFormat {
                field: "url".to_string(),
                message: format!("URL must start with http:// or https://, got: {}", url),
            });
        }

        if url.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidFormat {
                field: "url".to_string(),
                message: "URL cannot contain spaces".to_string(),
            });
        }

        Ok(())
    }
}

/// Validator for k6 duration strings.
pub struct DurationValidator;

impl DurationValidator {
    pub fn validate(duration_str: &str) -> ValidationResult<()> {
        Self::parse(duration_str).map(|_| ())
    }

    pub fn validate_positive(duration_str: &str) -> ValidationResult<()> {
        let duration = Self::parse(duration_str)?;
        if duration.is_zero() {
            return Err(ValidationError::OutOfRange {
                field: "duration".to_string(),
                value: duration_str.trim().to_string(),
                min: "1s".to_string(),
                max: "unlimited".to_string(),
            });
        }
        Ok(())
    }

    fn parse(duration_str: &str) -> ValidationResult<std::time::Duration> {
        parse_duration_string(duration_str).map_err(|e| ValidationError::InvalidFormat {
            field: "duration".to_string(),
            message: format!("Invalid duration format '{}': {}", duration_str, e),
        })
    }
}

/// Validator for numeric ranges.
pub struct RangeValidator;

impl RangeValidator {
    pub fn validate_u64(value: u64, min: u64, max: u64, field: &str) -> ValidationResult<()> {
        if value < min || value > max {
            return Err(ValidationError::OutOfRange {
                field: field.to_string(),
                value: value.to_string(),
                min: min.to_string(),
                max: max.to_string(),
            });
        }
        Ok(())
    }
}

/// Validator for HTTP methods offered by the form.
pub struct HttpMethodValidator;

impl HttpMethodValidator {
    pub const VALID_METHODS: &'static [&'static str] = &["GET", "POST", "PUT", "DELETE", "PATCH"];

    pub fn validate(method: &str) -> ValidationResult<()> {
        let method_upper = method.trim().to_uppercase();
        if !Self::VALID_METHODS.contains(&method_upper.as_str()) {
            return Err(ValidationError::InvalidEnum {
                field: "method".to_string(),
                value: method.to_string(),
                expected: Self::VALID_METHODS.join(", "),
            });
        }
        Ok(())
    }

    /// Methods for which the form shows a request body field.
    pub fn accepts_body(method: &str) -> bool {
        matches!(
            method.trim().to_uppercase().as_str(),
            "POST" | "PUT" | "PATCH"
        )
    }
}

/// Validator for free-form JSON text fields.
pub struct JsonTextValidator;

impl JsonTextValidator {
    /// Blank text is accepted; anything else must parse as JSON.
    pub fn validate(text: &str, field: &str) -> ValidationResult<Option<serde_json::Value>> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(text)
            .map(Some)
            .map_err(|e| ValidationError::InvalidJson {
                field: field.to_string(),
                message: e.to_string(),
            })
    }

    /// Blank text is accepted; anything else must be a JSON object.
    pub fn validate_object(
        text: &str,
        field: &str,
    ) -> ValidationResult<serde_json::Map<String, serde_json::Value>> {
        match Self::validate(text, field)? {
            None => Ok(serde_json::Map::new()),
            Some(serde_json::Value::Object(map)) => Ok(map),
            Some(_) => Err(ValidationError::InvalidJson {
                field: field.to_string(),
                message: "expected a JSON object".to_string(),
            }),
        }
    }
}
