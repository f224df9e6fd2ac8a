//! Formatting of run results for display.

use serde::Serialize;

use crate::config_validation::ValidationError;
use crate::dashboard::{Notification, NotificationVariant};
use crate::results::{MetricsSummary, TestMetrics, TimelinePoint};
use crate::test_config::TestConfig;

/// Formats milliseconds as "250ms" below one second and "1.50s" above.
pub fn format_duration(ms: f64) -> String {
    if ms < 1000.0 {
        format!("{:.0}ms", ms)
    } else {
        format!("{:.2}s", ms / 1000.0)
    }
}

/// Inserts thousands separators: 12345 -> "12,345".
pub fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Colour band of the success-rate card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuccessRateLevel {
    Success,
    Warning,
    Error,
}

impl SuccessRateLevel {
    pub fn from_rate(rate: f64) -> Self {
        if rate >= 99.0 {
            SuccessRateLevel::Success
        } else if rate >= 95.0 {
            SuccessRateLevel::Warning
        } else {
            SuccessRateLevel::Error
        }
    }
}

/// Errors as a percentage of all requests; 0 when nothing ran.
pub fn error_rate(summary: &MetricsSummary) -> f64 {
    if summary.total_requests == 0 {
        0.0
    } else {
        summary.errors as f64 / summary.total_requests as f64 * 100.0
    }
}

/// "load • 10 VUs • 30s"
pub fn test_badge(config: &TestConfig) -> String {
    format!(
        "{} \u{2022} {} VUs \u{2022} {}",
        config.test_type, config.vus, config.duration
    )
}

/// Text shown while a run is in progress.
pub fn running_message(config: &TestConfig) -> String {
    format!(
        "Testing {} with {} virtual users",
        config.url, config.vus
    )
}

/// Summary cards and performance summary as plain text.
pub fn render_summary(metrics: &TestMetrics) -> String {
    let s = &metrics.summary;
    let rows = [
        ("Total Requests", format_count(s.total_requests)),
        (
            "Success Rate",
            format!(
                "{:.2}% ({:?})",
                s.success_rate,
                SuccessRateLevel::from_rate(s.success_rate)
            ),
        ),
        ("Avg Response", format_duration(s.avg_response_time)),
        ("Requests/sec", format!("{:.1}", s.rps)),
        ("P95 Response Time", format_duration(s.p95_response_time)),
        ("Total Errors", s.errors.to_string()),
        ("Error Rate", format!("{:.2}%", error_rate(s))),
    ];

    rows.iter()
        .map(|(label, value)| format!("{:<20} {}\n", label, value))
        .collect()
}

/// One table row per timeline point.
pub fn render_timeline(timeline: &[TimelinePoint]) -> String {
    let mut out = format!(
        "{:>8} {:>12} {:>10} {:>8}\n",
        "time", "response", "rps", "errors"
    );
    for point in timeline {
        out.push_str(&format!(
            "{:>8} {:>12} {:>10.1} {:>8}\n",
            point.timestamp,
            format_duration(point.response_time),
            point.rps,
            point.errors
        ));
    }
    out
}

pub fn completion_notification(metrics: &TestMetrics) -> Notification {
    Notification {
        title: "Test completed successfully".to_string(),
        description: format!(
            "Processed {} requests",
            format_count(metrics.summary.total_requests)
        ),
        variant: NotificationVariant::Default,
    }
}

pub fn failure_notification() -> Notification {
    Notification {
        title: "Test failed".to_string(),
        description: "Unable to run performance test. Please check your configuration."
            .to_string(),
        variant: NotificationVariant::Destructive,
    }
}

pub fn invalid_json_notification() -> Notification {
    Notification {
        title: "Invalid JSON".to_string(),
        description: "Please check your headers and body JSON formatting".to_string(),
        variant: NotificationVariant::Destructive,
    }
}

pub fn invalid_config_notification(error: &ValidationError) -> Notification {
    if error.is_json_error() {
        invalid_json_notification()
    } else {
        Notification {
            title: "Invalid configuration".to_string(),
            description: error.to_string(),
            variant: NotificationVariant::Destructive,
        }
    }
}
