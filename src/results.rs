//! Test run results and k6 output aggregation.
//!
//! k6 `--out json` writes one JSON object per line. `Metric` lines declare a
//! metric, `Point` lines carry a single sample:
//!
//! ```text
//! {"type":"Point","metric":"http_req_duration","data":{"time":"2024-05-01T10:00:00.5Z","value":123.4,"tags":{"status":"200"}}}
//! ```
//!
//! [`parse_k6_output`] folds the points into a [`TestMetrics`] summary and a
//! timeline of fixed-width buckets.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use crate::percentiles::PercentileTracker;

/// Width of one timeline bucket, in seconds.
pub const TIMELINE_BUCKET_SECS: i64 = 5;

#[derive(Error, Debug)]
pub enum ResultsParseError {
    #[error("line {line}: {source}")]
    InvalidLine {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("line {line}: malformed '{metric}' point: {source}")]
    InvalidPoint {
        line: usize,
        metric: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("k6 output contained no request samples")]
    NoSamples,

    #[error("{0}")]
    Histogram(String),
}

/// Aggregate numbers shown on the summary cards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub total_requests: u64,
    /// Percentage of successful requests, 0 to 100.
    pub success_rate: f64,
    /// Milliseconds.
    pub avg_response_time: f64,
    /// Milliseconds.
    pub p95_response_time: f64,
    pub rps: f64,
    pub errors: u64,
}

/// One point of the response-time/throughput timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelinePoint {
    /// Offset from the start of the run, e.g. "15s".
    pub timestamp: String,
    pub response_time: f64,
    pub rps: f64,
    pub errors: u64,
}

/// Everything the dashboard needs to render one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestMetrics {
    pub summary: MetricsSummary,
    pub timeline: Vec<TimelinePoint>,
}

impl TestMetrics {
    /// True when the success rate lies in [0, 100] and errors do not exceed
    /// the request count.
    pub fn is_consistent(&self) -> bool {
        let summary = &self.summary;
        (0.0..=100.0).contains(&summary.success_rate) && summary.errors <= summary.total_requests
    }
}

#[derive(Deserialize)]
struct K6Line {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    metric: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Deserialize)]
struct PointData {
    time: DateTime<FixedOffset>,
    value: f64,
    #[serde(default)]
    tags: Option<HashMap<String, serde_json::Value>>,
}

impl PointData {
    fn status(&self) -> Option<u16> {
        let status = self.tags.as_ref()?.get("status")?;
        match status {
            serde_json::Value::String(s) => s.parse().ok(),
            serde_json::Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
            _ => None,
        }
    }
}

/// A request counted from an `http_reqs` point.
struct RequestSample {
    time: DateTime<FixedOffset>,
    failed_status: bool,
}

/// Accumulates k6 points, one line at a time.
#[derive(Default)]
pub struct ResultsAggregator {
    requests: Vec<RequestSample>,
    durations: Vec<(DateTime<FixedOffset>, f64)>,
    failures: Vec<(DateTime<FixedOffset>, bool)>,
}

impl ResultsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one line of k6 JSON output. Blank lines are skipped.
    pub fn push_line(&mut self, line_no: usize, line: &str) -> Result<(), ResultsParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }

        let record: K6Line =
            serde_json::from_str(line).map_err(|source| ResultsParseError::InvalidLine {
                line: line_no,
                source,
            })?;

        if record.kind != "Point" {
            return Ok(());
        }

        let metric = record.metric.as_str();
        if !matches!(metric, "http_reqs" | "http_req_duration" | "http_req_failed") {
            return Ok(());
        }

        let point: PointData =
            serde_json::from_value(record.data).map_err(|source| ResultsParseError::InvalidPoint {
                line: line_no,
                metric: record.metric.clone(),
                source,
            })?;

        match metric {
            "http_reqs" => self.requests.push(RequestSample {
                time: point.time,
                failed_status: point.status().map_or(false, |s| s >= 400),
            }),
            "http_req_duration" => self.durations.push((point.time, point.value)),
            _ => self.failures.push((point.time, point.value != 0.0)),
        }

        Ok(())
    }

    /// Builds the summary and timeline from everything pushed so far.
    pub fn finish(self) -> Result<TestMetrics, ResultsParseError> {
        let times = self
            .requests
            .iter()
            .map(|r| r.time)
            .chain(self.durations.iter().map(|(t, _)| *t))
            .chain(self.failures.iter().map(|(t, _)| *t));

        let (start, end) = match times.fold(None, |range: Option<(_, _)>, t| match range {
            None => Some((t, t)),
            Some((lo, hi)) => Some((lo.min(t), hi.max(t))),
        }) {
            Some(range) if !(self.requests.is_empty() && self.durations.is_empty()) => range,
            _ => return Err(ResultsParseError::NoSamples),
        };

        // Request timestamps, each flagged as failed or not.
        let outcomes: Vec<(DateTime<FixedOffset>, bool)> = if !self.failures.is_empty() {
            self.failures.clone()
        } else if !self.requests.is_empty() {
            self.requests
                .iter()
                .map(|r| (r.time, r.failed_status))
                .collect()
        } else {
            self.durations.iter().map(|(t, _)| (*t, false)).collect()
        };

        let total_requests = if self.requests.is_empty() {
            outcomes.len() as u64
        } else {
            self.requests.len() as u64
        };
        let errors = (outcomes.iter().filter(|(_, failed)| *failed).count() as u64)
            .min(total_requests);

        let mut tracker = PercentileTracker::new().map_err(ResultsParseError::Histogram)?;
        for (_, ms) in &self.durations {
            tracker.record_ms(*ms);
        }
        let avg_response_time = if self.durations.is_empty() {
            0.0
        } else {
            self.durations.iter().map(|(_, ms)| ms).sum::<f64>() / self.durations.len() as f64
        };
        let stats = tracker.stats();
        if let Some(stats) = &stats {
            debug!("Response times: {}", stats.format());
        }
        let p95_response_time = stats.map_or(0.0, |s| s.p95);

        let elapsed_secs = ((end - start).num_milliseconds() as f64 / 1000.0).max(1.0);

        let success_rate = if total_requests == 0 {
            100.0
        } else {
            ((total_requests - errors) as f64 / total_requests as f64 * 100.0).clamp(0.0, 100.0)
        };

        let summary = MetricsSummary {
            total_requests,
            success_rate,
            avg_response_time,
            p95_response_time,
            rps: total_requests as f64 / elapsed_secs,
            errors,
        };

        let request_times: Vec<DateTime<FixedOffset>> = if self.requests.is_empty() {
            outcomes.iter().map(|(t, _)| *t).collect()
        } else {
            self.requests.iter().map(|r| r.time).collect()
        };

        let timeline = build_timeline(start, end, &request_times, &self.durations, &outcomes);

        Ok(TestMetrics { summary, timeline })
    }
}

fn bucket_index(start: DateTime<FixedOffset>, t: DateTime<FixedOffset>) -> usize {
    let offset_ms = (t - start).num_milliseconds().max(0);
    (offset_ms / (TIMELINE_BUCKET_SECS * 1000)) as usize
}

fn build_timeline(
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
    requests: &[DateTime<FixedOffset>],
    durations: &[(DateTime<FixedOffset>, f64)],
    outcomes: &[(DateTime<FixedOffset>, bool)],
) -> Vec<TimelinePoint> {
    let buckets = bucket_index(start, end) + 1;

    let mut request_counts = vec![0u64; buckets];
    let mut duration_sums = vec![(0.0f64, 0u64); buckets];
    let mut error_counts = vec![0u64; buckets];

    for t in requests {
        request_counts[bucket_index(start, *t)] += 1;
    }
    for (t, ms) in durations {
        let slot = &mut duration_sums[bucket_index(start, *t)];
        slot.0 += ms;
        slot.1 += 1;
    }
    for (t, failed) in outcomes {
        if *failed {
            error_counts[bucket_index(start, *t)] += 1;
        }
    }

    (0..buckets)
        .map(|i| {
            let (sum, count) = duration_sums[i];
            TimelinePoint {
                timestamp: format!("{}s", i as i64 * TIMELINE_BUCKET_SECS),
                response_time: if count == 0 { 0.0 } else { sum / count as f64 },
                rps: request_counts[i] as f64 / TIMELINE_BUCKET_SECS as f64,
                errors: error_counts[i],
            }
        })
        .collect()
}

/// Parses the complete JSON-lines output of a k6 run.
pub fn parse_k6_output(output: &str) -> Result<TestMetrics, ResultsParseError> {
    let mut aggregator = ResultsAggregator::new();
    for (index, line) in output.lines().enumerate() {
        aggregator.push_line(index + 1, line)?;
    }
    aggregator.finish()
}
