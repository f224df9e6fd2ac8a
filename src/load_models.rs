use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::config_validation::ValidationError;
use crate::utils::parse_duration_string;

/// Named load profiles offered by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    /// Constant number of virtual users for the whole duration.
    #[default]
    Load,

    /// Short bursts to double the base load and back.
    /// - 10s ramp to base, 1m hold
    /// - 10s spike to 2x, 3m hold
    /// - 10s back to base, 3m hold
    /// - 10s ramp down to zero
    Spike,

    /// Stepped increase to 1.5x then 2x the base load, with a long ramp down.
    Stress,

    /// Constant load, intended for long durations.
    Soak,
}

impl TestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestType::Load => "load",
            TestType::Spike => "spike",
            TestType::Stress => "stress",
            TestType::Soak => "soak",
        }
    }

    pub fn all() -> [TestType; 4] {
        [
            TestType::Load,
            TestType::Stress,
            TestType::Spike,
            TestType::Soak,
        ]
    }

    /// Stage list for this profile, scaled to `vus` virtual users.
    ///
    /// Load and soak tests run without stages and rely on the plain
    /// `vus`/`duration` options.
    pub fn stages(&self, vus: u32) -> Vec<Stage> {
        let base = f64::from(vus);

        match self {
            TestType::Load | TestType::Soak => Vec::new(),
            TestType::Spike => vec![
                Stage::new("10s", base),
                Stage::new("1m", base),
                Stage::new("10s", base * 2.0),
                Stage::new("3m", base * 2.0),
                Stage::new("10s", base),
                Stage::new("3m", base),
                Stage::new("10s", 0.0),
            ],
            TestType::Stress => vec![
                Stage::new("2m", base),
                Stage::new("5m", base),
                Stage::new("2m", base * 1.5),
                Stage::new("5m", base * 1.5),
                Stage::new("2m", base * 2.0),
                Stage::new("5m", base * 2.0),
                Stage::new("10m", 0.0),
            ],
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "load" => Ok(TestType::Load),
            "spike" => Ok(TestType::Spike),
            "stress" => Ok(TestType::Stress),
            "soak" => Ok(TestType::Soak),
            _ => Err(ValidationError::InvalidEnum {
                field: "testType".to_string(),
                value: s.to_string(),
                expected: "load, spike, stress, soak".to_string(),
            }),
        }
    }
}

/// A time-boxed target load level within a test profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub duration: String,
    pub target: f64,
}

impl Stage {
    pub fn new(duration: &str, target: f64) -> Self {
        Self {
            duration: duration.to_string(),
            target,
        }
    }
}

/// Sum of all stage durations.
pub fn total_stage_duration(stages: &[Stage]) -> Result<Duration, String> {
    stages.iter().try_fold(Duration::ZERO, |acc, stage| {
        parse_duration_string(&stage.duration).map(|d| acc + d)
    })
}

/// Highest target across all stages, or `None` for an empty list.
pub fn peak_target(stages: &[Stage]) -> Option<f64> {
    stages.iter().map(|s| s.target).reduce(f64::max)
}
