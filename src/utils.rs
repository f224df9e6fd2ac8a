use std::str::FromStr;
use std::time::Duration;

/// Parses a k6-style duration string such as "30s", "10m", "1h30m" or "500ms".
///
/// Supported units:
/// - `ms` for milliseconds
/// - `s` for seconds
/// - `m` for minutes
/// - `h` for hours
/// - `d` for days
///
/// Segments may be chained ("1m30s"); every segment needs a unit.
pub fn parse_duration_string(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration string cannot be empty".to_string());
    }

    let mut total = Duration::ZERO;
    let mut rest = s;

    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let (digits, tail) = rest.split_at(digits_end);

        let value = match u64::from_str(digits) {
            Ok(v) => v,
            Err(_) => return Err(format!("Invalid numeric value in duration: '{}'", s)),
        };

        let unit_end = tail.find(|c: char| c.is_ascii_digit()).unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_end);

        let segment = match unit {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value.saturating_mul(60)),
            "h" => Duration::from_secs(value.saturating_mul(60 * 60)),
            "d" => Duration::from_secs(value.saturating_mul(24 * 60 * 60)),
            "" => {
                return Err(format!(
                    "Unknown duration unit: missing after '{}'. Use 'ms', 's', 'm', 'h', or 'd'.",
                    value
                ))
            }
            other => {
                return Err(format!(
                    "Unknown duration unit: '{}'. Use 'ms', 's', 'm', 'h', or 'd'.",
                    other
                ))
            }
        };

        total = total.saturating_add(segment);
        rest = tail;
    }

    Ok(total)
}

/// Formats a number the way JavaScript prints it: whole values without a
/// fractional part ("15"), everything else with the shortest representation
/// ("7.5").
pub fn format_js_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
