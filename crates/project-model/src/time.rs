//! Time utilities: safe-seconds normalization and timecode conversions.
//!
//! Every duration or timestamp that crosses a boundary (decoded metadata,
//! service responses, user input, restored snapshots) goes through
//! [`safe_seconds`] or [`safe_duration`] so non-finite or negative values
//! never reach clip intervals or rendered strings.

/// Duration assigned to media whose length is unknown or unparsable.
pub const UNKNOWN_DURATION_SECS: f64 = 10.0;

/// Largest time rendered by the timecode formatters (`99:59:59.999`).
/// Longer times are clamped to it.
pub const MAX_TIMECODE_SECS: f64 = 359_999.999;

/// Normalize a timestamp: non-finite or negative input becomes `0.0`.
pub fn safe_seconds(value: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        0.0
    }
}

/// Normalize a duration: anything that is not a finite positive number
/// becomes `fallback`.
pub fn safe_duration(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        fallback
    }
}

/// Convert scene milliseconds into timeline seconds.
pub fn ms_to_secs(ms: f64) -> f64 {
    safe_seconds(ms) / 1000.0
}

/// Format seconds as `HH:MM:SS.mmm`.
///
/// Invalid input renders as `00:00:00.000`; anything past
/// [`MAX_TIMECODE_SECS`] renders as the maximum.
pub fn seconds_to_timecode(seconds: f64) -> String {
    let total_ms = (safe_seconds(seconds).min(MAX_TIMECODE_SECS) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{secs:02}.{ms:03}")
}

/// Format seconds as `HH:MM:SS`, the display form used for clip durations
/// and recording names.
pub fn format_hms(seconds: f64) -> String {
    let total_secs = safe_seconds(seconds).min(MAX_TIMECODE_SECS).floor() as u64;
    format!(
        "{:02}:{:02}:{:02}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60
    )
}

/// Parse a duration string into seconds.
///
/// Accepts `H:MM:SS`, `MM:SS`, or a bare integer (the last component may
/// carry a fractional part). Empty input and `"Unknown"` yield
/// [`UNKNOWN_DURATION_SECS`]; so does a bare zero. Anything else that does
/// not parse also yields the fallback, with a warning.
pub fn timecode_to_seconds(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("unknown") {
        return UNKNOWN_DURATION_SECS;
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    let parsed = match parts.as_slice() {
        [h, m, s] => parse_component(h)
            .zip(parse_component(m))
            .zip(parse_last_component(s))
            .map(|((h, m), s)| h * 3600.0 + m * 60.0 + s),
        [m, s] => parse_component(m)
            .zip(parse_last_component(s))
            .map(|(m, s)| m * 60.0 + s),
        [s] => parse_last_component(s).filter(|secs| *secs > 0.0),
        _ => None,
    };

    match parsed {
        Some(secs) if secs.is_finite() => secs,
        _ => {
            tracing::warn!(input = %text, "Invalid duration format, defaulting to {UNKNOWN_DURATION_SECS}s");
            UNKNOWN_DURATION_SECS
        }
    }
}

fn parse_component(part: &str) -> Option<f64> {
    part.trim().parse::<u64>().ok().map(|v| v as f64)
}

fn parse_last_component(part: &str) -> Option<f64> {
    let value = part.trim().parse::<f64>().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timecode_format() {
        assert_eq!(seconds_to_timecode(0.0), "00:00:00.000");
        assert_eq!(seconds_to_timecode(61.5), "00:01:01.500");
        assert_eq!(seconds_to_timecode(3723.042), "01:02:03.042");
    }

    #[test]
    fn test_timecode_rejects_invalid_input() {
        assert_eq!(seconds_to_timecode(f64::NAN), "00:00:00.000");
        assert_eq!(seconds_to_timecode(f64::INFINITY), "00:00:00.000");
        assert_eq!(seconds_to_timecode(-4.0), "00:00:00.000");
    }

    #[test]
    fn test_format_hms() {
        assert_eq!(format_hms(12.9), "00:00:12");
        assert_eq!(format_hms(3600.0), "01:00:00");
    }

    #[test]
    fn test_formatters_clamp_huge_times() {
        assert_eq!(seconds_to_timecode(1e300), "99:59:59.999");
        assert_eq!(seconds_to_timecode(f64::MAX), "99:59:59.999");
        assert_eq!(format_hms(1e20), "99:59:59");
        assert_eq!(seconds_to_timecode(MAX_TIMECODE_SECS), "99:59:59.999");
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(timecode_to_seconds("01:02:03"), 3723.0);
        assert_eq!(timecode_to_seconds("02:30"), 150.0);
        assert_eq!(timecode_to_seconds("42"), 42.0);
        assert_eq!(timecode_to_seconds("00:00:12.5"), 12.5);
    }

    #[test]
    fn test_parse_fallbacks() {
        assert_eq!(timecode_to_seconds(""), UNKNOWN_DURATION_SECS);
        assert_eq!(timecode_to_seconds("Unknown"), UNKNOWN_DURATION_SECS);
        assert_eq!(timecode_to_seconds("abc"), UNKNOWN_DURATION_SECS);
        assert_eq!(timecode_to_seconds("1:2:3:4"), UNKNOWN_DURATION_SECS);
        assert_eq!(timecode_to_seconds("-5"), UNKNOWN_DURATION_SECS);
        assert_eq!(timecode_to_seconds("0"), UNKNOWN_DURATION_SECS);
        assert_eq!(timecode_to_seconds("inf"), UNKNOWN_DURATION_SECS);
    }

    #[test]
    fn test_safe_helpers() {
        assert_eq!(safe_seconds(f64::NEG_INFINITY), 0.0);
        assert_eq!(safe_seconds(2.5), 2.5);
        assert_eq!(safe_duration(0.0, 30.0), 30.0);
        assert_eq!(safe_duration(f64::NAN, 30.0), 30.0);
        assert_eq!(ms_to_secs(5000.0), 5.0);
    }
}
