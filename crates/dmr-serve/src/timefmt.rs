//! Conversion between seconds and the `HH:MM:SS[.fff]` strings used by
//! AVTransport position/duration arguments.

/// Format a non-negative duration in seconds as `HH:MM:SS`, truncating
/// any fractional part.
pub fn duration_to_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

/// Parse `HH:MM:SS` with an optional `.fff` fraction into seconds.
pub fn time_to_seconds(time: &str) -> Option<f64> {
    let parts: Vec<&str> = time.trim().split(':').collect();
    let &[hours, minutes, seconds] = parts.as_slice() else {
        return None;
    };
    let hours: u64 = hours.parse().ok()?;
    let minutes: u64 = minutes.parse().ok()?;
    let (whole, fraction) = match seconds.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (seconds, None),
    };
    let whole: u64 = whole.parse().ok()?;
    let fraction = match fraction {
        Some(digits) if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
            format!("0.{digits}").parse::<f64>().ok()?
        }
        Some(_) => return None,
        None => 0.0,
    };
    Some((hours * 3600 + minutes * 60 + whole) as f64 + fraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trips_whole_seconds() {
        for seconds in [0u64, 1, 59, 60, 61, 3599, 3600, 3661, 7200, 86399, 359999] {
            let formatted = duration_to_time(seconds as f64);
            assert_eq!(
                time_to_seconds(&formatted),
                Some(seconds as f64),
                "{formatted}"
            );
        }
    }

    #[test]
    fn test_known_values() {
        assert_eq!(duration_to_time(90.0), "00:01:30");
        assert_eq!(duration_to_time(3661.9), "01:01:01");
        assert_eq!(duration_to_time(-5.0), "00:00:00");
        assert_eq!(duration_to_time(f64::NAN), "00:00:00");

        assert_eq!(time_to_seconds("00:01:30"), Some(90.0));
        assert_eq!(time_to_seconds("01:00:00.500"), Some(3600.5));
        assert_eq!(time_to_seconds(" 00:00:05 "), Some(5.0));
    }

    #[test]
    fn test_rejects_malformed_input() {
        for input in [
            "not-a-time",
            "00:01",
            "1:2:3:4",
            "-00:01:00",
            "00:01:3x",
            "00:01:30.",
            "00:01:30.5x",
            "",
        ] {
            assert_eq!(time_to_seconds(input), None, "{input:?}");
        }
    }
}
