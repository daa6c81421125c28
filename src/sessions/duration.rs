//! Human-readable play durations: `MM:SS` below an hour, `HH:MM:SS` above.

use crate::error::{Error, Result};

/// Format whole seconds. Negative input is treated as zero.
pub fn format_duration(secs: i64) -> String {
    let secs = secs.max(0);
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// Parse `MM:SS` or `HH:MM:SS` back into seconds.
pub fn parse_duration(s: &str) -> Result<i64> {
    let invalid = || Error::InvalidDuration(s.to_string());

    let parts = s
        .trim()
        .split(':')
        .map(|p| {
            if p.is_empty() || !p.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid());
            }
            p.parse::<i64>().map_err(|_| invalid())
        })
        .collect::<Result<Vec<_>>>()?;

    let (hours, minutes, seconds) = match parts[..] {
        [m, s] => (0, m, s),
        [h, m, s] => (h, m, s),
        _ => return Err(invalid()),
    };
    if seconds >= 60 || (parts.len() == 3 && minutes >= 60) {
        return Err(invalid());
    }
    Ok(hours * 3600 + minutes * 60 + seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_format_examples() {
        assert_eq!(format_duration(0), "00:00");
        assert_eq!(format_duration(18), "00:18");
        assert_eq!(format_duration(3599), "59:59");
        assert_eq!(format_duration(3600), "01:00:00");
        assert_eq!(format_duration(45_296), "12:34:56");
        assert_eq!(format_duration(-5), "00:00");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "12", "1:2:3:4", "aa:bb", "01:60", "1:60:00", "-1:00", "01: 00"] {
            assert!(parse_duration(bad).is_err(), "{bad:?} should not parse");
        }
        assert_eq!(parse_duration("03:25").unwrap(), 205);
        assert_eq!(parse_duration("1:02:03").unwrap(), 3723);
    }

    proptest! {
        #[test]
        fn prop_short_durations_roundtrip(secs in 0i64..3600) {
            let formatted = format_duration(secs);
            prop_assert_eq!(formatted.len(), 5);
            prop_assert_eq!(parse_duration(&formatted).unwrap(), secs);
        }

        #[test]
        fn prop_long_durations_roundtrip(secs in 3600i64..360_000) {
            let formatted = format_duration(secs);
            prop_assert_eq!(formatted.matches(':').count(), 2);
            prop_assert_eq!(parse_duration(&formatted).unwrap(), secs);
        }
    }
}
