//! Human-readable timespans ("25 years", "6 months", "30d").
//!
//! Years and months use the canonical year from [`crate::rate`], so a
//! duration of "1 year" is exactly twelve payment periods of "1 month".

use crate::rate::{Frequency, SECONDS_PER_YEAR};

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const WEEK: u64 = 7 * DAY;
const YEAR: u64 = SECONDS_PER_YEAR as u64;
const MONTH: u64 = YEAR / 12;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimespanError {
    #[error("empty timespan")]
    Empty,

    #[error("invalid number '{0}' in timespan")]
    Number(String),

    #[error("unknown time unit '{0}'")]
    Unit(String),

    #[error("timespan '{0}' has a unit with no number")]
    MissingNumber(String),
}

fn unit_secs(unit: &str) -> Option<f64> {
    let secs = match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" => MINUTE,
        "h" | "hr" | "hrs" | "hour" | "hours" => HOUR,
        "d" | "day" | "days" => DAY,
        "w" | "wk" | "wks" | "week" | "weeks" => WEEK,
        "mo" | "mon" | "month" | "months" => MONTH,
        "y" | "yr" | "yrs" | "year" | "years" => YEAR,
        _ => return None,
    };
    Some(secs as f64)
}

/// Parses a timespan into seconds.
///
/// Accepts bare seconds ("3600"), one or more number/unit pairs
/// ("25y", "1 year and 6 months") or a frequency name ("monthly").
pub fn parse_timespan(text: &str) -> Result<f64, TimespanError> {
    let text = text.trim().to_ascii_lowercase();
    if text.is_empty() {
        return Err(TimespanError::Empty);
    }
    if let Ok(freq) = text.parse::<Frequency>() {
        return Ok(freq.period_secs());
    }
    if let Ok(secs) = text.parse::<f64>() {
        return if secs.is_finite() {
            Ok(secs)
        } else {
            Err(TimespanError::Number(text))
        };
    }

    let mut total = 0.;
    let mut number: Option<f64> = None;
    let mut chars = text.char_indices().peekable();
    while let Some(&(start, c)) = chars.peek() {
        if c.is_ascii_digit() || c == '.' {
            let mut end = start;
            while let Some(&(i, c)) = chars.peek() {
                if !(c.is_ascii_digit() || c == '.') {
                    break;
                }
                end = i + c.len_utf8();
                chars.next();
            }
            let digits = &text[start..end];
            if number.is_some() {
                // two numbers in a row
                return Err(TimespanError::Number(digits.to_string()));
            }
            number = Some(
                digits
                    .parse()
                    .map_err(|_| TimespanError::Number(digits.to_string()))?,
            );
        } else if c.is_ascii_alphabetic() {
            let mut end = start;
            while let Some(&(i, c)) = chars.peek() {
                if !c.is_ascii_alphabetic() {
                    break;
                }
                end = i + c.len_utf8();
                chars.next();
            }
            let word = &text[start..end];
            if word == "and" && number.is_none() {
                continue;
            }
            let secs = unit_secs(word).ok_or_else(|| TimespanError::Unit(word.to_string()))?;
            let n = number
                .take()
                .ok_or_else(|| TimespanError::MissingNumber(text.clone()))?;
            total += n * secs;
        } else if c.is_whitespace() || c == ',' {
            chars.next();
        } else {
            return Err(TimespanError::Unit(c.to_string()));
        }
    }

    // a trailing number without a unit counts as seconds
    if let Some(n) = number {
        total += n;
    }
    Ok(total)
}

fn plural(count: u64, unit: &str) -> String {
    if count == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", count, unit)
    }
}

/// Formats seconds as text, keeping the three largest non-zero units.
pub fn format_timespan(secs: f64) -> String {
    let mut left = if secs.is_finite() && secs > 0. {
        secs.round() as u64
    } else {
        0
    };
    let mut parts = Vec::new();
    for (size, name) in [
        (YEAR, "year"),
        (MONTH, "month"),
        (DAY, "day"),
        (HOUR, "hour"),
        (MINUTE, "minute"),
        (1, "second"),
    ] {
        let count = left / size;
        left %= size;
        if count > 0 {
            parts.push(plural(count, name));
        }
    }
    parts.truncate(3);

    match parts.len() {
        0 => "0 seconds".to_string(),
        1 => parts.remove(0),
        n => format!("{} and {}", parts[..n - 1].join(", "), parts[n - 1]),
    }
}

#[cfg(test)]
mod tests {
    use super::{format_timespan, parse_timespan, TimespanError};
    use crate::rate::{Frequency, SECONDS_PER_YEAR};
    use test_log::test;

    #[test]
    fn test_parse_timespan() {
        assert_eq!(parse_timespan("3600"), Ok(3600.));
        assert_eq!(parse_timespan("0"), Ok(0.));
        assert_eq!(parse_timespan("25y"), Ok(25. * SECONDS_PER_YEAR));
        assert_eq!(parse_timespan("25 years"), Ok(25. * SECONDS_PER_YEAR));
        assert_eq!(parse_timespan("1 Year"), Ok(SECONDS_PER_YEAR));
        assert_eq!(parse_timespan("1 month"), Ok(SECONDS_PER_YEAR / 12.));
        assert_eq!(parse_timespan("6 months"), Ok(SECONDS_PER_YEAR / 2.));
        assert_eq!(parse_timespan("30d"), Ok(30. * 86_400.));
        assert_eq!(parse_timespan("2 weeks"), Ok(14. * 86_400.));
        assert_eq!(parse_timespan("1.5h"), Ok(5_400.));
        assert_eq!(
            parse_timespan("1 year and 6 months"),
            Ok(SECONDS_PER_YEAR * 1.5)
        );
        assert_eq!(parse_timespan("1h, 30m 15"), Ok(5_415.));
        assert_eq!(parse_timespan("monthly"), Ok(Frequency::Monthly.period_secs()));
        assert_eq!(
            parse_timespan("semi-annually"),
            Ok(Frequency::SemiAnnually.period_secs())
        );
    }

    #[test]
    fn test_parse_timespan_errors() {
        assert_eq!(parse_timespan("  "), Err(TimespanError::Empty));
        assert_eq!(
            parse_timespan("3 fortnights"),
            Err(TimespanError::Unit("fortnights".to_string()))
        );
        assert!(matches!(
            parse_timespan("years"),
            Err(TimespanError::MissingNumber(_))
        ));
        assert!(matches!(
            parse_timespan("1.2.3 days"),
            Err(TimespanError::Number(_))
        ));
        assert!(parse_timespan("5 $").is_err());
        assert_eq!(parse_timespan("1 2 days"), Err(TimespanError::Number("2".to_string())));
    }

    #[test]
    fn test_format_timespan() {
        assert_eq!(format_timespan(0.), "0 seconds");
        assert_eq!(format_timespan(1.), "1 second");
        assert_eq!(format_timespan(25. * SECONDS_PER_YEAR), "25 years");
        assert_eq!(format_timespan(SECONDS_PER_YEAR / 12.), "1 month");
        assert_eq!(format_timespan(1.5 * SECONDS_PER_YEAR), "1 year and 6 months");
        assert_eq!(format_timespan(30. * 86_400.), "30 days");
        assert_eq!(
            format_timespan(3. * 86_400. + 4. * 3_600. + 5. * 60. + 6.),
            "3 days, 4 hours and 5 minutes"
        );
    }

    #[test]
    fn test_round_trip_of_durations() {
        for text in ["25 years", "1 month", "1 year and 6 months", "30 days"] {
            assert_eq!(format_timespan(parse_timespan(text).unwrap()), text);
        }
    }
}
