//! Shared utilities for CLI commands.

use std::sync::LazyLock;

use anyhow::Context;
use regex::Regex;

/// Pre-compiled regex for human-readable durations.
static DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\s*(s|m|h|d)?\s*$").unwrap());

/// Parse a session duration into whole seconds.
///
/// Supports bare seconds ("3600") and a single unit suffix: "90s", "30m",
/// "2h", "1d". The result is not checked for positivity; the engine rejects
/// zero durations itself.
pub fn parse_duration(s: &str) -> anyhow::Result<i64> {
    let Some(caps) = DURATION_RE.captures(s) else {
        anyhow::bail!("Invalid duration: {s:?}. Use seconds (e.g., 3600) or 90s, 30m, 2h, 1d");
    };

    let n: i64 = caps[1]
        .parse()
        .with_context(|| format!("duration value too large: {s}"))?;

    let multiplier = match caps.get(2).map(|m| m.as_str()) {
        None | Some("s") => 1,
        Some("m") => 60,
        Some("h") => 60 * 60,
        Some("d") => 24 * 60 * 60,
        Some(unit) => anyhow::bail!("Unknown duration unit: {unit}"),
    };

    n.checked_mul(multiplier)
        .with_context(|| format!("duration value too large: {s}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_seconds_and_units() {
        assert_eq!(parse_duration("3600").unwrap(), 3600);
        assert_eq!(parse_duration("90s").unwrap(), 90);
        assert_eq!(parse_duration("30m").unwrap(), 1800);
        assert_eq!(parse_duration("2h").unwrap(), 7200);
        assert_eq!(parse_duration("1d").unwrap(), 86_400);
        assert_eq!(parse_duration(" 5 m ").unwrap(), 300);
    }

    #[test]
    fn zero_is_parsed_and_left_to_the_engine() {
        assert_eq!(parse_duration("0").unwrap(), 0);
    }

    #[test]
    fn rejects_garbage() {
        for input in ["", "-5", "1w", "ten minutes", "1.5h"] {
            let err = parse_duration(input).unwrap_err();
            assert!(
                err.to_string().contains("Invalid duration"),
                "{input}: {err}"
            );
        }
    }

    #[test]
    fn rejects_overflow() {
        let err = parse_duration("99999999999999999999").unwrap_err();
        assert!(err.to_string().contains("too large"));
        let err = parse_duration("9223372036854775807d").unwrap_err();
        assert!(err.to_string().contains("too large"));
    }
}
