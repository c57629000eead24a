use std::sync::LazyLock;

use regex::Regex;

use crate::clean::clean_field;

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 3_600;
const SECONDS_PER_DAY: u64 = 86_400;

static DAYS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)g").expect("valid pattern"));
// Hours need the trailing whitespace so "34sn" is not read as 34 hours.
static HOURS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)s\s").expect("valid pattern"));
static MINUTES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)dk").expect("valid pattern"));
static SECONDS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)sn").expect("valid pattern"));

/// Parses a duration into whole seconds, returning 0 for anything it cannot read.
pub fn parse_duration(text: &str) -> u64 {
    try_parse_duration(text).unwrap_or(0)
}

/// Parses a duration into whole seconds.
///
/// Accepted forms, in order of precedence:
/// - localized suffixes: `1g 5s 10dk`, `12dk 34sn` (days, hours, minutes, seconds)
/// - day-dotted: `7.07:45:01`
/// - colon: `HH:MM:SS` or `MM:SS`, fields are not bounds-checked
///
/// Parenthetical annotations such as ` (Avg.)` are stripped first. Blank
/// input is `Some(0)`; `None` means the text matched no known form.
pub fn try_parse_duration(text: &str) -> Option<u64> {
    let cleaned = clean_field(text);
    let cleaned = cleaned.as_str();
    if cleaned.is_empty() {
        return Some(0);
    }

    if is_localized(cleaned) {
        return parse_localized(cleaned);
    }

    if let Some(seconds) = parse_day_dotted(cleaned) {
        return Some(seconds);
    }

    parse_colon(cleaned)
}

/// Formats seconds in the coarsest localized form.
///
/// Days drop the seconds field and hours keep it, so the output only loses
/// precision from one day up. Negative input formats as `0dk 0sn`.
pub fn format_duration(seconds: i64) -> String {
    let Ok(mut rest) = u64::try_from(seconds) else {
        return "0dk 0sn".to_string();
    };

    let days = rest / SECONDS_PER_DAY;
    rest %= SECONDS_PER_DAY;
    let hours = rest / SECONDS_PER_HOUR;
    rest %= SECONDS_PER_HOUR;
    let minutes = rest / SECONDS_PER_MINUTE;
    let secs = rest % SECONDS_PER_MINUTE;

    if days > 0 {
        format!("{days}g {hours}s {minutes}dk")
    } else if hours > 0 {
        format!("{hours}s {minutes}dk {secs}sn")
    } else {
        format!("{minutes}dk {secs}sn")
    }
}

/// Formats an unsigned second count, saturating at `i64::MAX`.
pub fn format_seconds(seconds: u64) -> String {
    format_duration(i64::try_from(seconds).unwrap_or(i64::MAX))
}

fn is_localized(text: &str) -> bool {
    text.contains("dk") || text.contains("sn") || text.contains('g') || text.contains("s ")
}

fn parse_localized(text: &str) -> Option<u64> {
    let units = [
        (&*DAYS, SECONDS_PER_DAY),
        (&*HOURS, SECONDS_PER_HOUR),
        (&*MINUTES, SECONDS_PER_MINUTE),
        (&*SECONDS, 1),
    ];

    let mut matched = false;
    let mut total = 0u64;
    for (pattern, scale) in units {
        let Some(value) = pattern
            .captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
        else {
            continue;
        };
        matched = true;
        total = total.saturating_add(value.saturating_mul(scale));
    }

    matched.then_some(total)
}

fn parse_day_dotted(text: &str) -> Option<u64> {
    let (days, clock) = text.split_once('.')?;
    if clock.contains('.') {
        return None;
    }
    let days = days.trim().parse::<u64>().ok()?;
    let fields = colon_fields(clock)?;
    let [hours, minutes, seconds] = fields.as_slice() else {
        return None;
    };

    Some(weighted_sum(&[
        (days, SECONDS_PER_DAY),
        (*hours, SECONDS_PER_HOUR),
        (*minutes, SECONDS_PER_MINUTE),
        (*seconds, 1),
    ]))
}

fn parse_colon(text: &str) -> Option<u64> {
    match colon_fields(text)?.as_slice() {
        [hours, minutes, seconds] => Some(weighted_sum(&[
            (*hours, SECONDS_PER_HOUR),
            (*minutes, SECONDS_PER_MINUTE),
            (*seconds, 1),
        ])),
        [minutes, seconds] => Some(weighted_sum(&[(*minutes, SECONDS_PER_MINUTE), (*seconds, 1)])),
        _ => None,
    }
}

fn weighted_sum(parts: &[(u64, u64)]) -> u64 {
    parts.iter().fold(0u64, |total, (value, scale)| {
        total.saturating_add(value.saturating_mul(*scale))
    })
}

fn colon_fields(text: &str) -> Option<Vec<u64>> {
    text.split(':')
        .map(|field| field.trim().parse::<u64>().ok())
        .collect()
}
