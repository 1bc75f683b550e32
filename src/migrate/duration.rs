//! Time-grain duration arithmetic.
//!
//! A time grain shows up in three spellings across stored queries: an
//! ISO-8601 duration (`PT5M`), a shorthand interval (`5m`) and a legacy
//! `(count, unit)` pair. Everything here is pure and allocation-light.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Literal time grain meaning "let the backend pick".
pub const AUTO: &str = "auto";

/// Grains offered when a query carries no allowed-grain list of its own.
pub const DEFAULT_GRAIN_LADDER: [&str; 8] = ["1m", "5m", "15m", "30m", "1h", "6h", "12h", "1d"];

const MS_PER_SECOND: u64 = 1_000;
const MS_PER_MINUTE: u64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: u64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: u64 = 24 * MS_PER_HOUR;
const MS_PER_WEEK: u64 = 7 * MS_PER_DAY;

/// Duration conversion errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DurationError {
    #[error("invalid duration input: {0}")]
    InvalidDurationInput(String),
    #[error("unsupported duration: {0}")]
    UnsupportedDuration(String),
}

/// Unit of a legacy `(count, unit)` time grain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeGrainUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeGrainUnit {
    fn designator(self) -> char {
        match self {
            TimeGrainUnit::Second => 'S',
            TimeGrainUnit::Minute => 'M',
            TimeGrainUnit::Hour => 'H',
            TimeGrainUnit::Day => 'D',
        }
    }

    /// Whether the unit belongs after the `T` separator.
    fn is_time_component(self) -> bool {
        !matches!(self, TimeGrainUnit::Day)
    }
}

impl FromStr for TimeGrainUnit {
    type Err = DurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "second" | "seconds" | "s" => Ok(TimeGrainUnit::Second),
            "minute" | "minutes" | "m" => Ok(TimeGrainUnit::Minute),
            "hour" | "hours" | "h" => Ok(TimeGrainUnit::Hour),
            "day" | "days" | "d" => Ok(TimeGrainUnit::Day),
            other => Err(DurationError::InvalidDurationInput(format!(
                "unknown time grain unit '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for TimeGrainUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeGrainUnit::Second => "second",
            TimeGrainUnit::Minute => "minute",
            TimeGrainUnit::Hour => "hour",
            TimeGrainUnit::Day => "day",
        };
        f.write_str(name)
    }
}

/// Build an ISO-8601 duration from a legacy count and unit.
///
/// `("5", Minute)` gives `PT5M`, `("1", Day)` gives `P1D`.
pub fn to_iso8601(count: &str, unit: TimeGrainUnit) -> Result<String, DurationError> {
    let n = parse_count(count)?;
    if unit.is_time_component() {
        Ok(format!("PT{}{}", n, unit.designator()))
    } else {
        Ok(format!("P{}{}", n, unit.designator()))
    }
}

/// Render an ISO-8601 duration as a shorthand interval (`PT5M` -> `5m`).
///
/// Only single-component durations have a shorthand; `PT1H30M` is
/// [`DurationError::UnsupportedDuration`] and callers should keep the ISO text.
pub fn to_shorthand(iso: &str) -> Result<String, DurationError> {
    let parts = parse_iso8601(iso)?;
    let nonzero: Vec<(u64, &str)> = [
        (parts.weeks, "w"),
        (parts.days, "d"),
        (parts.hours, "h"),
        (parts.minutes, "m"),
        (parts.seconds, "s"),
    ]
    .into_iter()
    .filter(|(n, _)| *n > 0)
    .collect();

    match nonzero.as_slice() {
        [(n, suffix)] => Ok(format!("{}{}", n, suffix)),
        [] => Err(DurationError::UnsupportedDuration(format!(
            "'{}' is a zero-length duration",
            iso
        ))),
        _ => Err(DurationError::UnsupportedDuration(format!(
            "'{}' mixes units",
            iso
        ))),
    }
}

/// Total length of an ISO-8601 duration in milliseconds. Mixed components are fine here.
pub fn iso8601_to_ms(iso: &str) -> Result<u64, DurationError> {
    let parts = parse_iso8601(iso)?;
    [
        (parts.weeks, MS_PER_WEEK),
        (parts.days, MS_PER_DAY),
        (parts.hours, MS_PER_HOUR),
        (parts.minutes, MS_PER_MINUTE),
        (parts.seconds, MS_PER_SECOND),
    ]
    .into_iter()
    .try_fold(0u64, |acc, (n, unit_ms)| {
        n.checked_mul(unit_ms).and_then(|v| acc.checked_add(v))
    })
    .ok_or_else(|| DurationError::InvalidDurationInput(format!("'{}' overflows", iso)))
}

/// Length of a shorthand interval (`ms`, `s`, `m`, `h`, `d`, `w`) in milliseconds.
pub fn interval_to_ms(interval: &str) -> Result<u64, DurationError> {
    let trimmed = interval.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, suffix) = trimmed.split_at(split);
    if digits.is_empty() {
        return Err(DurationError::InvalidDurationInput(format!(
            "'{}' has no count",
            interval
        )));
    }

    let unit_ms = match suffix {
        "ms" => 1,
        "s" => MS_PER_SECOND,
        "m" => MS_PER_MINUTE,
        "h" => MS_PER_HOUR,
        "d" => MS_PER_DAY,
        "w" => MS_PER_WEEK,
        _ => {
            return Err(DurationError::InvalidDurationInput(format!(
                "'{}' has an unknown unit",
                interval
            )))
        }
    };

    digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(unit_ms))
        .ok_or_else(|| DurationError::InvalidDurationInput(format!("'{}' overflows", interval)))
}

/// Milliseconds for either spelling: ISO-8601 when it starts with `P`, shorthand otherwise.
pub fn duration_to_ms(text: &str) -> Result<u64, DurationError> {
    let trimmed = text.trim();
    if trimmed.starts_with('P') || trimmed.starts_with('p') {
        iso8601_to_ms(trimmed)
    } else {
        interval_to_ms(trimmed)
    }
}

/// Shorthand for a millisecond count, using the largest unit that divides it evenly.
pub fn ms_to_shorthand(ms: u64) -> String {
    if ms == 0 {
        return "0ms".to_string();
    }
    for (unit_ms, suffix) in [
        (MS_PER_DAY, "d"),
        (MS_PER_HOUR, "h"),
        (MS_PER_MINUTE, "m"),
        (MS_PER_SECOND, "s"),
    ] {
        if ms % unit_ms == 0 {
            return format!("{}{}", ms / unit_ms, suffix);
        }
    }
    format!("{}ms", ms)
}

/// Convert a shorthand interval into an ISO-8601 grain.
///
/// Anything shorter than a minute becomes `PT1M`, the smallest grain the
/// metrics APIs accept.
pub fn interval_to_iso8601(interval: &str) -> Result<String, DurationError> {
    let ms = interval_to_ms(interval)?;
    if ms < MS_PER_MINUTE {
        return Ok("PT1M".to_string());
    }
    let iso = if ms % MS_PER_DAY == 0 {
        format!("P{}D", ms / MS_PER_DAY)
    } else if ms % MS_PER_HOUR == 0 {
        format!("PT{}H", ms / MS_PER_HOUR)
    } else if ms % MS_PER_MINUTE == 0 {
        format!("PT{}M", ms / MS_PER_MINUTE)
    } else {
        format!("PT{}S", ms / MS_PER_SECOND)
    };
    Ok(iso)
}

/// Pick the allowed grain closest to `target`.
///
/// Returns the smallest candidate that is at least `target`; when every
/// candidate is smaller, the largest one. Equal lengths resolve to the
/// earliest candidate. `auto` and unparseable entries are ignored, and an
/// empty set falls back to [`DEFAULT_GRAIN_LADDER`].
pub fn closest<S: AsRef<str>>(target: &str, candidates: &[S]) -> Result<String, DurationError> {
    let target_ms = duration_to_ms(target)?;

    let mut usable: Vec<(&str, u64)> = candidates
        .iter()
        .map(|c| c.as_ref().trim())
        .filter(|c| !c.eq_ignore_ascii_case(AUTO))
        .filter_map(|c| duration_to_ms(c).ok().map(|ms| (c, ms)))
        .collect();
    if usable.is_empty() {
        usable = DEFAULT_GRAIN_LADDER
            .iter()
            .filter_map(|c| interval_to_ms(c).ok().map(|ms| (*c, ms)))
            .collect();
    }

    let mut at_least: Option<(&str, u64)> = None;
    let mut largest: Option<(&str, u64)> = None;
    for (grain, ms) in usable {
        if ms >= target_ms && at_least.map_or(true, |(_, best)| ms < best) {
            at_least = Some((grain, ms));
        }
        if largest.map_or(true, |(_, max)| ms > max) {
            largest = Some((grain, ms));
        }
    }

    at_least
        .or(largest)
        .map(|(grain, _)| grain.to_string())
        .ok_or_else(|| DurationError::InvalidDurationInput("no candidate grains".to_string()))
}

/// Project legacy grain values (ISO or shorthand) onto milliseconds.
///
/// `auto` and blank values are skipped and duplicates collapse to their first
/// occurrence. Any other value that cannot be parsed fails the whole batch.
pub fn to_milliseconds<'a, I>(values: I) -> Result<Vec<u64>, DurationError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = Vec::new();
    for value in values {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case(AUTO) {
            continue;
        }
        let ms = duration_to_ms(value)?;
        if !out.contains(&ms) {
            out.push(ms);
        }
    }
    Ok(out)
}

/// Interval to use when the grain is `auto`; `None` for a fixed grain.
pub fn auto_interval(time_grain: Option<&str>, allowed_ms: &[u64]) -> Option<String> {
    if time_grain != Some(AUTO) {
        return None;
    }
    let candidates: Vec<String> = allowed_ms.iter().map(|ms| ms_to_shorthand(*ms)).collect();
    closest("1m", &candidates).ok()
}

fn parse_count(count: &str) -> Result<u64, DurationError> {
    let trimmed = count.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DurationError::InvalidDurationInput(format!(
            "count '{}' is not a positive integer",
            count
        )));
    }
    match trimmed.parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(DurationError::InvalidDurationInput(format!(
            "count '{}' is not a positive integer",
            count
        ))),
    }
}

#[derive(Debug, Default)]
struct IsoParts {
    weeks: u64,
    days: u64,
    hours: u64,
    minutes: u64,
    seconds: u64,
}

fn parse_iso8601(iso: &str) -> Result<IsoParts, DurationError> {
    let invalid = || DurationError::InvalidDurationInput(format!("'{}' is not an ISO-8601 duration", iso));

    let upper = iso.trim().to_ascii_uppercase();
    let body = upper.strip_prefix('P').ok_or_else(invalid)?;
    let (date, time) = match body.split_once('T') {
        Some((date, time)) => {
            if time.is_empty() {
                return Err(invalid());
            }
            (date, Some(time))
        }
        None => (body, None),
    };

    let mut parts = IsoParts::default();
    let mut seen = 0usize;

    for (n, designator) in components(date).ok_or_else(invalid)? {
        let slot = match designator {
            'W' => &mut parts.weeks,
            'D' => &mut parts.days,
            'Y' | 'M' => {
                return Err(DurationError::UnsupportedDuration(format!(
                    "'{}' uses calendar units",
                    iso
                )))
            }
            _ => return Err(invalid()),
        };
        assign(slot, n).ok_or_else(invalid)?;
        seen += 1;
    }

    if let Some(time) = time {
        for (n, designator) in components(time).ok_or_else(invalid)? {
            let slot = match designator {
                'H' => &mut parts.hours,
                'M' => &mut parts.minutes,
                'S' => &mut parts.seconds,
                _ => return Err(invalid()),
            };
            assign(slot, n).ok_or_else(invalid)?;
            seen += 1;
        }
    }

    if seen == 0 {
        return Err(invalid());
    }
    Ok(parts)
}

/// Split `5D` / `1H30M` into `(count, designator)` pairs.
fn components(s: &str) -> Option<Vec<(u64, char)>> {
    let mut out = Vec::new();
    let mut digits = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else {
            if digits.is_empty() {
                return None;
            }
            out.push((digits.parse().ok()?, c));
            digits.clear();
        }
    }
    if !digits.is_empty() {
        return None;
    }
    Some(out)
}

/// Fill a component slot once; a repeated designator is malformed.
fn assign(slot: &mut u64, n: u64) -> Option<()> {
    if *slot != 0 {
        return None;
    }
    *slot = n;
    Some(())
}
