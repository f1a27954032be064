//! Flag value kinds and their textual forms.

use crate::error::ValidationError;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// The type of value a flag holds.
///
/// Values are stored in their canonical textual form. `normalize` validates
/// raw input and produces that form, so two spellings of the same value
/// (`1` and `true`, `90s` and `1m30s`) compare equal after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagKind {
    /// Arbitrary UTF-8 text
    String,
    /// `true` / `false`
    Bool,
    /// Signed 64-bit integer
    Int,
    /// 64-bit float
    Float,
    /// Duration such as `1m30s` or `250ms`
    Duration,
}

impl FlagKind {
    /// Validate `raw` and return the canonical textual form for this kind.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidValue` if `raw` cannot be parsed.
    pub fn normalize(&self, raw: &str) -> Result<String, ValidationError> {
        match self {
            Self::String => Ok(raw.to_string()),
            Self::Bool => parse_bool(raw)
                .map(|b| b.to_string())
                .ok_or_else(|| ValidationError::invalid_value(*self, raw, "expected a boolean")),
            Self::Int => raw
                .parse::<i64>()
                .map(|i| i.to_string())
                .map_err(|e| ValidationError::invalid_value(*self, raw, e.to_string())),
            Self::Float => raw
                .parse::<f64>()
                .map(|f| f.to_string())
                .map_err(|e| ValidationError::invalid_value(*self, raw, e.to_string())),
            Self::Duration => parse_duration(raw)
                .map(format_duration)
                .map_err(|reason| ValidationError::invalid_value(*self, raw, reason)),
        }
    }

    /// Whether a bare `-name` on the command line means `true`.
    pub fn is_bool(&self) -> bool {
        matches!(self, Self::Bool)
    }
}

impl fmt::Display for FlagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Duration => "duration",
        };
        f.write_str(name)
    }
}

/// Parse a boolean the way command-line tools conventionally accept them.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Parse a duration string such as `300ms`, `1.5h` or `2h45m`.
///
/// A duration is a sequence of decimal numbers, each with an optional
/// fraction and a unit suffix. Valid units are `ns`, `us` (or `µs`), `ms`,
/// `s`, `m` and `h`. The bare string `0` is also accepted.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    if raw == "0" {
        return Ok(Duration::ZERO);
    }
    if raw.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut total: u128 = 0;
    let mut rest = raw;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_len);
        if number.is_empty() || number == "." {
            return Err(format!("invalid duration {:?}", raw));
        }

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let scale = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => NANOS_PER_MICRO,
            "ms" => NANOS_PER_MILLI,
            "s" => NANOS_PER_SEC,
            "m" => 60 * NANOS_PER_SEC,
            "h" => 3600 * NANOS_PER_SEC,
            "" => return Err(format!("missing unit in duration {:?}", raw)),
            other => return Err(format!("unknown unit {:?} in duration {:?}", other, raw)),
        };

        total = total
            .checked_add(scaled(number, scale).ok_or_else(|| format!("invalid duration {:?}", raw))?)
            .ok_or_else(|| format!("duration {:?} overflows", raw))?;
        rest = tail;
    }

    let secs = u64::try_from(total / NANOS_PER_SEC).map_err(|_| format!("duration {:?} overflows", raw))?;
    Ok(Duration::new(secs, (total % NANOS_PER_SEC) as u32))
}

/// Multiply a decimal string like `1.25` by `scale` nanoseconds.
fn scaled(number: &str, scale: u128) -> Option<u128> {
    let (whole, fraction) = match number.split_once('.') {
        Some((w, f)) => (w, f),
        None => (number, ""),
    };
    if fraction.contains('.') || (whole.is_empty() && fraction.is_empty()) {
        return None;
    }

    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut nanos = whole.checked_mul(scale)?;

    // Digits beyond the unit's precision are truncated.
    let mut place = scale;
    for digit in fraction.chars() {
        place /= 10;
        if place == 0 {
            break;
        }
        let digit = u128::from(digit.to_digit(10)?).checked_mul(place)?;
        nanos = nanos.checked_add(digit)?;
    }
    Some(nanos)
}

/// Format a duration in its canonical form, e.g. `0s`, `250ms`, `1.5s`, `1h2m3s`.
///
/// The output is accepted by [`parse_duration`] and yields the same duration.
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < NANOS_PER_MICRO {
        return format!("{}ns", nanos);
    }
    if nanos < NANOS_PER_MILLI {
        return format!("{}us", decimal(nanos, NANOS_PER_MICRO));
    }
    if nanos < NANOS_PER_SEC {
        return format!("{}ms", decimal(nanos, NANOS_PER_MILLI));
    }

    let secs = nanos / NANOS_PER_SEC;
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = nanos % (60 * NANOS_PER_SEC);

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    out.push_str(&format!("{}s", decimal(seconds, NANOS_PER_SEC)));
    out
}

/// Render `value / unit` with the remainder as a trimmed decimal fraction.
fn decimal(value: u128, unit: u128) -> String {
    let whole = value / unit;
    let remainder = value % unit;
    if remainder == 0 {
        return whole.to_string();
    }
    let width = unit.ilog10() as usize;
    let fraction = format!("{:0width$}", remainder, width = width);
    format!("{}.{}", whole, fraction.trim_end_matches('0'))
}
