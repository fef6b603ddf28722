//! Duration parsing for scenario scripts and seconds-based serialization.

use serde::Serializer;

use std::time::Duration;

use crate::{ProfilerError, ProfilerResult};

/// Parses `"250ms"`, `"1.5s"`, `"300us"`, `"2m"` or a bare number of seconds.
pub fn parse_duration(input: &str) -> ProfilerResult<Duration> {
    let s = input.trim();
    if s.is_empty() {
        return Err(ProfilerError::InvalidArgument("empty duration".to_string()));
    }

    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let value: f64 = number
        .parse()
        .map_err(|_| ProfilerError::InvalidArgument(format!("invalid duration {input:?}")))?;

    let secs = match unit.trim() {
        "" | "s" => value,
        "ms" => value / 1_000.0,
        "us" => value / 1_000_000.0,
        "ns" => value / 1_000_000_000.0,
        "m" => value * 60.0,
        other => {
            return Err(ProfilerError::InvalidArgument(format!(
                "invalid duration unit {other:?} in {input:?}"
            )));
        }
    };

    Duration::try_from_secs_f64(secs)
        .map_err(|e| ProfilerError::InvalidArgument(format!("invalid duration {input:?}: {e}")))
}

/// Formats seconds with four decimals, the resolution every report line uses.
pub fn fmt_secs(d: Duration) -> String {
    format!("{:.4}s", d.as_secs_f64())
}

pub(crate) fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

pub(crate) fn serialize_opt_secs<S: Serializer>(
    d: &Option<Duration>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match d {
        Some(d) => s.serialize_some(&d.as_secs_f64()),
        None => s.serialize_none(),
    }
}
