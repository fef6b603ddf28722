//! Backing-store query timings, collected once at end of request.

use serde::Serialize;

use std::time::Duration;

use crate::checkpoint::truncate_chars;
use crate::{Backtrace, CallSite, Frame, ProfilerOptions, simplify_backtrace};

/// One entry of the host's query log.
#[derive(Debug, Clone, PartialEq)]
pub struct RawQuery {
    pub text: String,
    pub duration: Duration,
    pub backtrace: Backtrace,
}

impl RawQuery {
    pub fn new(text: impl Into<String>, duration: Duration) -> Self {
        Self {
            text: text.into(),
            duration,
            backtrace: Backtrace::None,
        }
    }

    pub fn with_backtrace(mut self, backtrace: Backtrace) -> Self {
        self.backtrace = backtrace;
        self
    }
}

/// The host's accumulated query log as seen at end of request.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum QueryLog {
    /// Query logging was not enabled.
    #[default]
    Absent,
    /// Something was there but it was not list-shaped.
    Malformed,
    Entries(Vec<RawQuery>),
}

impl QueryLog {
    /// Decodes a JSON query log of `[text, seconds, backtrace?]` tuples.
    ///
    /// Non-array input is `Malformed`; individual entries that are not at
    /// least `[string, number]` are skipped.
    pub fn from_value(value: &serde_json::Value) -> Self {
        let serde_json::Value::Array(items) = value else {
            return match value {
                serde_json::Value::Null => Self::Absent,
                _ => Self::Malformed,
            };
        };
        let entries = items.iter().filter_map(decode_entry).collect();
        Self::Entries(entries)
    }
}

fn decode_entry(item: &serde_json::Value) -> Option<RawQuery> {
    let tuple = item.as_array()?;
    if tuple.len() < 2 {
        return None;
    }
    let text = match &tuple[0] {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let secs = match &tuple[1] {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    let duration = Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO);
    let backtrace = match tuple.get(2) {
        Some(serde_json::Value::String(s)) => Backtrace::Text(s.clone()),
        Some(serde_json::Value::Array(frames)) => Backtrace::Frames(
            frames
                .iter()
                .filter_map(|f| serde_json::from_value::<Frame>(f.clone()).ok())
                .collect(),
        ),
        _ => Backtrace::None,
    };
    Some(RawQuery {
        text,
        duration,
        backtrace,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRecord {
    pub text: String,
    #[serde(serialize_with = "crate::duration::serialize_secs")]
    pub duration: Duration,
    /// blake3 of the untruncated query text.
    pub fingerprint: String,
    pub call_site: CallSite,
}

#[derive(Debug, Clone, Default)]
pub struct QueryCollector {
    records: Vec<QueryRecord>,
}

impl QueryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the collected records with the contents of `log`.
    ///
    /// Returns the number of records collected, or `None` when the log was
    /// absent or malformed (nothing changes in that case).
    pub fn collect(&mut self, log: &QueryLog, options: &ProfilerOptions) -> Option<usize> {
        let QueryLog::Entries(entries) = log else {
            tracing::debug!("query log unavailable ({log:?}); skipping query collection");
            return None;
        };
        self.records = entries
            .iter()
            .map(|raw| QueryRecord {
                text: truncate_chars(&raw.text, options.query_text_limit),
                duration: raw.duration,
                fingerprint: blake3::hash(raw.text.as_bytes()).to_hex().to_string(),
                call_site: simplify_backtrace(&raw.backtrace, &options.app_code_marker),
            })
            .collect();
        Some(self.records.len())
    }

    pub fn records(&self) -> &[QueryRecord] {
        &self.records
    }

    pub(crate) fn take(&mut self) -> Vec<QueryRecord> {
        std::mem::take(&mut self.records)
    }
}
