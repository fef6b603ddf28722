//! Outbound network call timings, correlated by token.

use serde::{Deserialize, Serialize};

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Opaque identifier linking a call's start to its completion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallToken(String);

impl CallToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CallToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for CallToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Pending,
    Success,
    Error,
}

impl CallStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// How an outbound call ended, as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Success { status_code: Option<u16> },
    Error { message: String },
}

impl CallOutcome {
    pub fn ok() -> Self {
        Self::Success { status_code: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkCallRecord {
    pub token: CallToken,
    pub url: String,
    pub method: String,
    #[serde(serialize_with = "crate::duration::serialize_secs")]
    pub started_at: Duration,
    #[serde(serialize_with = "crate::duration::serialize_secs")]
    pub duration: Duration,
    pub status: CallStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Token-keyed call table. Records keep start order for reporting.
#[derive(Debug, Clone, Default)]
pub struct NetworkCollector {
    calls: Vec<NetworkCallRecord>,
    by_token: HashMap<CallToken, usize>,
    nonce: u64,
}

impl NetworkCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pending call started at session offset `now`.
    pub fn start(&mut self, url: &str, method: &str, now: Duration) -> &NetworkCallRecord {
        let token = self.next_token(url, now);
        let method = match method.trim() {
            "" => "GET".to_string(),
            m => m.to_ascii_uppercase(),
        };
        let index = self.calls.len();
        self.calls.push(NetworkCallRecord {
            token: token.clone(),
            url: url.to_string(),
            method,
            started_at: now,
            duration: Duration::ZERO,
            status: CallStatus::Pending,
            status_code: None,
            error: None,
        });
        self.by_token.insert(token, index);
        &self.calls[index]
    }

    /// Resolves a pending call. Unknown tokens and calls that already
    /// completed are ignored and return `None`.
    pub fn finish(
        &mut self,
        token: &CallToken,
        outcome: CallOutcome,
        now: Duration,
    ) -> Option<&NetworkCallRecord> {
        let index = *self.by_token.get(token)?;
        let record = self.calls.get_mut(index)?;
        if record.status != CallStatus::Pending {
            return None;
        }
        record.duration = now.saturating_sub(record.started_at);
        match outcome {
            CallOutcome::Success { status_code } => {
                record.status = CallStatus::Success;
                record.status_code = status_code;
            }
            CallOutcome::Error { message } => {
                record.status = CallStatus::Error;
                record.error = Some(message);
            }
        }
        Some(&*record)
    }

    pub fn get(&self, token: &CallToken) -> Option<&NetworkCallRecord> {
        self.by_token.get(token).and_then(|&i| self.calls.get(i))
    }

    pub fn calls(&self) -> &[NetworkCallRecord] {
        &self.calls
    }

    pub(crate) fn take(&mut self) -> Vec<NetworkCallRecord> {
        self.by_token.clear();
        std::mem::take(&mut self.calls)
    }

    fn next_token(&mut self, url: &str, now: Duration) -> CallToken {
        loop {
            self.nonce = self.nonce.wrapping_add(1);
            let mut hasher = blake3::Hasher::new();
            hasher.update(url.as_bytes());
            hasher.update(&self.nonce.to_le_bytes());
            hasher.update(&now.as_nanos().to_le_bytes());
            let hex = hasher.finalize().to_hex();
            let token = CallToken(hex.as_str()[..32].to_string());
            if !self.by_token.contains_key(&token) {
                return token;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_urls_get_distinct_tokens() {
        let mut net = NetworkCollector::new();
        let now = Duration::from_millis(10);
        let a = net.start("https://api.example.com/hook", "post", now).token.clone();
        let b = net.start("https://api.example.com/hook", "post", now).token.clone();
        assert_ne!(a, b);
        assert_eq!(net.calls().len(), 2);
        assert_eq!(net.calls()[0].method, "POST");
    }

    #[test]
    fn finish_computes_duration_and_status() {
        let mut net = NetworkCollector::new();
        let token = net.start("https://a", "", Duration::from_millis(100)).token.clone();
        assert_eq!(net.get(&token).map(|c| c.method.as_str()), Some("GET"));
        let done = net
            .finish(&token, CallOutcome::error("timed out"), Duration::from_millis(350))
            .expect("known token");
        assert_eq!(done.duration, Duration::from_millis(250));
        assert_eq!(done.status, CallStatus::Error);
        assert_eq!(done.error.as_deref(), Some("timed out"));
    }

    #[test]
    fn unknown_token_and_double_finish_are_ignored() {
        let mut net = NetworkCollector::new();
        assert!(
            net.finish(&CallToken::from("nope"), CallOutcome::ok(), Duration::from_secs(1))
                .is_none()
        );
        assert!(net.calls().is_empty());

        let token = net.start("https://a", "GET", Duration::ZERO).token.clone();
        assert!(net.finish(&token, CallOutcome::ok(), Duration::from_millis(5)).is_some());
        assert!(net.finish(&token, CallOutcome::error("late"), Duration::from_secs(9)).is_none());
        assert_eq!(net.get(&token).map(|c| c.status), Some(CallStatus::Success));
        assert_eq!(net.get(&token).map(|c| c.duration), Some(Duration::from_millis(5)));
    }
}
