//! Request metadata and the "is this a request we profile" predicate.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use std::collections::BTreeMap;

/// Ambient facts about the incoming request, as far as the host knows them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RequestMetadata {
    pub action: Option<String>,
    pub is_async: bool,
    pub uri: Option<String>,
    pub form_id: Option<String>,
    pub logged_in: Option<bool>,
    /// Upstream request-received wall time, when the front end reports one.
    #[serde(with = "time::serde::rfc3339::option")]
    pub received_at: Option<OffsetDateTime>,
    pub extra: BTreeMap<String, String>,
}

impl RequestMetadata {
    pub fn for_action(action: impl Into<String>) -> Self {
        Self {
            action: Some(action.into()),
            is_async: true,
            ..Self::default()
        }
    }

    pub fn with_received_at(mut self, at: OffsetDateTime) -> Self {
        self.received_at = Some(at);
        self
    }

    /// `key=value` pairs for the report header, skipping unknowns.
    pub fn describe(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        if let Some(action) = &self.action {
            out.push(("action".to_string(), action.clone()));
        }
        out.push(("async".to_string(), self.is_async.to_string()));
        if let Some(uri) = &self.uri {
            out.push(("uri".to_string(), uri.clone()));
        }
        if let Some(form_id) = &self.form_id {
            out.push(("form_id".to_string(), form_id.clone()));
        }
        if let Some(logged_in) = self.logged_in {
            let who = if logged_in { "logged_in" } else { "guest" };
            out.push(("user".to_string(), who.to_string()));
        }
        for (k, v) in &self.extra {
            out.push((k.clone(), v.clone()));
        }
        out
    }
}

/// Decides whether a request gets profiled. Called on every request, so it
/// must be cheap.
pub trait RequestClassifier: Send + Sync {
    fn matches(&self, request: &RequestMetadata) -> bool;
}

impl<F> RequestClassifier for F
where
    F: Fn(&RequestMetadata) -> bool + Send + Sync,
{
    fn matches(&self, request: &RequestMetadata) -> bool {
        self(request)
    }
}

/// Matches requests carrying one specific action identifier.
#[derive(Debug, Clone)]
pub struct ActionClassifier {
    action: String,
    require_async: bool,
}

impl ActionClassifier {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            require_async: true,
        }
    }

    /// Also match synchronous requests that carry the action.
    pub fn any_transport(mut self) -> Self {
        self.require_async = false;
        self
    }
}

impl RequestClassifier for ActionClassifier {
    fn matches(&self, request: &RequestMetadata) -> bool {
        if self.require_async && !request.is_async {
            return false;
        }
        request.action.as_deref() == Some(self.action.as_str())
    }
}
