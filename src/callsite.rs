//! Best-effort identification of the code that triggered a recording.

use serde::{Deserialize, Serialize};

use std::fmt;
use std::panic::Location;

pub const UNKNOWN_CALL_SITE: &str = "unknown";

/// Where a checkpoint or query came from. Renders as `file:line -> function`,
/// `Type::function`, or `unknown`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
}

impl CallSite {
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Resolves from a `#[track_caller]` location, keeping only the file's
    /// base name.
    pub fn from_location(location: &Location<'_>) -> Self {
        let file = base_name(location.file());
        if file.is_empty() {
            return Self::unknown();
        }
        Self {
            file: Some(file.to_string()),
            line: Some(location.line()),
            function: None,
        }
    }

    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        let function = function.into();
        if !function.is_empty() {
            self.function = Some(function);
        }
        self
    }

    pub fn is_unknown(&self) -> bool {
        self.file.is_none() && self.function.is_none()
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, &self.function) {
            (Some(file), Some(function)) => match self.line {
                Some(line) => write!(f, "{file}:{line} -> {function}"),
                None => write!(f, "{file} -> {function}"),
            },
            (Some(file), None) => match self.line {
                Some(line) => write!(f, "{file}:{line}"),
                None => f.write_str(file),
            },
            (None, Some(function)) => f.write_str(function),
            (None, None) => f.write_str(UNKNOWN_CALL_SITE),
        }
    }
}

/// One frame of a host-supplied backtrace. Every field is optional because
/// hosts fill in whatever they have.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub function: Option<String>,
}

impl Frame {
    fn qualified_function(&self) -> Option<String> {
        let function = self.function.as_deref().filter(|f| !f.is_empty())?;
        Some(match self.class.as_deref().filter(|c| !c.is_empty()) {
            Some(class) => format!("{class}::{function}"),
            None => function.to_string(),
        })
    }
}

/// Raw backtrace attached to a query log entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Backtrace {
    #[default]
    None,
    Text(String),
    Frames(Vec<Frame>),
}

/// Reduces a backtrace to the single most relevant caller.
///
/// Scans every frame for the first one whose file contains `app_marker` and
/// names a function; framework frames can sit arbitrarily deep above it.
/// Falls back to the first frame when it carries both a class and a
/// function, then to `unknown`.
pub fn simplify_backtrace(backtrace: &Backtrace, app_marker: &str) -> CallSite {
    match backtrace {
        Backtrace::None => CallSite::unknown(),
        Backtrace::Text(text) if text.trim().is_empty() => CallSite::unknown(),
        Backtrace::Text(text) => CallSite::unknown().with_function(text.trim()),
        Backtrace::Frames(frames) => {
            let app_frame = frames.iter().find(|frame| {
                !app_marker.is_empty()
                    && frame.file.as_deref().is_some_and(|f| f.contains(app_marker))
                    && frame.function.is_some()
            });
            if let Some(frame) = app_frame
                && let Some(function) = frame.qualified_function()
            {
                return CallSite::unknown().with_function(function);
            }
            match frames.first() {
                Some(first) if first.class.is_some() && first.function.is_some() => first
                    .qualified_function()
                    .map(|f| CallSite::unknown().with_function(f))
                    .unwrap_or_default(),
                _ => CallSite::unknown(),
            }
        }
    }
}

fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
