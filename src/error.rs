//! Crate-wide error types.
//!
//! Only the outer surfaces (options loading, scenario replay, report
//! serialization) return these. Recording and synthesis never fail.

use thiserror::Error;

pub type ProfilerResult<T> = Result<T, ProfilerError>;

#[derive(Debug, Error)]
pub enum ProfilerError {
    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("scenario error: {0}")]
    Scenario(String),
}
