//! reqprof: request-scoped performance profiling.
//!
//! One [`ProfilingSession`] per request collects checkpoints, query timings
//! and outbound call timings, then synthesizes a single [`Report`] at end of
//! request.

mod callsite;
mod checkpoint;
mod collectors;
mod config;
mod duration;
mod error;
pub mod labels;
mod lifecycle;
mod render;
mod report;
mod request;
mod runtime;
mod scenario;
mod session;
mod sink;

pub use callsite::*;
pub use checkpoint::*;
pub use collectors::*;
pub use config::*;
pub use duration::*;
pub use error::*;
pub use lifecycle::*;
pub use report::*;
pub use request::*;
pub use runtime::*;
pub use scenario::*;
pub use session::*;
pub use sink::*;
