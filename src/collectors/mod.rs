//! Side-channel recorders correlated with the checkpoint timeline.

mod network;
mod query;

pub use network::*;
pub use query::*;
