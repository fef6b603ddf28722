//! Clock and memory primitives shared by every recorder.

mod clock;
mod memory;

pub use clock::*;
pub use memory::*;
