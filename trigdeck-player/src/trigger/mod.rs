//! Trigger inputs
//!
//! One [`TriggerInput`] per physical input. The interrupt side only writes
//! the input's [`EdgeLatch`]; everything else happens in the poll loop.

pub mod debounce;
pub mod edge;
pub mod input;

pub use debounce::DebounceTimer;
pub use edge::{EdgeHandler, EdgeLatch, EdgeSample, PinLevel};
pub use input::{InputSettings, InputStatus, TriggerInput};
