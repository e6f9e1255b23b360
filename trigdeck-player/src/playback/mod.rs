//! Playback engines and the engine pool

pub mod engine;
pub mod pool;
pub mod state;

pub use engine::PlaybackEngine;
pub use pool::{EngineHandle, EnginePool, PoolError};
pub use state::{EngineState, PlaybackStatus};
