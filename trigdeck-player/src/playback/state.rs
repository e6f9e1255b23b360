//! Engine transport state
//!
//! [`EngineState`] is the full internal state, including the two ramp states
//! that defer a hard stop/pause until the output volume reaches zero.
//! [`PlaybackStatus`] is what observers (trigger inputs, the protocol) see:
//! a ramp in progress reports as its destination.

use serde::Serialize;

/// Internal transport state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    #[default]
    Stopped,
    Playing,
    Paused,
    /// Volume ramping to zero, hard pause pending
    Pausing,
    /// Volume ramping to zero, hard stop pending
    Stopping,
}

impl EngineState {
    /// External view of the state
    pub fn status(self) -> PlaybackStatus {
        match self {
            EngineState::Stopped | EngineState::Stopping => PlaybackStatus::Stopped,
            EngineState::Playing => PlaybackStatus::Playing,
            EngineState::Paused | EngineState::Pausing => PlaybackStatus::Paused,
        }
    }

    /// True while a ramp is pending
    pub fn is_ramping(self) -> bool {
        matches!(self, EngineState::Pausing | EngineState::Stopping)
    }
}

/// Externally observable playback status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum PlaybackStatus {
    Stopped = 0,
    Playing = 1,
    Paused = 2,
}

impl PlaybackStatus {
    /// Status byte used by the command protocol
    pub fn wire(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackStatus::Playing => write!(f, "playing"),
            PlaybackStatus::Paused => write!(f, "paused"),
            PlaybackStatus::Stopped => write!(f, "stopped"),
        }
    }
}
