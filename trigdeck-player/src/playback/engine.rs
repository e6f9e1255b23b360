//! Playback engine
//!
//! One playback slot wrapping an external audio source. Forced stops and
//! pauses can be ramped: the engine sets the source volume to zero and
//! commits the hard transport action from [`PlaybackEngine::poll`] once the
//! output stage reports silence, so the channel never clicks.
//!
//! ```text
//! Stopped ──play──▶ Playing ──pause(ramp)──▶ Pausing ──vol=0──▶ Paused
//!    ▲                 │ stop(ramp)                                │
//!    │                 ▼                                           │
//!    └──vol=0──── Stopping                 Playing ◀──resume───────┘
//! ```

use super::state::{EngineState, PlaybackStatus};
use crate::hal::{AudioSource, SourceError, SourceStatus};
use tracing::trace;
use trigdeck_common::protocol::PlayMode;

/// Base volume applied to a freshly allocated engine
pub const DEFAULT_VOLUME: f32 = 1.0;

pub struct PlaybackEngine<S> {
    state: EngineState,
    base_volume: f32,
    pub(super) busy: bool,
    source: S,
}

impl<S: AudioSource> PlaybackEngine<S> {
    pub fn new(source: S) -> Self {
        Self {
            state: EngineState::Stopped,
            base_volume: DEFAULT_VOLUME,
            busy: false,
            source,
        }
    }

    /// Start `path` from the beginning
    ///
    /// A pending ramp is abandoned with an immediate hard stop. On failure
    /// the engine is left stopped (or in its previous state if the source
    /// kept playing) and the caller is expected to release it.
    pub fn play(&mut self, path: &str, mode: PlayMode) -> Result<(), SourceError> {
        if self.state.is_ramping() {
            self.source.stop();
            self.state = EngineState::Stopped;
        }

        if matches!(self.state, EngineState::Stopped | EngineState::Paused) {
            self.source.set_volume(self.base_volume);
        }

        self.source.open(path, mode)?;
        self.state = EngineState::Playing;
        trace!("Engine playing {} ({:?})", path, mode);
        Ok(())
    }

    /// Stop playback, optionally ramping the volume down first
    pub fn stop(&mut self, ramp: bool) {
        if self.state == EngineState::Stopped {
            return;
        }

        if ramp && self.state != EngineState::Paused {
            if self.state == EngineState::Playing {
                self.source.set_volume(0.0);
            }
            self.state = EngineState::Stopping;
        } else {
            self.source.stop();
            self.state = EngineState::Stopped;
        }
    }

    /// Pause playback, optionally ramping the volume down first
    pub fn pause(&mut self, ramp: bool) {
        if matches!(
            self.state,
            EngineState::Paused | EngineState::Stopped | EngineState::Stopping
        ) {
            return;
        }

        if ramp {
            if self.state == EngineState::Playing {
                self.source.set_volume(0.0);
                self.state = EngineState::Pausing;
            }
        } else {
            self.source.pause();
            self.state = EngineState::Paused;
        }
    }

    /// Resume a paused (or pausing) engine at its base volume
    pub fn resume(&mut self) {
        if matches!(
            self.state,
            EngineState::Stopping | EngineState::Stopped | EngineState::Playing
        ) {
            return;
        }

        // Commit the pending pause so the source is in a known state
        if self.state == EngineState::Pausing {
            self.source.pause();
        }

        self.source.set_volume(self.base_volume);
        self.source.resume();
        self.state = EngineState::Playing;
    }

    /// Advance the ramp state machine; called once per tick
    pub fn poll(&mut self) {
        let silent = self.source.volume() == 0.0;

        match self.state {
            EngineState::Stopping if silent => {
                self.source.stop();
                self.state = EngineState::Stopped;
            }
            EngineState::Pausing if silent => {
                self.source.pause();
                self.state = EngineState::Paused;
            }
            _ => {}
        }

        // End of stream
        if self.source.status() == SourceStatus::Stopped {
            self.state = EngineState::Stopped;
        }
    }

    pub fn status(&self) -> PlaybackStatus {
        self.state.status()
    }

    /// Internal state including ramps
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Stopped with no ramp in flight
    pub fn is_idle(&self) -> bool {
        self.state == EngineState::Stopped
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn volume(&self) -> f32 {
        self.base_volume
    }

    /// Set the base volume and apply it to the source immediately
    pub fn set_volume(&mut self, volume: f32) {
        self.base_volume = volume;
        self.source.set_volume(volume);
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}
