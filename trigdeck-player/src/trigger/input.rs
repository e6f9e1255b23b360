//! Trigger input state machine
//!
//! Consumes debounced level changes from one physical input and drives one
//! playback engine according to the input's trigger mode and deassertion
//! policy.
//!
//! # Edge mode
//!
//! Only the transition into `Asserted` acts. A fresh pulse starts the clip;
//! a pulse while playing re-triggers according to the deassertion policy
//! (`Pause` pauses, `Restart` replays from the start, `Stop` stops and frees
//! the engine); a pulse while paused resumes.
//!
//! # Level mode
//!
//! Holding the input asserted keeps the clip playing. Deassertion pauses
//! (`Pause` policy) or stops (any other policy) with a volume ramp; the
//! engine is freed once the stop has completed.
//!
//! # Error latch
//!
//! A clip that fails to start latches the input's error flag. The input
//! then ignores level changes until [`TriggerInput::reset_error`].

use super::debounce::DebounceTimer;
use super::edge::{EdgeHandler, EdgeLatch, EdgeSample, PinLevel};
use crate::hal::{AudioSource, PinBus};
use crate::playback::{EngineHandle, EnginePool, PlaybackStatus};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use trigdeck_common::config::{DeassertPolicy, InputConfig, Polarity, TriggerMode};
use trigdeck_common::protocol::PlayMode;
use trigdeck_common::time::ms_to_ticks;
use trigdeck_common::Ticks;

/// Static behaviour of one input
#[derive(Debug, Clone)]
pub struct InputSettings {
    pub pin: u8,
    pub file: String,
    pub polarity: Polarity,
    pub trigger: TriggerMode,
    pub deassert: DeassertPolicy,
    pub mode: PlayMode,
    pub volume: f32,
    /// Debounce window in ticks (0 disables debouncing)
    pub debounce: Ticks,
}

impl InputSettings {
    /// Convert a configuration entry, expressing the debounce window in ticks
    pub fn from_config(config: &InputConfig, tick_ms: u64) -> Self {
        Self {
            pin: config.pin,
            file: config.file.clone(),
            polarity: config.polarity,
            trigger: config.trigger,
            deassert: config.deassert,
            mode: config.mode,
            volume: config.volume,
            debounce: ms_to_ticks(config.debounce_ms, tick_ms),
        }
    }
}

/// Snapshot of an input for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InputStatus {
    pub pin: u8,
    pub enabled: bool,
    pub asserted: bool,
    pub engine: Option<usize>,
    pub error: bool,
}

pub struct TriggerInput {
    settings: InputSettings,
    enabled: bool,
    latch: Arc<EdgeLatch>,
    /// Last latch word seen by the debouncer
    last_sample: EdgeSample,
    debouncer: DebounceTimer,
    /// Level the state machine last acted upon
    last_level: PinLevel,
    engine: Option<EngineHandle>,
    error: bool,
}

impl TriggerInput {
    pub fn new(settings: InputSettings) -> Self {
        let latch = Arc::new(EdgeLatch::new());
        let last_sample = latch.sample();
        Self {
            settings,
            enabled: false,
            latch,
            last_sample,
            debouncer: DebounceTimer::new(),
            last_level: PinLevel::Deasserted,
            engine: None,
            error: false,
        }
    }

    pub fn settings(&self) -> &InputSettings {
        &self.settings
    }

    /// Handler for the pin layer; writes only this input's latch
    pub fn edge_handler(&self) -> EdgeHandler {
        EdgeHandler::new(self.latch.clone(), self.settings.polarity)
    }

    /// Arm edge observation
    ///
    /// Level-triggered inputs also sample the current level so an input held
    /// asserted at start-up plays on the first poll.
    pub fn enable(&mut self, pins: &dyn PinBus, now: Ticks) {
        pins.attach(self.settings.pin, self.edge_handler());

        if self.settings.trigger == TriggerMode::Level {
            let raw = pins.read_level(self.settings.pin);
            self.latch
                .seed(PinLevel::from_raw(raw, self.settings.polarity), now);
            self.last_sample = self.latch.sample();
        }

        self.enabled = true;
        info!(
            "Pin {} enabled ({:?}, {:?}, {})",
            self.settings.pin, self.settings.polarity, self.settings.trigger, self.settings.file
        );
    }

    /// Stop observing edges; a bound engine is stopped and released
    pub fn disable<S: AudioSource>(&mut self, pins: &dyn PinBus, pool: &mut EnginePool<S>) {
        pins.detach(self.settings.pin);
        self.enabled = false;
        self.debouncer.stop();
        if let Some(handle) = self.engine.take() {
            pool.release(handle);
        }
        debug!("Pin {} disabled", self.settings.pin);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn has_error(&self) -> bool {
        self.error
    }

    /// Clear a latched playback error so the input reacts again
    ///
    /// The next poll evaluates the current level against a deasserted
    /// baseline, as after `enable`.
    pub fn reset_error(&mut self) {
        if !self.error {
            return;
        }
        self.error = false;
        self.last_level = PinLevel::Deasserted;
        self.debouncer.stop();
        info!("Pin {} error cleared", self.settings.pin);
    }

    pub fn engine(&self) -> Option<EngineHandle> {
        self.engine
    }

    pub fn status(&self) -> InputStatus {
        InputStatus {
            pin: self.settings.pin,
            enabled: self.enabled,
            asserted: self.last_level == PinLevel::Asserted,
            engine: self.engine.map(EngineHandle::index),
            error: self.error,
        }
    }

    /// Advance the input; returns true when a level change was acted upon
    pub fn poll<S: AudioSource>(&mut self, pool: &mut EnginePool<S>, now: Ticks) -> bool {
        if self.error || !self.enabled {
            return false;
        }

        // Free the engine once its clip has ended (or a ramped stop completed)
        if let Some(handle) = self.engine {
            if pool.engine(handle).is_idle() {
                pool.release(handle);
                self.engine = None;
            }
        }

        let Some(level) = self.stable_level(now) else {
            return false;
        };

        if level == self.last_level {
            return false;
        }
        self.last_level = level;

        debug!(
            "Pin {} {}",
            self.settings.pin,
            if level == PinLevel::Asserted { "asserted" } else { "deasserted" }
        );

        match (self.settings.trigger, level) {
            (TriggerMode::Edge, PinLevel::Asserted) => self.edge_asserted(pool),
            (TriggerMode::Edge, PinLevel::Deasserted) => {}
            (TriggerMode::Level, PinLevel::Asserted) => self.level_asserted(pool),
            (TriggerMode::Level, PinLevel::Deasserted) => self.level_deasserted(pool),
        }

        true
    }

    /// Latest level, or `None` while a debounce window is still open
    fn stable_level(&mut self, now: Ticks) -> Option<PinLevel> {
        let sample = self.latch.sample();
        if self.settings.debounce == 0 {
            return Some(sample.level);
        }

        // Every new edge restarts the window from the edge's own tick
        if sample != self.last_sample {
            self.last_sample = sample;
            self.debouncer.start_at(sample.at);
        }

        if let Some(elapsed) = self.debouncer.elapsed(now) {
            if elapsed < self.settings.debounce {
                return None;
            }
            self.debouncer.stop();
        }

        Some(sample.level)
    }

    /// Bound engine, acquiring one (at the input's volume) if needed
    fn bind<S: AudioSource>(&mut self, pool: &mut EnginePool<S>) -> Option<EngineHandle> {
        if let Some(handle) = self.engine {
            return Some(handle);
        }

        match pool.acquire() {
            Ok(handle) => {
                pool.engine_mut(handle).set_volume(self.settings.volume);
                self.engine = Some(handle);
                Some(handle)
            }
            Err(e) => {
                warn!("Pin {} player not available: {}", self.settings.pin, e);
                None
            }
        }
    }

    fn unbind<S: AudioSource>(&mut self, pool: &mut EnginePool<S>) {
        if let Some(handle) = self.engine.take() {
            pool.release(handle);
        }
    }

    /// Start the clip; a failure releases the engine and latches the error
    fn start<S: AudioSource>(&mut self, pool: &mut EnginePool<S>, handle: EngineHandle) {
        let settings = &self.settings;
        match pool
            .engine_mut(handle)
            .play(&settings.file, settings.mode)
        {
            Ok(()) => info!("Pin {} playing {}", settings.pin, settings.file),
            Err(e) => {
                error!("Pin {} error playing {}: {}", settings.pin, settings.file, e);
                self.unbind(pool);
                self.error = true;
            }
        }
    }

    fn edge_asserted<S: AudioSource>(&mut self, pool: &mut EnginePool<S>) {
        let Some(handle) = self.bind(pool) else {
            return;
        };

        match pool.engine(handle).status() {
            PlaybackStatus::Playing => match self.settings.deassert {
                DeassertPolicy::Pause => {
                    pool.engine_mut(handle).pause(true);
                    info!("Pin {} paused", self.settings.pin);
                }
                DeassertPolicy::Restart => {
                    pool.engine_mut(handle).stop(false);
                    self.start(pool, handle);
                }
                DeassertPolicy::Stop => {
                    pool.engine_mut(handle).stop(false);
                    self.unbind(pool);
                    info!("Pin {} stopped", self.settings.pin);
                }
            },
            PlaybackStatus::Paused => {
                pool.engine_mut(handle).resume();
                info!("Pin {} resumed", self.settings.pin);
            }
            PlaybackStatus::Stopped => self.start(pool, handle),
        }
    }

    fn level_asserted<S: AudioSource>(&mut self, pool: &mut EnginePool<S>) {
        let Some(handle) = self.bind(pool) else {
            return;
        };

        match pool.engine(handle).status() {
            PlaybackStatus::Playing => {}
            PlaybackStatus::Paused => {
                pool.engine_mut(handle).resume();
                info!("Pin {} resumed", self.settings.pin);
            }
            PlaybackStatus::Stopped => self.start(pool, handle),
        }
    }

    fn level_deasserted<S: AudioSource>(&mut self, pool: &mut EnginePool<S>) {
        let Some(handle) = self.engine else {
            warn!("Pin {} deasserted without player", self.settings.pin);
            return;
        };

        if pool.engine(handle).status() != PlaybackStatus::Playing {
            warn!("Pin {} deasserted while not playing", self.settings.pin);
            return;
        }

        if self.settings.deassert == DeassertPolicy::Pause {
            pool.engine_mut(handle).pause(true);
            info!("Pin {} paused", self.settings.pin);
        } else {
            pool.engine_mut(handle).stop(true);
            info!("Pin {} stopped", self.settings.pin);
        }
    }
}
