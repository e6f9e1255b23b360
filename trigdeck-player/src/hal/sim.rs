//! Simulated hardware
//!
//! Stand-ins for every collaborator trait. The audio source models what the
//! control core relies on: a volume that ramps towards its target over time,
//! clips that end on their own in normal mode, and opens that fail for
//! missing or unsupported files.

use super::{
    AudioSource, OutputMixer, PacketTransport, PinBus, SharedClock, SourceError, SourceStatus,
    StatusIndicator, TickSource,
};
use crate::trigger::EdgeHandler;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use trigdeck_common::protocol::{ErrorCode, Packet, PlayMode};
use trigdeck_common::Ticks;

/// Tick source advanced by hand
#[derive(Debug, Default)]
pub struct ManualClock {
    ticks: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ticks: Ticks) {
        self.ticks.fetch_add(ticks, Ordering::SeqCst);
    }
}

impl TickSource for ManualClock {
    fn now(&self) -> Ticks {
        self.ticks.load(Ordering::SeqCst)
    }
}

/// Which clip paths a simulated source can open
#[derive(Debug, Clone)]
pub enum SimCatalog {
    /// Every `.wav` path opens
    Any,
    /// Paths are resolved against a directory and must exist
    Directory(PathBuf),
    /// Only the listed paths exist
    Listed(HashSet<String>),
}

impl SimCatalog {
    pub fn listed<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        SimCatalog::Listed(paths.into_iter().map(Into::into).collect())
    }

    fn check(&self, path: &str) -> Result<(), SourceError> {
        let is_wav = Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));

        let exists = match self {
            SimCatalog::Any => true,
            SimCatalog::Directory(root) => root.join(path).is_file(),
            SimCatalog::Listed(paths) => paths.contains(path),
        };

        if !exists {
            return Err(SourceError::NotFound(path.to_string()));
        }
        if !is_wav {
            return Err(SourceError::Unsupported(path.to_string()));
        }
        Ok(())
    }
}

/// Timing of the simulated output stage
#[derive(Debug, Clone, Copy)]
pub struct SimTiming {
    /// Ticks taken to ramp from the current volume to a new target
    pub ramp_ticks: Ticks,
    /// Length of a clip in normal mode (0 = never ends)
    pub clip_ticks: Ticks,
}

impl Default for SimTiming {
    fn default() -> Self {
        Self {
            ramp_ticks: 4,
            clip_ticks: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct VolumeRamp {
    from: f32,
    target: f32,
    started_at: Ticks,
}

impl VolumeRamp {
    fn level(&self, now: Ticks, ramp_ticks: Ticks) -> f32 {
        let elapsed = now.saturating_sub(self.started_at);
        if ramp_ticks == 0 || elapsed >= ramp_ticks {
            return self.target;
        }
        let progress = elapsed as f32 / ramp_ticks as f32;
        self.from + (self.target - self.from) * progress
    }
}

/// Simulated audio decode/output engine
pub struct SimAudioSource {
    clock: SharedClock,
    catalog: Arc<SimCatalog>,
    timing: SimTiming,
    status: SourceStatus,
    path: Option<String>,
    mode: PlayMode,
    /// Play time accumulated before the current run
    played: Ticks,
    resumed_at: Ticks,
    ramp: VolumeRamp,
    opens: usize,
}

impl SimAudioSource {
    pub fn new(clock: SharedClock, catalog: Arc<SimCatalog>, timing: SimTiming) -> Self {
        let now = clock.now();
        Self {
            clock,
            catalog,
            timing,
            status: SourceStatus::Stopped,
            path: None,
            mode: PlayMode::Normal,
            played: 0,
            resumed_at: now,
            ramp: VolumeRamp {
                from: 1.0,
                target: 1.0,
                started_at: now,
            },
            opens: 0,
        }
    }

    /// Number of successful opens so far
    pub fn opens(&self) -> usize {
        self.opens
    }

    /// Path of the last opened clip
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Volume the output stage is ramping towards
    pub fn target_volume(&self) -> f32 {
        self.ramp.target
    }

    fn effective_status(&self, now: Ticks) -> SourceStatus {
        if self.status == SourceStatus::Playing
            && self.mode == PlayMode::Normal
            && self.timing.clip_ticks > 0
            && self.played + now.saturating_sub(self.resumed_at) >= self.timing.clip_ticks
        {
            return SourceStatus::Stopped;
        }
        self.status
    }
}

impl AudioSource for SimAudioSource {
    fn open(&mut self, path: &str, mode: PlayMode) -> Result<(), SourceError> {
        self.catalog.check(path)?;

        self.path = Some(path.to_string());
        self.mode = mode;
        self.played = 0;
        self.resumed_at = self.clock.now();
        self.status = SourceStatus::Playing;
        self.opens += 1;
        Ok(())
    }

    fn stop(&mut self) {
        self.status = SourceStatus::Stopped;
        self.played = 0;
    }

    fn pause(&mut self) {
        let now = self.clock.now();
        if self.effective_status(now) == SourceStatus::Playing {
            self.played += now.saturating_sub(self.resumed_at);
            self.status = SourceStatus::Paused;
        }
    }

    fn resume(&mut self) {
        if self.status == SourceStatus::Paused {
            self.resumed_at = self.clock.now();
            self.status = SourceStatus::Playing;
        }
    }

    fn set_volume(&mut self, volume: f32) {
        let now = self.clock.now();
        self.ramp = VolumeRamp {
            from: self.ramp.level(now, self.timing.ramp_ticks),
            target: volume,
            started_at: now,
        };
    }

    fn volume(&self) -> f32 {
        self.ramp.level(self.clock.now(), self.timing.ramp_ticks)
    }

    fn status(&self) -> SourceStatus {
        self.effective_status(self.clock.now())
    }
}

struct SimPin {
    level: bool,
    handler: Option<EdgeHandler>,
}

/// Simulated pin bank
///
/// `set_level` plays the role of the interrupt controller: it invokes the
/// attached handler with the new raw level and the current tick.
pub struct SimPins {
    clock: SharedClock,
    idle_level: bool,
    pins: Mutex<HashMap<u8, SimPin>>,
}

impl SimPins {
    /// Pin bank with pull-ups (idle level high)
    pub fn new(clock: SharedClock) -> Self {
        Self::with_idle_level(clock, true)
    }

    pub fn with_idle_level(clock: SharedClock, idle_level: bool) -> Self {
        Self {
            clock,
            idle_level,
            pins: Mutex::new(HashMap::new()),
        }
    }

    /// Drive a pin to `level`, firing the edge handler if the level changed
    pub fn set_level(&self, pin: u8, level: bool) {
        let handler = {
            let mut pins = self.pins.lock().unwrap_or_else(|e| e.into_inner());
            let entry = pins.entry(pin).or_insert(SimPin {
                level: self.idle_level,
                handler: None,
            });
            if entry.level == level {
                return;
            }
            entry.level = level;
            entry.handler.clone()
        };

        if let Some(handler) = handler {
            handler.on_edge(level, self.clock.now());
        }
    }

    pub fn is_attached(&self, pin: u8) -> bool {
        let pins = self.pins.lock().unwrap_or_else(|e| e.into_inner());
        pins.get(&pin).is_some_and(|p| p.handler.is_some())
    }
}

impl PinBus for SimPins {
    fn read_level(&self, pin: u8) -> bool {
        let pins = self.pins.lock().unwrap_or_else(|e| e.into_inner());
        pins.get(&pin).map_or(self.idle_level, |p| p.level)
    }

    fn attach(&self, pin: u8, handler: EdgeHandler) {
        let mut pins = self.pins.lock().unwrap_or_else(|e| e.into_inner());
        let entry = pins.entry(pin).or_insert(SimPin {
            level: self.idle_level,
            handler: None,
        });
        entry.handler = Some(handler);
        debug!("Pin {} attached", pin);
    }

    fn detach(&self, pin: u8) {
        let mut pins = self.pins.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = pins.get_mut(&pin) {
            entry.handler = None;
            debug!("Pin {} detached", pin);
        }
    }
}

/// Lowest output volume the simulated amplifier accepts (dB)
pub const SIM_MIN_DB: f32 = -100.0;

/// Highest output volume the simulated amplifier accepts (dB)
pub const SIM_MAX_DB: f32 = 12.0;

/// Simulated analog output stage
#[derive(Debug, Clone)]
pub struct SimMixer {
    speakers_db: f32,
    headphone_db: f32,
}

impl Default for SimMixer {
    fn default() -> Self {
        Self {
            speakers_db: 0.0,
            headphone_db: 0.0,
        }
    }
}

impl SimMixer {
    fn accepts(db: f32) -> bool {
        (SIM_MIN_DB..=SIM_MAX_DB).contains(&db)
    }
}

impl OutputMixer for SimMixer {
    fn speakers_volume(&self) -> f32 {
        self.speakers_db
    }

    fn set_speakers_volume(&mut self, db: f32) -> bool {
        if !Self::accepts(db) {
            return false;
        }
        self.speakers_db = db;
        true
    }

    fn headphone_volume(&self) -> f32 {
        self.headphone_db
    }

    fn set_headphone_volume(&mut self, db: f32) -> bool {
        if !Self::accepts(db) {
            return false;
        }
        self.headphone_db = db;
        true
    }
}

/// What the dispatcher sent back for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Packet(Packet),
    Error(ErrorCode),
}

/// In-memory packet transport
#[derive(Debug, Default)]
pub struct QueueTransport {
    requests: VecDeque<Packet>,
    replies: Vec<Reply>,
}

impl QueueTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a request for the next `pull_packet`
    pub fn submit(&mut self, packet: Packet) {
        self.requests.push_back(packet);
    }

    /// Drain the replies collected so far
    pub fn take_replies(&mut self) -> Vec<Reply> {
        std::mem::take(&mut self.replies)
    }
}

impl PacketTransport for QueueTransport {
    fn pull_packet(&mut self) -> Option<Packet> {
        self.requests.pop_front()
    }

    fn push_packet(&mut self, packet: &Packet) {
        self.replies.push(Reply::Packet(packet.clone()));
    }

    fn send_error_code(&mut self, code: ErrorCode) {
        self.replies.push(Reply::Error(code));
    }
}

/// Indicator that logs activity changes
#[derive(Debug, Default)]
pub struct LogIndicator {
    active: bool,
}

impl StatusIndicator for LogIndicator {
    fn set_active(&mut self, active: bool) {
        if active != self.active {
            self.active = active;
            info!("Activity indicator {}", if active { "on" } else { "off" });
        }
    }
}
