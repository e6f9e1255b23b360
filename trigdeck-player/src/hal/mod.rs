//! External collaborator interfaces
//!
//! The control core never touches hardware directly. Pin I/O, the audio
//! decode/output stage, the mixer, the tick source and the packet transport
//! are all reached through the traits below.
//!
//! [`sim`] provides in-process implementations used by the binary's
//! simulation mode and by tests.

pub mod clock;
pub mod sim;

use crate::trigger::EdgeHandler;
use std::sync::Arc;
use thiserror::Error;
use trigdeck_common::protocol::{ErrorCode, Packet, PlayMode};
use trigdeck_common::Ticks;

pub use clock::MonotonicClock;

/// Monotonic tick source
pub trait TickSource {
    fn now(&self) -> Ticks;
}

/// Tick source shared between the poll loop and the edge context
pub type SharedClock = Arc<dyn TickSource + Send + Sync>;

impl<T: TickSource + ?Sized> TickSource for Arc<T> {
    fn now(&self) -> Ticks {
        (**self).now()
    }
}

/// Transport status reported by an audio source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    Playing,
    Paused,
    Stopped,
}

/// Reasons an audio source refuses to start
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("unsupported file: {0}")]
    Unsupported(String),

    #[error("output device error: {0}")]
    Device(String),
}

/// One instance of the external audio decode/output engine
///
/// `set_volume` sets a target; the output stage ramps towards it and
/// `volume` reports the level currently applied.
pub trait AudioSource {
    fn open(&mut self, path: &str, mode: PlayMode) -> Result<(), SourceError>;
    fn stop(&mut self);
    fn pause(&mut self);
    fn resume(&mut self);
    fn set_volume(&mut self, volume: f32);
    fn volume(&self) -> f32;
    fn status(&self) -> SourceStatus;
}

/// Hardware pin layer
///
/// `attach` registers a handler invoked from the interrupt context with the
/// raw pin level and the tick of the edge.
pub trait PinBus {
    fn read_level(&self, pin: u8) -> bool;
    fn attach(&self, pin: u8, handler: EdgeHandler);
    fn detach(&self, pin: u8);
}

/// Framed packet transport (framing and CRC live below this interface)
pub trait PacketTransport {
    fn pull_packet(&mut self) -> Option<Packet>;
    fn push_packet(&mut self, packet: &Packet);
    fn send_error_code(&mut self, code: ErrorCode);
}

/// Analog output stage (volumes in dB)
///
/// Setters return `false` when the hardware rejects the value.
pub trait OutputMixer {
    fn speakers_volume(&self) -> f32;
    fn set_speakers_volume(&mut self, db: f32) -> bool;
    fn headphone_volume(&self) -> f32;
    fn set_headphone_volume(&mut self, db: f32) -> bool;
}

/// Cosmetic activity indicator (board LED)
pub trait StatusIndicator {
    fn set_active(&mut self, active: bool);
}
