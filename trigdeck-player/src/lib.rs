//! # trigdeck-player
//!
//! Control core of a trigger-driven multi-channel audio clip player.
//!
//! Physical inputs (buttons, contacts, sensors) start, pause, resume and
//! stop short clips on a fixed pool of playback engines; a host may drive
//! the same engines over a packet command protocol. Everything below the
//! control logic (pins, audio decode/output, mixer, transport, clock) is
//! reached through the traits in [`hal`].
//!
//! **Architecture:**
//! - [`trigger`]: edge latch, debounce and the per-input state machine
//! - [`playback`]: ramped engine state machine and the engine pool
//! - [`protocol`]: host command dispatcher
//! - [`controller`]: the cooperative poll loop tying it together
//! - [`console`]: stdin front end for the binary

pub mod console;
pub mod controller;
pub mod error;
pub mod hal;
pub mod playback;
pub mod protocol;
pub mod trigger;

pub use controller::{Controller, ControllerSnapshot};
pub use error::{Error, Result};
