//! # trigdeck Common Library
//!
//! Shared code for the trigdeck appliance crates:
//! - Error types
//! - Bootstrap configuration (TOML) and path resolution
//! - Command protocol wire definitions (command ids, error codes, packets)
//! - Tick/time helpers

pub mod config;
pub mod error;
pub mod protocol;
pub mod time;

pub use error::{Error, Result};
pub use time::Ticks;
