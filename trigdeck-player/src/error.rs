//! Error types for trigdeck-player
//!
//! Runtime failures never terminate the poll loop; these types cover the
//! start-up path (configuration, rig construction) and the console front end.

use crate::playback::PoolError;
use thiserror::Error;

/// Main error type for trigdeck-player
#[derive(Error, Debug)]
pub enum Error {
    /// Shared configuration and I/O errors
    #[error(transparent)]
    Common(#[from] trigdeck_common::Error),

    /// Engine pool misuse
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    /// Malformed console input
    #[error("Console error: {0}")]
    Console(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using trigdeck-player Error
pub type Result<T> = std::result::Result<T, Error>;
