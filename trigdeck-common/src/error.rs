//! Common error types for trigdeck

use thiserror::Error;

/// Common result type for trigdeck operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared across trigdeck crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error while loading configuration
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input (packet payload, parameter)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
