//! # Error Types
//!
//! Custom error types for Ground Link using `thiserror`.
//!
//! Framing errors on the radio link are not represented here: a corrupt frame
//! is dropped by the decoder and only counted (see [`crate::wire::decoder::DecoderStats`]).

use thiserror::Error;

/// Main error type for Ground Link
#[derive(Debug, Error)]
pub enum GroundLinkError {
    /// Wire protocol errors (frame construction)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Operation not allowed in the current session state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Serial port errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// None of the candidate serial devices could be opened
    #[error("No serial device found (tried: {0})")]
    SerialPortNotFound(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Ground Link
pub type Result<T> = std::result::Result<T, GroundLinkError>;
