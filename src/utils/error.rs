//! Error types for player-bridge
//!
//! This module defines the error type shared by the bridge, the host-side
//! stand-ins and the engine adapters. We use thiserror for the library error
//! type and leave anyhow to the binary.

use thiserror::Error;

/// Main error type for player-bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Channel transport errors
    #[error("Channel error: {0}")]
    Channel(String),

    /// No handler is registered under the channel name
    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    /// The channel has no handler for this method
    #[error("Method not implemented: {0}")]
    MethodNotImplemented(String),

    /// Compositor texture registration errors
    #[error("Texture error: {0}")]
    Texture(String),

    /// Native engine errors
    #[error("Engine error: {0}")]
    Engine(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File error: {0}")]
    FileIO(#[from] std::io::Error),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),
}

impl BridgeError {
    /// Create an engine error from string
    pub fn engine_error<S: Into<String>>(msg: S) -> Self {
        BridgeError::Engine(msg.into())
    }
}

/// Convenience type alias for Results in player-bridge
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Extension trait for converting other errors to BridgeError
pub trait IntoBridgeError<T> {
    /// Convert this error into a BridgeError with the given context
    fn engine_err(self, context: &str) -> Result<T>;
    fn config_err(self, context: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> IntoBridgeError<T> for std::result::Result<T, E> {
    fn engine_err(self, context: &str) -> Result<T> {
        self.map_err(|e| BridgeError::Engine(format!("{}: {}", context, e)))
    }

    fn config_err(self, context: &str) -> Result<T> {
        self.map_err(|e| BridgeError::Config(format!("{}: {}", context, e)))
    }
}
