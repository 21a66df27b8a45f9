//! Utility module for player-bridge
//!
//! This module provides common utilities used throughout the crate:
//! - Error handling with custom error types
//! - Configuration management
//! - Common helper functions

pub mod config;
pub mod error;

// Re-export commonly used items
pub use config::{ChannelConfig, Config, GeneralConfig, PlayerDefaults};
pub use error::{BridgeError, IntoBridgeError, Result};

/// Format a millisecond position for display
///
/// Formatted as "HH:MM:SS.mmm" or "MM:SS.mmm" for positions under an hour.
/// Negative positions (engines report -1 when unknown) format as "--:--".
pub fn format_position(ms: i64) -> String {
    if ms < 0 {
        return "--:--".to_string();
    }

    let millis = ms % 1000;
    let total_secs = ms / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
    } else {
        format!("{:02}:{:02}.{:03}", minutes, seconds, millis)
    }
}
