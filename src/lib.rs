//! player-bridge: drive native media player engines from a host UI process
//!
//! The host talks to each player over a command channel and an event
//! channel and composites decoded video through a texture registry.

pub mod bridge;
pub mod engine;
pub mod host;
pub mod utils;

pub use bridge::{BridgeContext, BridgePlayer, PlaybackState, PlayerRegistry};
pub use utils::config::Config;
pub use utils::error::{BridgeError, Result};
