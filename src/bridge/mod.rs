//! Player bridge core for player-bridge
//!
//! This module connects host channels to native player engines. It owns the
//! per-player state machine, event ordering, frame handoff and the registry
//! that creates and tears down player instances.

mod command;
mod context;
mod event;
mod frame;
mod player;
mod registry;
mod sink;
mod state;

pub use command::{method, Command};
pub use context::BridgeContext;
pub use event::{PlayerEvent, RenderKind};
pub use frame::{FrameSlot, FrameStats};
pub use player::{BridgePlayer, PlayerId};
pub use registry::{method as plugin_method, PlayerRegistry};
pub use sink::EventQueue;
pub use state::{PlaybackCounters, PlaybackState, StateMachine, Transition};
