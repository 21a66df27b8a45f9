//! Native engine boundary for player-bridge
//!
//! The media engine itself (demux, decode, render, seek) lives outside this
//! crate. This module defines the call interface the bridge drives, the
//! callback payloads the engine reports through, and the handle that guards
//! the engine's lifetime.

mod handle;
mod loopback;

pub use handle::EngineHandle;
pub use loopback::{EngineCall, LoopbackEngine, LoopbackProbe};

use crate::utils::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Event codes reported through the engine's event callback
pub mod event_code {
    pub const FLUSH: i32 = 0;
    pub const ERROR: i32 = 100;
    pub const PREPARED: i32 = 200;
    pub const COMPLETED: i32 = 300;
    pub const VIDEO_SIZE_CHANGED: i32 = 400;
    pub const SAR_CHANGED: i32 = 401;
    pub const VIDEO_RENDERING_START: i32 = 402;
    pub const AUDIO_RENDERING_START: i32 = 403;
    pub const VIDEO_ROTATION_CHANGED: i32 = 404;
    pub const BUFFERING_START: i32 = 500;
    pub const BUFFERING_END: i32 = 501;
    pub const BUFFERING_UPDATE: i32 = 502;
    pub const PLAYBACK_STATE_CHANGED: i32 = 700;
}

/// One engine callback: `(what, arg1, arg2, extra)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineEvent {
    /// Event code, see [`event_code`]
    pub what: i32,
    pub arg1: i32,
    pub arg2: i32,
    /// Free-form text, the error message for [`event_code::ERROR`]
    pub extra: Option<String>,
}

impl EngineEvent {
    pub fn new(what: i32, arg1: i32, arg2: i32) -> Self {
        Self {
            what,
            arg1,
            arg2,
            extra: None,
        }
    }

    pub fn with_extra<S: Into<String>>(mut self, extra: S) -> Self {
        self.extra = Some(extra.into());
        self
    }
}

/// Decoded RGBA frame produced by the engine's pixel callback
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8, `width * height * 4` bytes
    pub pixels: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    /// A frame filled with one RGBA color
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self::new(width, height, pixels)
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Receives engine events, invoked on the engine's callback thread(s)
pub type EngineEventListener = Arc<dyn Fn(EngineEvent) + Send + Sync>;

/// Receives decoded frames, invoked on the engine's render thread
pub type FrameListener = Arc<dyn Fn(Arc<PixelBuffer>) + Send + Sync>;

/// Engine option categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum OptionCategory {
    Format = 1,
    Codec = 2,
    Sws = 3,
    Player = 4,
    Swr = 5,
}

/// Engine option value, either integer or string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Int(i64),
    Str(String),
}

/// One `(category, key, value)` engine option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerOption {
    pub category: i32,
    pub key: String,
    pub value: OptionValue,
}

impl PlayerOption {
    /// Forward this option to the engine setter matching its value type
    pub fn apply(&self, engine: &dyn NativePlayer) {
        match &self.value {
            OptionValue::Int(value) => engine.set_int_option(self.category, &self.key, *value),
            OptionValue::Str(value) => engine.set_option(self.category, &self.key, value),
        }
    }
}

/// Native player engine interface
///
/// Implementations are internally synchronized: every method takes `&self`
/// and may be called from the host command path while the engine's own
/// threads are firing callbacks. Callbacks are raised from the engine's own
/// threads, never synchronously from inside one of these calls. No argument
/// validation happens here.
pub trait NativePlayer: Send + Sync {
    /// Set the media URL or path
    fn set_data_source(&self, url: &str) -> Result<()>;

    /// Start preparing; completion is reported with [`event_code::PREPARED`]
    fn prepare_async(&self) -> Result<()>;

    /// Start or resume playback
    fn start(&self) -> Result<()>;

    /// Pause playback
    fn pause(&self) -> Result<()>;

    /// Stop playback
    fn stop(&self) -> Result<()>;

    /// Return to the idle state, dropping the data source
    fn reset(&self) -> Result<()>;

    /// Seek to a position in milliseconds
    fn seek_to(&self, msec: i64) -> Result<()>;

    /// Set per-channel volume (0.0 to 1.0)
    fn set_volume(&self, left: f32, right: f32);

    /// Set playback speed multiplier
    fn set_speed(&self, speed: f32);

    /// Set loop count, 0 loops forever
    fn set_loop(&self, count: i32);

    /// Set a string option
    fn set_option(&self, category: i32, key: &str, value: &str);

    /// Set an integer option
    fn set_int_option(&self, category: i32, key: &str, value: i64);

    /// Current playback position in milliseconds
    fn current_position(&self) -> i64;

    /// Media duration in milliseconds
    fn duration(&self) -> i64;

    /// Install the event callback
    fn set_event_listener(&self, listener: EngineEventListener);

    /// Install the frame callback
    fn set_frame_listener(&self, listener: FrameListener);

    /// Release all native resources; must be called at most once
    fn shutdown(&self);
}

/// Creates one engine per player instance
pub trait EngineFactory: Send + Sync {
    fn create(&self) -> Result<Arc<dyn NativePlayer>>;
}

impl<F> EngineFactory for F
where
    F: Fn() -> Result<Arc<dyn NativePlayer>> + Send + Sync,
{
    fn create(&self) -> Result<Arc<dyn NativePlayer>> {
        self()
    }
}
