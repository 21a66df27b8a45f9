//! Events pushed to the host

use super::state::PlaybackState;
use crate::engine::{event_code, EngineEvent};
use log::warn;
use serde::Serialize;
use serde_json::Value;

/// Which renderer produced its first output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderKind {
    Video,
    Audio,
}

/// Event sent down a player's event channel as `{event: name, ...fields}`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlayerEvent {
    /// Preparation finished; duration in milliseconds
    Prepared { duration: i64 },

    StateChange {
        new: PlaybackState,
        old: PlaybackState,
    },

    RenderingStart {
        #[serde(rename = "type")]
        kind: RenderKind,
    },

    /// Buffering started (`true`) or ended (`false`)
    Freeze { value: bool },

    Buffering { head: i32, percent: i32 },

    SizeChanged { width: i32, height: i32 },
}

impl PlayerEvent {
    /// Map an engine callback that needs no engine queries
    ///
    /// Prepared, state changes and errors carry bridge-side work and are
    /// handled by the player; everything else unknown maps to `None`.
    pub fn from_engine(event: &EngineEvent) -> Option<Self> {
        match event.what {
            event_code::VIDEO_RENDERING_START => Some(PlayerEvent::RenderingStart {
                kind: RenderKind::Video,
            }),
            event_code::AUDIO_RENDERING_START => Some(PlayerEvent::RenderingStart {
                kind: RenderKind::Audio,
            }),
            event_code::BUFFERING_START => Some(PlayerEvent::Freeze { value: true }),
            event_code::BUFFERING_END => Some(PlayerEvent::Freeze { value: false }),
            event_code::BUFFERING_UPDATE => Some(PlayerEvent::Buffering {
                head: event.arg1,
                percent: event.arg2,
            }),
            event_code::VIDEO_SIZE_CHANGED => Some(PlayerEvent::SizeChanged {
                width: event.arg1,
                height: event.arg2,
            }),
            _ => None,
        }
    }

    /// Wire form of this event
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            warn!("Failed to encode {:?}: {}", self, e);
            Value::Null
        })
    }
}
