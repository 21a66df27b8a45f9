//! Playback state bookkeeping for player-bridge
//!
//! The state machine records whatever transition it is asked for; the engine
//! is trusted not to request impossible moves. Its job is tracking the
//! current state and keeping the process-wide playable/playing counters in
//! step with it.

use log::{debug, info};
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Playback state of one player, with its wire code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum PlaybackState {
    #[default]
    Idle = 0,
    Initialized = 1,
    Preparing = 2,
    Prepared = 3,
    Started = 4,
    Paused = 5,
    Completed = 6,
    Stopped = 7,
    Errored = 8,
    /// Terminal, only reached through release
    Released = 9,
}

impl PlaybackState {
    pub const ALL: [PlaybackState; 10] = [
        PlaybackState::Idle,
        PlaybackState::Initialized,
        PlaybackState::Preparing,
        PlaybackState::Prepared,
        PlaybackState::Started,
        PlaybackState::Paused,
        PlaybackState::Completed,
        PlaybackState::Stopped,
        PlaybackState::Errored,
        PlaybackState::Released,
    ];

    /// Wire code of this state
    pub fn code(self) -> i32 {
        self as i32
    }

    /// State for a wire code, `None` for unknown codes
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.code() == code)
    }

    /// Whether playback can proceed from here without preparing again
    pub fn is_playable(self) -> bool {
        matches!(
            self,
            PlaybackState::Prepared
                | PlaybackState::Started
                | PlaybackState::Paused
                | PlaybackState::Completed
        )
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Initialized => "initialized",
            PlaybackState::Preparing => "preparing",
            PlaybackState::Prepared => "prepared",
            PlaybackState::Started => "started",
            PlaybackState::Paused => "paused",
            PlaybackState::Completed => "completed",
            PlaybackState::Stopped => "stopped",
            PlaybackState::Errored => "errored",
            PlaybackState::Released => "released",
        };
        f.write_str(name)
    }
}

impl Serialize for PlaybackState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.code())
    }
}

/// Process-wide count of playable and playing players
///
/// Shared by every player in the process; each player adjusts it from its
/// own transitions.
#[derive(Debug, Default)]
pub struct PlaybackCounters {
    playable: AtomicI64,
    playing: AtomicI64,
}

impl PlaybackCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Players currently in a playable state
    pub fn playable(&self) -> i64 {
        self.playable.load(Ordering::Acquire)
    }

    /// Players currently started
    pub fn playing(&self) -> i64 {
        self.playing.load(Ordering::Acquire)
    }

    fn on_playable_change(&self, delta: i64) {
        let total = self.playable.fetch_add(delta, Ordering::AcqRel) + delta;
        debug!("Playable players: {} ({:+})", total, delta);
    }

    fn on_playing_change(&self, delta: i64) {
        let total = self.playing.fetch_add(delta, Ordering::AcqRel) + delta;
        debug!("Playing players: {} ({:+})", total, delta);
    }
}

/// One recorded transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub new: PlaybackState,
    pub old: PlaybackState,
}

/// Authoritative state of one player
#[derive(Debug, Default)]
pub struct StateMachine {
    state: PlaybackState,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Record a transition and update the shared counters
    pub fn transition(&mut self, new: PlaybackState, counters: &PlaybackCounters) -> Transition {
        let old = std::mem::replace(&mut self.state, new);

        let was_started = old == PlaybackState::Started;
        let is_started = new == PlaybackState::Started;
        if is_started != was_started {
            counters.on_playing_change(if is_started { 1 } else { -1 });
        }

        if new.is_playable() != old.is_playable() {
            counters.on_playable_change(if new.is_playable() { 1 } else { -1 });
        }

        if new != old {
            info!("Playback state changed: {} -> {}", old, new);
        }

        Transition { new, old }
    }
}
