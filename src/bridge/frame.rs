//! Latest-frame handoff between the engine and the compositor
//!
//! The engine's render thread stores frames, the compositor pulls them on
//! its own schedule. There is one slot and no queue: a store overwrites
//! whatever the compositor has not pulled yet, so a fast producer loses
//! intermediate frames instead of building up latency. Neither side ever
//! waits for the other; the slot is an atomic pointer swap.

use crate::engine::PixelBuffer;
use crate::host::PixelProvider;
use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Frame handoff statistics for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames stored by the producer
    pub frames_produced: u64,

    /// Pulls that returned a frame
    pub frames_pulled: u64,

    /// Frames overwritten before any pull saw them
    pub frames_overwritten: u64,
}

/// Single-slot, latest-wins frame buffer
#[derive(Default)]
pub struct FrameSlot {
    latest: ArcSwapOption<PixelBuffer>,
    unread: AtomicBool,
    produced: AtomicU64,
    pulled: AtomicU64,
    overwritten: AtomicU64,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame
    pub fn store(&self, frame: Arc<PixelBuffer>) {
        let previous = self.latest.swap(Some(frame));
        self.produced.fetch_add(1, Ordering::Relaxed);
        if self.unread.swap(true, Ordering::AcqRel) && previous.is_some() {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Current frame, `None` if nothing has been produced yet
    pub fn latest(&self) -> Option<Arc<PixelBuffer>> {
        let frame = self.latest.load_full();
        if frame.is_some() {
            self.unread.store(false, Ordering::Release);
            self.pulled.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }

    /// Drop the current frame; pulls report "not ready" again
    pub fn clear(&self) {
        self.latest.store(None);
        self.unread.store(false, Ordering::Release);
    }

    /// Get handoff statistics
    pub fn stats(&self) -> FrameStats {
        FrameStats {
            frames_produced: self.produced.load(Ordering::Relaxed),
            frames_pulled: self.pulled.load(Ordering::Relaxed),
            frames_overwritten: self.overwritten.load(Ordering::Relaxed),
        }
    }
}

impl PixelProvider for FrameSlot {
    fn pixels(&self, _width: u32, _height: u32) -> Option<Arc<PixelBuffer>> {
        // the compositor scales; the requested size does not select a frame
        self.latest()
    }
}
