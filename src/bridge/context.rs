//! Process-wide state shared by every player

use super::state::PlaybackCounters;
use crate::utils::config::Config;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Explicitly owned process context
///
/// Created once by whoever hosts the bridge and handed to every player by
/// reference: it carries the configuration, the id allocator and the
/// aggregate playback counters.
#[derive(Debug)]
pub struct BridgeContext {
    config: Config,
    next_id: AtomicI64,
    counters: PlaybackCounters,
}

impl BridgeContext {
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(Self {
            config,
            next_id: AtomicI64::new(1),
            counters: PlaybackCounters::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn counters(&self) -> &PlaybackCounters {
        &self.counters
    }

    /// Next player id; ids increase monotonically and are never reused
    pub fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::AcqRel)
    }
}
