//! Lifetime guard around a native engine

use super::NativePlayer;
use log::{debug, trace};
use parking_lot::RwLock;
use std::sync::Arc;

/// Shared handle to one engine that is emptied on shutdown
///
/// Calls made after shutdown are skipped instead of reaching a dead engine.
/// Engine callbacks may call back into the handle (for example to read the
/// duration while handling a prepared event) from inside an engine call, so
/// readers take the lock recursively.
pub struct EngineHandle {
    inner: RwLock<Option<Arc<dyn NativePlayer>>>,
}

impl EngineHandle {
    pub fn new(engine: Arc<dyn NativePlayer>) -> Self {
        Self {
            inner: RwLock::new(Some(engine)),
        }
    }

    /// Run `f` against the engine, `None` once it has been shut down
    pub fn with<R>(&self, f: impl FnOnce(&dyn NativePlayer) -> R) -> Option<R> {
        let guard = self.inner.read_recursive();
        match guard.as_ref() {
            Some(engine) => Some(f(engine.as_ref())),
            None => {
                trace!("Engine call skipped after shutdown");
                None
            }
        }
    }

    /// Whether the engine is still alive
    pub fn is_alive(&self) -> bool {
        self.inner.read_recursive().is_some()
    }

    /// Shut the engine down; returns false if it already was
    pub fn shutdown(&self) -> bool {
        // take it out first so callbacks racing the shutdown see an empty handle
        let engine = self.inner.write().take();
        match engine {
            Some(engine) => {
                engine.shutdown();
                debug!("Engine shut down");
                true
            }
            None => false,
        }
    }
}
