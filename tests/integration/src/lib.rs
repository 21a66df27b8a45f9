//! Integration test utilities for player-bridge
//!
//! This module provides common utilities for integration testing including:
//! - A fixture wiring a registry to the in-process messenger and compositor
//! - Access to the loopback engine behind each created player
//! - Config file generation

use anyhow::{Context, Result};
use parking_lot::Mutex;
use player_bridge::bridge::{plugin_method, BridgeContext, PlayerRegistry};
use player_bridge::engine::{LoopbackEngine, LoopbackProbe, NativePlayer};
use player_bridge::host::{HeadlessTextureRegistry, LocalMessenger, RecordingSink};
use player_bridge::Config;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

thread_local! {
    /// Probe of the engine most recently built on this thread
    static CREATED_PROBE: RefCell<Option<LoopbackProbe>> = const { RefCell::new(None) };
}

/// Frame size produced by auto-responding engines
pub const FRAME_SIZE: (u32, u32) = (64, 36);

/// Media duration reported by auto-responding engines
pub const DURATION_MS: i64 = 10_000;

/// Test fixture for integration tests
pub struct TestFixture {
    pub temp_dir: TempDir,
    pub context: Arc<BridgeContext>,
    pub messenger: Arc<LocalMessenger>,
    pub textures: Arc<HeadlessTextureRegistry>,
    pub registry: Arc<PlayerRegistry>,
    probes: Mutex<HashMap<i64, LoopbackProbe>>,
}

impl TestFixture {
    /// Fixture whose engines only record calls
    pub fn new() -> Result<Self> {
        Self::build(Config::default(), false)
    }

    /// Fixture whose engines answer lifecycle calls from a callback thread
    pub fn auto() -> Result<Self> {
        Self::build(Config::default(), true)
    }

    /// Record-only fixture with a custom configuration
    pub fn with_config(config: Config) -> Result<Self> {
        Self::build(config, false)
    }

    fn build(config: Config, auto: bool) -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let context = BridgeContext::new(config);
        let messenger = Arc::new(LocalMessenger::new());
        let textures = Arc::new(HeadlessTextureRegistry::new());
        // creation runs on the calling thread, so the probe is handed back
        // through a thread local and keyed by id once the id is known
        let factory = move || -> player_bridge::Result<Arc<dyn NativePlayer>> {
            let (engine, probe) = if auto {
                LoopbackEngine::auto(FRAME_SIZE, DURATION_MS)?
            } else {
                LoopbackEngine::new()
            };
            CREATED_PROBE.with(|slot| *slot.borrow_mut() = Some(probe));
            Ok(Arc::new(engine))
        };

        let registry = PlayerRegistry::new(
            Arc::clone(&context),
            messenger.clone(),
            textures.clone(),
            Box::new(factory),
        );
        registry.attach();

        Ok(Self {
            temp_dir,
            context,
            messenger,
            textures,
            registry,
            probes: Mutex::new(HashMap::new()),
        })
    }

    /// Get the path to the temporary directory
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write a config file into the temporary directory
    pub fn write_config(&self, contents: &str) -> Result<PathBuf> {
        let path = self.path().join("config.toml");
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Create a player over the plugin channel and listen to its events
    pub fn create_player(&self) -> Result<(i64, Arc<RecordingSink>)> {
        let plugin = &self.context.config().channels.plugin;
        let id = self
            .messenger
            .invoke(plugin, plugin_method::CREATE_PLAYER, Value::Null)?
            .as_i64()
            .context("createPlayer returned no id")?;
        let probe = CREATED_PROBE
            .with(|slot| slot.borrow_mut().take())
            .context("createPlayer built no engine")?;
        self.probes.lock().insert(id, probe);

        let sink = RecordingSink::new();
        self.messenger.listen(
            &self.context.config().channels.event_channel(id),
            Value::Null,
            sink.clone(),
        )?;
        Ok((id, sink))
    }

    /// Release a player over the plugin channel
    pub fn release_player(&self, id: i64) -> Result<()> {
        let plugin = &self.context.config().channels.plugin;
        self.messenger
            .invoke(plugin, plugin_method::RELEASE_PLAYER, json!({ "pid": id }))?;
        Ok(())
    }

    /// Send a command on a player's method channel
    pub fn call(&self, id: i64, method: &str, args: Value) -> Result<Value> {
        let channel = self.context.config().channels.method_channel(id);
        Ok(self.messenger.invoke(&channel, method, args)?)
    }

    /// Engine probe of a player created through [`create_player`](Self::create_player)
    pub fn probe(&self, id: i64) -> LoopbackProbe {
        self.probes
            .lock()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| panic!("no engine recorded for player {}", id))
    }
}

/// Helpers for inspecting event streams
pub mod events {
    use serde_json::{json, Value};

    /// A state_change event as it appears on the wire
    pub fn state_change(new: i64, old: i64) -> Value {
        json!({ "event": "state_change", "new": new, "old": old })
    }

    /// Names of the events, in order
    pub fn names(events: &[Value]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| e["event"].as_str().map(str::to_string))
            .collect()
    }
}
