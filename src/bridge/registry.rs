//! Instance registry and the plugin channel
//!
//! The registry is the only owner of live players. It creates them through an
//! injected [`EngineFactory`], binds their channels on the injected
//! messenger and tears them down on request.

use super::command::num_i64;
use super::context::BridgeContext;
use super::player::{BridgePlayer, PlayerId};
use crate::engine::EngineFactory;
use crate::host::{BinaryMessenger, MethodHandler, TextureRegistry};
use crate::utils::error::{BridgeError, Result};
use log::{debug, info, warn};
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Plugin channel method names
pub mod method {
    pub const CREATE_PLAYER: &str = "createPlayer";
    pub const RELEASE_PLAYER: &str = "releasePlayer";
}

/// Registry of live players keyed by id
pub struct PlayerRegistry {
    context: Arc<BridgeContext>,
    messenger: Arc<dyn BinaryMessenger>,
    textures: Arc<dyn TextureRegistry>,
    factory: Box<dyn EngineFactory>,
    players: RwLock<HashMap<PlayerId, Arc<BridgePlayer>>>,
}

impl PlayerRegistry {
    pub fn new(
        context: Arc<BridgeContext>,
        messenger: Arc<dyn BinaryMessenger>,
        textures: Arc<dyn TextureRegistry>,
        factory: Box<dyn EngineFactory>,
    ) -> Arc<Self> {
        Arc::new(Self {
            context,
            messenger,
            textures,
            factory,
            players: RwLock::new(HashMap::new()),
        })
    }

    /// Serve the plugin channel on the messenger
    pub fn attach(self: &Arc<Self>) {
        let plugin = &self.context.config().channels.plugin;
        let handler: Arc<dyn MethodHandler> = Arc::new(PluginChannel {
            registry: Arc::downgrade(self),
        });
        self.messenger.set_method_handler(plugin, Some(handler));
        info!("Plugin channel {} attached", plugin);
    }

    /// Stop serving the plugin channel
    pub fn detach(&self) {
        self.messenger
            .set_method_handler(&self.context.config().channels.plugin, None);
    }

    /// Create a player and bind its channels
    pub fn create_player(&self) -> Result<Arc<BridgePlayer>> {
        let engine = self.factory.create()?;
        let player = BridgePlayer::new(
            Arc::clone(&self.context),
            engine,
            Arc::clone(&self.textures),
        );
        player.attach_channels(Arc::clone(&self.messenger));

        self.players.write().insert(player.id(), Arc::clone(&player));
        debug!("{} players live", self.len());
        Ok(player)
    }

    /// Remove and release a player
    ///
    /// Releasing an unknown id logs and succeeds.
    pub fn release_player(&self, id: PlayerId) -> bool {
        // take it out first so release runs without the table lock
        let player = self.players.write().remove(&id);
        match player {
            Some(player) => player.release(),
            None => {
                warn!("Release of unknown player {}", id);
                false
            }
        }
    }

    pub fn player(&self, id: PlayerId) -> Option<Arc<BridgePlayer>> {
        self.players.read().get(&id).cloned()
    }

    /// Release every live player
    pub fn release_all(&self) {
        let players: Vec<_> = self.players.write().drain().map(|(_, p)| p).collect();
        if !players.is_empty() {
            info!("Releasing {} players", players.len());
        }
        for player in players {
            player.release();
        }
    }

    pub fn len(&self) -> usize {
        self.players.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for PlayerRegistry {
    fn drop(&mut self) {
        self.release_all();
    }
}

struct PluginChannel {
    registry: Weak<PlayerRegistry>,
}

impl MethodHandler for PluginChannel {
    fn handle_method(&self, method: &str, args: &Value) -> Result<Value> {
        let registry = self
            .registry
            .upgrade()
            .ok_or_else(|| BridgeError::Channel("player registry is gone".to_string()))?;

        match method {
            method::CREATE_PLAYER => Ok(json!(registry.create_player()?.id())),
            method::RELEASE_PLAYER => {
                match args.get("pid").and_then(num_i64) {
                    Some(id) => {
                        registry.release_player(id);
                    }
                    None => debug!("releasePlayer without a pid"),
                }
                Ok(Value::Null)
            }
            other => Err(BridgeError::MethodNotImplemented(other.to_string())),
        }
    }
}
