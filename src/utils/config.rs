//! Configuration management for player-bridge
//!
//! This module handles loading and managing bridge configuration
//! from config files and environment variables.

use crate::engine::{OptionCategory, OptionValue, PlayerOption};
use crate::utils::error::{BridgeError, IntoBridgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main bridge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Channel naming
    pub channels: ChannelConfig,

    /// Defaults applied to every new player
    pub player: PlayerDefaults,

    /// General settings
    pub general: GeneralConfig,
}

/// Channel naming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Plugin-level channel serving createPlayer/releasePlayer
    pub plugin: String,

    /// Prefix of the per-player command channel
    pub method_prefix: String,

    /// Prefix of the per-player event channel
    pub event_prefix: String,
}

/// Per-player defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerDefaults {
    /// Engine options applied right after an engine is created
    pub default_options: Vec<PlayerOption>,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            plugin: "player_bridge".to_string(),
            method_prefix: "player_bridge/player".to_string(),
            event_prefix: "player_bridge/event".to_string(),
        }
    }
}

impl ChannelConfig {
    /// Name of the command channel for a player
    pub fn method_channel(&self, id: i64) -> String {
        format!("{}/{}", self.method_prefix, id)
    }

    /// Name of the event channel for a player
    pub fn event_channel(&self, id: i64) -> String {
        format!("{}/{}", self.event_prefix, id)
    }
}

impl Default for PlayerDefaults {
    fn default() -> Self {
        Self {
            // the frame callback hands RGBA buffers straight to the compositor
            default_options: vec![PlayerOption {
                category: OptionCategory::Player as i32,
                key: "overlay-format".to_string(),
                value: OptionValue::Str("fcc-rgba".to_string()),
            }],
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration
    ///
    /// Later sources override earlier ones:
    /// 1. Default values
    /// 2. User config file (~/.config/player-bridge/config.toml on Linux)
    /// 3. Environment variables (PLAYER_BRIDGE_* prefix)
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(user_path) = Self::user_config_path() {
            if user_path.exists() {
                config = Self::read_file(&user_path)?;
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from an explicit file, then apply environment overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::read_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .config_err(&format!("Failed to read config file {}", path.display()))?;

        toml::from_str(&contents).config_err("Failed to parse config file")
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(log_level) = std::env::var("PLAYER_BRIDGE_LOG_LEVEL") {
            self.general.log_level = log_level;
        }

        if let Ok(prefix) = std::env::var("PLAYER_BRIDGE_METHOD_PREFIX") {
            self.channels.method_prefix = prefix;
        }

        if let Ok(prefix) = std::env::var("PLAYER_BRIDGE_EVENT_PREFIX") {
            self.channels.event_prefix = prefix;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let channels = &self.channels;
        if channels.plugin.is_empty()
            || channels.method_prefix.is_empty()
            || channels.event_prefix.is_empty()
        {
            return Err(BridgeError::Config("Channel names must be non-empty".to_string()));
        }

        // both channels of one player would resolve to the same name
        if channels.method_prefix == channels.event_prefix {
            return Err(BridgeError::Config(
                "Method and event channel prefixes must differ".to_string(),
            ));
        }

        for option in &self.player.default_options {
            if option.category < 0 || option.key.is_empty() {
                return Err(BridgeError::Config(format!(
                    "Invalid default option {:?}",
                    option
                )));
            }
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.general.log_level.as_str()) {
            return Err(BridgeError::Config(format!(
                "Invalid log level '{}', must be one of: {:?}",
                self.general.log_level, valid_log_levels
            )));
        }

        Ok(())
    }

    /// Get user config file path
    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("player-bridge").join("config.toml"))
    }
}
