//! Command decoding for the per-player method channel
//!
//! Host arguments arrive as loosely typed maps. Each command is decoded here
//! once, at the channel boundary, into typed fields. Decoding is permissive
//! by default: a number may arrive as an integer, a float or a numeric
//! string and is coerced; a missing or malformed field decodes to `None`,
//! which the handler treats as "nothing to do" rather than as an error.

use crate::engine::{OptionValue, PlayerOption};
use crate::utils::error::{BridgeError, Result};
use serde_json::Value;

/// Method names accepted on a player's command channel
pub mod method {
    pub const SETUP_SURFACE: &str = "setupSurface";
    pub const SET_OPTION: &str = "setOption";
    pub const APPLY_OPTIONS: &str = "applyOptions";
    /// Spelled the way host code sends it
    pub const SET_DATE_SOURCE: &str = "setDateSource";
    pub const SET_DATA_SOURCE: &str = "setDataSource";
    pub const PREPARE_ASYNC: &str = "prepareAsync";
    pub const START: &str = "start";
    pub const PAUSE: &str = "pause";
    pub const STOP: &str = "stop";
    pub const RESET: &str = "reset";
    pub const GET_CURRENT_POSITION: &str = "getCurrentPosition";
    pub const SET_VOLUME: &str = "setVolume";
    pub const SEEK_TO: &str = "seekTo";
    pub const SET_LOOP: &str = "setLoop";
    pub const SET_SPEED: &str = "setSpeed";
}

/// A decoded player command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetupSurface,
    /// `None` when category, key or value is missing or malformed
    SetOption(Option<PlayerOption>),
    /// Every well-formed entry; malformed ones are already dropped
    ApplyOptions(Vec<PlayerOption>),
    SetDataSource { url: Option<String> },
    PrepareAsync,
    Start,
    Pause,
    Stop,
    Reset,
    GetCurrentPosition,
    SetVolume { volume: Option<f32> },
    SeekTo { msec: Option<i64> },
    SetLoop { count: Option<i32> },
    SetSpeed { speed: Option<f32> },
}

impl Command {
    /// Decode a method call
    ///
    /// Only an unknown method name is an error.
    pub fn decode(name: &str, args: &Value) -> Result<Self> {
        let command = match name {
            method::SETUP_SURFACE => Command::SetupSurface,
            method::SET_OPTION => Command::SetOption(decode_option(args)),
            method::APPLY_OPTIONS => Command::ApplyOptions(decode_option_map(args)),
            method::SET_DATE_SOURCE | method::SET_DATA_SOURCE => Command::SetDataSource {
                url: args.get("url").and_then(Value::as_str).map(str::to_string),
            },
            method::PREPARE_ASYNC => Command::PrepareAsync,
            method::START => Command::Start,
            method::PAUSE => Command::Pause,
            method::STOP => Command::Stop,
            method::RESET => Command::Reset,
            method::GET_CURRENT_POSITION => Command::GetCurrentPosition,
            method::SET_VOLUME => Command::SetVolume {
                volume: args.get("volume").and_then(num_f64).map(|v| v as f32),
            },
            method::SEEK_TO => Command::SeekTo {
                msec: args.get("msec").and_then(num_i64),
            },
            method::SET_LOOP => Command::SetLoop {
                count: args.get("loop").and_then(num_i32),
            },
            method::SET_SPEED => Command::SetSpeed {
                speed: args.get("speed").and_then(num_f64).map(|v| v as f32),
            },
            other => return Err(BridgeError::MethodNotImplemented(other.to_string())),
        };
        Ok(command)
    }
}

/// `{cat, key, long | str}`; `long` wins when both are present
fn decode_option(args: &Value) -> Option<PlayerOption> {
    let category = args.get("cat").and_then(num_i32).filter(|c| *c >= 0)?;
    let key = args
        .get("key")
        .and_then(Value::as_str)
        .filter(|k| !k.is_empty())?;

    let value = match args.get("long").and_then(num_i64) {
        Some(value) => OptionValue::Int(value),
        None => OptionValue::Str(args.get("str").and_then(Value::as_str)?.to_string()),
    };

    Some(PlayerOption {
        category,
        key: key.to_string(),
        value,
    })
}

/// `{<category>: {<key>: <int | string>}}`
fn decode_option_map(args: &Value) -> Vec<PlayerOption> {
    let Some(categories) = args.as_object() else {
        return Vec::new();
    };

    let mut options = Vec::new();
    for (category, entries) in categories {
        let Some(category) = category.trim().parse::<i32>().ok().filter(|c| *c >= 0) else {
            continue;
        };
        let Some(entries) = entries.as_object() else {
            continue;
        };

        for (key, value) in entries {
            // integers only: a float value is malformed here, not coerced
            let value = match value {
                Value::Number(n) => n.as_i64().map(OptionValue::Int),
                Value::String(s) => Some(OptionValue::Str(s.clone())),
                _ => None,
            };
            if let Some(value) = value.filter(|_| !key.is_empty()) {
                options.push(PlayerOption {
                    category,
                    key: key.clone(),
                    value,
                });
            }
        }
    }
    options
}

/// Coerce any numeric representation to i64, truncating fractions
pub(crate) fn num_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        }
        _ => None,
    }
}

fn num_i32(value: &Value) -> Option<i32> {
    num_i64(value).and_then(|v| i32::try_from(v).ok())
}

/// Coerce any numeric representation to f64
fn num_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|f| f.is_finite())
}
