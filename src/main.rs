use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{debug, error, info, warn};
use player_bridge::bridge::{method, plugin_method, BridgeContext, PlayerRegistry};
use player_bridge::engine::{LoopbackEngine, NativePlayer};
use player_bridge::host::{EventSink, HeadlessTextureRegistry, LocalMessenger};
use player_bridge::utils::{format_position, Config};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// player-bridge - drive a player over host channels
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Media URL handed to the player
    #[arg(short, long, default_value = "loopback://test-pattern")]
    url: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Loop count passed to the engine, 0 loops forever
    #[arg(long, value_name = "COUNT", default_value = "1")]
    loop_count: i32,

    /// How long to play before pausing, in milliseconds
    #[arg(long, value_name = "MS", default_value = "500")]
    play_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Loading config from {}", path.display()))?,
        None => Config::load().context("Loading config")?,
    };

    let log_level = if args.debug {
        "debug".to_string()
    } else {
        config.general.log_level.clone()
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    info!("Starting player-bridge v{}", env!("CARGO_PKG_VERSION"));

    let plugin = config.channels.plugin.clone();
    let context = BridgeContext::new(config);
    let messenger = Arc::new(LocalMessenger::new());
    let textures = Arc::new(HeadlessTextureRegistry::new());
    let factory = || -> player_bridge::Result<Arc<dyn NativePlayer>> {
        let (engine, _probe) = LoopbackEngine::auto((320, 240), 10_000)?;
        Ok(Arc::new(engine))
    };
    let registry = PlayerRegistry::new(
        Arc::clone(&context),
        messenger.clone(),
        textures.clone(),
        Box::new(factory),
    );
    registry.attach();

    let id = messenger
        .invoke(&plugin, plugin_method::CREATE_PLAYER, Value::Null)?
        .as_i64()
        .context("createPlayer returned no id")?;
    let channels = &context.config().channels;
    let commands = channels.method_channel(id);
    messenger.listen(&channels.event_channel(id), Value::Null, Arc::new(LoggingSink))?;

    let call = |name: &str, args: Value| -> Result<Value> {
        debug!("-> {} {}", name, args);
        messenger
            .invoke(&commands, name, args)
            .with_context(|| format!("Command {} failed", name))
    };

    let texture = call(method::SETUP_SURFACE, Value::Null)?
        .as_i64()
        .context("setupSurface returned no texture id")?;
    info!("Rendering into texture {}", texture);

    call(method::SET_DATE_SOURCE, json!({ "url": args.url }))?;
    call(method::SET_LOOP, json!({ "loop": args.loop_count }))?;
    call(method::PREPARE_ASYNC, Value::Null)?;
    call(method::START, Value::Null)?;

    tokio::time::sleep(Duration::from_millis(args.play_ms)).await;

    let position = call(method::GET_CURRENT_POSITION, Value::Null)?
        .as_i64()
        .unwrap_or(-1);
    info!("Position: {}", format_position(position));

    match textures.pull(texture, 320, 240) {
        Some(frame) => info!("Compositor pulled a {}x{} frame", frame.width, frame.height),
        None => warn!("No frame produced yet"),
    }

    call(method::PAUSE, Value::Null)?;
    call(method::SEEK_TO, json!({ "msec": 0 }))?;

    // let the callback thread drain before teardown
    tokio::time::sleep(Duration::from_millis(50)).await;

    if let Some(player) = registry.player(id) {
        let stats = player.frame_stats();
        info!(
            "Frames: {} produced, {} pulled, {} overwritten",
            stats.frames_produced, stats.frames_pulled, stats.frames_overwritten
        );
    }
    info!(
        "Counters: {} playable, {} playing",
        context.counters().playable(),
        context.counters().playing()
    );

    messenger.invoke(&plugin, plugin_method::RELEASE_PLAYER, json!({ "pid": id }))?;
    registry.detach();

    info!("Session finished");
    Ok(())
}

/// Event sink that logs everything it receives
struct LoggingSink;

impl EventSink for LoggingSink {
    fn success(&self, event: Value) {
        info!("<- {}", event);
    }

    fn error(&self, code: &str, message: &str, details: Value) {
        error!("<- error {}: {} ({})", code, message, details);
    }
}
