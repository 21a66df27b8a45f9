//! One bridged player instance
//!
//! A `BridgePlayer` pairs a command channel, an event channel and a native
//! engine. Commands run on the host's threads, engine callbacks on the
//! engine's; both funnel state changes and event publication through the
//! same per-player lock so the host sees one consistent order.

use super::command::Command;
use super::context::BridgeContext;
use super::event::PlayerEvent;
use super::frame::{FrameSlot, FrameStats};
use super::sink::EventQueue;
use super::state::{PlaybackState, StateMachine, Transition};
use crate::engine::{event_code, EngineEvent, EngineHandle, NativePlayer, PixelBuffer};
use crate::host::{
    BinaryMessenger, EventSink, MethodHandler, PixelProvider, StreamHandler, TextureId,
    TextureRegistry,
};
use crate::utils::error::{BridgeError, Result};
use crate::utils::format_position;
use log::{debug, info, trace, warn};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Player identifier, also the suffix of its channel names
pub type PlayerId = i64;

const NO_TEXTURE: TextureId = -1;

/// Everything that must change under one lock
struct PlayerCore {
    machine: StateMachine,
    events: EventQueue,
    /// Set once the final released event is out; nothing is published after
    closed: bool,
}

impl PlayerCore {
    fn publish(&mut self, event: PlayerEvent) {
        if self.closed {
            trace!("Dropping {:?} after release", event);
            return;
        }
        self.events.publish(event.to_value());
    }

    fn transition(&mut self, new: PlaybackState, context: &BridgeContext) {
        if self.closed {
            trace!("Ignoring transition to {} after release", new);
            return;
        }
        let Transition { new, old } = self.machine.transition(new, context.counters());
        self.events
            .publish(PlayerEvent::StateChange { new, old }.to_value());
    }
}

struct ChannelBinding {
    messenger: Arc<dyn BinaryMessenger>,
    method_channel: String,
    event_channel: String,
}

/// A player instance bridged to the host
pub struct BridgePlayer {
    id: PlayerId,
    context: Arc<BridgeContext>,
    engine: EngineHandle,
    core: Mutex<PlayerCore>,
    frames: Arc<FrameSlot>,
    textures: Arc<dyn TextureRegistry>,
    /// Serializes setup and teardown of the render target
    surface: Mutex<Option<TextureId>>,
    /// Copy of the registered texture id for the frame path, `NO_TEXTURE` if none
    texture_id: AtomicI64,
    binding: Mutex<Option<ChannelBinding>>,
}

impl BridgePlayer {
    /// Create a player around a freshly created engine
    ///
    /// Applies the configured default options and installs the engine's
    /// event and frame listeners. The player is not reachable from the host
    /// until [`attach_channels`](Self::attach_channels) is called.
    pub fn new(
        context: Arc<BridgeContext>,
        engine: Arc<dyn NativePlayer>,
        textures: Arc<dyn TextureRegistry>,
    ) -> Arc<Self> {
        let id = context.allocate_id();

        for option in &context.config().player.default_options {
            option.apply(engine.as_ref());
        }

        let player = Arc::new(Self {
            id,
            context,
            engine: EngineHandle::new(Arc::clone(&engine)),
            core: Mutex::new(PlayerCore {
                machine: StateMachine::new(),
                events: EventQueue::new(),
                closed: false,
            }),
            frames: Arc::new(FrameSlot::new()),
            textures,
            surface: Mutex::new(None),
            texture_id: AtomicI64::new(NO_TEXTURE),
            binding: Mutex::new(None),
        });

        // listeners hold weak references: the engine is owned by the player
        let weak = Arc::downgrade(&player);
        engine.set_event_listener(Arc::new(move |event: EngineEvent| {
            if let Some(player) = weak.upgrade() {
                player.on_engine_event(event);
            }
        }));
        let weak = Arc::downgrade(&player);
        engine.set_frame_listener(Arc::new(move |frame: Arc<PixelBuffer>| {
            if let Some(player) = weak.upgrade() {
                player.on_frame(frame);
            }
        }));

        info!("Player {} created", id);
        player
    }

    /// Register this player's command and event channels with the host
    pub fn attach_channels(self: &Arc<Self>, messenger: Arc<dyn BinaryMessenger>) {
        if self.is_released() {
            warn!("Player {} is released, not attaching channels", self.id);
            return;
        }

        let channels = &self.context.config().channels;
        let binding = ChannelBinding {
            method_channel: channels.method_channel(self.id),
            event_channel: channels.event_channel(self.id),
            messenger,
        };

        let method_handler: Arc<dyn MethodHandler> = Arc::clone(self) as Arc<dyn MethodHandler>;
        let stream_handler: Arc<dyn StreamHandler> = Arc::clone(self) as Arc<dyn StreamHandler>;
        binding
            .messenger
            .set_method_handler(&binding.method_channel, Some(method_handler));
        binding
            .messenger
            .set_stream_handler(&binding.event_channel, Some(stream_handler));
        debug!(
            "Player {} bound to {} and {}",
            self.id, binding.method_channel, binding.event_channel
        );

        *self.binding.lock() = Some(binding);
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    /// Current playback state
    pub fn state(&self) -> PlaybackState {
        self.core.lock().machine.state()
    }

    pub fn is_released(&self) -> bool {
        self.core.lock().closed
    }

    /// Texture registered by setupSurface, if any
    pub fn texture_id(&self) -> Option<TextureId> {
        *self.surface.lock()
    }

    /// Frame handoff statistics
    pub fn frame_stats(&self) -> FrameStats {
        self.frames.stats()
    }

    /// Decode and run one host command
    pub fn handle_command(&self, name: &str, args: &Value) -> Result<Value> {
        let command = Command::decode(name, args)?;
        self.execute(command)
    }

    /// Run a decoded command
    ///
    /// Engine failures are logged and never turn into a failed reply; the
    /// host hears about them through the event channel.
    pub fn execute(&self, command: Command) -> Result<Value> {
        debug!("Player {} <- {:?}", self.id, command);

        match command {
            Command::SetupSurface => return self.setup_surface().map(Value::from),
            Command::SetOption(option) => {
                if let Some(option) = option {
                    self.engine.with(|engine| option.apply(engine));
                }
            }
            Command::ApplyOptions(options) => {
                self.engine.with(|engine| {
                    for option in &options {
                        option.apply(engine);
                    }
                });
            }
            Command::SetDataSource { url } => {
                // reported regardless of what the engine made of the source
                self.call_and_transition(PlaybackState::Initialized, |engine| match url {
                    Some(url) => engine.set_data_source(&url),
                    None => Ok(()),
                });
            }
            Command::PrepareAsync => {
                self.call_and_transition(PlaybackState::Preparing, |engine| engine.prepare_async())
            }
            Command::Start => self.engine_call("start", |engine| engine.start()),
            Command::Pause => self.engine_call("pause", |engine| engine.pause()),
            Command::Stop => self.call_and_transition(PlaybackState::Stopped, |engine| engine.stop()),
            Command::Reset => self.call_and_transition(PlaybackState::Idle, |engine| engine.reset()),
            Command::GetCurrentPosition => {
                let position = self
                    .engine
                    .with(|engine| engine.current_position())
                    .unwrap_or(0);
                trace!("Player {} position {}", self.id, format_position(position));
                return Ok(json!(position));
            }
            Command::SetVolume { volume } => {
                if let Some(volume) = volume {
                    self.engine.with(|engine| engine.set_volume(volume, volume));
                }
            }
            Command::SeekTo { msec } => {
                if let Some(msec) = msec {
                    self.seek_to(msec);
                }
            }
            Command::SetLoop { count } => {
                if let Some(count) = count {
                    self.engine.with(|engine| engine.set_loop(count));
                }
            }
            Command::SetSpeed { speed } => {
                if let Some(speed) = speed {
                    self.engine.with(|engine| engine.set_speed(speed));
                }
            }
        }

        Ok(Value::Null)
    }

    fn engine_call(&self, what: &str, call: impl FnOnce(&dyn NativePlayer) -> Result<()>) {
        if let Some(Err(e)) = self.engine.with(call) {
            warn!("Player {} {} failed: {}", self.id, what, e);
        }
    }

    fn change_state(&self, new: PlaybackState) {
        self.core.lock().transition(new, &self.context);
    }

    /// Engine call followed by a forced transition, as one step
    ///
    /// The core lock is held across the call so engine callbacks raised by
    /// it land after the forced state, never before.
    fn call_and_transition(
        &self,
        new: PlaybackState,
        call: impl FnOnce(&dyn NativePlayer) -> Result<()>,
    ) {
        let mut core = self.core.lock();
        if let Some(Err(e)) = self.engine.with(call) {
            warn!("Player {} engine call before {} failed: {}", self.id, new, e);
        }
        core.transition(new, &self.context);
    }

    fn seek_to(&self, msec: i64) {
        // held across the seek so no callback lands between paused and the seek
        let mut core = self.core.lock();
        if core.machine.state() == PlaybackState::Completed {
            // leave completed first, or the host keeps showing the end screen
            core.transition(PlaybackState::Paused, &self.context);
        }
        self.engine_call("seek_to", |engine| engine.seek_to(msec));
    }

    fn setup_surface(&self) -> Result<TextureId> {
        let mut surface = self.surface.lock();
        if let Some(id) = *surface {
            debug!("Player {} surface already set up, texture {}", self.id, id);
            return Ok(id);
        }
        if self.is_released() {
            return Err(BridgeError::NotFound(format!("player {} is released", self.id)));
        }

        let provider: Arc<dyn PixelProvider> = Arc::clone(&self.frames) as Arc<dyn PixelProvider>;
        let id = self.textures.register_texture(provider).map_err(|e| {
            warn!("Player {} texture registration failed: {}", self.id, e);
            e
        })?;

        *surface = Some(id);
        self.texture_id.store(id, Ordering::Release);
        info!("Player {} surface set up, texture {}", self.id, id);

        // a frame may have arrived before the surface existed
        if self.frames.stats().frames_produced > 0 {
            self.notify_frame(id);
        }

        Ok(id)
    }

    /// Engine event callback, runs on the engine's thread
    pub fn on_engine_event(&self, event: EngineEvent) {
        trace!("Player {} engine event {:?}", self.id, event);

        match event.what {
            event_code::PREPARED => {
                // query the engine before taking the lock
                let duration = self.engine.with(|engine| engine.duration()).unwrap_or(0);
                self.core.lock().publish(PlayerEvent::Prepared { duration });
            }
            event_code::PLAYBACK_STATE_CHANGED => match PlaybackState::from_code(event.arg1) {
                Some(PlaybackState::Released) => {
                    warn!("Player {} engine reported released, ignoring", self.id);
                }
                Some(state) => self.change_state(state),
                None => warn!("Player {} unknown engine state {}", self.id, event.arg1),
            },
            event_code::ERROR => {
                let mut core = self.core.lock();
                if core.closed {
                    return;
                }
                let state = core.machine.state();
                let message = event.extra.as_deref().unwrap_or("");
                warn!(
                    "Player {} engine error {} in state {}: {}",
                    self.id, event.arg1, state, message
                );
                core.events.publish_error(
                    &event.arg1.to_string(),
                    message,
                    json!({"extra": event.arg2, "state": state}),
                );
            }
            _ => match PlayerEvent::from_engine(&event) {
                Some(mapped) => self.core.lock().publish(mapped),
                None => trace!("Player {} ignoring engine event {}", self.id, event.what),
            },
        }
    }

    /// Engine frame callback, runs on the engine's render thread
    pub fn on_frame(&self, frame: Arc<PixelBuffer>) {
        self.frames.store(frame);
        let id = self.texture_id.load(Ordering::Acquire);
        if id != NO_TEXTURE {
            self.notify_frame(id);
        }
    }

    fn notify_frame(&self, id: TextureId) {
        if let Err(e) = self.textures.mark_frame_available(id) {
            warn!("Player {} frame notify for texture {} failed: {}", self.id, id, e);
        }
    }

    /// Tear the player down
    ///
    /// Publishes the final released state, shuts the engine down, drops the
    /// render target and both channels. Returns false if the player was
    /// already released; a second call does nothing else.
    pub fn release(&self) -> bool {
        {
            let mut core = self.core.lock();
            if core.closed {
                trace!("Player {} already released", self.id);
                return false;
            }
            core.transition(PlaybackState::Released, &self.context);
            core.closed = true;
        }

        self.engine.shutdown();

        let texture = self.surface.lock().take();
        self.texture_id.store(NO_TEXTURE, Ordering::Release);
        if let Some(id) = texture {
            if let Err(e) = self.textures.unregister_texture(id) {
                warn!("Player {} unregistering texture {} failed: {}", self.id, id, e);
            }
        }

        if let Some(binding) = self.binding.lock().take() {
            binding
                .messenger
                .set_method_handler(&binding.method_channel, None);
            binding.messenger.set_stream_handler(&binding.event_channel, None);
        }

        self.core.lock().events.close();
        self.frames.clear();

        info!("Player {} released", self.id);
        true
    }
}

impl MethodHandler for BridgePlayer {
    fn handle_method(&self, method: &str, args: &Value) -> Result<Value> {
        self.handle_command(method, args)
    }
}

impl StreamHandler for BridgePlayer {
    fn on_listen(&self, _args: &Value, sink: Arc<dyn EventSink>) {
        let mut core = self.core.lock();
        if core.closed {
            debug!("Player {} is released, ignoring listen", self.id);
            return;
        }
        debug!("Player {} event listener attached", self.id);
        core.events.attach(sink);
    }

    fn on_cancel(&self, _args: &Value) {
        debug!("Player {} event listener detached", self.id);
        self.core.lock().events.detach();
    }
}

impl Drop for BridgePlayer {
    fn drop(&mut self) {
        if self.engine.is_alive() {
            warn!("Player {} dropped without release", self.id);
            self.release();
        }
    }
}
