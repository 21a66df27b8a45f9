//! In-process engine for host development and tests
//!
//! `LoopbackEngine` decodes nothing. It records every call it receives and,
//! in auto mode, answers lifecycle calls the way a real engine does: from its
//! own callback thread, after the call has returned.

use super::{
    event_code, EngineEvent, EngineEventListener, FrameListener, NativePlayer, PixelBuffer,
};
use crate::bridge::PlaybackState;
use crate::utils::error::{BridgeError, IntoBridgeError, Result};
use crossbeam_channel::{unbounded, Sender};
use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;

/// One call received by the loopback engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    SetDataSource(String),
    PrepareAsync,
    Start,
    Pause,
    Stop,
    Reset,
    SeekTo(i64),
    SetVolume(f32, f32),
    SetSpeed(f32),
    SetLoop(i32),
    SetOption(i32, String, String),
    SetIntOption(i32, String, i64),
    Shutdown,
}

enum Job {
    Event(EngineEvent),
    Frame(Arc<PixelBuffer>),
}

struct Shared {
    calls: Mutex<Vec<EngineCall>>,
    event_listener: RwLock<Option<EngineEventListener>>,
    frame_listener: RwLock<Option<FrameListener>>,
    position: AtomicI64,
    duration: AtomicI64,
    failing: AtomicBool,
}

impl Shared {
    fn record(&self, call: EngineCall) {
        self.calls.lock().push(call);
    }

    fn emit_event(&self, event: EngineEvent) {
        // clone out so the listener runs without our lock held
        let listener = self.event_listener.read().clone();
        if let Some(listener) = listener {
            listener(event);
        }
    }

    fn emit_frame(&self, frame: Arc<PixelBuffer>) {
        let listener = self.frame_listener.read().clone();
        if let Some(listener) = listener {
            listener(frame);
        }
    }

    fn check(&self, what: &str) -> Result<()> {
        if self.failing.load(Ordering::Acquire) {
            Err(BridgeError::engine_error(format!("loopback {} failed", what)))
        } else {
            Ok(())
        }
    }
}

/// Auto-mode responder: engine-side state plus the callback thread
struct Responder {
    tx: Option<Sender<Job>>,
    thread: Option<thread::JoinHandle<()>>,
    state: PlaybackState,
    frame_size: (u32, u32),
    first_frame_sent: bool,
}

impl Responder {
    fn send(&self, job: Job) {
        if let Some(tx) = &self.tx {
            if tx.send(job).is_err() {
                warn!("Loopback callback thread is gone");
            }
        }
    }

    fn change_state(&mut self, new: PlaybackState) {
        let old = std::mem::replace(&mut self.state, new);
        self.send(Job::Event(EngineEvent::new(
            event_code::PLAYBACK_STATE_CHANGED,
            new.code(),
            old.code(),
        )));
    }
}

/// Engine stand-in that records calls
pub struct LoopbackEngine {
    shared: Arc<Shared>,
    responder: Mutex<Option<Responder>>,
}

/// Test-side view of a [`LoopbackEngine`]
#[derive(Clone)]
pub struct LoopbackProbe {
    shared: Arc<Shared>,
}

impl LoopbackEngine {
    /// Create an engine that only records calls; events come from the probe
    pub fn new() -> (Self, LoopbackProbe) {
        let shared = Arc::new(Shared {
            calls: Mutex::new(Vec::new()),
            event_listener: RwLock::new(None),
            frame_listener: RwLock::new(None),
            position: AtomicI64::new(0),
            duration: AtomicI64::new(0),
            failing: AtomicBool::new(false),
        });
        let probe = LoopbackProbe {
            shared: Arc::clone(&shared),
        };
        (
            Self {
                shared,
                responder: Mutex::new(None),
            },
            probe,
        )
    }

    /// Create an engine that answers lifecycle calls from a callback thread
    ///
    /// The first `start` produces one solid frame of `frame_size`.
    pub fn auto(frame_size: (u32, u32), duration_ms: i64) -> Result<(Self, LoopbackProbe)> {
        let (engine, probe) = Self::new();
        engine.shared.duration.store(duration_ms, Ordering::Release);

        let (tx, rx) = unbounded::<Job>();
        let shared = Arc::clone(&engine.shared);
        let thread = thread::Builder::new()
            .name("loopback-callback".to_string())
            .spawn(move || {
                for job in rx.iter() {
                    match job {
                        Job::Event(event) => shared.emit_event(event),
                        Job::Frame(frame) => shared.emit_frame(frame),
                    }
                }
                debug!("Loopback callback thread exiting");
            })
            .engine_err("Spawning loopback callback thread")?;

        *engine.responder.lock() = Some(Responder {
            tx: Some(tx),
            thread: Some(thread),
            state: PlaybackState::Idle,
            frame_size,
            first_frame_sent: false,
        });

        Ok((engine, probe))
    }

    fn respond(&self, f: impl FnOnce(&mut Responder)) {
        if let Some(responder) = self.responder.lock().as_mut() {
            f(responder);
        }
    }
}

impl NativePlayer for LoopbackEngine {
    fn set_data_source(&self, url: &str) -> Result<()> {
        self.shared.record(EngineCall::SetDataSource(url.to_string()));
        self.shared.check("set_data_source")?;
        self.respond(|r| r.state = PlaybackState::Initialized);
        Ok(())
    }

    fn prepare_async(&self) -> Result<()> {
        self.shared.record(EngineCall::PrepareAsync);
        self.shared.check("prepare_async")?;
        self.respond(|r| {
            r.state = PlaybackState::Preparing;
            r.send(Job::Event(EngineEvent::new(event_code::PREPARED, 0, 0)));
            r.change_state(PlaybackState::Prepared);
        });
        Ok(())
    }

    fn start(&self) -> Result<()> {
        self.shared.record(EngineCall::Start);
        self.shared.check("start")?;
        self.respond(|r| {
            if !r.first_frame_sent {
                r.first_frame_sent = true;
                let (width, height) = r.frame_size;
                r.send(Job::Event(EngineEvent::new(
                    event_code::VIDEO_SIZE_CHANGED,
                    width as i32,
                    height as i32,
                )));
                r.send(Job::Frame(Arc::new(PixelBuffer::solid(
                    width,
                    height,
                    [0x20, 0x20, 0x20, 0xff],
                ))));
                r.send(Job::Event(EngineEvent::new(
                    event_code::VIDEO_RENDERING_START,
                    0,
                    0,
                )));
            }
            r.change_state(PlaybackState::Started);
        });
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        self.shared.record(EngineCall::Pause);
        self.shared.check("pause")?;
        self.respond(|r| r.change_state(PlaybackState::Paused));
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.shared.record(EngineCall::Stop);
        self.shared.check("stop")?;
        self.respond(|r| r.state = PlaybackState::Stopped);
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        self.shared.record(EngineCall::Reset);
        self.shared.check("reset")?;
        self.respond(|r| {
            r.state = PlaybackState::Idle;
            r.first_frame_sent = false;
        });
        Ok(())
    }

    fn seek_to(&self, msec: i64) -> Result<()> {
        self.shared.record(EngineCall::SeekTo(msec));
        self.shared.check("seek_to")?;
        self.shared.position.store(msec, Ordering::Release);
        Ok(())
    }

    fn set_volume(&self, left: f32, right: f32) {
        self.shared.record(EngineCall::SetVolume(left, right));
    }

    fn set_speed(&self, speed: f32) {
        self.shared.record(EngineCall::SetSpeed(speed));
    }

    fn set_loop(&self, count: i32) {
        self.shared.record(EngineCall::SetLoop(count));
    }

    fn set_option(&self, category: i32, key: &str, value: &str) {
        self.shared.record(EngineCall::SetOption(
            category,
            key.to_string(),
            value.to_string(),
        ));
    }

    fn set_int_option(&self, category: i32, key: &str, value: i64) {
        self.shared
            .record(EngineCall::SetIntOption(category, key.to_string(), value));
    }

    fn current_position(&self) -> i64 {
        self.shared.position.load(Ordering::Acquire)
    }

    fn duration(&self) -> i64 {
        self.shared.duration.load(Ordering::Acquire)
    }

    fn set_event_listener(&self, listener: EngineEventListener) {
        *self.shared.event_listener.write() = Some(listener);
    }

    fn set_frame_listener(&self, listener: FrameListener) {
        *self.shared.frame_listener.write() = Some(listener);
    }

    fn shutdown(&self) {
        self.shared.record(EngineCall::Shutdown);

        let responder = self.responder.lock().take();
        if let Some(mut responder) = responder {
            // closing the channel ends the callback thread
            responder.tx.take();
            if let Some(thread) = responder.thread.take() {
                if thread.thread().id() != thread::current().id() && thread.join().is_err() {
                    warn!("Loopback callback thread panicked");
                }
            }
        }

        *self.shared.event_listener.write() = None;
        *self.shared.frame_listener.write() = None;
    }
}

impl LoopbackProbe {
    /// Calls received so far, in order
    pub fn calls(&self) -> Vec<EngineCall> {
        self.shared.calls.lock().clone()
    }

    /// Forget recorded calls
    pub fn clear_calls(&self) {
        self.shared.calls.lock().clear();
    }

    /// Fire an engine event on the calling thread
    pub fn emit(&self, event: EngineEvent) {
        self.shared.emit_event(event);
    }

    /// Fire the frame callback on the calling thread
    pub fn emit_frame(&self, frame: PixelBuffer) {
        self.shared.emit_frame(Arc::new(frame));
    }

    /// Make lifecycle calls fail from now on
    pub fn set_failing(&self, failing: bool) {
        self.shared.failing.store(failing, Ordering::Release);
    }

    pub fn set_position(&self, msec: i64) {
        self.shared.position.store(msec, Ordering::Release);
    }

    pub fn set_duration(&self, msec: i64) {
        self.shared.duration.store(msec, Ordering::Release);
    }

    /// Whether an event listener is installed
    pub fn has_event_listener(&self) -> bool {
        self.shared.event_listener.read().is_some()
    }
}
