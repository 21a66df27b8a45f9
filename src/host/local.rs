//! In-process channel transport

use super::{BinaryMessenger, EventSink, MethodHandler, SinkMessage, StreamHandler};
use crate::utils::error::{BridgeError, Result};
use log::{debug, trace};
use parking_lot::{Condvar, Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Name-keyed channel table living in the same process as the bridge
///
/// Handlers are looked up and cloned out of the table before they run, so a
/// handler may register or clear channels (the plugin channel does this when
/// it creates and releases players).
#[derive(Default)]
pub struct LocalMessenger {
    methods: RwLock<HashMap<String, Arc<dyn MethodHandler>>>,
    streams: RwLock<HashMap<String, Arc<dyn StreamHandler>>>,
}

impl LocalMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call a method on a channel and wait for the reply
    pub fn invoke(&self, channel: &str, method: &str, args: Value) -> Result<Value> {
        let handler = self
            .methods
            .read()
            .get(channel)
            .cloned()
            .ok_or_else(|| BridgeError::ChannelNotFound(channel.to_string()))?;

        trace!("{} <- {}({})", channel, method, args);
        handler.handle_method(method, &args)
    }

    /// Start listening on an event channel
    pub fn listen(&self, channel: &str, args: Value, sink: Arc<dyn EventSink>) -> Result<()> {
        let handler = self.stream_handler(channel)?;
        handler.on_listen(&args, sink);
        Ok(())
    }

    /// Stop listening on an event channel
    pub fn cancel(&self, channel: &str, args: Value) -> Result<()> {
        let handler = self.stream_handler(channel)?;
        handler.on_cancel(&args);
        Ok(())
    }

    pub fn has_method_handler(&self, channel: &str) -> bool {
        self.methods.read().contains_key(channel)
    }

    pub fn has_stream_handler(&self, channel: &str) -> bool {
        self.streams.read().contains_key(channel)
    }

    fn stream_handler(&self, channel: &str) -> Result<Arc<dyn StreamHandler>> {
        self.streams
            .read()
            .get(channel)
            .cloned()
            .ok_or_else(|| BridgeError::ChannelNotFound(channel.to_string()))
    }
}

impl BinaryMessenger for LocalMessenger {
    fn set_method_handler(&self, channel: &str, handler: Option<Arc<dyn MethodHandler>>) {
        let mut methods = self.methods.write();
        match handler {
            Some(handler) => {
                debug!("Method channel registered: {}", channel);
                methods.insert(channel.to_string(), handler);
            }
            None => {
                debug!("Method channel cleared: {}", channel);
                methods.remove(channel);
            }
        }
    }

    fn set_stream_handler(&self, channel: &str, handler: Option<Arc<dyn StreamHandler>>) {
        let mut streams = self.streams.write();
        match handler {
            Some(handler) => {
                debug!("Event channel registered: {}", channel);
                streams.insert(channel.to_string(), handler);
            }
            None => {
                debug!("Event channel cleared: {}", channel);
                streams.remove(channel);
            }
        }
    }
}

/// Event sink that keeps everything it receives
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<SinkMessage>>,
    arrived: Condvar,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Everything received so far, in order
    pub fn messages(&self) -> Vec<SinkMessage> {
        self.messages.lock().clone()
    }

    /// Received events, skipping error notifications
    pub fn events(&self) -> Vec<Value> {
        self.messages
            .lock()
            .iter()
            .filter_map(|m| match m {
                SinkMessage::Event(event) => Some(event.clone()),
                SinkMessage::Error { .. } => None,
            })
            .collect()
    }

    /// `(new, old)` pairs of every received state_change event
    pub fn state_changes(&self) -> Vec<(i64, i64)> {
        self.events()
            .iter()
            .filter(|e| e["event"] == "state_change")
            .filter_map(|e| Some((e["new"].as_i64()?, e["old"].as_i64()?)))
            .collect()
    }

    /// Block until `pred` holds for the received messages or `timeout` passes
    pub fn wait_for(&self, timeout: Duration, pred: impl Fn(&[SinkMessage]) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut messages = self.messages.lock();
        while !pred(&messages) {
            if self.arrived.wait_until(&mut messages, deadline).timed_out() {
                return pred(&messages);
            }
        }
        true
    }

    fn push(&self, message: SinkMessage) {
        self.messages.lock().push(message);
        self.arrived.notify_all();
    }
}

impl EventSink for RecordingSink {
    fn success(&self, event: Value) {
        self.push(SinkMessage::Event(event));
    }

    fn error(&self, code: &str, message: &str, details: Value) {
        self.push(SinkMessage::Error {
            code: code.to_string(),
            message: message.to_string(),
            details,
        });
    }
}
