//! Ordered event delivery to a listener that may not be attached yet
//!
//! The queue has no lock of its own. It lives inside the player's critical
//! section next to the state machine, so attach, detach and publish share one
//! order with every state mutation.

use crate::host::{EventSink, SinkMessage};
use log::trace;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;

/// Event queue of one player
#[derive(Default)]
pub struct EventQueue {
    listener: Option<Arc<dyn EventSink>>,
    buffered: VecDeque<SinkMessage>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a listener and flush everything buffered to it, oldest first
    ///
    /// Replaces any listener already attached.
    pub fn attach(&mut self, listener: Arc<dyn EventSink>) {
        if !self.buffered.is_empty() {
            trace!("Flushing {} buffered events", self.buffered.len());
        }
        for message in self.buffered.drain(..) {
            message.deliver(listener.as_ref());
        }
        self.listener = Some(listener);
    }

    /// Remove the listener; later messages are buffered until the next attach
    pub fn detach(&mut self) {
        self.listener = None;
    }

    /// Detach and drop anything still buffered
    pub fn close(&mut self) {
        self.listener = None;
        if !self.buffered.is_empty() {
            trace!("Dropping {} undelivered events", self.buffered.len());
            self.buffered.clear();
        }
    }

    /// Deliver an event now, or buffer it while nobody listens
    pub fn publish(&mut self, event: Value) {
        self.push(SinkMessage::Event(event));
    }

    /// Deliver an error notification
    ///
    /// Listeners treat it as the end of the stream from the player's side;
    /// the channel itself stays open.
    pub fn publish_error(&mut self, code: &str, message: &str, details: Value) {
        self.push(SinkMessage::Error {
            code: code.to_string(),
            message: message.to_string(),
            details,
        });
    }

    pub fn is_attached(&self) -> bool {
        self.listener.is_some()
    }

    /// Number of messages waiting for a listener
    pub fn buffered_len(&self) -> usize {
        self.buffered.len()
    }

    fn push(&mut self, message: SinkMessage) {
        match &self.listener {
            Some(listener) => message.deliver(listener.as_ref()),
            None => self.buffered.push_back(message),
        }
    }
}
