//! Host-side interfaces for player-bridge
//!
//! The host UI process talks to the bridge through named channels (method
//! calls with replies, plus event streams) and composites video through a
//! texture registry. This module defines both boundaries and ships
//! in-process implementations used by the demo binary and the tests.

mod local;
mod texture;

pub use local::{LocalMessenger, RecordingSink};
pub use texture::HeadlessTextureRegistry;

use crate::engine::PixelBuffer;
use crate::utils::error::Result;
use serde_json::Value;
use std::sync::Arc;

/// Compositor texture identifier
pub type TextureId = i64;

/// One message travelling down an event channel
#[derive(Debug, Clone, PartialEq)]
pub enum SinkMessage {
    Event(Value),
    Error {
        code: String,
        message: String,
        details: Value,
    },
}

impl SinkMessage {
    /// Hand this message to a sink
    pub fn deliver(self, sink: &dyn EventSink) {
        match self {
            SinkMessage::Event(event) => sink.success(event),
            SinkMessage::Error {
                code,
                message,
                details,
            } => sink.error(&code, &message, details),
        }
    }
}

/// Handles method calls arriving on one command channel
pub trait MethodHandler: Send + Sync {
    /// Handle a method call and produce its reply
    ///
    /// # Arguments
    ///
    /// * `method` - Method name
    /// * `args` - Argument map (or `Value::Null` when the caller sent none)
    fn handle_method(&self, method: &str, args: &Value) -> Result<Value>;
}

/// Receiving end of an event channel, owned by the host transport
///
/// Implementations enqueue and return; they must not block the caller.
/// Delivery runs inside the publishing player's critical section, so a sink
/// must not call back into that player (listen, cancel, commands, release)
/// from `success` or `error`.
pub trait EventSink: Send + Sync {
    /// Deliver one event
    fn success(&self, event: Value);

    /// Deliver an error notification
    fn error(&self, code: &str, message: &str, details: Value);
}

/// Handles listen/cancel requests on one event channel
pub trait StreamHandler: Send + Sync {
    /// The host started listening; events go to `sink` from now on
    fn on_listen(&self, args: &Value, sink: Arc<dyn EventSink>);

    /// The host stopped listening
    fn on_cancel(&self, args: &Value);
}

/// Channel table of the host transport
pub trait BinaryMessenger: Send + Sync {
    /// Install or clear (`None`) the method handler of a channel
    fn set_method_handler(&self, channel: &str, handler: Option<Arc<dyn MethodHandler>>);

    /// Install or clear (`None`) the stream handler of a channel
    fn set_stream_handler(&self, channel: &str, handler: Option<Arc<dyn StreamHandler>>);
}

/// Pull callback the compositor invokes when it wants a frame
pub trait PixelProvider: Send + Sync {
    /// Latest frame, `None` while no frame is ready
    ///
    /// `width` and `height` are the size the compositor would like.
    fn pixels(&self, width: u32, height: u32) -> Option<Arc<PixelBuffer>>;
}

/// Host compositor texture registry
pub trait TextureRegistry: Send + Sync {
    /// Register a render target backed by `provider`
    fn register_texture(&self, provider: Arc<dyn PixelProvider>) -> Result<TextureId>;

    /// Remove a render target
    fn unregister_texture(&self, id: TextureId) -> Result<()>;

    /// Tell the compositor a new frame is ready to be pulled
    fn mark_frame_available(&self, id: TextureId) -> Result<()>;
}
