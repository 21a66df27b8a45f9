//! In-memory compositor texture registry

use super::{PixelProvider, TextureId, TextureRegistry};
use crate::engine::PixelBuffer;
use crate::utils::error::{BridgeError, Result};
use log::{debug, trace};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

struct Entry {
    provider: Arc<dyn PixelProvider>,
    frames_available: Arc<AtomicU64>,
}

/// Texture registry without a GPU behind it
///
/// Stands in for the host compositor: it hands out ids, counts frame
/// notifications and lets callers pull frames the way a render loop would.
pub struct HeadlessTextureRegistry {
    next_id: AtomicI64,
    textures: RwLock<HashMap<TextureId, Entry>>,
    rejecting: AtomicBool,
}

impl Default for HeadlessTextureRegistry {
    fn default() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            textures: RwLock::new(HashMap::new()),
            rejecting: AtomicBool::new(false),
        }
    }
}

impl HeadlessTextureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make further registrations fail, as a compositor out of resources does
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::Release);
    }

    /// Pull the current frame of a texture, as the render loop would
    pub fn pull(&self, id: TextureId, width: u32, height: u32) -> Option<Arc<PixelBuffer>> {
        let provider = self
            .textures
            .read()
            .get(&id)
            .map(|entry| Arc::clone(&entry.provider))?;
        provider.pixels(width, height)
    }

    /// Number of frame-available notifications a texture has received
    pub fn frames_available(&self, id: TextureId) -> u64 {
        self.textures
            .read()
            .get(&id)
            .map(|entry| entry.frames_available.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    pub fn is_registered(&self, id: TextureId) -> bool {
        self.textures.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.textures.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TextureRegistry for HeadlessTextureRegistry {
    fn register_texture(&self, provider: Arc<dyn PixelProvider>) -> Result<TextureId> {
        if self.rejecting.load(Ordering::Acquire) {
            return Err(BridgeError::Texture("registry is not accepting textures".to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::AcqRel);
        self.textures.write().insert(
            id,
            Entry {
                provider,
                frames_available: Arc::new(AtomicU64::new(0)),
            },
        );
        debug!("Texture {} registered", id);
        Ok(id)
    }

    fn unregister_texture(&self, id: TextureId) -> Result<()> {
        match self.textures.write().remove(&id) {
            Some(_) => {
                debug!("Texture {} unregistered", id);
                Ok(())
            }
            None => Err(BridgeError::NotFound(format!("texture {}", id))),
        }
    }

    fn mark_frame_available(&self, id: TextureId) -> Result<()> {
        let textures = self.textures.read();
        let entry = textures
            .get(&id)
            .ok_or_else(|| BridgeError::NotFound(format!("texture {}", id)))?;
        let count = entry.frames_available.fetch_add(1, Ordering::AcqRel) + 1;
        trace!("Texture {} frame available ({})", id, count);
        Ok(())
    }
}
