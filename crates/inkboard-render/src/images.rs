//! Decoded bitmaps for image items, keyed by `src`.

use crate::RenderResult;
use image::RgbaImage;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Shared cache of decoded images.
///
/// Image items only carry a `src` string; whoever owns the bytes registers
/// them here before the items are drawn. Missing sources draw a placeholder.
#[derive(Debug, Default)]
pub struct ImageStore {
    images: RwLock<HashMap<String, Arc<RgbaImage>>>,
}

impl ImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, src: impl Into<String>, image: RgbaImage) {
        if let Ok(mut images) = self.images.write() {
            images.insert(src.into(), Arc::new(image));
        }
    }

    /// Decode an encoded image (PNG, JPEG, WebP) and register it.
    pub fn insert_encoded(&self, src: impl Into<String>, bytes: &[u8]) -> RenderResult<(u32, u32)> {
        let decoded = image::load_from_memory(bytes)?.to_rgba8();
        let dims = decoded.dimensions();
        self.insert(src, decoded);
        Ok(dims)
    }

    /// Decode a file, registered under its path.
    pub fn insert_file(&self, path: impl AsRef<Path>) -> RenderResult<(u32, u32)> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        self.insert_encoded(path.to_string_lossy(), &bytes)
    }

    pub fn get(&self, src: &str) -> Option<Arc<RgbaImage>> {
        self.images.read().ok()?.get(src).cloned()
    }

    pub fn remove(&self, src: &str) -> bool {
        self.images.write().is_ok_and(|mut images| images.remove(src).is_some())
    }

    pub fn len(&self) -> usize {
        self.images.read().map_or(0, |images| images.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
