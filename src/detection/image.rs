use std::{fmt, path::Path, sync::Arc};

use anyhow::{Context, Result};
use image::ImageFormat;
use log::debug;
use uuid::Uuid;

use crate::error::DetectionError;

/// A user-selected leaf image. Owned by exactly one session at a time.
pub struct ImageHandle {
    id: Uuid,
    format: ImageFormat,
    bytes: Arc<[u8]>,
}

impl ImageHandle {
    /// Accepts any byte buffer whose header identifies a known image format.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, DetectionError> {
        let format = image::guess_format(&bytes).map_err(|_| DetectionError::NotAnImage)?;
        Ok(Self {
            id: Uuid::new_v4(),
            format,
            bytes: bytes.into(),
        })
    }

    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read image {}", path.display()))?;
        Self::from_bytes(bytes)
            .with_context(|| format!("{} is not an image", path.display()))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }

    /// Shared view of the pixels for a classifier; does not transfer ownership.
    pub fn bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageHandle")
            .field("id", &self.id)
            .field("format", &self.format)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl Drop for ImageHandle {
    fn drop(&mut self) {
        debug!("Released image {}", self.id);
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::ImageHandle;

    /// Smallest header `image::guess_format` recognises as PNG.
    pub const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    pub fn png() -> ImageHandle {
        ImageHandle::from_bytes(PNG_MAGIC.to_vec()).expect("png magic is an image")
    }
}
