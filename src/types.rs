//! Shared primitive IDs, image blobs and geometry.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable layer identifier, minted once per layer and never reused.
pub type LayerId = Uuid;
/// Ticket handed out for one in-flight edit.
pub type Ticket = u64;

/// Opaque, immutable binary image resource.
///
/// Cloning shares the underlying bytes. Equality compares content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageBlob {
    /// MIME type, e.g. `image/png`.
    pub mime: String,
    /// Encoded image bytes.
    pub bytes: Arc<[u8]>,
}

impl ImageBlob {
    /// Wraps encoded bytes with their MIME type.
    pub fn new(mime: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            mime: mime.into(),
            bytes: bytes.into(),
        }
    }

    /// Wraps PNG-encoded bytes.
    pub fn png(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::new("image/png", bytes)
    }

    /// Encoded size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when the blob carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Axis-aligned pixel rectangle in source-image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CropRect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl CropRect {
    /// Builds a rectangle.
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// True when the rectangle covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A face or person found by the detection collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Detection {
    /// Detection index as reported by the collaborator.
    pub id: u32,
    /// Bounding box.
    pub bbox: CropRect,
}

/// Optional spatial restriction for a generative edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Targeting {
    /// Restrict the edit to one face region.
    Face(CropRect),
    /// Freehand mask; white pixels are editable.
    Mask(ImageBlob),
}
