//! Layer record and provenance metadata.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{CropRect, ImageBlob, LayerId};

/// Display name given to the uploaded base layer.
pub const ORIGINAL_LAYER_NAME: &str = "Original Image";
/// Fully opaque layer opacity.
pub const MAX_OPACITY: u8 = 100;

/// Provenance of a layer: which kind of edit produced it and from what input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerKind {
    /// The uploaded source image.
    Original,
    /// Free-form generative edit.
    Generative {
        /// Instruction sent to the collaborator.
        prompt: String,
    },
    /// Global stylistic filter.
    Filter {
        /// Filter instruction.
        prompt: String,
    },
    /// Global photographic adjustment.
    Adjustment {
        /// Adjustment instruction.
        prompt: String,
    },
    /// Background replacement.
    Background {
        /// Background instruction.
        prompt: String,
    },
    /// Applied collaborator suggestion.
    Suggestion {
        /// Suggested instruction.
        prompt: String,
    },
    /// Local crop of the layer below.
    Crop {
        /// Crop rectangle in source pixels.
        rect: CropRect,
    },
}

impl LayerKind {
    /// True only for the uploaded base layer.
    pub fn is_original(&self) -> bool {
        matches!(self, Self::Original)
    }

    /// Instruction text for prompt-driven kinds.
    pub fn prompt(&self) -> Option<&str> {
        match self {
            Self::Generative { prompt }
            | Self::Filter { prompt }
            | Self::Adjustment { prompt }
            | Self::Background { prompt }
            | Self::Suggestion { prompt } => Some(prompt),
            Self::Original | Self::Crop { .. } => None,
        }
    }
}

/// One immutable edit result plus its display state.
///
/// Only `is_visible` and `opacity` ever differ between copies of the same
/// layer held by different history entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    /// Stable identity.
    pub id: LayerId,
    /// Human-readable label.
    pub name: String,
    /// Encoded pixels.
    pub image: ImageBlob,
    /// Whether the layer takes part in compositing.
    pub is_visible: bool,
    /// Opacity percentage, 0..=100.
    pub opacity: u8,
    /// Provenance.
    pub kind: LayerKind,
}

impl Layer {
    /// Creates a visible, opaque layer with a fresh id.
    pub fn new(name: impl Into<String>, image: ImageBlob, kind: LayerKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            image,
            is_visible: true,
            opacity: MAX_OPACITY,
            kind,
        }
    }

    /// Creates the base layer for an uploaded image.
    pub fn original(image: ImageBlob) -> Self {
        Self::new(ORIGINAL_LAYER_NAME, image, LayerKind::Original)
    }

    /// Copy with a different visibility.
    pub fn with_visibility(&self, is_visible: bool) -> Self {
        Self {
            is_visible,
            ..self.clone()
        }
    }

    /// Copy with opacity clamped to 0..=100.
    pub fn with_opacity(&self, opacity: i32) -> Self {
        Self {
            opacity: clamp_opacity(opacity),
            ..self.clone()
        }
    }
}

/// Clamps any integer into the valid opacity range.
pub fn clamp_opacity(value: i32) -> u8 {
    value.clamp(0, i32::from(MAX_OPACITY)) as u8
}
