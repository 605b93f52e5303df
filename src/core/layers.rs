use thiserror::Error;

use crate::{
    layer::Layer,
    types::{ImageBlob, LayerId},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayerError {
    #[error("invalid layer stack state: {0}")]
    InvalidState(&'static str),
    #[error("layer index out of range: from {from} to {to} with {len} layers")]
    IndexOutOfRange { from: usize, to: usize, len: usize },
}

/// Ordered layer sequence for one point in history. Index order is z-order.
///
/// Every transform returns a new stack and leaves `self` untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerStack {
    layers: Vec<Layer>,
}

impl LayerStack {
    /// Empty stack: the "no image loaded" document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stack holding only the uploaded base layer.
    pub fn with_original(layer: Layer) -> Result<Self, LayerError> {
        Self::new().append(layer)
    }

    pub(crate) fn from_layers(layers: Vec<Layer>) -> Self {
        Self { layers }
    }

    /// Adds `layer` on top.
    ///
    /// Only an original layer may start a stack, and only one may exist.
    pub fn append(&self, layer: Layer) -> Result<Self, LayerError> {
        match (self.layers.is_empty(), layer.kind.is_original()) {
            (true, false) => {
                return Err(LayerError::InvalidState("no base layer to edit on"));
            }
            (false, true) => {
                return Err(LayerError::InvalidState("base layer already present"));
            }
            _ => {}
        }

        let mut layers = self.layers.clone();
        layers.push(layer);
        Ok(Self { layers })
    }

    pub fn set_visibility(&self, id: LayerId, is_visible: bool) -> Self {
        self.replace_with(id, |l| l.with_visibility(is_visible))
    }

    /// Unknown ids leave the stack as it was.
    pub fn toggle_visibility(&self, id: LayerId) -> Self {
        self.replace_with(id, |l| l.with_visibility(!l.is_visible))
    }

    pub fn set_opacity(&self, id: LayerId, opacity: i32) -> Self {
        self.replace_with(id, |l| l.with_opacity(opacity))
    }

    /// Moves the layer at `from` so it ends up at `to`.
    pub fn reorder(&self, from: usize, to: usize) -> Result<Self, LayerError> {
        let len = self.layers.len();
        if from >= len || to >= len {
            return Err(LayerError::IndexOutOfRange { from, to, len });
        }

        let mut layers = self.layers.clone();
        let moved = layers.remove(from);
        layers.insert(to, moved);
        Ok(Self { layers })
    }

    /// Collapses the stack to the original upload, wherever reordering left it.
    pub fn truncate_to_base(&self) -> Self {
        Self {
            layers: self.original().or(self.base()).cloned().into_iter().collect(),
        }
    }

    /// The image the next edit applies to: the top of the stack.
    pub fn current_image(&self) -> Option<&ImageBlob> {
        self.top().map(|l| &l.image)
    }

    pub fn top(&self) -> Option<&Layer> {
        self.layers.last()
    }

    pub fn base(&self) -> Option<&Layer> {
        self.layers.first()
    }

    /// The uploaded layer. Sits at index 0 unless it was reordered away.
    pub fn original(&self) -> Option<&Layer> {
        self.layers.iter().find(|l| l.kind.is_original())
    }

    pub fn get(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn position(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn ids(&self) -> Vec<LayerId> {
        self.layers.iter().map(|l| l.id).collect()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    fn replace_with(&self, id: LayerId, f: impl Fn(&Layer) -> Layer) -> Self {
        Self {
            layers: self
                .layers
                .iter()
                .map(|l| if l.id == id { f(l) } else { l.clone() })
                .collect(),
        }
    }
}
