//! Edit request model: what a tool panel asks the orchestrator to do.

use crate::{
    layer::LayerKind,
    types::{CropRect, Detection, Targeting},
};

const LABEL_PROMPT_CHARS: usize = 20;

/// An AI-backed edit instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditRequest {
    /// Free-form retouch, optionally restricted to a face or mask.
    Generative {
        /// Instruction text.
        prompt: String,
        /// Optional spatial restriction.
        targeting: Option<Targeting>,
    },
    /// Global stylistic filter.
    Filter {
        /// Instruction text.
        prompt: String,
    },
    /// Global photographic adjustment.
    Adjustment {
        /// Instruction text.
        prompt: String,
    },
    /// Background replacement, optionally removing detected people.
    Background {
        /// Instruction text.
        prompt: String,
        /// People to remove from the scene.
        exclude: Vec<Detection>,
    },
    /// A suggestion previously produced by the collaborator.
    Suggestion {
        /// Instruction text.
        prompt: String,
    },
}

impl EditRequest {
    /// Shorthand for an untargeted generative edit.
    pub fn generative(prompt: impl Into<String>) -> Self {
        Self::Generative {
            prompt: prompt.into(),
            targeting: None,
        }
    }

    /// Instruction text.
    pub fn prompt(&self) -> &str {
        match self {
            Self::Generative { prompt, .. }
            | Self::Filter { prompt }
            | Self::Adjustment { prompt }
            | Self::Background { prompt, .. }
            | Self::Suggestion { prompt } => prompt,
        }
    }

    /// Name given to the layer this request produces.
    pub fn layer_name(&self) -> String {
        match self {
            Self::Generative { prompt, .. } => prompt.clone(),
            Self::Filter { prompt } => format!("Filter: {}...", label_prefix(prompt)),
            Self::Adjustment { prompt } => format!("Adjustment: {}...", label_prefix(prompt)),
            Self::Background { prompt, .. } => format!("Background: {}...", label_prefix(prompt)),
            Self::Suggestion { prompt } => format!("Suggestion: {}...", label_prefix(prompt)),
        }
    }

    /// Provenance recorded on the resulting layer.
    pub fn layer_kind(&self) -> LayerKind {
        let prompt = self.prompt().to_string();
        match self {
            Self::Generative { .. } => LayerKind::Generative { prompt },
            Self::Filter { .. } => LayerKind::Filter { prompt },
            Self::Adjustment { .. } => LayerKind::Adjustment { prompt },
            Self::Background { .. } => LayerKind::Background { prompt },
            Self::Suggestion { .. } => LayerKind::Suggestion { prompt },
        }
    }
}

/// Work performed while the orchestrator is busy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditWork {
    /// Remote collaborator call.
    Ai(EditRequest),
    /// Local crop of the top layer.
    Crop(CropRect),
}

impl EditWork {
    /// Name given to the resulting layer.
    pub fn layer_name(&self) -> String {
        match self {
            Self::Ai(req) => req.layer_name(),
            Self::Crop(_) => "Crop".to_string(),
        }
    }

    /// Provenance recorded on the resulting layer.
    pub fn layer_kind(&self) -> LayerKind {
        match self {
            Self::Ai(req) => req.layer_kind(),
            Self::Crop(rect) => LayerKind::Crop { rect: *rect },
        }
    }

    /// Phrase used in the user-facing failure message.
    pub fn failure_label(&self) -> &'static str {
        match self {
            Self::Ai(EditRequest::Generative { .. }) => "generate the image",
            Self::Ai(EditRequest::Filter { .. }) => "apply the filter",
            Self::Ai(EditRequest::Adjustment { .. }) => "apply the adjustment",
            Self::Ai(EditRequest::Background { .. }) => "apply the background change",
            Self::Ai(EditRequest::Suggestion { .. }) => "apply the suggestion",
            Self::Crop(_) => "crop the image",
        }
    }
}

fn label_prefix(prompt: &str) -> String {
    prompt.chars().take(LABEL_PROMPT_CHARS).collect()
}
