use serde::{Deserialize, Serialize};

use crate::{core::history::EditorState, types::LayerId};

/// Version of [`StoredStateEnvelope`] payloads.
pub const STATE_FORMAT_VERSION: u16 = 1;
/// Key of the single editor-state record.
pub const STATE_KEY: &str = "editorState";

/// Per-snapshot reference to an immutable layer plus its display state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerRef {
    pub id: LayerId,
    pub is_visible: bool,
    pub opacity: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredState {
    pub history: Vec<Vec<LayerRef>>,
    pub history_index: Option<usize>,
}

impl StoredState {
    pub fn from_state(state: &EditorState) -> Self {
        let history = state
            .history
            .iter()
            .map(|stack| {
                stack
                    .layers()
                    .iter()
                    .map(|l| LayerRef {
                        id: l.id,
                        is_visible: l.is_visible,
                        opacity: l.opacity,
                    })
                    .collect()
            })
            .collect();

        Self {
            history,
            history_index: state.history_index,
        }
    }
}

/// Versioned wrapper for stable decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredStateEnvelope {
    pub format_version: u16,
    pub state: StoredState,
}

impl StoredStateEnvelope {
    pub fn new(state: StoredState) -> Self {
        Self {
            format_version: STATE_FORMAT_VERSION,
            state,
        }
    }
}
