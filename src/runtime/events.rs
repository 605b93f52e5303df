//! Runtime event stream payloads.

use crate::types::{LayerId, Ticket};

/// Events emitted from the single-writer editor loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorEvent {
    /// A new document was started from an uploaded image.
    Uploaded {
        /// Id of the original layer.
        id: LayerId,
    },
    /// An edit entered the busy state.
    EditStarted {
        /// Ticket of the in-flight edit.
        ticket: Ticket,
    },
    /// An edit succeeded and its layer was committed.
    LayerAdded {
        /// Id of the new layer.
        id: LayerId,
    },
    /// An edit failed; history is unchanged.
    EditFailed {
        /// User-facing message.
        message: String,
    },
    /// The in-flight edit was cancelled.
    EditCancelled {
        /// Ticket of the cancelled edit.
        ticket: Ticket,
    },
    /// Visibility, opacity or order changed in a new history entry.
    LayersChanged,
    /// All edits were collapsed back to the original layer.
    ResetToOriginal,
    /// One undo step was applied.
    UndoApplied {
        /// Cursor after the step.
        cursor: usize,
    },
    /// One redo step was applied.
    RedoApplied {
        /// Cursor after the step.
        cursor: usize,
    },
    /// The document was discarded.
    Cleared,
    /// The persistence adapter accepted the latest state.
    Saved,
    /// The persistence adapter failed; the in-memory document is unaffected.
    PersistFailed {
        /// Failure description.
        message: String,
    },
}
