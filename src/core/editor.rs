use thiserror::Error;

use crate::{
    ai::{AiCollaborator, AiError, dispatch::run_edit},
    edit::{EditRequest, EditWork},
    layer::Layer,
    raster::{self, RasterError},
    types::{CropRect, ImageBlob, LayerId, Ticket},
};

use super::{
    history::{EditorState, HistoryError, HistoryLog},
    layers::{LayerError, LayerStack},
};

/// Everything the orchestrator can refuse or fail with.
///
/// `Display` is the user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditorError {
    #[error("No image loaded to edit.")]
    NoImageLoaded,
    #[error("Please enter a description for your edit.")]
    EmptyInstruction,
    #[error("Another edit is still in progress.")]
    Busy,
    #[error("The edit was cancelled.")]
    Cancelled,
    #[error("{0}")]
    AiPolicyBlocked(String),
    #[error("{0}")]
    AiNoResult(String),
    #[error("{0}")]
    AiTransportFailure(String),
    #[error("Layer index out of range (from {from}, to {to}, {len} layers).")]
    IndexOutOfRange { from: usize, to: usize, len: usize },
    #[error("Invalid layer state: {0}.")]
    InvalidState(&'static str),
    #[error("Image processing failed: {0}")]
    Raster(#[from] RasterError),
    #[error("Saved editor state is unusable: {0}")]
    History(#[from] HistoryError),
    #[error("Storage is unavailable: {0}")]
    PersistenceUnavailable(String),
}

impl From<AiError> for EditorError {
    fn from(value: AiError) -> Self {
        let message = value.to_string();
        match value {
            AiError::PolicyBlocked { .. } => Self::AiPolicyBlocked(message),
            AiError::UnexpectedStop { .. } | AiError::NoResult { .. } => Self::AiNoResult(message),
            AiError::Transport(_) => Self::AiTransportFailure(message),
        }
    }
}

impl From<LayerError> for EditorError {
    fn from(value: LayerError) -> Self {
        match value {
            LayerError::InvalidState(why) => Self::InvalidState(why),
            LayerError::IndexOutOfRange { from, to, len } => Self::IndexOutOfRange { from, to, len },
        }
    }
}

/// Whether an edit is in flight, and under which ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorStatus {
    Idle,
    Busy { ticket: Ticket },
}

/// An edit that has entered the busy state and awaits its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEdit {
    pub ticket: Ticket,
    /// Top-of-stack image at the time the edit began.
    pub base: ImageBlob,
    pub work: EditWork,
}

/// The single write path from tool panels into history.
///
/// Edits run in two phases: `begin_*` validates and enters `Busy`, then
/// [`Editor::complete`] commits against whatever snapshot is current at that
/// moment. While busy, every mutating call fails with [`EditorError::Busy`].
#[derive(Debug, Default)]
pub struct Editor {
    history: HistoryLog,
    busy: Option<(Ticket, EditWork)>,
    next_ticket: Ticket,
    last_error: Option<String>,
}

impl Editor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history_limit(limit: Option<usize>) -> Self {
        Self {
            history: HistoryLog::with_limit(limit),
            ..Self::default()
        }
    }

    pub fn restore(state: EditorState, limit: Option<usize>) -> Result<Self, EditorError> {
        Ok(Self {
            history: HistoryLog::from_state(state, limit)?,
            ..Self::default()
        })
    }

    pub fn state(&self) -> EditorState {
        self.history.export_state()
    }

    /// Starts a new document from `image`, discarding all history.
    pub fn upload(&mut self, image: ImageBlob) -> Result<LayerId, EditorError> {
        self.ensure_idle()?;
        let base = Layer::original(image);
        let id = base.id;
        let stack = LayerStack::with_original(base)?;

        self.history.reset();
        self.history.commit(stack);
        self.last_error = None;
        tracing::info!(layer_id = %id, "image uploaded");
        Ok(id)
    }

    /// Returns to the "no image loaded" state.
    pub fn clear(&mut self) -> Result<(), EditorError> {
        self.ensure_idle()?;
        self.history.reset();
        self.last_error = None;
        Ok(())
    }

    pub fn begin_edit(&mut self, request: EditRequest) -> Result<PendingEdit, EditorError> {
        self.ensure_idle()?;
        let base = self.top_image()?;
        if request.prompt().trim().is_empty() {
            return Err(self.record(EditorError::EmptyInstruction));
        }
        Ok(self.enter_busy(base, EditWork::Ai(request)))
    }

    pub fn begin_crop(&mut self, rect: CropRect) -> Result<PendingEdit, EditorError> {
        self.ensure_idle()?;
        let base = self.top_image()?;
        Ok(self.enter_busy(base, EditWork::Crop(rect)))
    }

    /// Finishes the edit identified by `ticket`.
    ///
    /// A ticket that is no longer current (cancelled, or never issued) is
    /// discarded with [`EditorError::Cancelled`] and changes nothing.
    pub fn complete(
        &mut self,
        ticket: Ticket,
        outcome: Result<ImageBlob, EditorError>,
    ) -> Result<LayerId, EditorError> {
        let work = match self.busy.take() {
            Some((current, work)) if current == ticket => work,
            other => {
                self.busy = other;
                tracing::debug!(ticket, "discarding result of a stale edit");
                return Err(EditorError::Cancelled);
            }
        };

        let committed = outcome.and_then(|image| {
            let layer = Layer::new(work.layer_name(), image, work.layer_kind());
            let id = layer.id;
            let next = self
                .history
                .current()
                .ok_or(EditorError::NoImageLoaded)?
                .append(layer)?;
            self.history.commit(next);
            Ok(id)
        });

        match committed {
            Ok(id) => {
                tracing::info!(ticket, layer_id = %id, cursor = ?self.history.cursor(), "edit committed");
                self.last_error = None;
                Ok(id)
            }
            Err(err) => {
                tracing::warn!(ticket, error = %err, "edit failed");
                self.last_error = Some(format!("Failed to {}. {err}", work.failure_label()));
                Err(err)
            }
        }
    }

    /// Abandons the in-flight edit, if any. Returns whether one was cancelled.
    pub fn cancel(&mut self) -> bool {
        match self.busy.take() {
            Some((ticket, _)) => {
                tracing::info!(ticket, "edit cancelled");
                true
            }
            None => false,
        }
    }

    /// Runs a whole AI edit inline: begin, call the collaborator, complete.
    pub async fn apply<A: AiCollaborator>(
        &mut self,
        ai: &A,
        request: EditRequest,
    ) -> Result<LayerId, EditorError> {
        let pending = self.begin_edit(request.clone())?;
        let outcome = run_edit(ai, pending.base, request)
            .await
            .map_err(EditorError::from);
        self.complete(pending.ticket, outcome)
    }

    /// Crops the top layer inline.
    pub fn crop(&mut self, rect: CropRect) -> Result<LayerId, EditorError> {
        let pending = self.begin_crop(rect)?;
        let outcome = raster::crop(&pending.base, rect).map_err(EditorError::from);
        self.complete(pending.ticket, outcome)
    }

    pub fn undo(&mut self) -> Result<bool, EditorError> {
        self.ensure_idle()?;
        Ok(self.history.undo().is_some())
    }

    pub fn redo(&mut self) -> Result<bool, EditorError> {
        self.ensure_idle()?;
        Ok(self.history.redo().is_some())
    }

    /// Collapses the document to the original upload as a new history entry.
    pub fn reset_to_original(&mut self) -> Result<(), EditorError> {
        self.commit_transform(|s| Ok(s.truncate_to_base()))
    }

    /// Commits a copy of the current snapshot with `id` shown or hidden.
    /// An unknown id commits an identical snapshot.
    pub fn toggle_visibility(&mut self, id: LayerId) -> Result<(), EditorError> {
        self.commit_transform(|s| Ok(s.toggle_visibility(id)))
    }

    pub fn set_opacity(&mut self, id: LayerId, opacity: i32) -> Result<(), EditorError> {
        self.commit_transform(|s| Ok(s.set_opacity(id, opacity)))
    }

    pub fn reorder_layers(&mut self, from: usize, to: usize) -> Result<(), EditorError> {
        self.commit_transform(|s| s.reorder(from, to))
    }

    /// Flattens the displayed stack into one PNG. Never touches history.
    pub fn export(&self) -> Result<ImageBlob, EditorError> {
        let current = self.current().ok_or(EditorError::NoImageLoaded)?;
        Ok(raster::flatten(current.layers())?)
    }

    pub fn current(&self) -> Option<&LayerStack> {
        self.history.current().filter(|s| !s.is_empty())
    }

    pub fn current_image(&self) -> Option<&ImageBlob> {
        self.current().and_then(LayerStack::current_image)
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn status(&self) -> EditorStatus {
        match &self.busy {
            Some((ticket, _)) => EditorStatus::Busy { ticket: *ticket },
            None => EditorStatus::Idle,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_some()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.last_error = None;
    }

    fn ensure_idle(&self) -> Result<(), EditorError> {
        if self.busy.is_some() {
            return Err(EditorError::Busy);
        }
        Ok(())
    }

    fn top_image(&mut self) -> Result<ImageBlob, EditorError> {
        if let Some(image) = self.current_image().cloned() {
            return Ok(image);
        }
        Err(self.record(EditorError::NoImageLoaded))
    }

    fn enter_busy(&mut self, base: ImageBlob, work: EditWork) -> PendingEdit {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.busy = Some((ticket, work.clone()));
        self.last_error = None;
        tracing::debug!(ticket, "edit started");
        PendingEdit { ticket, base, work }
    }

    fn record(&mut self, err: EditorError) -> EditorError {
        self.last_error = Some(err.to_string());
        err
    }

    /// Applies `f` to the current snapshot and commits the result. Every
    /// successful transform drops the redo future, even when nothing changed.
    fn commit_transform(
        &mut self,
        f: impl FnOnce(&LayerStack) -> Result<LayerStack, LayerError>,
    ) -> Result<(), EditorError> {
        self.ensure_idle()?;
        let current = self.current().ok_or(EditorError::NoImageLoaded)?;
        let next = f(current)?;

        self.history.commit(next);
        tracing::debug!(cursor = ?self.history.cursor(), "layer stack updated");
        Ok(())
    }
}
