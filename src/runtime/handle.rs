use std::{future::Future, sync::Arc};

use thiserror::Error;
use tokio::{
    sync::{Mutex, broadcast, mpsc, oneshot},
    task::AbortHandle,
    time::Duration,
};

use crate::{
    ai::{AiCollaborator, AiResult, dispatch::run_edit},
    config::EditorConfig,
    core::{
        editor::{Editor, EditorError, PendingEdit},
        history::EditorState,
        layers::LayerStack,
    },
    edit::{EditRequest, EditWork},
    persist::{PersistError, PersistResult, StateStore, load_or_none},
    raster::{self, RasterError},
    types::{CropRect, Detection, ImageBlob, LayerId, Ticket},
};

use super::events::EditorEvent;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Editor(#[from] EditorError),
    #[error("editor runtime is not running")]
    ChannelClosed,
}

impl From<PersistError> for RuntimeError {
    fn from(value: PersistError) -> Self {
        Self::Editor(value.into())
    }
}

/// Point-in-time view of the editor for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorView {
    pub layers: Option<LayerStack>,
    pub cursor: Option<usize>,
    pub history_len: usize,
    pub can_undo: bool,
    pub can_redo: bool,
    pub busy: bool,
    pub error: Option<String>,
}

/// Cloneable handle to a running editor loop.
#[derive(Clone)]
pub struct EditorHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<EditorEvent>,
}

type Reply<T> = oneshot::Sender<Result<T, RuntimeError>>;

enum Command {
    Upload {
        image: ImageBlob,
        resp: Reply<LayerId>,
    },
    Generate {
        request: EditRequest,
        resp: Reply<LayerId>,
    },
    Crop {
        rect: CropRect,
        resp: Reply<LayerId>,
    },
    Cancel {
        resp: oneshot::Sender<bool>,
    },
    Undo {
        resp: Reply<bool>,
    },
    Redo {
        resp: Reply<bool>,
    },
    ResetToOriginal {
        resp: Reply<()>,
    },
    ToggleVisibility {
        id: LayerId,
        resp: Reply<()>,
    },
    SetOpacity {
        id: LayerId,
        opacity: i32,
        resp: Reply<()>,
    },
    Reorder {
        from: usize,
        to: usize,
        resp: Reply<()>,
    },
    Clear {
        resp: Reply<()>,
    },
    View {
        resp: oneshot::Sender<EditorView>,
    },
    DismissError {
        resp: oneshot::Sender<()>,
    },
    Export {
        resp: Reply<ImageBlob>,
    },
    DetectFaces {
        resp: Reply<Vec<Detection>>,
    },
    DetectPeople {
        resp: Reply<Vec<Detection>>,
    },
    Suggestions {
        resp: Reply<Vec<String>>,
    },
    Flush {
        resp: Reply<()>,
    },
    Shutdown {
        resp: Reply<()>,
    },
}

enum PersistMsg {
    Save(EditorState),
    Clear,
    Flush {
        resp: oneshot::Sender<PersistResult<()>>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

struct Completion {
    ticket: Ticket,
    outcome: Result<ImageBlob, EditorError>,
}

struct Inflight {
    ticket: Ticket,
    abort: AbortHandle,
    resp: Reply<LayerId>,
}

type SharedStore = Arc<Mutex<Box<dyn StateStore>>>;

/// Spawns the editor loop, restoring from `store` when one is given.
///
/// Must be called from within a tokio runtime.
pub fn spawn_editor<A: AiCollaborator>(
    ai: A,
    store: Option<Box<dyn StateStore>>,
    config: EditorConfig,
) -> EditorHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(config.command_queue_bound);
    let (events_tx, _) = broadcast::channel::<EditorEvent>(config.event_buffer);
    let events_tx_loop = events_tx.clone();

    tokio::spawn(async move {
        let (editor, persist_tx) = match store {
            Some(store) => match restore(store, config.history_limit).await {
                Some((store, editor)) => {
                    let (tx, rx) = mpsc::channel::<PersistMsg>(config.persist_queue_bound);
                    spawn_persistence_worker(store, rx, events_tx_loop.clone());
                    (editor, Some(tx))
                }
                None => (Editor::with_history_limit(config.history_limit), None),
            },
            None => (Editor::with_history_limit(config.history_limit), None),
        };

        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();
        let mut state = LoopState {
            editor,
            ai: Arc::new(ai),
            config,
            events_tx: events_tx_loop,
            persist_tx,
            done_tx,
            inflight: None,
        };

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break; };
                    if state.handle_command(cmd).await {
                        break;
                    }
                }
                Some(done) = done_rx.recv() => {
                    state.handle_completion(done);
                }
            }
        }

        state.abort_inflight();
    });

    EditorHandle { cmd_tx, events_tx }
}

impl EditorHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<EditorEvent> {
        self.events_tx.subscribe()
    }

    /// Starts a new document from `image`.
    pub async fn upload(&self, image: ImageBlob) -> Result<LayerId, RuntimeError> {
        self.request(|resp| Command::Upload { image, resp }).await?
    }

    /// Runs an AI edit and waits for it to commit, fail or be cancelled.
    pub async fn generate(&self, request: EditRequest) -> Result<LayerId, RuntimeError> {
        self.request(|resp| Command::Generate { request, resp }).await?
    }

    pub async fn crop(&self, rect: CropRect) -> Result<LayerId, RuntimeError> {
        self.request(|resp| Command::Crop { rect, resp }).await?
    }

    /// Cancels the in-flight edit. Returns whether one was running.
    pub async fn cancel(&self) -> Result<bool, RuntimeError> {
        self.request(|resp| Command::Cancel { resp }).await
    }

    pub async fn undo(&self) -> Result<bool, RuntimeError> {
        self.request(|resp| Command::Undo { resp }).await?
    }

    pub async fn redo(&self) -> Result<bool, RuntimeError> {
        self.request(|resp| Command::Redo { resp }).await?
    }

    pub async fn reset_to_original(&self) -> Result<(), RuntimeError> {
        self.request(|resp| Command::ResetToOriginal { resp }).await?
    }

    pub async fn toggle_visibility(&self, id: LayerId) -> Result<(), RuntimeError> {
        self.request(|resp| Command::ToggleVisibility { id, resp }).await?
    }

    pub async fn set_opacity(&self, id: LayerId, opacity: i32) -> Result<(), RuntimeError> {
        self.request(|resp| Command::SetOpacity { id, opacity, resp })
            .await?
    }

    pub async fn reorder(&self, from: usize, to: usize) -> Result<(), RuntimeError> {
        self.request(|resp| Command::Reorder { from, to, resp }).await?
    }

    /// Discards the document and its stored copy.
    pub async fn clear(&self) -> Result<(), RuntimeError> {
        self.request(|resp| Command::Clear { resp }).await?
    }

    pub async fn view(&self) -> Result<EditorView, RuntimeError> {
        self.request(|resp| Command::View { resp }).await
    }

    pub async fn dismiss_error(&self) -> Result<(), RuntimeError> {
        self.request(|resp| Command::DismissError { resp }).await
    }

    /// Flattens the displayed stack into a PNG.
    pub async fn export(&self) -> Result<ImageBlob, RuntimeError> {
        self.request(|resp| Command::Export { resp }).await?
    }

    pub async fn detect_faces(&self) -> Result<Vec<Detection>, RuntimeError> {
        self.request(|resp| Command::DetectFaces { resp }).await?
    }

    pub async fn detect_people(&self) -> Result<Vec<Detection>, RuntimeError> {
        self.request(|resp| Command::DetectPeople { resp }).await?
    }

    pub async fn suggestions(&self) -> Result<Vec<String>, RuntimeError> {
        self.request(|resp| Command::Suggestions { resp }).await?
    }

    /// Waits until every queued save has reached the store.
    pub async fn flush(&self) -> Result<(), RuntimeError> {
        self.request(|resp| Command::Flush { resp }).await?
    }

    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.request(|resp| Command::Shutdown { resp }).await?
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }
}

struct LoopState<A: AiCollaborator> {
    editor: Editor,
    ai: Arc<A>,
    config: EditorConfig,
    events_tx: broadcast::Sender<EditorEvent>,
    persist_tx: Option<mpsc::Sender<PersistMsg>>,
    done_tx: mpsc::UnboundedSender<Completion>,
    inflight: Option<Inflight>,
}

impl<A: AiCollaborator> LoopState<A> {
    async fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Upload { image, resp } => {
                let res = self.editor.upload(image);
                if let Ok(id) = &res {
                    self.emit(EditorEvent::Uploaded { id: *id });
                    self.persist();
                }
                let _ = resp.send(res.map_err(RuntimeError::from));
            }
            Command::Generate { request, resp } => {
                let begun = self.editor.begin_edit(request);
                self.start(begun, resp);
            }
            Command::Crop { rect, resp } => {
                let begun = self.editor.begin_crop(rect);
                self.start(begun, resp);
            }
            Command::Cancel { resp } => {
                let _ = resp.send(self.cancel_inflight());
            }
            Command::Undo { resp } => {
                let res = self.editor.undo();
                if let (Ok(true), Some(cursor)) = (&res, self.editor.history().cursor()) {
                    self.emit(EditorEvent::UndoApplied { cursor });
                    self.persist();
                }
                let _ = resp.send(res.map_err(RuntimeError::from));
            }
            Command::Redo { resp } => {
                let res = self.editor.redo();
                if let (Ok(true), Some(cursor)) = (&res, self.editor.history().cursor()) {
                    self.emit(EditorEvent::RedoApplied { cursor });
                    self.persist();
                }
                let _ = resp.send(res.map_err(RuntimeError::from));
            }
            Command::ResetToOriginal { resp } => {
                let res = self.editor.reset_to_original();
                self.after_transform(&res, EditorEvent::ResetToOriginal);
                let _ = resp.send(res.map_err(RuntimeError::from));
            }
            Command::ToggleVisibility { id, resp } => {
                let res = self.editor.toggle_visibility(id);
                self.after_transform(&res, EditorEvent::LayersChanged);
                let _ = resp.send(res.map_err(RuntimeError::from));
            }
            Command::SetOpacity { id, opacity, resp } => {
                let res = self.editor.set_opacity(id, opacity);
                self.after_transform(&res, EditorEvent::LayersChanged);
                let _ = resp.send(res.map_err(RuntimeError::from));
            }
            Command::Reorder { from, to, resp } => {
                let res = self.editor.reorder_layers(from, to);
                self.after_transform(&res, EditorEvent::LayersChanged);
                let _ = resp.send(res.map_err(RuntimeError::from));
            }
            Command::Clear { resp } => {
                let res = self.editor.clear();
                if res.is_ok() {
                    self.emit(EditorEvent::Cleared);
                    self.enqueue(PersistMsg::Clear);
                }
                let _ = resp.send(res.map_err(RuntimeError::from));
            }
            Command::View { resp } => {
                let _ = resp.send(self.view());
            }
            Command::DismissError { resp } => {
                self.editor.dismiss_error();
                let _ = resp.send(());
            }
            Command::Export { resp } => {
                let Some(stack) = self.editor.current().cloned() else {
                    let _ = resp.send(Err(EditorError::NoImageLoaded.into()));
                    return false;
                };
                tokio::spawn(async move {
                    let res = tokio::task::spawn_blocking(move || raster::flatten(stack.layers()))
                        .await
                        .map_err(|e| RasterError::Encode(format!("export task failed: {e}")))
                        .and_then(|r| r)
                        .map_err(|e| RuntimeError::from(EditorError::from(e)));
                    let _ = resp.send(res);
                });
            }
            Command::DetectFaces { resp } => {
                self.read_only_call(resp, |ai, image| async move { ai.detect_faces(image).await });
            }
            Command::DetectPeople { resp } => {
                self.read_only_call(resp, |ai, image| async move { ai.detect_people(image).await });
            }
            Command::Suggestions { resp } => {
                self.read_only_call(resp, |ai, image| async move {
                    ai.generate_suggestions(image).await
                });
            }
            Command::Flush { resp } => {
                let out = match &self.persist_tx {
                    Some(tx) => {
                        let (flush_tx, flush_rx) = oneshot::channel();
                        if tx.send(PersistMsg::Flush { resp: flush_tx }).await.is_err() {
                            Err(RuntimeError::ChannelClosed)
                        } else {
                            flush_rx
                                .await
                                .map_err(|_| RuntimeError::ChannelClosed)
                                .and_then(|r| r.map_err(RuntimeError::from))
                        }
                    }
                    None => Ok(()),
                };
                let _ = resp.send(out);
            }
            Command::Shutdown { resp } => {
                self.abort_inflight();
                let out = match &self.persist_tx {
                    Some(tx) => {
                        let (done_tx, done_rx) = oneshot::channel();
                        if tx.send(PersistMsg::Shutdown { resp: done_tx }).await.is_err() {
                            Err(RuntimeError::ChannelClosed)
                        } else {
                            done_rx.await.map_err(|_| RuntimeError::ChannelClosed)
                        }
                    }
                    None => Ok(()),
                };
                let _ = resp.send(out);
                return true;
            }
        }

        false
    }

    /// Spawns the work of a begun edit, or reports why it could not begin.
    fn start(&mut self, begun: Result<PendingEdit, EditorError>, resp: Reply<LayerId>) {
        let pending = match begun {
            Ok(pending) => pending,
            Err(err) => {
                if err != EditorError::Busy {
                    self.emit(EditorEvent::EditFailed {
                        message: err.to_string(),
                    });
                }
                let _ = resp.send(Err(err.into()));
                return;
            }
        };

        let ticket = pending.ticket;
        let ai = Arc::clone(&self.ai);
        let done_tx = self.done_tx.clone();
        let timeout = self.config.ai_timeout();

        let task = tokio::spawn(async move {
            let outcome = match tokio::time::timeout(timeout, perform(ai, pending)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(EditorError::AiTransportFailure(format!(
                    "The request timed out after {} ms.",
                    timeout.as_millis()
                ))),
            };
            let _ = done_tx.send(Completion { ticket, outcome });
        });

        self.inflight = Some(Inflight {
            ticket,
            abort: task.abort_handle(),
            resp,
        });
        self.emit(EditorEvent::EditStarted { ticket });
    }

    fn handle_completion(&mut self, done: Completion) {
        let Completion { ticket, outcome } = done;
        let res = self.editor.complete(ticket, outcome);
        if res == Err(EditorError::Cancelled) {
            tracing::debug!(ticket, "late edit result discarded");
            return;
        }

        match &res {
            Ok(id) => {
                self.emit(EditorEvent::LayerAdded { id: *id });
                self.persist();
            }
            Err(err) => {
                let message = self
                    .editor
                    .last_error()
                    .map(str::to_string)
                    .unwrap_or_else(|| err.to_string());
                self.emit(EditorEvent::EditFailed { message });
            }
        }

        if let Some(inflight) = self.inflight.take_if(|i| i.ticket == ticket) {
            let _ = inflight.resp.send(res.map_err(RuntimeError::from));
        }
    }

    fn cancel_inflight(&mut self) -> bool {
        let Some(inflight) = self.inflight.take() else {
            return false;
        };

        inflight.abort.abort();
        self.editor.cancel();
        let _ = inflight.resp.send(Err(EditorError::Cancelled.into()));
        self.emit(EditorEvent::EditCancelled {
            ticket: inflight.ticket,
        });
        true
    }

    fn abort_inflight(&mut self) {
        if self.cancel_inflight() {
            tracing::info!("in-flight edit aborted on shutdown");
        }
    }

    fn read_only_call<T, F, Fut>(&self, resp: Reply<T>, call: F)
    where
        T: Send + 'static,
        F: FnOnce(Arc<A>, ImageBlob) -> Fut + Send + 'static,
        Fut: Future<Output = AiResult<T>> + Send + 'static,
    {
        let Some(image) = self.editor.current_image().cloned() else {
            let _ = resp.send(Err(EditorError::NoImageLoaded.into()));
            return;
        };

        let ai = Arc::clone(&self.ai);
        let timeout = self.config.ai_timeout();
        tokio::spawn(async move {
            let _ = resp.send(with_timeout(timeout, call(ai, image)).await);
        });
    }

    fn after_transform(&self, res: &Result<(), EditorError>, event: EditorEvent) {
        if res.is_ok() {
            self.emit(event);
            self.persist();
        }
    }

    fn view(&self) -> EditorView {
        let history = self.editor.history();
        EditorView {
            layers: self.editor.current().cloned(),
            cursor: history.cursor(),
            history_len: history.len(),
            can_undo: self.editor.can_undo(),
            can_redo: self.editor.can_redo(),
            busy: self.editor.is_busy(),
            error: self.editor.last_error().map(str::to_string),
        }
    }

    fn persist(&self) {
        self.enqueue(PersistMsg::Save(self.editor.state()));
    }

    fn enqueue(&self, msg: PersistMsg) {
        let Some(tx) = &self.persist_tx else {
            return;
        };
        if let Err(err) = tx.try_send(msg) {
            tracing::warn!(error = %err, "persist queue rejected editor state");
            self.emit(EditorEvent::PersistFailed {
                message: format!("persist queue error: {err}"),
            });
        }
    }

    fn emit(&self, event: EditorEvent) {
        let _ = self.events_tx.send(event);
    }
}

async fn perform<A: AiCollaborator>(
    ai: Arc<A>,
    pending: PendingEdit,
) -> Result<ImageBlob, EditorError> {
    let PendingEdit { base, work, .. } = pending;
    match work {
        EditWork::Ai(request) => run_edit(ai.as_ref(), base, request)
            .await
            .map_err(EditorError::from),
        EditWork::Crop(rect) => tokio::task::spawn_blocking(move || raster::crop(&base, rect))
            .await
            .map_err(|e| RasterError::Encode(format!("crop task failed: {e}")))
            .and_then(|r| r)
            .map_err(EditorError::from),
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    fut: impl Future<Output = AiResult<T>>,
) -> Result<T, RuntimeError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(res) => res.map_err(|e| EditorError::from(e).into()),
        Err(_) => Err(EditorError::AiTransportFailure(format!(
            "The request timed out after {} ms.",
            timeout.as_millis()
        ))
        .into()),
    }
}

/// Loads stored state off the async threads. Returns `None` when the store
/// could not even be consulted.
async fn restore(
    store: Box<dyn StateStore>,
    history_limit: Option<usize>,
) -> Option<(Box<dyn StateStore>, Editor)> {
    let loaded = tokio::task::spawn_blocking(move || {
        let state = load_or_none(&*store);
        (store, state)
    })
    .await;

    let (store, state) = match loaded {
        Ok(pair) => pair,
        Err(err) => {
            tracing::warn!(error = %err, "state store load task failed, running without persistence");
            return None;
        }
    };

    let editor = match state {
        Some(state) => Editor::restore(state, history_limit).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "stored editor state rejected, starting empty");
            Editor::with_history_limit(history_limit)
        }),
        None => Editor::with_history_limit(history_limit),
    };
    if let Some(cursor) = editor.history().cursor() {
        tracing::info!(cursor, entries = editor.history().len(), "editor state restored");
    }

    Some((store, editor))
}

fn spawn_persistence_worker(
    store: Box<dyn StateStore>,
    mut rx: mpsc::Receiver<PersistMsg>,
    events_tx: broadcast::Sender<EditorEvent>,
) {
    let store: SharedStore = Arc::new(Mutex::new(store));
    tokio::spawn(async move {
        loop {
            let Some(msg) = rx.recv().await else {
                let _ = blocking(&store, |s| s.flush()).await;
                break;
            };

            match msg {
                PersistMsg::Save(state) => {
                    let res = blocking(&store, move |s| s.save(&state)).await;
                    report(&events_tx, "save", res);
                }
                PersistMsg::Clear => {
                    let res = blocking(&store, |s| s.clear()).await;
                    report(&events_tx, "clear", res);
                }
                PersistMsg::Flush { resp } => {
                    let _ = resp.send(blocking(&store, |s| s.flush()).await);
                }
                PersistMsg::Shutdown { resp } => {
                    if let Err(err) = blocking(&store, |s| s.flush()).await {
                        tracing::warn!(error = %err, "final flush failed");
                    }
                    let _ = resp.send(());
                    break;
                }
            }
        }
    });
}

async fn blocking<T, F>(store: &SharedStore, f: F) -> PersistResult<T>
where
    T: Send + 'static,
    F: FnOnce(&mut Box<dyn StateStore>) -> PersistResult<T> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || {
        let mut guard = store.blocking_lock();
        f(&mut *guard)
    })
    .await
    .map_err(|e| PersistError::Message(format!("join error: {e}")))?
}

fn report(events_tx: &broadcast::Sender<EditorEvent>, what: &'static str, res: PersistResult<()>) {
    match res {
        Ok(()) => {
            let _ = events_tx.send(EditorEvent::Saved);
        }
        Err(err) => {
            tracing::warn!(op = what, error = %err, "persisting editor state failed");
            let _ = events_tx.send(EditorEvent::PersistFailed {
                message: err.to_string(),
            });
        }
    }
}
