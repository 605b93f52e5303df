//! Durable editor-state adapter.

/// Versioned on-disk record shapes.
pub mod record;
/// SQLite implementation.
pub mod sqlite;

use thiserror::Error;

use crate::core::{editor::EditorError, history::EditorState};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("corrupt editor state: {0}")]
    Corrupt(String),
    #[error("{0}")]
    Message(String),
}

impl From<PersistError> for EditorError {
    fn from(value: PersistError) -> Self {
        Self::PersistenceUnavailable(value.to_string())
    }
}

pub type PersistResult<T> = Result<T, PersistError>;

/// Stores the single `(history, history_index)` record of the editor.
pub trait StateStore: Send {
    fn load(&self) -> PersistResult<Option<EditorState>>;
    fn save(&mut self, state: &EditorState) -> PersistResult<()>;
    fn clear(&mut self) -> PersistResult<()>;
    fn flush(&mut self) -> PersistResult<()> {
        Ok(())
    }
}

/// Loads the stored state, treating any failure as "nothing stored".
pub fn load_or_none(store: &dyn StateStore) -> Option<EditorState> {
    match store.load() {
        Ok(state) => state,
        Err(err) => {
            tracing::warn!(error = %err, "stored editor state unavailable, starting empty");
            None
        }
    }
}
