use thiserror::Error;

use super::layers::LayerStack;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("history cursor {cursor:?} does not fit {len} entries")]
    CursorOutOfBounds { cursor: Option<usize>, len: usize },
    #[error("history entry {0} has no original layer")]
    MissingBase(usize),
}

/// The durable `(entries, cursor)` pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditorState {
    pub history: Vec<LayerStack>,
    pub history_index: Option<usize>,
}

/// Linear undo/redo log of layer-stack snapshots.
///
/// `cursor` is `None` exactly when the log is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryLog {
    entries: Vec<LayerStack>,
    cursor: Option<usize>,
    limit: Option<usize>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log that keeps at most `limit` entries, pruning the oldest.
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            limit: limit.map(|n| n.max(1)),
            ..Self::default()
        }
    }

    /// Rebuilds a log from persisted parts, checking every invariant.
    pub fn from_parts(
        entries: Vec<LayerStack>,
        cursor: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Self, HistoryError> {
        let len = entries.len();
        let cursor_ok = match cursor {
            None => len == 0,
            Some(c) => c < len,
        };
        if !cursor_ok {
            return Err(HistoryError::CursorOutOfBounds { cursor, len });
        }

        if let Some(idx) = entries
            .iter()
            .position(|e| e.original().is_none())
        {
            return Err(HistoryError::MissingBase(idx));
        }

        let mut log = Self {
            entries,
            cursor,
            limit: limit.map(|n| n.max(1)),
        };
        log.prune();
        Ok(log)
    }

    /// Drops the redo future, appends `snapshot` and moves the cursor onto it.
    pub fn commit(&mut self, snapshot: LayerStack) -> &LayerStack {
        let keep = self.cursor.map_or(0, |c| c + 1);
        self.entries.truncate(keep);
        self.entries.push(snapshot);
        self.cursor = Some(self.entries.len() - 1);
        self.prune();
        &self.entries[self.entries.len() - 1]
    }

    /// Steps the cursor back one entry. `None` at the oldest entry.
    pub fn undo(&mut self) -> Option<&LayerStack> {
        let cursor = self.cursor.filter(|c| *c > 0)?;
        self.cursor = Some(cursor - 1);
        self.entries.get(cursor - 1)
    }

    /// Steps the cursor forward one entry. `None` at the tip.
    pub fn redo(&mut self) -> Option<&LayerStack> {
        let cursor = self.cursor.filter(|c| c + 1 < self.entries.len())?;
        self.cursor = Some(cursor + 1);
        self.entries.get(cursor + 1)
    }

    /// Empties the log.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.cursor = None;
    }

    pub fn current(&self) -> Option<&LayerStack> {
        self.cursor.and_then(|c| self.entries.get(c))
    }

    pub fn can_undo(&self) -> bool {
        self.cursor.is_some_and(|c| c > 0)
    }

    pub fn can_redo(&self) -> bool {
        self.cursor.is_some_and(|c| c + 1 < self.entries.len())
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn entries(&self) -> &[LayerStack] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn from_state(state: EditorState, limit: Option<usize>) -> Result<Self, HistoryError> {
        Self::from_parts(state.history, state.history_index, limit)
    }

    pub fn export_state(&self) -> EditorState {
        EditorState {
            history: self.entries.clone(),
            history_index: self.cursor,
        }
    }

    fn prune(&mut self) {
        let Some(limit) = self.limit else {
            return;
        };
        // never prune the entry under the cursor
        let excess = self
            .entries
            .len()
            .saturating_sub(limit)
            .min(self.cursor.unwrap_or(0));
        if excess == 0 {
            return;
        }

        self.entries.drain(..excess);
        self.cursor = self.cursor.map(|c| c.saturating_sub(excess));
    }
}
