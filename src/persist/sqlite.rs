//! SQLite-backed editor-state store.
//!
//! Each immutable layer is written once to `layers`; history snapshots in
//! `editor_state` refer to layers by id with their per-snapshot display state.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use hashbrown::{HashMap, HashSet};
use rusqlite::{Connection, OptionalExtension, params};

use crate::{
    core::{history::EditorState, layers::LayerStack},
    layer::{Layer, LayerKind, MAX_OPACITY},
    types::{ImageBlob, LayerId},
};

use super::{
    PersistError, PersistResult, StateStore,
    record::{STATE_FORMAT_VERSION, STATE_KEY, StoredState, StoredStateEnvelope},
};

/// Immutable part of a layer as stored in the `layers` table.
struct LayerRow {
    name: String,
    image: ImageBlob,
    kind: LayerKind,
}

/// SQLite implementation of [`crate::persist::StateStore`].
pub struct SqliteStateStore {
    conn: Connection,
}

impl SqliteStateStore {
    /// Opens or creates a store at `path`.
    ///
    /// Enables WAL mode and sets `synchronous=NORMAL`.
    pub fn open(path: impl AsRef<Path>) -> PersistResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(conn)
    }

    /// Opens an in-memory store.
    pub fn open_in_memory() -> PersistResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn)
    }

    fn init_connection(conn: Connection) -> PersistResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self { conn })
    }

    /// Number of distinct layers currently stored.
    pub fn layer_count(&self) -> PersistResult<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM layers", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    fn load_envelope(&self) -> PersistResult<Option<StoredStateEnvelope>> {
        let payload: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT payload FROM editor_state WHERE key = ?1",
                params![STATE_KEY],
                |row| row.get(0),
            )
            .optional()?;

        let Some(payload) = payload else {
            return Ok(None);
        };

        let env: StoredStateEnvelope = serde_json::from_slice(&payload)?;
        if env.format_version != STATE_FORMAT_VERSION {
            return Err(PersistError::Corrupt(format!(
                "unsupported state format version: {}",
                env.format_version
            )));
        }
        Ok(Some(env))
    }

    fn load_layer_row(&self, id: LayerId) -> PersistResult<LayerRow> {
        let row: Option<(String, String, String, Vec<u8>)> = self
            .conn
            .query_row(
                "SELECT name, mime, kind, bytes FROM layers WHERE id = ?1",
                params![id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let Some((name, mime, kind, bytes)) = row else {
            return Err(PersistError::Corrupt(format!("missing layer {id}")));
        };

        Ok(LayerRow {
            name,
            image: ImageBlob::new(mime, bytes),
            kind: serde_json::from_str(&kind)?,
        })
    }
}

impl StateStore for SqliteStateStore {
    fn load(&self) -> PersistResult<Option<EditorState>> {
        let Some(env) = self.load_envelope()? else {
            return Ok(None);
        };

        let mut rows: HashMap<LayerId, LayerRow> = HashMap::new();
        let mut history = Vec::with_capacity(env.state.history.len());

        for refs in env.state.history {
            let mut layers = Vec::with_capacity(refs.len());
            for r in refs {
                if r.opacity > MAX_OPACITY {
                    return Err(PersistError::Corrupt(format!(
                        "layer {} has opacity {}",
                        r.id, r.opacity
                    )));
                }
                if !rows.contains_key(&r.id) {
                    let row = self.load_layer_row(r.id)?;
                    rows.insert(r.id, row);
                }
                let row = &rows[&r.id];
                layers.push(Layer {
                    id: r.id,
                    name: row.name.clone(),
                    image: row.image.clone(),
                    is_visible: r.is_visible,
                    opacity: r.opacity,
                    kind: row.kind.clone(),
                });
            }
            history.push(LayerStack::from_layers(layers));
        }

        Ok(Some(EditorState {
            history,
            history_index: env.state.history_index,
        }))
    }

    fn save(&mut self, state: &EditorState) -> PersistResult<()> {
        let payload = serde_json::to_vec(&StoredStateEnvelope::new(StoredState::from_state(state)))?;

        let mut referenced: HashSet<LayerId> = HashSet::new();
        let tx = self.conn.transaction()?;
        {
            let mut insert = tx.prepare(
                "INSERT OR IGNORE INTO layers(id, name, mime, kind, bytes) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for layer in state.history.iter().flat_map(|s| s.layers()) {
                if !referenced.insert(layer.id) {
                    continue;
                }
                insert.execute(params![
                    layer.id.to_string(),
                    layer.name,
                    layer.image.mime,
                    serde_json::to_string(&layer.kind)?,
                    &layer.image.bytes[..],
                ])?;
            }

            tx.execute(
                "INSERT OR REPLACE INTO editor_state(key, format_version, ts_ms, payload) VALUES (?1, ?2, ?3, ?4)",
                params![STATE_KEY, STATE_FORMAT_VERSION, now_ms() as i64, payload],
            )?;

            let stored_ids: Vec<String> = {
                let mut stmt = tx.prepare("SELECT id FROM layers")?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                let ids = rows.collect::<Result<Vec<String>, _>>()?;
                ids
            };
            let mut delete = tx.prepare("DELETE FROM layers WHERE id = ?1")?;
            for id in stored_ids {
                let still_used = LayerId::parse_str(&id).is_ok_and(|id| referenced.contains(&id));
                if !still_used {
                    delete.execute(params![id])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn clear(&mut self) -> PersistResult<()> {
        self.conn
            .execute_batch("DELETE FROM editor_state; DELETE FROM layers;")?;
        Ok(())
    }

    fn flush(&mut self) -> PersistResult<()> {
        self.conn.execute_batch("PRAGMA wal_checkpoint(PASSIVE);")?;
        Ok(())
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
