//! Runtime configuration.

use tokio::time::Duration;

/// Tuning knobs for [`crate::runtime::handle::spawn_editor`].
#[derive(Debug, Clone)]
pub struct EditorConfig {
    /// Upper bound on one collaborator call or crop before it fails.
    pub ai_timeout_ms: u64,
    /// Capacity of the command channel into the editor loop.
    pub command_queue_bound: usize,
    /// Capacity of the broadcast event channel.
    pub event_buffer: usize,
    /// Capacity of the save queue into the persistence worker.
    pub persist_queue_bound: usize,
    /// Keep at most this many history entries; `None` keeps all.
    pub history_limit: Option<usize>,
}

impl EditorConfig {
    pub fn ai_timeout(&self) -> Duration {
        Duration::from_millis(self.ai_timeout_ms)
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            ai_timeout_ms: 60_000,
            command_queue_bound: 256,
            event_buffer: 1024,
            persist_queue_bound: 64,
            history_limit: None,
        }
    }
}
