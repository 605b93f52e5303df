//! Layered, non-destructive edit history for an AI-assisted photo editor.
//!
//! Every successful edit appends an immutable layer to a new snapshot of the
//! layer stack; snapshots form a linear undo/redo history that can be stored
//! durably and restored on the next start.
//!
//! # Examples
//!
//! In-memory usage with [`core::editor::Editor`]:
//! ```
//! use pixshop::{
//!     core::editor::{Editor, EditorError},
//!     edit::EditRequest,
//!     types::ImageBlob,
//! };
//!
//! let mut editor = Editor::new();
//! let original = editor.upload(ImageBlob::png(vec![0x89, b'P', b'N', b'G'])).expect("upload");
//! assert_eq!(editor.current().expect("stack").base().map(|l| l.id), Some(original));
//!
//! let err = editor.begin_edit(EditRequest::generative("   ")).unwrap_err();
//! assert_eq!(err, EditorError::EmptyInstruction);
//! assert!(!editor.is_busy());
//! assert!(!editor.can_undo());
//! ```
//!
//! Runtime usage with a SQLite store:
//! ```no_run
//! use pixshop::{
//!     ai::{AiCollaborator, AiResult},
//!     config::EditorConfig,
//!     edit::EditRequest,
//!     persist::sqlite::SqliteStateStore,
//!     runtime::handle::spawn_editor,
//!     types::{Detection, ImageBlob, Targeting},
//! };
//!
//! struct Echo;
//!
//! impl AiCollaborator for Echo {
//!     async fn generate_edit(&self, image: ImageBlob, _: String, _: Option<Targeting>) -> AiResult<ImageBlob> { Ok(image) }
//!     async fn generate_filter(&self, image: ImageBlob, _: String) -> AiResult<ImageBlob> { Ok(image) }
//!     async fn generate_background_change(&self, image: ImageBlob, _: String, _: Vec<Detection>) -> AiResult<ImageBlob> { Ok(image) }
//!     async fn detect_faces(&self, _: ImageBlob) -> AiResult<Vec<Detection>> { Ok(vec![]) }
//!     async fn detect_people(&self, _: ImageBlob) -> AiResult<Vec<Detection>> { Ok(vec![]) }
//!     async fn generate_suggestions(&self, _: ImageBlob) -> AiResult<Vec<String>> { Ok(vec![]) }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store = SqliteStateStore::open("pixshop.db").expect("open sqlite");
//! let handle = spawn_editor(Echo, Some(Box::new(store)), EditorConfig::default());
//! handle.upload(ImageBlob::png(std::fs::read("photo.png").expect("read"))).await.expect("upload");
//! handle.generate(EditRequest::generative("add a hat")).await.expect("generate");
//! handle.undo().await.expect("undo");
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```

/// Generative collaborator contract and request routing.
pub mod ai;
/// Runtime tuning knobs.
pub mod config;
/// History, layer stacks, the edit orchestrator and display handles.
pub mod core;
/// Edit requests issued by the tool panels.
pub mod edit;
/// Immutable layer records.
pub mod layer;
/// Persistence abstraction and SQLite implementation.
pub mod persist;
/// Crop and flatten on decoded rasters.
pub mod raster;
/// Single-writer runtime handle and events.
pub mod runtime;
/// Shared primitive types.
pub mod types;
