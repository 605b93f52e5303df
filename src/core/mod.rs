//! In-memory edit engine: layer stacks, history, display handles and the
//! orchestrating state machine.

/// Orchestrating edit state machine.
pub mod editor;
/// Display-handle lifecycle for rendering layers.
pub mod handles;
/// Linear undo/redo snapshot log.
pub mod history;
/// Ordered layer stack and its pure transforms.
pub mod layers;
