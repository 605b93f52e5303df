//! External generative-AI collaborator boundary.

/// Routing of edit requests onto collaborator calls.
pub mod dispatch;
/// Collaborator trait and its error shape.
pub mod traits;

pub use traits::{AiCollaborator, AiError, AiResult};
