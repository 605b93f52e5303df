use std::future::Future;

use thiserror::Error;

use crate::types::{Detection, ImageBlob, Targeting};

/// Failure reported by the collaborator.
///
/// `Display` renders the reason shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AiError {
    #[error("Request was blocked. Reason: {reason}.")]
    PolicyBlocked { reason: String },
    #[error("Image generation stopped unexpectedly. Reason: {reason}. This often relates to safety settings.")]
    UnexpectedStop { reason: String },
    #[error("The AI model did not return a usable result. {detail}")]
    NoResult { detail: String },
    #[error("The AI service could not be reached: {0}")]
    Transport(String),
}

pub type AiResult<T> = Result<T, AiError>;

/// Image-in, image-out generative service plus its detection helpers.
///
/// Implementations must keep the input's resolution and format conventions.
/// Every call takes owned inputs so it can run on a spawned task.
pub trait AiCollaborator: Send + Sync + 'static {
    fn generate_edit(
        &self,
        image: ImageBlob,
        instruction: String,
        targeting: Option<Targeting>,
    ) -> impl Future<Output = AiResult<ImageBlob>> + Send;

    fn generate_filter(
        &self,
        image: ImageBlob,
        instruction: String,
    ) -> impl Future<Output = AiResult<ImageBlob>> + Send;

    fn generate_background_change(
        &self,
        image: ImageBlob,
        instruction: String,
        people_to_exclude: Vec<Detection>,
    ) -> impl Future<Output = AiResult<ImageBlob>> + Send;

    fn detect_faces(&self, image: ImageBlob) -> impl Future<Output = AiResult<Vec<Detection>>> + Send;

    fn detect_people(&self, image: ImageBlob) -> impl Future<Output = AiResult<Vec<Detection>>> + Send;

    fn generate_suggestions(&self, image: ImageBlob) -> impl Future<Output = AiResult<Vec<String>>> + Send;
}
