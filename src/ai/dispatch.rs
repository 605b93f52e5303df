use crate::{edit::EditRequest, types::ImageBlob};

use super::traits::{AiCollaborator, AiError, AiResult};

/// Sends `request` against `image` to the matching collaborator call.
///
/// Adjustments and suggestions go through the background-change call with
/// no exclusions. An empty image in the response counts as no result.
pub async fn run_edit<A: AiCollaborator>(
    ai: &A,
    image: ImageBlob,
    request: EditRequest,
) -> AiResult<ImageBlob> {
    let out = match request {
        EditRequest::Generative { prompt, targeting } => {
            ai.generate_edit(image, prompt, targeting).await?
        }
        EditRequest::Filter { prompt } => ai.generate_filter(image, prompt).await?,
        EditRequest::Adjustment { prompt } | EditRequest::Suggestion { prompt } => {
            ai.generate_background_change(image, prompt, Vec::new()).await?
        }
        EditRequest::Background { prompt, exclude } => {
            ai.generate_background_change(image, prompt, exclude).await?
        }
    };

    if out.is_empty() {
        return Err(AiError::NoResult {
            detail: "The response contained an empty image.".to_string(),
        });
    }
    Ok(out)
}
