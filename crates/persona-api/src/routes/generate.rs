use std::sync::Arc;

use axum::Extension;
use tracing::{info, instrument};

use persona_core::Dispatcher;

use crate::{error::ApiResult, types::GenerateForm};

/// `POST /generate`: run one persona chat turn.
///
/// Responds with the decoded text as `text/plain`, prompt included.
#[instrument(
    skip_all,
    fields(model_id = %form.model_id, character = %form.conversation.character_name)
)]
pub async fn generate(
    Extension(dispatcher): Extension<Arc<Dispatcher>>,
    form: GenerateForm,
) -> ApiResult<String> {
    let text = dispatcher.generate(&form.model_id, &form.conversation).await?;
    info!(bytes = text.len(), "Generation complete");
    Ok(text)
}
