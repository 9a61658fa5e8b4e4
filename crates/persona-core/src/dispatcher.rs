use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::{
    error::{CoreError, CoreResult},
    kind::ModelKind,
    model::{FinishReason, GenerateInput},
    prompt::{policy_for, Conversation},
    registry::ModelRegistry,
};

/// Result of one dispatched generation.
#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    /// Prompt and continuation decoded together, special tokens kept.
    pub text: String,
    pub finish_reason: FinishReason,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// Routes a conversation to the model named by its identifier, formats the
/// prompt with that model's template policy and decodes the result.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ModelRegistry>,
}

impl Dispatcher {
    pub fn new(registry: ModelRegistry) -> Self {
        Self { registry: Arc::new(registry) }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Render the prompt `model_id` would receive, without touching a model.
    pub fn build_prompt(&self, model_id: &str, conv: &Conversation) -> CoreResult<String> {
        let kind: ModelKind = model_id.parse()?;
        Ok(policy_for(kind).render(conv))
    }

    /// Generate a reply for `conv` with the model named by `model_id`.
    ///
    /// The identifier is resolved before anything else, so an unknown id
    /// never reaches a model.
    pub async fn generate(&self, model_id: &str, conv: &Conversation) -> CoreResult<String> {
        let kind: ModelKind = model_id.parse()?;
        Ok(self.generate_kind(kind, conv).await?.text)
    }

    pub async fn generate_kind(&self, kind: ModelKind, conv: &Conversation) -> CoreResult<Reply> {
        let entry = self.registry.get(kind)?.clone();
        let policy = policy_for(kind);
        let prompt = policy.render(conv);

        let prompt_ids = entry.tokenizer.encode(&prompt, true)?;
        let stop_ids: Vec<u32> = entry.tokenizer.eos_token_id().into_iter().collect();
        let params = policy.decoding.to_sampling_params(stop_ids);
        info!(
            model = %kind,
            character = %conv.character_name,
            prompt_tokens = prompt_ids.len(),
            has_history = conv.chat_history.is_some(),
            "Dispatching generation"
        );

        let model = Arc::clone(&entry.model);
        let input = GenerateInput { token_ids: prompt_ids.clone() };
        let generation = tokio::task::spawn_blocking(move || {
            let mut model = model.blocking_lock();
            model.generate(input, params)
        })
        .await
        .map_err(|e| CoreError::Generation(format!("generation task failed: {e}")))??;

        let completion_tokens = generation.token_ids.len();
        let mut all_ids = prompt_ids;
        let prompt_tokens = all_ids.len();
        all_ids.extend_from_slice(&generation.token_ids);
        let text = entry.tokenizer.decode(&all_ids, false)?;

        debug!(
            model = %kind,
            prompt_tokens,
            completion_tokens,
            finish_reason = ?generation.finish_reason,
            "Generation decoded"
        );
        Ok(Reply { text, finish_reason: generation.finish_reason, prompt_tokens, completion_tokens })
    }
}
