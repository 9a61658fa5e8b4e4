use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use candle_core::{quantized::gguf_file, Device, IndexOp, Tensor};
use candle_transformers::models::quantized_llama;
use tracing::{debug, info, warn};

use crate::{
    error::{CoreError, CoreResult},
    model::{FinishReason, GenerateInput, Generation, Model, ModelConfig, SamplingParams},
    sampling::{rng_for, sample_token},
    tokenizer::Tokenizer,
};

/// Length of the rotary-embedding table `quantized_llama` precomputes.
/// Positions past it cannot be embedded.
pub const ROPE_TABLE_LEN: usize = 4096;

/// GGUF keys that carry a linear RoPE scaling factor (SuperHOT and similar).
const ROPE_SCALE_KEYS: [&str; 2] = ["llama.rope.scale_linear", "llama.rope.scaling.factor"];

/// Context window a model can actually use: the configured length, capped
/// at [`ROPE_TABLE_LEN`].
pub fn effective_sequence_length(configured: usize) -> usize {
    configured.min(ROPE_TABLE_LEN)
}

/// Linear RoPE scale recorded in the GGUF metadata, if any and not 1.
fn rope_linear_scale(metadata: &HashMap<String, gguf_file::Value>) -> Option<f32> {
    ROPE_SCALE_KEYS
        .iter()
        .find_map(|key| match metadata.get(*key)? {
            gguf_file::Value::F32(v) => Some(*v),
            gguf_file::Value::F64(v) => Some(*v as f32),
            _ => None,
        })
        .filter(|scale| (*scale - 1.0).abs() > f32::EPSILON)
}

/// A LLaMA-architecture GGUF model (Nous-Hermes, Pygmalion and friends)
/// together with the tokenizer it was trained with.
pub struct QuantizedModel {
    name: String,
    weights: quantized_llama::ModelWeights,
    tokenizer: Arc<Tokenizer>,
    device: Device,
    max_sequence_length: usize,
}

impl std::fmt::Debug for QuantizedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuantizedModel")
            .field("name", &self.name)
            .field("max_sequence_length", &self.max_sequence_length)
            .finish()
    }
}

impl QuantizedModel {
    /// Return a cheap clone of the model's tokenizer Arc.
    pub fn tokenizer_arc(&self) -> Arc<Tokenizer> {
        Arc::clone(&self.tokenizer)
    }

    /// Effective context window, after clamping to [`ROPE_TABLE_LEN`].
    pub fn max_sequence_length(&self) -> usize {
        self.max_sequence_length
    }

    fn open_gguf(path: &Path) -> CoreResult<(gguf_file::Content, std::fs::File)> {
        let mut file = std::fs::File::open(path).map_err(|e| CoreError::Config {
            field: "weights".to_string(),
            reason: format!("cannot open {}: {e}", path.display()),
        })?;
        let content = gguf_file::Content::read(&mut file).map_err(|e| e.with_path(path))?;
        Ok((content, file))
    }
}

/// Extract the logits for a single sequence position from the model output.
///
/// `quantized_llama` returns `[batch, vocab]` for the last position, but
/// `[batch, seq, vocab]` and `[vocab]` are accepted too.
fn last_token_logits(logits: &Tensor, seq_pos: usize) -> CoreResult<Tensor> {
    match logits.dims() {
        [_, _, _] => Ok(logits.i((0, seq_pos))?),
        [_, _] => Ok(logits.i(0)?),
        [_] => Ok(logits.clone()),
        dims => Err(CoreError::Config {
            field: "logits".to_string(),
            reason: format!("Unexpected logits shape: {dims:?}"),
        }),
    }
}

impl Model for QuantizedModel {
    fn load(config: &ModelConfig, device: &Device) -> CoreResult<Self> {
        info!(
            model = %config.name,
            weights = %config.weights.display(),
            "Loading quantized GGUF model"
        );
        let (content, mut reader) = Self::open_gguf(&config.weights)?;

        let arch = match content.metadata.get("general.architecture") {
            Some(gguf_file::Value::String(s)) => s.clone(),
            _ => "llama".to_string(),
        };
        if arch != "llama" {
            return Err(CoreError::Config {
                field: "general.architecture".to_string(),
                reason: format!("{arch:?} is not a LLaMA-family model"),
            });
        }

        // quantized_llama has no hook for position interpolation.
        if let Some(scale) = rope_linear_scale(&content.metadata) {
            warn!(
                model = %config.name,
                scale,
                "GGUF declares a linear RoPE scale; positions are encoded unscaled"
            );
        }

        // from_gguf consumes `content`; keep what the tokenizer fallback needs.
        let tokenizer_meta: HashMap<String, gguf_file::Value> = content
            .metadata
            .iter()
            .filter(|(k, _)| k.starts_with("tokenizer.ggml."))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let weights = quantized_llama::ModelWeights::from_gguf(content, &mut reader, device)?;

        let tokenizer = Arc::new(match &config.tokenizer {
            Some(path) => Tokenizer::from_file(path)?,
            None => {
                info!(model = %config.name, "No tokenizer.json configured, using GGUF vocabulary");
                Tokenizer::from_gguf_metadata(&tokenizer_meta)?
            }
        });

        let max_sequence_length = effective_sequence_length(config.max_sequence_length);
        if max_sequence_length < config.max_sequence_length {
            warn!(
                model = %config.name,
                requested = config.max_sequence_length,
                effective = max_sequence_length,
                "Context window clamped to the rotary table length"
            );
        }

        info!(model = %config.name, max_sequence_length, "Quantized model loaded");
        Ok(Self {
            name: config.name.clone(),
            weights,
            tokenizer,
            device: device.clone(),
            max_sequence_length,
        })
    }

    fn generate(&mut self, input: GenerateInput, params: SamplingParams) -> CoreResult<Generation> {
        let prompt_len = input.token_ids.len();
        if prompt_len == 0 {
            return Err(CoreError::Config {
                field: "token_ids".to_string(),
                reason: "Prompt encoded to zero tokens".to_string(),
            });
        }
        if prompt_len >= self.max_sequence_length {
            return Err(CoreError::SequenceTooLong { got: prompt_len, max: self.max_sequence_length });
        }

        let mut rng = rng_for(&params);
        let mut history = input.token_ids.clone();
        let mut generated = Vec::with_capacity(params.max_new_tokens);
        let mut finish_reason = FinishReason::Length;

        // Prefill with the whole prompt at position 0 (which also resets the
        // KV cache), then feed one token per step.
        let mut step_input = Tensor::new(input.token_ids.as_slice(), &self.device)?.unsqueeze(0)?;
        let mut pos = 0usize;

        for _ in 0..params.max_new_tokens {
            let seq_len = step_input.dim(1)?;
            let logits = self.weights.forward(&step_input, pos)?;
            let last = last_token_logits(&logits, seq_len - 1)?;
            let next_id = sample_token(&last, &params, &history, &mut rng)?;
            pos += seq_len;

            history.push(next_id);
            generated.push(next_id);

            if params.stop_token_ids.contains(&next_id) {
                finish_reason = FinishReason::Stop;
                break;
            }
            if pos >= self.max_sequence_length {
                finish_reason = FinishReason::ContextFull;
                break;
            }
            step_input = Tensor::new(&[next_id], &self.device)?.unsqueeze(0)?;
        }

        debug!(
            model = %self.name,
            prompt_tokens = prompt_len,
            completion_tokens = generated.len(),
            ?finish_reason,
            "Generation finished"
        );
        Ok(Generation { token_ids: generated, finish_reason })
    }
}
