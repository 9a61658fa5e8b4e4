use std::path::PathBuf;

use candle_core::Device;
use serde::{Deserialize, Serialize};

use crate::{device::Placement, error::CoreResult};

/// Parameters controlling text generation.
///
/// The defaults follow the Hugging Face `generate` defaults (top-k 50, top-p
/// 1.0, temperature 1.0) so that per-model decoding tables only need to
/// state what they override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub max_new_tokens: usize,
    pub temperature: f64,
    pub top_p: f64,
    /// Limit sampling to top K tokens (applied before top_p).
    pub top_k: Option<usize>,
    /// Penalty for repeating tokens (1.0 = no penalty, >1.0 = discourage repetition).
    ///
    /// Applied over the whole sequence, prompt included.
    pub repetition_penalty: f64,
    /// Random seed for reproducible generation. `None` draws from OS entropy.
    pub seed: Option<u64>,
    /// Token ids that should stop generation.
    pub stop_token_ids: Vec<u32>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 512,
            temperature: 1.0,
            top_p: 1.0,
            top_k: Some(50),
            repetition_penalty: 1.0,
            seed: None,
            stop_token_ids: vec![],
        }
    }
}

/// Input to the model for a single generation request.
#[derive(Debug, Clone)]
pub struct GenerateInput {
    /// Pre-tokenized prompt ids.
    pub token_ids: Vec<u32>,
}

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// A stop token was sampled. The stop token is included in `token_ids`.
    Stop,
    /// `max_new_tokens` was reached.
    Length,
    /// The context window filled up before either of the above.
    ContextFull,
}

/// Tokens produced by one generation call, excluding the prompt.
#[derive(Debug, Clone)]
pub struct Generation {
    pub token_ids: Vec<u32>,
    pub finish_reason: FinishReason,
}

/// Where to find one model's artifacts on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Human-readable name used in logs.
    pub name: String,
    /// Path to the GGUF weights file.
    pub weights: PathBuf,
    /// Path to a `tokenizer.json`. When absent the vocabulary embedded in
    /// the GGUF metadata is used.
    pub tokenizer: Option<PathBuf>,
    /// Maximum supported sequence length, prompt plus generated tokens.
    pub max_sequence_length: usize,
    /// Device this model is loaded onto. Defaults to the CPU.
    #[serde(default)]
    pub placement: Placement,
}

/// Core trait that every model backend must implement.
///
/// Implementations must be `Send` so they can be shared across async tasks
/// behind an `Arc<Mutex<dyn Model + Send>>`.
pub trait Model: Send {
    /// Load model weights from `config`.
    fn load(config: &ModelConfig, device: &Device) -> CoreResult<Self>
    where
        Self: Sized;

    /// Run the full decode loop on the calling thread.
    ///
    /// Blocking and compute-heavy; async callers should run it inside
    /// `tokio::task::spawn_blocking`.
    fn generate(&mut self, input: GenerateInput, params: SamplingParams) -> CoreResult<Generation>;
}
