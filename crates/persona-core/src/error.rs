use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model config error: {field}: {reason}")]
    Config { field: String, reason: String },

    #[error("Unknown model id: {0:?}")]
    UnknownModel(String),

    #[error("Model {0} has no loaded registry entry")]
    ModelNotLoaded(String),

    #[error("Sequence too long: {got} tokens, max {max}")]
    SequenceTooLong { got: usize, max: usize },

    #[error("Generation failed: {0}")]
    Generation(String),
}

impl CoreError {
    /// Whether the error names a model the caller asked for that cannot serve.
    pub fn is_model_lookup(&self) -> bool {
        matches!(self, Self::UnknownModel(_) | Self::ModelNotLoaded(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
