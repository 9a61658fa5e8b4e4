use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where one model's artifacts live on the Hugging Face Hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSource {
    /// Repo holding the GGUF weights.
    pub repo: String,
    /// Exact GGUF file name inside `repo`.
    pub gguf_file: String,
    /// Repo holding the matching `tokenizer.json`.
    #[serde(default)]
    pub tokenizer_repo: Option<String>,
    #[serde(default = "default_revision")]
    pub revision: String,
}

fn default_revision() -> String {
    "main".to_string()
}

/// Local paths for a downloaded [`ArtifactSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalArtifacts {
    pub weights: PathBuf,
    /// `None` when no tokenizer repo is configured or it had no
    /// `tokenizer.json`.
    pub tokenizer: Option<PathBuf>,
}
