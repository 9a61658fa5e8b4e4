//! # persona-hub
//!
//! Hugging Face artifact download and local cache for persona-chat.
//!
//! ```rust,no_run
//! use persona_hub::{ArtifactSource, ModelCache, ModelDownloader};
//!
//! # async fn run() -> persona_hub::HubResult<()> {
//! let downloader = ModelDownloader::new(ModelCache::default_cache()?)?;
//! let source = ArtifactSource {
//!     repo: "TheBloke/Nous-Hermes-13B-GGUF".into(),
//!     gguf_file: "nous-hermes-13b.Q4_K_M.gguf".into(),
//!     tokenizer_repo: Some("TheBloke/Nous-Hermes-13B-GPTQ".into()),
//!     revision: "main".into(),
//! };
//! let local = downloader.fetch(&source, None).await?;
//! println!("weights at {}", local.weights.display());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod download;
pub mod error;
pub mod integrity;
pub mod source;

pub use cache::{FileMetadata, ModelCache};
pub use download::ModelDownloader;
pub use error::{HubError, HubResult};
pub use source::{ArtifactSource, LocalArtifacts};

/// File name fetched from each tokenizer repo.
pub const TOKENIZER_FILE: &str = "tokenizer.json";
