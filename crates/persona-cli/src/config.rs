use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use persona_core::{ModelConfig, ModelKind, Placement};
use persona_hub::{ArtifactSource, LocalArtifacts};

/// Full runtime configuration loaded from TOML + env vars.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub models: ModelsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    pub dir: String,
}

/// One section per [`ModelKind`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelsConfig {
    pub nous: ModelSource,
    pub pygmalion: ModelSource,
}

impl ModelsConfig {
    pub fn get(&self, kind: ModelKind) -> &ModelSource {
        match kind {
            ModelKind::Nous => &self.nous,
            ModelKind::Pygmalion => &self.pygmalion,
        }
    }
}

/// Hugging Face location of one model's artifacts and where to load it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelSource {
    pub repo: String,
    pub gguf_file: String,
    /// Repo to take `tokenizer.json` from. Empty means use the GGUF vocabulary.
    pub tokenizer_repo: String,
    pub revision: String,
    /// Usable context, capped at the 4096-entry rotary table.
    pub max_sequence_length: usize,
    pub prefer_gpu: bool,
    pub cuda_device_id: usize,
}

impl ModelSource {
    pub fn artifact_source(&self) -> ArtifactSource {
        ArtifactSource {
            repo: self.repo.clone(),
            gguf_file: self.gguf_file.clone(),
            tokenizer_repo: Some(self.tokenizer_repo.trim())
                .filter(|r| !r.is_empty())
                .map(str::to_string),
            revision: self.revision.clone(),
        }
    }

    pub fn placement(&self) -> Placement {
        Placement { prefer_gpu: self.prefer_gpu, cuda_device_id: self.cuda_device_id }
    }

    /// Loader config for `kind` from its resolved files. `gpu_override`
    /// replaces the configured `prefer_gpu` when set.
    pub fn model_config(
        &self,
        kind: ModelKind,
        local: LocalArtifacts,
        gpu_override: Option<bool>,
    ) -> ModelConfig {
        ModelConfig {
            name: kind.name().to_string(),
            weights: local.weights,
            tokenizer: local.tokenizer,
            max_sequence_length: self.max_sequence_length,
            placement: self.placement().with_gpu_override(gpu_override),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 44505,
                request_timeout_secs: 600,
            },
            cache: CacheConfig {
                dir: "~/.cache/persona-chat".to_string(),
            },
            models: ModelsConfig {
                nous: ModelSource {
                    repo: "TheBloke/Nous-Hermes-13B-GGUF".to_string(),
                    gguf_file: "nous-hermes-13b.Q4_K_M.gguf".to_string(),
                    tokenizer_repo: "TheBloke/Nous-Hermes-13B-GPTQ".to_string(),
                    revision: "main".to_string(),
                    max_sequence_length: 2048,
                    prefer_gpu: true,
                    cuda_device_id: 0,
                },
                pygmalion: ModelSource {
                    repo: "TheBloke/Pygmalion-7B-SuperHOT-8K-GGUF".to_string(),
                    gguf_file: "pygmalion-7b-superhot-8k.Q4_K_M.gguf".to_string(),
                    tokenizer_repo: "TheBloke/Pygmalion-7B-SuperHOT-8K-GPTQ".to_string(),
                    revision: "main".to_string(),
                    max_sequence_length: 4096,
                    prefer_gpu: true,
                    cuda_device_id: 0,
                },
            },
        }
    }
}

/// Load configuration from:
/// 1. Built-in defaults ([`AppConfig::default`])
/// 2. `config/default.toml` (if present)
/// 3. A custom config file path (if provided)
/// 4. Environment variables prefixed with `PERSONA_`, sections split by `__`
///    (`PERSONA_SERVER__PORT`, `PERSONA_MODELS__NOUS__GGUF_FILE`)
pub fn load_config(config_file: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder()
        .add_source(Config::try_from(&AppConfig::default())?)
        .add_source(File::with_name("config/default").required(false));

    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix("PERSONA")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

/// Expand a leading `~` to the home directory.
pub fn expand_cache_dir(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_server() {
        let cfg = load_config(None).unwrap();
        assert_eq!(cfg.server.port, 44505);
        assert_eq!(cfg.server.host, "0.0.0.0");
    }

    #[test]
    fn test_default_model_sources() {
        let cfg = load_config(None).unwrap();
        assert_eq!(cfg.models.nous.repo, "TheBloke/Nous-Hermes-13B-GGUF");
        assert_eq!(cfg.models.nous.max_sequence_length, 2048);
        assert_eq!(cfg.models.pygmalion.gguf_file, "pygmalion-7b-superhot-8k.Q4_K_M.gguf");
        assert_eq!(cfg.models.pygmalion.max_sequence_length, 4096);
        assert!(cfg.models.nous.prefer_gpu && cfg.models.pygmalion.prefer_gpu);
    }

    #[test]
    fn test_models_get_follows_kind() {
        let cfg = AppConfig::default();
        assert!(cfg.models.get(ModelKind::Nous).repo.contains("Nous-Hermes"));
        assert!(cfg.models.get(ModelKind::Pygmalion).repo.contains("Pygmalion"));
    }

    #[test]
    fn test_custom_file_overrides_one_field() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("custom.toml");
        std::fs::write(
            &file,
            "[server]\nport = 9999\n\n[models.nous]\ngguf_file = \"nous-hermes-13b.Q5_K_M.gguf\"\n",
        )
        .unwrap();

        let cfg = load_config(Some(&file)).unwrap();
        assert_eq!(cfg.server.port, 9999);
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.models.nous.gguf_file, "nous-hermes-13b.Q5_K_M.gguf");
        assert_eq!(cfg.models.nous.repo, "TheBloke/Nous-Hermes-13B-GGUF");
    }

    #[test]
    fn test_missing_custom_file_is_error() {
        assert!(load_config(Some(Path::new("/nonexistent/persona.toml"))).is_err());
    }

    #[test]
    fn test_empty_tokenizer_repo_means_gguf_vocab() {
        let mut source = AppConfig::default().models.nous;
        assert!(source.artifact_source().tokenizer_repo.is_some());
        source.tokenizer_repo = "  ".to_string();
        assert!(source.artifact_source().tokenizer_repo.is_none());
    }

    #[test]
    fn test_expand_tilde() {
        let path = expand_cache_dir("~/.cache/persona-chat");
        assert!(!path.to_string_lossy().starts_with('~'));
        assert!(path.ends_with(".cache/persona-chat"));
        assert_eq!(expand_cache_dir("/abs/cache"), PathBuf::from("/abs/cache"));
        assert_eq!(expand_cache_dir("relative"), PathBuf::from("relative"));
    }

    #[test]
    fn test_placement_is_per_model() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("gpus.toml");
        std::fs::write(
            &file,
            "[models.nous]\ncuda_device_id = 1\n\n[models.pygmalion]\nprefer_gpu = false\n",
        )
        .unwrap();

        let cfg = load_config(Some(&file)).unwrap();
        assert_eq!(cfg.models.nous.placement(), Placement { prefer_gpu: true, cuda_device_id: 1 });
        assert_eq!(cfg.models.pygmalion.placement(), Placement::CPU);
    }

    #[test]
    fn test_model_config_applies_gpu_override() {
        let cfg = AppConfig::default();
        let local = || LocalArtifacts {
            weights: PathBuf::from("/cache/pyg.gguf"),
            tokenizer: None,
        };
        let source = cfg.models.get(ModelKind::Pygmalion);

        let as_configured = source.model_config(ModelKind::Pygmalion, local(), None);
        assert_eq!(as_configured.name, "pygmalion");
        assert_eq!(as_configured.max_sequence_length, 4096);
        assert!(as_configured.placement.prefer_gpu);

        let forced_cpu = source.model_config(ModelKind::Pygmalion, local(), Some(false));
        assert_eq!(forced_cpu.placement, Placement::CPU);
    }
}
