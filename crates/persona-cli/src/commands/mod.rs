use std::collections::BTreeMap;

use anyhow::Context;
use indicatif::MultiProgress;
use tracing::info;

use persona_core::{CoreResult, ModelConfig, ModelKind, ModelRegistry};
use persona_hub::{LocalArtifacts, ModelCache, ModelDownloader};

use crate::config::{expand_cache_dir, AppConfig};

pub mod list;
pub mod prompt;
pub mod pull;
pub mod run;
pub mod serve;

pub(crate) fn open_cache(config: &AppConfig) -> anyhow::Result<ModelCache> {
    let cache_dir = expand_cache_dir(&config.cache.dir);
    ModelCache::new(&cache_dir)
        .with_context(|| format!("Cannot open model cache at {}", cache_dir.display()))
}

/// Resolve local artifacts for `kinds`, downloading whatever is missing
/// unless `offline` is set. `gpu_override` replaces each model's configured
/// `prefer_gpu`.
pub(crate) async fn resolve_artifacts(
    kinds: &[ModelKind],
    offline: bool,
    gpu_override: Option<bool>,
    config: &AppConfig,
) -> anyhow::Result<BTreeMap<ModelKind, ModelConfig>> {
    let cache = open_cache(config)?;
    let downloader = if offline { None } else { Some(ModelDownloader::new(cache.clone())?) };
    let mp = MultiProgress::new();

    let mut configs = BTreeMap::new();
    for &kind in kinds {
        let source_cfg = config.models.get(kind);
        let source = source_cfg.artifact_source();
        let local: LocalArtifacts = match &downloader {
            Some(d) => d
                .fetch(&source, Some(&mp))
                .await
                .with_context(|| format!("Failed to fetch artifacts for {kind}"))?,
            None => cache
                .resolve(&source)
                .with_context(|| format!("Artifacts for {kind} are not cached"))?,
        };
        info!(
            model = %kind,
            weights = %local.weights.display(),
            tokenizer = ?local.tokenizer,
            "Artifacts ready"
        );
        configs.insert(kind, source_cfg.model_config(kind, local, gpu_override));
    }
    Ok(configs)
}

/// Fetch artifacts for every model and load them, each onto its own device.
pub(crate) async fn load_all_models(
    gpu_override: Option<bool>,
    offline: bool,
    config: &AppConfig,
) -> anyhow::Result<ModelRegistry> {
    let configs = resolve_artifacts(&ModelKind::ALL, offline, gpu_override, config).await?;
    load_blocking(move || ModelRegistry::load_all(&configs)).await
}

/// Fetch artifacts for `kinds` only and load them.
pub(crate) async fn load_models(
    kinds: &[ModelKind],
    gpu_override: Option<bool>,
    offline: bool,
    config: &AppConfig,
) -> anyhow::Result<ModelRegistry> {
    let configs = resolve_artifacts(kinds, offline, gpu_override, config).await?;
    let kinds = kinds.to_vec();
    load_blocking(move || ModelRegistry::load(&kinds, &configs)).await
}

/// Loading is blocking and heavy, so it runs off the async runtime.
async fn load_blocking<F>(load: F) -> anyhow::Result<ModelRegistry>
where
    F: FnOnce() -> CoreResult<ModelRegistry> + Send + 'static,
{
    let registry = tokio::task::spawn_blocking(load)
        .await
        .context("Model loading task panicked")??;
    Ok(registry)
}
