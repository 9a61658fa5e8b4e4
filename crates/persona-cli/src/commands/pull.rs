use anyhow::Context;
use indicatif::MultiProgress;
use tracing::info;

use persona_core::ModelKind;
use persona_hub::ModelDownloader;

use crate::config::AppConfig;

/// Download artifacts for one model, or both when `model_id` is `None`.
pub async fn run(model_id: Option<&str>, verify: bool, config: &AppConfig) -> anyhow::Result<()> {
    let kinds: Vec<ModelKind> = match model_id {
        Some(raw) => vec![raw.parse()?],
        None => ModelKind::ALL.to_vec(),
    };

    let cache = super::open_cache(config)?;
    let downloader = ModelDownloader::new(cache.clone())?;
    let mp = MultiProgress::new();

    for kind in kinds {
        let source = config.models.get(kind).artifact_source();
        info!(model = %kind, repo = %source.repo, file = %source.gguf_file, "Pulling");
        let local = downloader
            .fetch(&source, Some(&mp))
            .await
            .with_context(|| format!("Failed to pull {kind}"))?;

        if verify {
            cache
                .verify(&source.repo, &source.revision, &source.gguf_file)
                .with_context(|| format!("Cached weights for {kind} are corrupt"))?;
        }

        println!("\n{kind}");
        println!("  weights:   {}", local.weights.display());
        match &local.tokenizer {
            Some(p) => println!("  tokenizer: {}", p.display()),
            None => println!("  tokenizer: (embedded GGUF vocabulary)"),
        }
    }

    println!("\nCache: {}", cache.root().display());
    Ok(())
}
