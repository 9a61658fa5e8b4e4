use std::time::Instant;

use tracing::info;

use persona_core::{Conversation, Dispatcher, ModelKind};

use crate::config::AppConfig;

/// Load a single model, generate one reply and print it.
pub async fn run(
    model_id: &str,
    conversation: &Conversation,
    gpu_override: Option<bool>,
    offline: bool,
    stats: bool,
    config: &AppConfig,
) -> anyhow::Result<()> {
    let kind: ModelKind = model_id.parse()?;

    let load_start = Instant::now();
    let registry = super::load_models(&[kind], gpu_override, offline, config).await?;
    let load_elapsed = load_start.elapsed();
    let dispatcher = Dispatcher::new(registry);

    info!(model = %kind, "Generating response");
    let gen_start = Instant::now();
    let reply = dispatcher.generate_kind(kind, conversation).await?;
    let gen_elapsed = gen_start.elapsed();

    println!("{}", reply.text);

    if stats {
        let tok_per_sec = if gen_elapsed.as_secs_f64() > 0.0 {
            reply.completion_tokens as f64 / gen_elapsed.as_secs_f64()
        } else {
            0.0
        };
        eprintln!(
            "\n[stats] model loaded in {:.2} s | {} prompt + {} generated tokens | {:.1} tok/s | finish: {:?}",
            load_elapsed.as_secs_f64(),
            reply.prompt_tokens,
            reply.completion_tokens,
            tok_per_sec,
            reply.finish_reason,
        );
    }
    Ok(())
}
