use persona_core::{build_prompt, policy_for, Conversation, ModelKind};

/// Print the exact prompt a model would receive, plus its decoding settings.
pub fn run(model_id: &str, conversation: &Conversation, show_params: bool) -> anyhow::Result<()> {
    let kind: ModelKind = model_id.parse()?;
    print!("{}", build_prompt(kind, conversation));
    if show_params {
        let d = policy_for(kind).decoding;
        eprintln!(
            "\n[{kind}] temperature={} max_new_tokens={} repetition_penalty={}",
            d.temperature,
            d.max_new_tokens,
            d.repetition_penalty.map_or_else(|| "none".to_string(), |p| p.to_string()),
        );
    }
    Ok(())
}
