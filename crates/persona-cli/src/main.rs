use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use persona_core::Conversation;

mod commands;
mod config;

use config::load_config;

/// persona-chat: character roleplay over two quantized LLaMA models
#[derive(Debug, Parser)]
#[command(name = "persona", version, about, long_about = None, arg_required_else_help = true)]
struct Cli {
    /// Path to a custom configuration file (TOML).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

/// Conversation fields, named as in the HTTP form.
#[derive(Debug, Args)]
struct ConversationArgs {
    /// Which model to use: `1` (Nous-Hermes) or `2` (Pygmalion).
    #[arg(long)]
    model_id: String,

    #[arg(long)]
    character_name: String,

    /// Persona description of the character.
    #[arg(long)]
    persona: String,

    /// The user's current message.
    #[arg(long)]
    prompt: String,

    /// Prior transcript, inserted verbatim.
    #[arg(long)]
    chat_history: Option<String>,
}

impl ConversationArgs {
    fn split(self) -> (String, Conversation) {
        let conversation = Conversation {
            character_name: self.character_name,
            persona: self.persona,
            prompt: self.prompt,
            chat_history: self.chat_history,
        };
        (self.model_id, conversation)
    }
}

/// Device override applied to every model being loaded.
#[derive(Debug, Args)]
struct DeviceArgs {
    /// Prefer GPU acceleration (CUDA/Metal) for every model.
    #[arg(long, conflicts_with = "cpu")]
    gpu: bool,

    /// Load every model on the CPU.
    #[arg(long)]
    cpu: bool,
}

impl DeviceArgs {
    /// `None` keeps each model's configured placement.
    fn gpu_override(&self) -> Option<bool> {
        match (self.gpu, self.cpu) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Load both models and start the HTTP server.
    Serve {
        /// Address to bind to.
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on.
        #[arg(long, short = 'p')]
        port: Option<u16>,

        #[command(flatten)]
        device: DeviceArgs,

        /// Use only cached artifacts; never download.
        #[arg(long)]
        offline: bool,
    },

    /// Download model artifacts into the local cache.
    Pull {
        /// `1`, `2`, `nous` or `pygmalion`. Omit to pull both.
        model_id: Option<String>,

        /// Re-hash the weights after download and compare with the recorded digest.
        #[arg(long)]
        verify: bool,
    },

    /// Show configured models and cached files.
    List,

    /// Print the prompt a model would receive, without loading it.
    Prompt {
        #[command(flatten)]
        conversation: ConversationArgs,

        /// Also print the model's decoding parameters to stderr.
        #[arg(long)]
        params: bool,
    },

    /// Generate one reply locally and print it.
    Run {
        #[command(flatten)]
        conversation: ConversationArgs,

        #[command(flatten)]
        device: DeviceArgs,

        /// Use only cached artifacts; never download.
        #[arg(long)]
        offline: bool,

        /// Print timing and throughput stats after generation.
        #[arg(long)]
        stats: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_format);

    let cfg = load_config(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Serve { host, port, device, offline } => {
            commands::serve::run(host.as_deref(), port, device.gpu_override(), offline, &cfg).await?;
        }
        Commands::Pull { model_id, verify } => {
            commands::pull::run(model_id.as_deref(), verify, &cfg).await?;
        }
        Commands::List => {
            commands::list::run(&cfg)?;
        }
        Commands::Prompt { conversation, params } => {
            let (model_id, conversation) = conversation.split();
            commands::prompt::run(&model_id, &conversation, params)?;
        }
        Commands::Run { conversation, device, offline, stats } => {
            let (model_id, conversation) = conversation.split();
            commands::run::run(&model_id, &conversation, device.gpu_override(), offline, stats, &cfg)
                .await?;
        }
    }

    Ok(())
}

fn init_tracing(log_format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).init(),
    }
}
