use std::sync::Arc;

use tracing::info;

use persona_api::{serve, ServerConfig};
use persona_core::Dispatcher;

use crate::config::AppConfig;

/// Load every model and serve `POST /generate` until shutdown.
pub async fn run(
    host: Option<&str>,
    port: Option<u16>,
    gpu_override: Option<bool>,
    offline: bool,
    config: &AppConfig,
) -> anyhow::Result<()> {
    let registry = super::load_all_models(gpu_override, offline, config).await?;
    let dispatcher = Arc::new(Dispatcher::new(registry));

    let server_config = ServerConfig {
        host: host.unwrap_or(&config.server.host).to_string(),
        port: port.unwrap_or(config.server.port),
        request_timeout_secs: config.server.request_timeout_secs,
    };

    info!(
        host = %server_config.host,
        port = server_config.port,
        "Server starting"
    );

    serve(dispatcher, server_config).await
}
