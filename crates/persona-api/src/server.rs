use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    middleware,
    routing::{get, post},
    Extension, Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

use persona_core::Dispatcher;

use crate::{
    middleware::request_id_middleware,
    routes::{
        generate::generate,
        models::{health, list_models},
    },
};

/// Configuration for the API server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on a whole request, generation included.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 44505,
            request_timeout_secs: 600,
        }
    }
}

/// Build the axum router with every route and middleware layer.
pub fn build_router(dispatcher: Arc<Dispatcher>, timeout_secs: u64) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/generate", post(generate))
        .route("/v1/models", get(list_models))
        .route("/health", get(health))
        .layer(Extension(dispatcher))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TimeoutLayer::new(Duration::from_secs(timeout_secs)))
        .layer(cors)
        .layer(trace_layer)
}

/// Start the HTTP server and block until a shutdown signal is received.
pub async fn serve(dispatcher: Arc<Dispatcher>, config: ServerConfig) -> anyhow::Result<()> {
    let loaded: Vec<&str> = dispatcher.registry().loaded().map(|k| k.wire_id()).collect();
    let router = build_router(dispatcher, config.request_timeout_secs);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(address = %addr, models = ?loaded, "Starting persona-chat server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down gracefully");
    Ok(())
}

/// Resolves on SIGINT (Ctrl-C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
