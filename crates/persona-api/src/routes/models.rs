use std::sync::Arc;

use axum::{response::IntoResponse, Extension, Json};
use chrono::Utc;
use serde_json::json;

use persona_core::Dispatcher;

use crate::types::{ModelList, ModelObject};

/// `GET /v1/models`: the models this server can route to.
pub async fn list_models(Extension(dispatcher): Extension<Arc<Dispatcher>>) -> Json<ModelList> {
    let now = Utc::now().timestamp();
    let data = dispatcher
        .registry()
        .loaded()
        .map(|kind| ModelObject {
            id: kind.wire_id().to_string(),
            name: kind.name().to_string(),
            object: "model".to_string(),
            created: now,
            owned_by: "persona-chat".to_string(),
        })
        .collect();
    Json(ModelList { object: "list".to_string(), data })
}

/// `GET /health`: liveness probe.
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
