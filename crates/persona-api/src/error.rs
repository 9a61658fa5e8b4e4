use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use persona_core::CoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Model error: {0}")]
    Model(#[from] CoreError),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "invalid_request_error", msg.clone()),
            ApiError::Model(e) if e.is_model_lookup() => {
                (StatusCode::NOT_FOUND, "model_not_found", e.to_string())
            }
            ApiError::Model(e @ CoreError::SequenceTooLong { .. }) => {
                (StatusCode::BAD_REQUEST, "context_length_exceeded", e.to_string())
            }
            ApiError::Model(e) => (StatusCode::INTERNAL_SERVER_ERROR, "model_error", e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = self.parts();
        if status.is_server_error() {
            tracing::error!(error = %message, "Request failed");
        }

        let body = json!({
            "error": {
                "message": message,
                "type": error_type,
                "code": status.as_u16()
            }
        });

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
