use std::collections::HashMap;

use axum::{
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
    Form,
};
use serde::Serialize;

use persona_core::Conversation;

use crate::error::ApiError;

// ─── Request types ────────────────────────────────────────────────────────────

/// Fields of a `POST /generate` request.
///
/// Accepts `multipart/form-data` and `application/x-www-form-urlencoded`
/// bodies. Text fields are passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateForm {
    pub model_id: String,
    pub conversation: Conversation,
}

impl GenerateForm {
    /// Build from raw field pairs. `chat_history` is optional and an empty
    /// value is treated as not sent.
    pub fn from_fields(mut fields: HashMap<String, String>) -> Result<Self, ApiError> {
        let mut take = |name: &str| {
            fields
                .remove(name)
                .ok_or_else(|| ApiError::BadRequest(format!("missing form field `{name}`")))
        };
        let model_id = take("model_id")?;
        let character_name = take("character_name")?;
        let persona = take("persona")?;
        let prompt = take("prompt")?;
        let chat_history = fields.remove("chat_history").filter(|h| !h.is_empty());
        Ok(Self {
            model_id,
            conversation: Conversation { character_name, persona, prompt, chat_history },
        })
    }
}

impl<S> FromRequest<S> for GenerateForm
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("multipart/form-data"));

        let fields = if is_multipart {
            let mut multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            let mut fields = HashMap::new();
            while let Some(field) = multipart
                .next_field()
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?
            {
                let Some(name) = field.name().map(str::to_string) else {
                    continue;
                };
                let value = field.text().await.map_err(|e| ApiError::BadRequest(e.body_text()))?;
                fields.insert(name, value);
            }
            fields
        } else {
            let Form(fields) = Form::<HashMap<String, String>>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            fields
        };

        Self::from_fields(fields)
    }
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelObject>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelObject {
    /// Value to send as `model_id`.
    pub id: String,
    pub name: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}
