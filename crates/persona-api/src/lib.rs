//! # persona-api
//!
//! HTTP front end for persona-chat.
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | `POST` | `/generate` | Form fields in, generated text out |
//! | `GET` | `/v1/models` | List loaded models |
//! | `GET` | `/health` | Liveness probe |

pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod types;


pub use error::{ApiError, ApiResult};
pub use server::{build_router, serve, ServerConfig};
