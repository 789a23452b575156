//! HTTP surface: `/generate-embedding`, `/verify-face` and `/health`.

pub mod errors;
pub mod handlers;
pub mod request;
pub mod server;

pub use errors::{ApiError, ErrorBody};
pub use request::{EmbeddingResponse, HealthResponse, VerifyResponse};
pub use server::{create_app, start_server, AppState};
