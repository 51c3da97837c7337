pub mod docs;
pub mod health;
pub mod question;

use crate::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};

/// Every route the service exposes, without middleware.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/question", put(question::add_questions_in_bulk))
        .route("/api/question/download-pdf", post(question::download_pdf))
        .route("/api-docs/openapi.json", get(docs::openapi_json))
}
