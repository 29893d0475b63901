//! Route modules for the HMAC uploader server

pub mod files;
pub mod form;
pub mod health;
pub mod verify;

use axum::{extract::DefaultBodyLimit, routing::get, Router};

use crate::state::AppState;

/// Build the application router
///
/// Cross-cutting layers (CORS, tracing) are added by the binary.
pub fn app(state: AppState) -> Router {
    let body_limit = state.config().storage.max_upload_bytes;

    let api = Router::new()
        .merge(files::router())
        .merge(verify::router())
        .layer(DefaultBodyLimit::max(body_limit));

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", api)
        .with_state(state)
}
