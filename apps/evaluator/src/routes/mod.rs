pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::jobs::{handlers, upload};
use crate::state::AppState;

/// Multipart framing on top of two full-size files.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.uploads.max_file_size * 2 + MULTIPART_OVERHEAD;

    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/api/v1/upload",
            post(upload::handle_upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/v1/evaluate", post(handlers::handle_evaluate))
        .route("/api/v1/result/:id", get(handlers::handle_get_result))
        .with_state(state)
}
