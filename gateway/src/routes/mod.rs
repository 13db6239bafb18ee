pub mod api;
pub mod media_stream;

use std::sync::Arc;

use axum::{Router, routing::get};

use crate::handlers::api::health_check;
use crate::state::AppState;

/// Every route the server exposes, with state applied.
///
/// Cross-cutting layers (CORS, security headers) are added by the binary.
pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .merge(api::create_api_router())
        .merge(media_stream::create_media_stream_router())
        .with_state(state)
}
