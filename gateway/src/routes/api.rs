use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;

use crate::handlers::calls;
use crate::state::AppState;
use std::sync::Arc;

/// Create the admin API router for live calls
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/calls", get(calls::list_calls))
        .route(
            "/calls/{call_id}/instructions",
            post(calls::inject_instructions),
        )
        .route("/calls/{call_id}/setup", put(calls::prepare_call))
        .route("/calls/{call_id}/end", post(calls::end_call))
        .layer(TraceLayer::new_for_http())
}
