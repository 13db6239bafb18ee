use std::sync::Arc;

use axum::{Json, extract::State};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub openai_configured: bool,
    pub active_calls: usize,
    pub uptime_secs: u64,
}

/// Liveness and load: service status plus the number of bridged calls.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        openai_configured: state.config.has_openai_key(),
        active_calls: state.orchestrator.active_calls(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}
