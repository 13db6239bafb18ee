//! Admin operations on live calls.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::bridge::{CallSetup, CursorSnapshot, SessionState};
use crate::errors::{AppError, AppResult};
use crate::state::AppState;
use crate::utils::validate_call_id;

#[derive(Debug, Deserialize)]
pub struct InstructionRequest {
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
pub struct CallSetupRequest {
    #[serde(default)]
    pub objectives: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CallActionResponse {
    pub success: bool,
    pub call_id: String,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct CallInfo {
    pub call_id: String,
    pub state: SessionState,
    pub elapsed_ms: u64,
    pub upstream: CursorSnapshot,
    pub downstream: CursorSnapshot,
}

/// Wrap an operator prompt so the model can tell it apart from the caller.
pub fn admin_instruction(prompt: &str) -> String {
    format!("[Admin instruction: {}]", prompt.trim())
}

fn checked_call_id(call_id: &str) -> AppResult<()> {
    validate_call_id(call_id)
        .map(|_| ())
        .map_err(|e| AppError::BadRequest(e.to_string()))
}

/// `GET /calls`
pub async fn list_calls(State(state): State<Arc<AppState>>) -> Json<Vec<CallInfo>> {
    let mut calls: Vec<CallInfo> = state
        .orchestrator
        .call_ids()
        .into_iter()
        .filter_map(|call_id| state.orchestrator.lookup(&call_id))
        .map(|session| CallInfo {
            call_id: session.call_id().to_string(),
            state: session.state(),
            elapsed_ms: session.elapsed().as_millis() as u64,
            upstream: session.upstream_cursor(),
            downstream: session.downstream_cursor(),
        })
        .collect();
    calls.sort_by(|a, b| a.call_id.cmp(&b.call_id));
    Json(calls)
}

/// `POST /calls/{call_id}/instructions`
///
/// Injects the prompt into the call's AI conversation and asks for a response.
pub async fn inject_instructions(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
    Json(request): Json<InstructionRequest>,
) -> AppResult<Json<CallActionResponse>> {
    checked_call_id(&call_id)?;
    if request.prompt.trim().is_empty() {
        return Err(AppError::BadRequest("prompt is required".to_string()));
    }

    state
        .orchestrator
        .inject_instruction(&call_id, &admin_instruction(&request.prompt))
        .await?;

    Ok(Json(CallActionResponse {
        success: true,
        call_id,
        message: "Prompt sent to AI",
    }))
}

/// `PUT /calls/{call_id}/setup`
///
/// Registers objectives for a call that has not connected its media stream
/// yet, typically an outbound call about to be placed.
pub async fn prepare_call(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
    Json(request): Json<CallSetupRequest>,
) -> AppResult<Json<CallActionResponse>> {
    checked_call_id(&call_id)?;
    let setup = CallSetup::with_objectives(request.objectives);
    if setup.is_empty() {
        return Err(AppError::BadRequest(
            "at least one objective is required".to_string(),
        ));
    }
    if state.orchestrator.lookup(&call_id).is_some() {
        return Err(AppError::Conflict(format!(
            "call {call_id} is already bridged"
        )));
    }

    state.orchestrator.prepare_call(&call_id, setup);
    Ok(Json(CallActionResponse {
        success: true,
        call_id,
        message: "Call setup registered",
    }))
}

/// `POST /calls/{call_id}/end`
///
/// Forces the call closed and returns once teardown has finished.
pub async fn end_call(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
) -> AppResult<Json<CallActionResponse>> {
    checked_call_id(&call_id)?;
    state.orchestrator.shutdown(&call_id).await?;
    info!(call_id = %call_id, "call ended by admin");

    Ok(Json(CallActionResponse {
        success: true,
        call_id,
        message: "Call ended",
    }))
}
