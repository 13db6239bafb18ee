//! Twilio Media Streams WebSocket endpoint.

use std::sync::Arc;

use axum::{
    extract::{
        Path, State,
        ws::{WebSocket, WebSocketUpgrade},
    },
    response::{IntoResponse, Response},
};
use tracing::{info, warn};

use crate::core::bridge::BridgeError;
use crate::core::telephony::twilio_endpoints;
use crate::errors::AppError;
use crate::state::AppState;
use crate::utils::validate_call_id;

/// Media Streams messages are small JSON frames; anything larger is not Twilio.
const MAX_WS_MESSAGE_SIZE: usize = 64 * 1024;

/// `GET /media-stream/{call_id}`
///
/// Upgrades to a WebSocket and hands it to the orchestrator. Invalid ids and
/// calls over the admission limit are refused before the upgrade.
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    Path(call_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    if let Err(e) = validate_call_id(&call_id) {
        warn!(call_id = %call_id, "rejecting media stream: {}", e);
        return AppError::BadRequest(e.to_string()).into_response();
    }
    // early answers only; `accept` decides atomically after the upgrade
    if state.orchestrator.lookup(&call_id).is_some() {
        return AppError::from(BridgeError::DuplicateCall(call_id)).into_response();
    }
    if let Some(limit) = state.orchestrator.config().max_concurrent_calls
        && state.orchestrator.at_capacity()
    {
        return AppError::from(BridgeError::CapacityExceeded(limit)).into_response();
    }

    info!(call_id = %call_id, "media stream upgrade requested");
    ws.max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_media_stream(socket, call_id, state))
}

async fn handle_media_stream(socket: WebSocket, call_id: String, state: Arc<AppState>) {
    let format = state.orchestrator.config().telephony_format;
    match state
        .orchestrator
        .accept(&call_id, twilio_endpoints(socket, format))
    {
        Ok(_) => info!(call_id = %call_id, "media stream bridged"),
        // the socket is dropped with the rejected endpoints
        Err(e) => warn!(call_id = %call_id, "media stream rejected: {}", e),
    }
}
