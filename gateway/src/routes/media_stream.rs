//! Media stream WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::media_stream_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the media stream router
///
/// # Endpoint
///
/// `GET /media-stream/{call_id}` - WebSocket upgrade for a Twilio Media Stream
///
/// Point a TwiML `<Stream url="wss://host/media-stream/{CallSid}"/>` here.
/// Twilio sends `connected`, `start`, then `media` frames with base64 µ-law
/// audio; the bridge answers with `media`, `mark` and `clear` frames.
pub fn create_media_stream_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/media-stream/{call_id}", get(media_stream_handler))
        .layer(TraceLayer::new_for_http())
}
