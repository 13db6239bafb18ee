//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoints
//! - `calls` - Admin operations on live calls (instructions, forced end)
//! - `media_stream` - Twilio Media Streams WebSocket

pub mod api;
pub mod calls;
pub mod media_stream;

pub use media_stream::media_stream_handler;
