//! Telephony providers that stream call audio to the bridge.
//!
//! Twilio Media Streams is the only provider: one WebSocket per call carrying
//! base64 µ-law at 8kHz in 20ms chunks.

mod adapter;
pub mod messages;

pub use adapter::{SharedStreamSid, TwilioSink, TwilioSource, twilio_endpoints};
pub use messages::{TwilioCommand, TwilioEvent};
