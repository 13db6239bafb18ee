//! Realtime AI providers the bridge can connect calls to.

pub mod openai;

pub use openai::{OpenAIRealtimeConfig, OpenAIRealtimeConnector};
