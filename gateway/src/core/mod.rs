pub mod bridge;
pub mod codec;
pub mod realtime;
pub mod telephony;

// Re-export commonly used types for convenience
pub use bridge::{
    AiConnector, BridgeConfig, BridgeError, BridgeOrchestrator, CallSession, CallSummary,
    CloseReason, SessionState,
};
pub use codec::{AudioEncoding, AudioFormat, FrameCodec, MediaFrame};
pub use realtime::{OpenAIRealtimeConfig, OpenAIRealtimeConnector};
