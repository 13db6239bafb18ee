//! The bidirectional call bridge.
//!
//! A call enters through [`BridgeOrchestrator::accept`] with its telephony
//! endpoint; the orchestrator opens the AI side through an [`AiConnector`],
//! and two direction tasks relay audio and control events through the call's
//! [`CallSession`] until either side ends the call.

pub mod adapter;
pub mod config;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod playout;
mod pump;
pub mod registry;
pub mod session;

pub use adapter::{
    AiConnector, CallSetup, Endpoint, EndpointPair, MediaSink, MediaSource, TelephonyHandle,
};
pub use config::{BridgeConfig, InterruptionTrigger, TruncationMode};
pub use error::{BridgeError, BridgeResult, FailureClass};
pub use events::{Ack, ControlEvent, ControlKind, Inbound, MediaFrame, Outbound, Side};
pub use orchestrator::BridgeOrchestrator;
pub use playout::{PlaybackMarks, PlayoutTracker, TruncationPolicy, WallClock};
pub use pump::EnergyDetector;
pub use registry::SessionRegistry;
pub use session::{
    CallSession, CallSummary, CloseReason, CursorSnapshot, Direction, SessionState, StateChange,
};
