//! Realtime voice assistant.
//!
//! - `channel` defines the message types and the connector seam
//! - `live` implements the connector over the Gemini Live websocket API
//! - `tools` decodes the assistant's actions
//! - `session` is the state machine tying microphone, channel and playback together

pub mod channel;
pub mod live;
pub mod session;
pub mod tools;

pub use channel::{
    FunctionCall, FunctionResponse, InboundEvent, OutboundMessage, RealtimeConnector,
    RealtimeLink, SessionSetup,
};
pub use live::GeminiLiveConnector;
pub use session::{SessionConfig, SessionState, VoiceSession};
pub use tools::{AssistantAction, AssistantActions, PlaybackAction};
