//! Bidirectional channel to the remote conversational agent.

use crate::error::{BasarError, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Tool invocation requested by the agent.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub id: String,
    pub name: String,
    pub args: Value,
}

/// Answer to a [`FunctionCall`], correlated by id.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionResponse {
    pub id: String,
    pub name: String,
    /// `Ok(result)` or `Err(error message)`.
    pub outcome: std::result::Result<String, String>,
}

/// Something that happened on the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    ToolCall(Vec<FunctionCall>),
    /// Base64 PCM (s16le, 24 kHz mono).
    Audio(String),
    /// The user spoke over the agent; queued speech must stop.
    Interrupted,
    TurnComplete,
    /// The server will close soon.
    GoAway(Option<String>),
    Closed(Option<String>),
    Error(String),
}

/// Message queued for the agent.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// Base64 PCM (s16le mono at the setup's input rate).
    Audio(String),
    ToolResponse(Vec<FunctionResponse>),
    Close,
}

/// Parameters sent when the channel opens.
#[derive(Debug, Clone)]
pub struct SessionSetup {
    pub model: String,
    pub voice: String,
    pub system_instruction: String,
    pub function_declarations: Value,
    pub input_sample_rate: u32,
}

/// An open channel: one outbound queue, one inbound stream, and the
/// transport task moving messages between them and the network.
pub struct RealtimeLink {
    outbound: mpsc::UnboundedSender<OutboundMessage>,
    inbound: mpsc::UnboundedReceiver<InboundEvent>,
    transport: Option<JoinHandle<()>>,
}

impl RealtimeLink {
    pub fn new(
        outbound: mpsc::UnboundedSender<OutboundMessage>,
        inbound: mpsc::UnboundedReceiver<InboundEvent>,
        transport: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            outbound,
            inbound,
            transport,
        }
    }

    /// Handle for producers (the capture pump) that only enqueue.
    pub fn sender(&self) -> mpsc::UnboundedSender<OutboundMessage> {
        self.outbound.clone()
    }

    pub fn send(&self, message: OutboundMessage) -> Result<()> {
        self.outbound
            .send(message)
            .map_err(|_| BasarError::Channel("Channel is closed".to_string()))
    }

    /// Next inbound event, or `None` once the transport has gone away.
    pub async fn recv(&mut self) -> Option<InboundEvent> {
        self.inbound.recv().await
    }

    /// Ask the transport to close the connection. The transport task is
    /// detached and exits after sending the close frame.
    pub fn close(self) {
        if self.outbound.send(OutboundMessage::Close).is_err() {
            debug!("Transport already gone");
        }
        drop(self.transport);
    }
}

/// Opens realtime channels.
#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    /// Connect and complete the setup handshake.
    async fn connect(&self, setup: &SessionSetup) -> Result<RealtimeLink>;
}
