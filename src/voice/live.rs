//! Gemini Live websocket transport.

use super::channel::{
    FunctionCall, FunctionResponse, InboundEvent, OutboundMessage, RealtimeConnector,
    RealtimeLink, SessionSetup,
};
use crate::config::{ServiceSettings, VoiceSettings};
use crate::error::{BasarError, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, instrument, warn};

/// Connects to the Gemini Live `BidiGenerateContent` endpoint.
pub struct GeminiLiveConnector {
    url: String,
    api_key: String,
    connect_timeout: Duration,
}

impl GeminiLiveConnector {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            connect_timeout,
        }
    }

    pub fn from_settings(service: &ServiceSettings, voice: &VoiceSettings) -> Result<Self> {
        let api_key = service.gemini_api_key().ok_or_else(|| {
            BasarError::Config(format!(
                "{} is not set. The voice assistant needs a Gemini API key.",
                service.gemini_api_key_env
            ))
        })?;
        Ok(Self::new(
            voice.live_url.clone(),
            api_key,
            Duration::from_secs(voice.connect_timeout_seconds),
        ))
    }

    fn endpoint(&self) -> Result<String> {
        let mut url = url::Url::parse(&self.url)
            .map_err(|e| BasarError::Config(format!("Invalid live URL '{}': {}", self.url, e)))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url.into())
    }
}

#[async_trait]
impl RealtimeConnector for GeminiLiveConnector {
    #[instrument(skip(self, setup), fields(model = %setup.model))]
    async fn connect(&self, setup: &SessionSetup) -> Result<RealtimeLink> {
        let endpoint = self.endpoint()?;

        let (ws, _) = tokio::time::timeout(
            self.connect_timeout,
            tokio_tungstenite::connect_async(endpoint.as_str()),
        )
        .await
        .map_err(|_| BasarError::Channel("Timed out connecting to the live API".to_string()))?
        .map_err(|e| BasarError::Channel(format!("Connection failed: {}", e)))?;

        let (mut write, mut read) = ws.split();

        write
            .send(Message::Text(encode_setup(setup).to_string()))
            .await
            .map_err(|e| BasarError::Channel(format!("Failed to send setup: {}", e)))?;

        // The server answers the setup before anything else.
        let handshake = tokio::time::timeout(self.connect_timeout, async {
            while let Some(frame) = read.next().await {
                let frame = frame.map_err(|e| BasarError::Channel(e.to_string()))?;
                match frame_text(&frame) {
                    Some(text) => {
                        if decode_server_message(&text)?.setup_complete {
                            return Ok(());
                        }
                    }
                    None => {
                        if let Message::Close(close) = frame {
                            let reason = close.map(|c| c.reason.to_string()).unwrap_or_default();
                            return Err(BasarError::Channel(format!(
                                "Server closed during setup: {}",
                                reason
                            )));
                        }
                    }
                }
            }
            Err::<(), BasarError>(BasarError::Channel(
                "Connection ended during setup".to_string(),
            ))
        })
        .await
        .map_err(|_| BasarError::Channel("Timed out waiting for setup".to_string()))?;
        handshake?;

        info!("Live session established");

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutboundMessage>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<InboundEvent>();

        let input_rate = setup.input_sample_rate;
        let transport = tokio::spawn(async move {
            loop {
                tokio::select! {
                    outbound = out_rx.recv() => {
                        let Some(message) = outbound else {
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        };
                        if message == OutboundMessage::Close {
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        }
                        if let Err(e) = write.send(Message::Text(encode_outbound(&message, input_rate).to_string())).await {
                            let _ = in_tx.send(InboundEvent::Error(format!("Send failed: {}", e)));
                            break;
                        }
                    }
                    inbound = read.next() => {
                        match inbound {
                            Some(Ok(Message::Close(close))) => {
                                let reason = close.map(|c| c.reason.to_string()).filter(|r| !r.is_empty());
                                let _ = in_tx.send(InboundEvent::Closed(reason));
                                break;
                            }
                            Some(Ok(frame)) => {
                                let Some(text) = frame_text(&frame) else { continue };
                                match decode_server_message(&text) {
                                    Ok(message) => {
                                        for event in message.events {
                                            let _ = in_tx.send(event);
                                        }
                                    }
                                    Err(e) => warn!("Ignoring undecodable server message: {}", e),
                                }
                            }
                            Some(Err(e)) => {
                                let _ = in_tx.send(InboundEvent::Error(e.to_string()));
                                break;
                            }
                            None => {
                                let _ = in_tx.send(InboundEvent::Closed(None));
                                break;
                            }
                        }
                    }
                }
            }
            debug!("Live transport finished");
        });

        Ok(RealtimeLink::new(out_tx, in_rx, Some(transport)))
    }
}

/// JSON text of a data frame. Gemini sends JSON in binary frames too.
fn frame_text(frame: &Message) -> Option<String> {
    match frame {
        Message::Text(text) => Some(text.to_string()),
        Message::Binary(bytes) => String::from_utf8(bytes.to_vec()).ok(),
        _ => None,
    }
}

/// The `setup` message opening a session.
pub fn encode_setup(setup: &SessionSetup) -> Value {
    let model = if setup.model.starts_with("models/") {
        setup.model.clone()
    } else {
        format!("models/{}", setup.model)
    };

    json!({
        "setup": {
            "model": model,
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": setup.voice } }
                }
            },
            "systemInstruction": { "parts": [{ "text": setup.system_instruction }] },
            "tools": [{ "functionDeclarations": setup.function_declarations }]
        }
    })
}

/// Wire form of an outbound message. Audio is labelled with the capture
/// rate declared at setup.
pub fn encode_outbound(message: &OutboundMessage, input_rate: u32) -> Value {
    match message {
        OutboundMessage::Audio(data) => json!({
            "realtimeInput": {
                "mediaChunks": [{ "mimeType": format!("audio/pcm;rate={}", input_rate), "data": data }]
            }
        }),
        OutboundMessage::ToolResponse(responses) => json!({
            "toolResponse": {
                "functionResponses": responses.iter().map(encode_response).collect::<Vec<_>>()
            }
        }),
        OutboundMessage::Close => Value::Null,
    }
}

fn encode_response(response: &FunctionResponse) -> Value {
    let body = match &response.outcome {
        Ok(result) => json!({ "result": result }),
        Err(error) => json!({ "error": error }),
    };
    json!({ "id": response.id, "name": response.name, "response": body })
}

/// A decoded server message.
#[derive(Debug, Default, PartialEq)]
pub struct ServerMessage {
    pub setup_complete: bool,
    /// Events in the order the session must handle them: tool calls,
    /// audio, then interruption and turn markers.
    pub events: Vec<InboundEvent>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawServerMessage {
    setup_complete: Option<Value>,
    server_content: Option<RawServerContent>,
    tool_call: Option<RawToolCall>,
    go_away: Option<RawGoAway>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawServerContent {
    model_turn: Option<RawTurn>,
    #[serde(default)]
    interrupted: bool,
    #[serde(default)]
    turn_complete: bool,
}

#[derive(Debug, Deserialize, Default)]
struct RawTurn {
    #[serde(default)]
    parts: Vec<RawPart>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawPart {
    inline_data: Option<RawInlineData>,
}

#[derive(Debug, Deserialize)]
struct RawInlineData {
    data: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawToolCall {
    #[serde(default)]
    function_calls: Vec<RawFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct RawFunctionCall {
    #[serde(default)]
    id: String,
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawGoAway {
    time_left: Option<String>,
}

/// Decode one server JSON message into session events.
pub fn decode_server_message(text: &str) -> Result<ServerMessage> {
    let raw: RawServerMessage = serde_json::from_str(text)
        .map_err(|e| BasarError::Channel(format!("Invalid server message: {}", e)))?;

    let mut events = Vec::new();

    if let Some(call) = raw.tool_call {
        let calls: Vec<FunctionCall> = call
            .function_calls
            .into_iter()
            .map(|c| FunctionCall {
                id: c.id,
                name: c.name,
                args: c.args,
            })
            .collect();
        if !calls.is_empty() {
            events.push(InboundEvent::ToolCall(calls));
        }
    }

    if let Some(content) = raw.server_content {
        let audio = content
            .model_turn
            .into_iter()
            .flat_map(|t| t.parts)
            .filter_map(|p| p.inline_data)
            .map(|d| InboundEvent::Audio(d.data));
        events.extend(audio);
        if content.interrupted {
            events.push(InboundEvent::Interrupted);
        }
        if content.turn_complete {
            events.push(InboundEvent::TurnComplete);
        }
    }

    if let Some(go_away) = raw.go_away {
        events.push(InboundEvent::GoAway(go_away.time_left));
    }

    Ok(ServerMessage {
        setup_complete: raw.setup_complete.is_some(),
        events,
    })
}
