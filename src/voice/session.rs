//! Realtime voice session.
//!
//! A [`VoiceSession`] owns every resource of one conversation: the
//! microphone pump, the channel link and the playback queue. It is driven
//! from a single task with [`VoiceSession::next_event`] and
//! [`VoiceSession::handle_event`]; state changes only through its methods.

use super::channel::{
    FunctionCall, FunctionResponse, InboundEvent, OutboundMessage, RealtimeConnector,
    RealtimeLink, SessionSetup,
};
use super::live::GeminiLiveConnector;
use super::tools::{dispatch, function_declarations, AssistantAction, AssistantActions};
use crate::audio::{
    decode, decode_pcm, default_microphone, default_output, encode, encode_pcm, AudioOutput,
    Microphone, PlaybackQueue,
};
use crate::config::{Prompts, Settings};
use crate::error::{BasarError, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Active,
    Closing,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Active => write!(f, "active"),
            SessionState::Closing => write!(f, "closing"),
        }
    }
}

/// Audio parameters of a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub setup: SessionSetup,
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub frame_size: usize,
}

impl SessionConfig {
    pub fn from_settings(settings: &Settings, prompts: &Prompts) -> Self {
        Self {
            setup: SessionSetup {
                model: settings.voice.live_model.clone(),
                voice: settings.voice.voice.clone(),
                system_instruction: prompts.assistant_persona(),
                function_declarations: function_declarations(),
                input_sample_rate: settings.voice.input_sample_rate,
            },
            input_sample_rate: settings.voice.input_sample_rate,
            output_sample_rate: settings.voice.output_sample_rate,
            frame_size: settings.voice.frame_size,
        }
    }
}

/// One full-duplex conversation with the remote agent.
pub struct VoiceSession {
    config: SessionConfig,
    connector: Arc<dyn RealtimeConnector>,
    microphone: Arc<dyn Microphone>,
    actions: Arc<dyn AssistantActions>,
    playback: PlaybackQueue,
    state: SessionState,
    link: Option<RealtimeLink>,
    pump: Option<JoinHandle<()>>,
}

impl VoiceSession {
    /// Session on the system devices and the Gemini Live API.
    pub fn new(settings: &Settings, actions: Arc<dyn AssistantActions>) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;
        let connector = Arc::new(GeminiLiveConnector::from_settings(
            &settings.service,
            &settings.voice,
        )?);
        let microphone = default_microphone().ok_or_else(|| {
            BasarError::Device(
                "No microphone support in this build (enable the device-audio feature)".to_string(),
            )
        })?;

        Ok(Self::with_components(
            SessionConfig::from_settings(settings, &prompts),
            connector,
            microphone,
            default_output(),
            actions,
        ))
    }

    pub fn with_components(
        config: SessionConfig,
        connector: Arc<dyn RealtimeConnector>,
        microphone: Arc<dyn Microphone>,
        output: Box<dyn AudioOutput>,
        actions: Arc<dyn AssistantActions>,
    ) -> Self {
        Self {
            config,
            connector,
            microphone,
            actions,
            playback: PlaybackQueue::new(output),
            state: SessionState::Idle,
            link: None,
            pump: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn playback(&self) -> &PlaybackQueue {
        &self.playback
    }

    /// Open the microphone and connect. Only valid from `Idle`.
    ///
    /// A refused microphone surfaces as `PermissionDenied` and the session
    /// stays idle. A failed connection releases the microphone and returns
    /// to idle with a `Channel` error.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(BasarError::InvalidState(format!(
                "Cannot start a session that is {}",
                self.state
            )));
        }

        let mut capture = self
            .microphone
            .open(self.config.input_sample_rate, self.config.frame_size)?;

        self.state = SessionState::Connecting;
        info!("Connecting voice session");

        let link = match self.connector.connect(&self.config.setup).await {
            Ok(link) => link,
            Err(e) => {
                drop(capture);
                self.state = SessionState::Idle;
                return Err(match e {
                    BasarError::Channel(_) => e,
                    other => BasarError::Channel(other.to_string()),
                });
            }
        };

        let outbound = link.sender();
        self.pump = Some(tokio::spawn(async move {
            while let Some(frame) = capture.next_frame().await {
                let chunk = encode(&encode_pcm(&frame));
                if outbound.send(OutboundMessage::Audio(chunk)).is_err() {
                    break;
                }
            }
            debug!("Capture pump finished");
        }));

        self.link = Some(link);
        self.state = SessionState::Active;
        info!("Voice session active");
        Ok(())
    }

    /// Close the channel, release the microphone and silence playback.
    /// Does nothing when already idle.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> Result<()> {
        if self.state == SessionState::Idle {
            return Ok(());
        }
        self.state = SessionState::Closing;

        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Some(link) = self.link.take() {
            link.close();
        }
        self.playback.interrupt();

        self.state = SessionState::Idle;
        info!("Voice session stopped");
        Ok(())
    }

    /// Start when idle or closing, stop otherwise.
    pub async fn toggle(&mut self) -> Result<()> {
        match self.state {
            SessionState::Idle => self.start().await,
            SessionState::Closing => {
                self.stop().await?;
                self.start().await
            }
            SessionState::Connecting | SessionState::Active => self.stop().await,
        }
    }

    /// Next event from the channel. `None` while no channel is open; a
    /// vanished transport is reported as `Closed`.
    pub async fn next_event(&mut self) -> Option<InboundEvent> {
        let link = self.link.as_mut()?;
        Some(link.recv().await.unwrap_or(InboundEvent::Closed(None)))
    }

    /// React to one inbound event.
    pub async fn handle_event(&mut self, event: InboundEvent) -> Result<()> {
        match event {
            InboundEvent::ToolCall(calls) => self.answer_tool_calls(calls).await,
            InboundEvent::Audio(data) => {
                self.play_chunk(&data);
                Ok(())
            }
            InboundEvent::Interrupted => {
                debug!("Agent interrupted");
                self.playback.interrupt();
                Ok(())
            }
            InboundEvent::TurnComplete => {
                debug!("Agent turn complete");
                Ok(())
            }
            InboundEvent::GoAway(time_left) => {
                warn!(
                    "Server is closing the session soon (time left: {})",
                    time_left.as_deref().unwrap_or("unknown")
                );
                Ok(())
            }
            InboundEvent::Closed(reason) => {
                info!(
                    "Channel closed{}",
                    reason.map(|r| format!(": {}", r)).unwrap_or_default()
                );
                self.stop().await
            }
            InboundEvent::Error(message) => {
                self.stop().await?;
                Err(BasarError::Channel(message))
            }
        }
    }

    fn play_chunk(&mut self, data: &str) {
        let frame = decode(data)
            .and_then(|bytes| decode_pcm(&bytes, self.config.output_sample_rate, 1));
        match frame {
            Ok(frame) if frame.is_empty() => {}
            Ok(frame) => {
                if let Err(e) = self.playback.schedule(&frame) {
                    warn!("Failed to schedule agent audio: {}", e);
                }
            }
            Err(e) => warn!("Dropping malformed audio chunk: {}", e),
        }
    }

    async fn answer_tool_calls(&mut self, calls: Vec<FunctionCall>) -> Result<()> {
        let mut responses = Vec::with_capacity(calls.len());
        for call in calls {
            let outcome = match AssistantAction::parse(&call.name, &call.args) {
                Ok(action) => {
                    info!("Assistant action: {:?}", action);
                    Ok(dispatch(self.actions.as_ref(), &action).await.to_string())
                }
                Err(e) => {
                    warn!("Rejected tool call {}: {}", call.name, e);
                    Err(e.to_string())
                }
            };
            responses.push(FunctionResponse {
                id: call.id,
                name: call.name,
                outcome,
            });
        }

        match &self.link {
            Some(link) => link.send(OutboundMessage::ToolResponse(responses)),
            None => Ok(()),
        }
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Some(link) = self.link.take() {
            link.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::playback::tests::ManualOutput;
    use crate::audio::CaptureStream;
    use crate::voice::tools::{PlaybackAction, NAVIGATION_DONE};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Remote end of a fake channel.
    struct Remote {
        events: mpsc::UnboundedSender<InboundEvent>,
        outbound: mpsc::UnboundedReceiver<OutboundMessage>,
    }

    struct FakeConnector {
        remote: Mutex<Option<Remote>>,
        fail: bool,
    }

    impl FakeConnector {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                remote: Mutex::new(None),
                fail,
            })
        }

        fn remote(&self) -> Remote {
            self.remote.lock().unwrap().take().expect("connected")
        }
    }

    #[async_trait]
    impl RealtimeConnector for FakeConnector {
        async fn connect(&self, _setup: &SessionSetup) -> Result<RealtimeLink> {
            if self.fail {
                return Err(BasarError::Channel("handshake refused".into()));
            }
            let (out_tx, out_rx) = mpsc::unbounded_channel();
            let (in_tx, in_rx) = mpsc::unbounded_channel();
            *self.remote.lock().unwrap() = Some(Remote {
                events: in_tx,
                outbound: out_rx,
            });
            Ok(RealtimeLink::new(out_tx, in_rx, None))
        }
    }

    struct FakeMicrophone {
        deny: bool,
        feed: Mutex<Option<mpsc::UnboundedSender<Vec<f32>>>>,
    }

    impl FakeMicrophone {
        fn new(deny: bool) -> Arc<Self> {
            Arc::new(Self {
                deny,
                feed: Mutex::new(None),
            })
        }

        fn feed(&self) -> mpsc::UnboundedSender<Vec<f32>> {
            self.feed.lock().unwrap().clone().expect("microphone open")
        }
    }

    impl Microphone for FakeMicrophone {
        fn open(&self, _sample_rate: u32, _frame_size: usize) -> Result<CaptureStream> {
            if self.deny {
                return Err(BasarError::PermissionDenied("user refused".into()));
            }
            let (tx, rx) = mpsc::unbounded_channel();
            *self.feed.lock().unwrap() = Some(tx);
            Ok(CaptureStream::from_receiver(rx))
        }
    }

    #[derive(Default)]
    struct RecordedActions {
        pages: Mutex<Vec<String>>,
        playback: Mutex<Vec<PlaybackAction>>,
    }

    #[async_trait]
    impl AssistantActions for RecordedActions {
        async fn on_navigate(&self, page: &str) {
            self.pages.lock().unwrap().push(page.to_string());
        }

        async fn on_play_action(&self, action: PlaybackAction) {
            self.playback.lock().unwrap().push(action);
        }
    }

    fn config() -> SessionConfig {
        SessionConfig {
            setup: SessionSetup {
                model: "live".into(),
                voice: "Kore".into(),
                system_instruction: "persona".into(),
                function_declarations: function_declarations(),
                input_sample_rate: 16_000,
            },
            input_sample_rate: 16_000,
            output_sample_rate: 24_000,
            frame_size: 4096,
        }
    }

    struct Harness {
        session: VoiceSession,
        connector: Arc<FakeConnector>,
        microphone: Arc<FakeMicrophone>,
        actions: Arc<RecordedActions>,
        output: ManualOutput,
    }

    fn harness(deny_mic: bool, fail_connect: bool) -> Harness {
        let connector = FakeConnector::new(fail_connect);
        let microphone = FakeMicrophone::new(deny_mic);
        let actions = Arc::new(RecordedActions::default());
        let output = ManualOutput::default();
        let session = VoiceSession::with_components(
            config(),
            connector.clone(),
            microphone.clone(),
            Box::new(output.clone()),
            actions.clone(),
        );
        Harness {
            session,
            connector,
            microphone,
            actions,
            output,
        }
    }

    /// 0.1 s of 24 kHz speech, base64 encoded.
    fn speech_chunk() -> String {
        encode(&vec![0u8; 4_800])
    }

    #[tokio::test]
    async fn test_stop_on_idle_is_noop() {
        let mut h = harness(false, false);
        h.session.stop().await.unwrap();
        assert_eq!(h.session.state(), SessionState::Idle);
        assert!(h.session.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_start_streams_microphone_frames() {
        let mut h = harness(false, false);
        h.session.start().await.unwrap();
        assert_eq!(h.session.state(), SessionState::Active);
        assert!(h.session.start().await.is_err());

        let mut remote = h.connector.remote();
        h.microphone.feed().send(vec![0.25; 4096]).unwrap();

        match remote.outbound.recv().await {
            Some(OutboundMessage::Audio(data)) => {
                let bytes = decode(&data).unwrap();
                assert_eq!(bytes.len(), 8192);
                assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), 8192);
            }
            other => panic!("expected audio, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_permission_denied_surfaces() {
        let mut h = harness(true, false);
        let result = h.session.start().await;
        assert!(matches!(result, Err(BasarError::PermissionDenied(_))));
        assert_eq!(h.session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_connect_failure_returns_to_idle() {
        let mut h = harness(false, true);
        let result = h.session.start().await;
        assert!(matches!(result, Err(BasarError::Channel(_))));
        assert_eq!(h.session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_tool_call_acknowledged_by_id() {
        let mut h = harness(false, false);
        h.session.start().await.unwrap();
        let mut remote = h.connector.remote();

        remote
            .events
            .send(InboundEvent::ToolCall(vec![
                FunctionCall {
                    id: "call-7".into(),
                    name: "navigateToPage".into(),
                    args: json!({"page": "library"}),
                },
                FunctionCall {
                    id: "call-8".into(),
                    name: "launchRocket".into(),
                    args: json!({}),
                },
            ]))
            .unwrap();

        let event = h.session.next_event().await.unwrap();
        h.session.handle_event(event).await.unwrap();

        assert_eq!(*h.actions.pages.lock().unwrap(), vec!["library".to_string()]);
        match remote.outbound.recv().await {
            Some(OutboundMessage::ToolResponse(responses)) => {
                assert_eq!(responses.len(), 2);
                assert_eq!(responses[0].id, "call-7");
                assert_eq!(responses[0].outcome, Ok(NAVIGATION_DONE.to_string()));
                assert_eq!(responses[1].id, "call-8");
                assert!(responses[1].outcome.is_err());
            }
            other => panic!("expected tool response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_audio_is_scheduled_back_to_back() {
        let mut h = harness(false, false);
        h.session.start().await.unwrap();

        h.output.set_time(2.0);
        for _ in 0..3 {
            h.session
                .handle_event(InboundEvent::Audio(speech_chunk()))
                .await
                .unwrap();
        }

        let starts: Vec<f64> = h.output.started().iter().map(|s| s.1).collect();
        assert_eq!(starts.len(), 3);
        assert!((starts[0] - 2.0).abs() < 1e-9);
        assert!((starts[1] - 2.1).abs() < 1e-9);
        assert!((starts[2] - 2.2).abs() < 1e-9);
        assert!((h.session.playback().cursor() - 2.3).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_interruption_clears_playback() {
        let mut h = harness(false, false);
        h.session.start().await.unwrap();

        for _ in 0..3 {
            h.session
                .handle_event(InboundEvent::Audio(speech_chunk()))
                .await
                .unwrap();
        }
        assert_eq!(h.session.playback().active_sources(), 3);

        h.session.handle_event(InboundEvent::Interrupted).await.unwrap();
        assert_eq!(h.session.playback().active_sources(), 0);
        assert_eq!(h.session.playback().cursor(), 0.0);
        assert_eq!(h.output.playing(), 0);
        assert_eq!(h.session.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn test_malformed_audio_is_dropped() {
        let mut h = harness(false, false);
        h.session.start().await.unwrap();
        h.session
            .handle_event(InboundEvent::Audio("not base64!".into()))
            .await
            .unwrap();
        h.session
            .handle_event(InboundEvent::Audio(encode(&[1, 2, 3])))
            .await
            .unwrap();
        assert_eq!(h.session.playback().active_sources(), 0);
        assert!(h.session.is_active());
    }

    #[tokio::test]
    async fn test_channel_error_cleans_up() {
        let mut h = harness(false, false);
        h.session.start().await.unwrap();
        h.session
            .handle_event(InboundEvent::Audio(speech_chunk()))
            .await
            .unwrap();
        let mut remote = h.connector.remote();

        let result = h
            .session
            .handle_event(InboundEvent::Error("socket reset".into()))
            .await;

        assert!(matches!(result, Err(BasarError::Channel(_))));
        assert_eq!(h.session.state(), SessionState::Idle);
        assert_eq!(h.session.playback().active_sources(), 0);
        assert_eq!(remote.outbound.recv().await, Some(OutboundMessage::Close));
    }

    #[tokio::test]
    async fn test_remote_close_returns_to_idle_and_toggle_restarts() {
        let mut h = harness(false, false);
        h.session.toggle().await.unwrap();
        assert!(h.session.is_active());

        let remote = h.connector.remote();
        drop(remote);

        let event = h.session.next_event().await.unwrap();
        assert_eq!(event, InboundEvent::Closed(None));
        h.session.handle_event(event).await.unwrap();
        assert_eq!(h.session.state(), SessionState::Idle);

        h.session.toggle().await.unwrap();
        assert!(h.session.is_active());
        h.session.toggle().await.unwrap();
        assert_eq!(h.session.state(), SessionState::Idle);
    }
}
