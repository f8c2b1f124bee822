//! Lecture player driven by the voice assistant.
//!
//! Keeps track of the page the listener is on and the selected course, and
//! turns `controlPlayback` requests into scheduled audio.

use crate::audio::{decode_pcm, AudioOutput, PlaybackQueue, SPEECH_SAMPLE_RATE};
use crate::config::Prompts;
use crate::course::CourseArtifact;
use crate::error::{BasarError, Result};
use crate::retry::{with_retry, RetryPolicy};
use crate::service::GenerationService;
use crate::voice::{AssistantActions, PlaybackAction};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Pages the assistant can navigate to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Page {
    #[default]
    Landing,
    Library,
    Details,
}

impl std::str::FromStr for Page {
    type Err = BasarError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "landing" | "home" => Ok(Page::Landing),
            "library" | "courses" => Ok(Page::Library),
            "details" | "course" => Ok(Page::Details),
            other => Err(BasarError::InvalidInput(format!("Unknown page: {}", other))),
        }
    }
}

impl std::fmt::Display for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Page::Landing => write!(f, "landing"),
            Page::Library => write!(f, "library"),
            Page::Details => write!(f, "details"),
        }
    }
}

/// What the player did in response to an action, for display.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    Navigated(Page),
    Playing {
        title: String,
        topics: usize,
        seconds: f64,
    },
    Stopped,
    Summary(Option<String>),
    NothingSelected,
}

struct Narrator {
    service: Arc<dyn GenerationService>,
    prompts: Prompts,
    voice: String,
    policy: RetryPolicy,
}

#[derive(Default)]
struct PlayerState {
    page: Page,
    course: Option<CourseArtifact>,
}

pub struct LecturePlayer {
    state: Mutex<PlayerState>,
    playback: Mutex<PlaybackQueue>,
    narrator: Option<Narrator>,
    events: mpsc::UnboundedSender<PlayerEvent>,
}

impl LecturePlayer {
    /// Create a player on `output`. The receiver yields a [`PlayerEvent`]
    /// for every handled action.
    pub fn new(output: Box<dyn AudioOutput>) -> (Self, mpsc::UnboundedReceiver<PlayerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let player = Self {
            state: Mutex::new(PlayerState::default()),
            playback: Mutex::new(PlaybackQueue::new(output)),
            narrator: None,
            events,
        };
        (player, rx)
    }

    /// Read smart summaries aloud instead of only reporting them.
    pub fn with_narrator(
        mut self,
        service: Arc<dyn GenerationService>,
        prompts: Prompts,
        voice: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        self.narrator = Some(Narrator {
            service,
            prompts,
            voice: voice.into(),
            policy,
        });
        self
    }

    /// Select a course and open its details page.
    pub fn select(&self, course: CourseArtifact) {
        let mut state = self.state();
        info!("Selected course '{}'", course.title);
        state.course = Some(course);
        state.page = Page::Details;
    }

    pub fn page(&self) -> Page {
        self.state().page
    }

    pub fn selected_title(&self) -> Option<String> {
        self.state().course.as_ref().map(|c| c.title.clone())
    }

    fn state(&self) -> MutexGuard<'_, PlayerState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn playback(&self) -> MutexGuard<'_, PlaybackQueue> {
        self.playback.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn emit(&self, event: PlayerEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    fn play(&self) {
        let Some(course) = self.state().course.clone() else {
            warn!("Play requested with no course selected");
            self.emit(PlayerEvent::NothingSelected);
            return;
        };

        let mut queue = self.playback();
        queue.interrupt();

        let mut topics = 0;
        let mut seconds = 0.0;
        for topic in course.topics() {
            let Some(audio) = &topic.audio else {
                debug!("Skipping text-only topic '{}'", topic.title);
                continue;
            };
            let scheduled = decode_pcm(&audio.pcm, audio.sample_rate, audio.channels)
                .and_then(|frame| queue.schedule(&frame).map(|_| frame.duration_secs()));
            match scheduled {
                Ok(duration) => {
                    topics += 1;
                    seconds += duration;
                }
                Err(e) => warn!("Skipping topic '{}': {}", topic.title, e),
            }
        }

        info!("Playing {} topic(s) of '{}'", topics, course.title);
        self.emit(PlayerEvent::Playing {
            title: course.title,
            topics,
            seconds,
        });
    }

    fn stop(&self) {
        self.playback().interrupt();
        self.emit(PlayerEvent::Stopped);
    }

    async fn summary(&self) {
        let selected = self.state().course.as_ref().map(|c| c.smart_summary.clone());
        let Some(summary) = selected else {
            self.emit(PlayerEvent::NothingSelected);
            return;
        };
        self.emit(PlayerEvent::Summary(summary.clone()));

        if let (Some(narrator), Some(text)) = (&self.narrator, summary) {
            if let Err(e) = self.narrate(narrator, &text).await {
                warn!("Summary narration failed: {}", e);
            }
        }
    }

    async fn narrate(&self, narrator: &Narrator, text: &str) -> Result<()> {
        let input = narrator.prompts.topic_narration(text);
        let pcm = with_retry(&narrator.policy, "summary narration", || {
            narrator.service.synthesize_speech(&input, &narrator.voice)
        })
        .await?;
        if pcm.is_empty() {
            return Err(BasarError::AudioSynthesis("empty audio payload".to_string()));
        }

        let frame = decode_pcm(&pcm, SPEECH_SAMPLE_RATE, 1)?;
        let mut queue = self.playback();
        queue.interrupt();
        queue.schedule(&frame)?;
        Ok(())
    }
}

#[async_trait]
impl AssistantActions for LecturePlayer {
    async fn on_navigate(&self, page: &str) {
        match page.parse::<Page>() {
            Ok(page) => {
                self.state().page = page;
                info!("Navigated to {}", page);
                self.emit(PlayerEvent::Navigated(page));
            }
            Err(e) => warn!("{}", e),
        }
    }

    async fn on_play_action(&self, action: PlaybackAction) {
        match action {
            PlaybackAction::Play => self.play(),
            PlaybackAction::Stop => self.stop(),
            PlaybackAction::Summary => self.summary().await,
        }
    }
}
