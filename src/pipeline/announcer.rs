//! Spoken status updates during generation.

use crate::audio::{decode_pcm, PlaybackQueue, SPEECH_SAMPLE_RATE};
use crate::config::Prompts;
use crate::error::Result;
use crate::retry::{with_retry, RetryPolicy};
use crate::service::GenerationService;
use std::sync::{Arc, Mutex};
use tracing::{debug, error};

/// Speaks short progress messages through the generation service.
///
/// Announcements are best effort: failures are logged and swallowed, and a
/// disabled announcer does nothing.
pub struct StatusAnnouncer {
    inner: Option<Speaker>,
}

struct Speaker {
    service: Arc<dyn GenerationService>,
    prompts: Prompts,
    voice: String,
    policy: RetryPolicy,
    playback: Arc<Mutex<PlaybackQueue>>,
}

impl StatusAnnouncer {
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn new(
        service: Arc<dyn GenerationService>,
        prompts: Prompts,
        voice: impl Into<String>,
        policy: RetryPolicy,
        playback: Arc<Mutex<PlaybackQueue>>,
    ) -> Self {
        Self {
            inner: Some(Speaker {
                service,
                prompts,
                voice: voice.into(),
                policy,
                playback,
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Speak `text`, or log why it could not be spoken.
    pub async fn announce(&self, text: &str) {
        let Some(speaker) = &self.inner else {
            return;
        };
        match speaker.speak(text).await {
            Ok(()) => debug!("Announced: {}", text),
            Err(e) => error!("Status announcement skipped: {}", e),
        }
    }
}

impl Speaker {
    async fn speak(&self, text: &str) -> Result<()> {
        let input = self.prompts.status_narration(text);
        let pcm = with_retry(&self.policy, "status announcement", || {
            self.service.synthesize_speech(&input, &self.voice)
        })
        .await?;

        if pcm.is_empty() {
            return Ok(());
        }
        let frame = decode_pcm(&pcm, SPEECH_SAMPLE_RATE, 1)?;

        // A poisoned queue only means another holder panicked mid-schedule.
        let mut queue = self.playback.lock().unwrap_or_else(|p| p.into_inner());
        queue.schedule(&frame)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::playback::tests::ManualOutput;
    use crate::error::BasarError;
    use crate::service::DocumentSource;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct SpeechOnly {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl GenerationService for SpeechOnly {
        async fn analyze_document(&self, _: &DocumentSource, _: &str) -> Result<String> {
            unreachable!("announcer never analyzes")
        }

        async fn synthesize_speech(&self, _: &str, _: &str) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(BasarError::RateLimited("quota".into()))
            } else {
                Ok(vec![0; 4_800])
            }
        }

        fn name(&self) -> &str {
            "speech-only"
        }
    }

    fn announcer(fail: bool) -> (StatusAnnouncer, Arc<SpeechOnly>, ManualOutput) {
        let service = Arc::new(SpeechOnly {
            calls: AtomicUsize::new(0),
            fail,
        });
        let output = ManualOutput::default();
        let queue = Arc::new(Mutex::new(PlaybackQueue::new(Box::new(output.clone()))));
        let announcer = StatusAnnouncer::new(
            service.clone(),
            Prompts::default(),
            "Kore",
            RetryPolicy::new(3, Duration::from_millis(5_000)),
            queue,
        );
        (announcer, service, output)
    }

    #[tokio::test]
    async fn test_announcement_is_scheduled() {
        let (announcer, service, output) = announcer(false);
        announcer.announce("Processing finished").await;

        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
        let started = output.started();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].2, 2_400);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_swallowed_after_small_budget() {
        let (announcer, service, output) = announcer(true);
        announcer.announce("Starting").await;

        // Initial call plus three retries.
        assert_eq!(service.calls.load(Ordering::SeqCst), 4);
        assert!(output.started().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_announcer_is_silent() {
        let announcer = StatusAnnouncer::disabled();
        assert!(!announcer.is_enabled());
        announcer.announce("nothing").await;
    }
}
