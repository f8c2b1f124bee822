//! Pipeline orchestration from document to course artifact.

use super::{GenerationProgress, PipelineObserver, StatusAnnouncer, StepKind};
use crate::audio::{default_output, PlaybackQueue, SPEECH_SAMPLE_RATE};
use crate::config::{GenerationSettings, Prompts, Settings};
use crate::course::{
    word_count, Category, Chapter, CourseArtifact, CourseOutline, Topic, TopicAudio, TopicOutline,
};
use crate::error::{BasarError, Result};
use crate::retry::with_retry;
use crate::service::{create_service, narration_voice, status_voice, DocumentSource, GenerationService};
use chrono::Utc;
use std::sync::{Arc, Mutex};
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Texts spoken at the pipeline milestones.
#[derive(Debug, Clone)]
pub struct StatusMessages {
    pub started: String,
    pub structured: String,
    pub synthesizing: String,
    pub completed: String,
    pub failed: String,
}

impl Default for StatusMessages {
    fn default() -> Self {
        Self {
            started: "I have started analyzing the lecture file.".to_string(),
            structured: "The chapters were identified. I am now organizing the topics.".to_string(),
            synthesizing: "Turning the explanations into an audio podcast.".to_string(),
            completed: "Processing finished successfully.".to_string(),
            failed: "Sorry, the daily quota seems to be used up or the server is very busy."
                .to_string(),
        }
    }
}

/// Runs the generation pipeline against a [`GenerationService`].
pub struct CoursePipeline {
    settings: GenerationSettings,
    prompts: Prompts,
    service: Arc<dyn GenerationService>,
    narration_voice: String,
    announcer: StatusAnnouncer,
    messages: StatusMessages,
}

impl CoursePipeline {
    /// Create a pipeline from configuration. Status announcements (when
    /// enabled) play on the default output.
    pub fn new(settings: &Settings) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;
        let service = create_service(settings)?;
        info!("Using {} for analysis and narration", service.name());

        let announcer = if settings.generation.announce_status {
            StatusAnnouncer::new(
                service.clone(),
                prompts.clone(),
                status_voice(settings),
                settings.generation.status_retry_policy(),
                Arc::new(Mutex::new(PlaybackQueue::new(default_output()))),
            )
        } else {
            StatusAnnouncer::disabled()
        };

        Ok(Self::with_components(
            settings.generation.clone(),
            prompts,
            service,
            narration_voice(settings),
            announcer,
        ))
    }

    /// Create a pipeline with custom components.
    pub fn with_components(
        settings: GenerationSettings,
        prompts: Prompts,
        service: Arc<dyn GenerationService>,
        narration_voice: &str,
        announcer: StatusAnnouncer,
    ) -> Self {
        Self {
            settings,
            prompts,
            service,
            narration_voice: narration_voice.to_string(),
            announcer,
            messages: StatusMessages::default(),
        }
    }

    pub fn service(&self) -> &Arc<dyn GenerationService> {
        &self.service
    }

    /// Generate a course from `document`.
    ///
    /// Per-topic synthesis failures degrade the topic to text only. A failure
    /// while reading or structuring marks the current step as failed, speaks
    /// a single failure notice and returns the error; no artifact is
    /// produced in that case.
    #[instrument(skip(self, document, observer), fields(document = %document.name))]
    pub async fn run(
        &self,
        document: &DocumentSource,
        observer: &dyn PipelineObserver,
    ) -> Result<CourseArtifact> {
        let mut progress = GenerationProgress::new();

        match self.execute(document, &mut progress, observer).await {
            Ok(artifact) => {
                observer.on_artifact_ready(&artifact);
                Ok(artifact)
            }
            Err(e) => {
                warn!("Course generation failed: {}", e);
                if let Some(step) = progress.fail(format!("{}", e)) {
                    observer.on_step_update(&step);
                }
                self.announcer.announce(&self.messages.failed).await;
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        document: &DocumentSource,
        progress: &mut GenerationProgress,
        observer: &dyn PipelineObserver,
    ) -> Result<CourseArtifact> {
        // Step 1: analyze and structure
        observer.on_step_update(&progress.start(StepKind::Reading)?);
        self.announcer.announce(&self.messages.started).await;

        let outline = self.analyze(document).await?;
        observer.on_step_update(&progress.complete(
            StepKind::Reading,
            Some(format!(
                "Found {} chapter(s) with {} topic(s).",
                outline.chapters.len(),
                outline.topic_count()
            )),
        )?);

        // Step 2: pacing pause between the large calls
        observer.on_step_update(&progress.start(StepKind::Structuring)?);
        self.announcer.announce(&self.messages.structured).await;
        tokio::time::sleep(self.settings.refine_pause()).await;
        observer.on_step_update(&progress.complete(StepKind::Structuring, None)?);

        // Step 3: narrate every topic in document order
        observer.on_step_update(&progress.start(StepKind::Synthesizing)?);
        self.announcer.announce(&self.messages.synthesizing).await;

        let total = outline.topic_count();
        let mut done = 0;
        let mut chapters = Vec::with_capacity(outline.chapters.len());
        for chapter in &outline.chapters {
            let mut topics = Vec::with_capacity(chapter.topics.len());
            for topic in &chapter.topics {
                done += 1;
                observer.on_step_update(&progress.describe(
                    StepKind::Synthesizing,
                    format!("Narrating topic {} of {}: {}", done, total, topic.title),
                )?);
                tokio::time::sleep(self.settings.topic_pause()).await;
                topics.push(self.narrate(topic).await);
            }
            chapters.push(Chapter::new(
                chapter.title.clone(),
                "Auto-extracted chapter".to_string(),
                topics,
            ));
        }

        let artifact = self.assemble(document, &outline, chapters);
        let voiced = artifact.narrated_topic_count();
        info!(
            "Generated course '{}' with {} of {} topic(s) narrated",
            artifact.title, voiced, total
        );

        observer.on_step_update(&progress.complete(
            StepKind::Synthesizing,
            Some(format!("Narrated {} of {} topic(s).", voiced, total)),
        )?);
        self.announcer.announce(&self.messages.completed).await;

        Ok(artifact)
    }

    async fn analyze(&self, document: &DocumentSource) -> Result<CourseOutline> {
        let prompt = self
            .prompts
            .analysis_request(&document.name, self.settings.min_script_words);
        let policy = self.settings.retry_policy();

        let response = with_retry(&policy, "lecture analysis", || {
            self.service.analyze_document(document, &prompt)
        })
        .await?;

        let outline = CourseOutline::parse(&response)?;
        for topic in outline.chapters.iter().flat_map(|c| c.topics.iter()) {
            let words = word_count(&topic.script);
            if words < self.settings.min_script_words as usize {
                warn!("Script for '{}' is only {} words", topic.title, words);
            }
        }
        Ok(outline)
    }

    /// Narrate one topic, falling back to a text-only topic on failure.
    async fn narrate(&self, topic: &TopicOutline) -> Topic {
        match self.synthesize(&topic.script).await {
            Ok(audio) => Topic::narrated(topic.title.clone(), topic.script.clone(), audio),
            Err(e) => {
                warn!("Topic '{}' is available as text only: {}", topic.title, e);
                Topic::text_only(topic.title.clone(), topic.script.clone())
            }
        }
    }

    async fn synthesize(&self, script: &str) -> Result<TopicAudio> {
        let input = self.prompts.topic_narration(script);
        let policy = self.settings.retry_policy();

        let pcm = with_retry(&policy, "topic narration", || {
            self.service.synthesize_speech(&input, &self.narration_voice)
        })
        .await?;

        if pcm.is_empty() {
            return Err(BasarError::AudioSynthesis("Empty audio payload".to_string()));
        }
        if pcm.len() % 2 != 0 {
            return Err(BasarError::MalformedAudio(format!(
                "Narration of {} bytes is not 16-bit PCM",
                pcm.len()
            )));
        }
        Ok(TopicAudio::new(pcm, SPEECH_SAMPLE_RATE, 1))
    }

    fn assemble(
        &self,
        document: &DocumentSource,
        outline: &CourseOutline,
        chapters: Vec<Chapter>,
    ) -> CourseArtifact {
        let title = outline
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| document.stem())
            .to_string();

        CourseArtifact {
            id: Uuid::new_v4().to_string(),
            smart_summary: Some(format!("This lecture covers {}.", title)),
            description: format!("Generated automatically from the file {}.", document.name),
            title,
            instructor: self.settings.instructor.clone(),
            university: self.settings.university.clone(),
            level: self.settings.level.clone(),
            category: Category::Personal,
            source_file: document.name.clone(),
            duration_seconds: chapters.iter().map(|c| c.duration_seconds).sum(),
            chapters,
            created_at: Utc::now(),
        }
    }
}
