//! Generate command implementation.

use super::open_library;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::course::{format_clock, CourseArtifact};
use crate::library::CourseLibrary;
use crate::pipeline::{CoursePipeline, GenerationStep, PipelineObserver, StepStatus};
use crate::service::DocumentSource;
use anyhow::Result;
use indicatif::ProgressBar;
use std::path::Path;

/// Mirrors pipeline progress on a spinner.
struct SpinnerObserver {
    spinner: ProgressBar,
}

impl PipelineObserver for SpinnerObserver {
    fn on_step_update(&self, step: &GenerationStep) {
        let line = Output::step_line(step);
        match step.status {
            StepStatus::Completed | StepStatus::Error => self.spinner.println(line),
            _ => self.spinner.set_message(line),
        }
    }

    fn on_artifact_ready(&self, artifact: &CourseArtifact) {
        self.spinner.set_message(format!("'{}' is ready", artifact.title));
    }
}

/// Run the generate command.
pub async fn run_generate(
    file: &str,
    title: Option<String>,
    announce: bool,
    mut settings: Settings,
) -> Result<()> {
    preflight::check(Operation::Generate, &settings)?;
    if announce {
        settings.generation.announce_status = true;
    }

    let document = DocumentSource::from_path(Path::new(file))?;
    let library = open_library(&settings)?;
    let pipeline = CoursePipeline::new(&settings)?;

    Output::info(&format!(
        "Generating a course from {} with {}",
        document.name,
        pipeline.service().name()
    ));

    let observer = SpinnerObserver {
        spinner: Output::spinner("Starting..."),
    };
    let result = pipeline.run(&document, &observer).await;
    observer.spinner.finish_and_clear();

    let mut course = match result {
        Ok(course) => course,
        Err(e) => {
            Output::error(&format!("Generation failed: {}", e));
            return Err(e.into());
        }
    };
    if let Some(title) = title {
        course.title = title;
    }

    library.save(&course).await?;

    Output::success(&format!("Created '{}'", course.title));
    Output::kv("Id", &course.id);
    Output::kv("Chapters", &course.chapters.len().to_string());
    Output::kv(
        "Voiced topics",
        &format!("{}/{}", course.narrated_topic_count(), course.topic_count()),
    );
    Output::kv("Duration", &format_clock(course.duration_seconds));
    if course.narrated_topic_count() < course.topic_count() {
        Output::warning("Some topics could not be narrated and are available as text only.");
    }

    Ok(())
}
