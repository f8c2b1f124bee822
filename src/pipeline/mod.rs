//! Course generation pipeline.
//!
//! Turns a lecture document into a narrated [`CourseArtifact`](crate::course::CourseArtifact)
//! in three steps: reading/structuring, a pacing pause, and per-topic speech
//! synthesis against a rate-limited remote service.

mod announcer;
mod runner;
mod steps;

pub use announcer::StatusAnnouncer;
pub use runner::CoursePipeline;
pub use steps::{GenerationProgress, GenerationStep, StepKind, StepStatus};

use crate::course::CourseArtifact;

/// Receives progress of a pipeline run.
pub trait PipelineObserver: Send + Sync {
    /// A step changed status or description.
    fn on_step_update(&self, step: &GenerationStep);

    /// The finished course. Called at most once per run, never after a failure.
    fn on_artifact_ready(&self, artifact: &CourseArtifact);
}

/// Observer that ignores every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {
    fn on_step_update(&self, _step: &GenerationStep) {}

    fn on_artifact_ready(&self, _artifact: &CourseArtifact) {}
}
