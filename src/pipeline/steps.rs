//! Generation steps and their left-to-right progression.

use crate::error::{BasarError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Reading,
    Structuring,
    Synthesizing,
}

impl StepKind {
    pub const ALL: [StepKind; 3] = [StepKind::Reading, StepKind::Structuring, StepKind::Synthesizing];

    fn index(self) -> usize {
        match self {
            StepKind::Reading => 0,
            StepKind::Structuring => 1,
            StepKind::Synthesizing => 2,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            StepKind::Reading => "Reading the file",
            StepKind::Structuring => "Smart structuring",
            StepKind::Synthesizing => "Generating the podcast",
        }
    }

    fn initial_description(self) -> &'static str {
        match self {
            StepKind::Reading => "Extract the text and headings of the lecture.",
            StepKind::Structuring => "Identify chapters and their topics.",
            StepKind::Synthesizing => "Turn the topic scripts into natural speech.",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Waiting,
    Processing,
    Completed,
    Error,
}

/// Snapshot of one pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationStep {
    pub kind: StepKind,
    pub status: StepStatus,
    pub description: String,
}

/// The three steps of a run. Steps only move forward, and a step can only
/// start once every step before it has completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationProgress {
    steps: Vec<GenerationStep>,
}

impl Default for GenerationProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl GenerationProgress {
    pub fn new() -> Self {
        Self {
            steps: StepKind::ALL
                .iter()
                .map(|&kind| GenerationStep {
                    kind,
                    status: StepStatus::Waiting,
                    description: kind.initial_description().to_string(),
                })
                .collect(),
        }
    }

    pub fn steps(&self) -> &[GenerationStep] {
        &self.steps
    }

    pub fn step(&self, kind: StepKind) -> &GenerationStep {
        &self.steps[kind.index()]
    }

    /// The step currently processing, if any.
    pub fn current(&self) -> Option<&GenerationStep> {
        self.steps.iter().find(|s| s.status == StepStatus::Processing)
    }

    pub fn is_completed(&self) -> bool {
        self.steps.iter().all(|s| s.status == StepStatus::Completed)
    }

    pub fn has_failed(&self) -> bool {
        self.steps.iter().any(|s| s.status == StepStatus::Error)
    }

    /// Waiting -> processing.
    pub fn start(&mut self, kind: StepKind) -> Result<GenerationStep> {
        let idx = kind.index();
        if self.steps[..idx].iter().any(|s| s.status != StepStatus::Completed) {
            return Err(BasarError::InvalidState(format!(
                "Cannot start '{}' before the previous steps complete",
                kind
            )));
        }
        self.transition(kind, StepStatus::Waiting, StepStatus::Processing, None)
    }

    /// Update the description of a processing step.
    pub fn describe(&mut self, kind: StepKind, description: impl Into<String>) -> Result<GenerationStep> {
        self.transition(
            kind,
            StepStatus::Processing,
            StepStatus::Processing,
            Some(description.into()),
        )
    }

    /// Processing -> completed.
    pub fn complete(&mut self, kind: StepKind, description: Option<String>) -> Result<GenerationStep> {
        self.transition(kind, StepStatus::Processing, StepStatus::Completed, description)
    }

    /// Mark the processing step (or, before anything started, the first
    /// waiting one) as failed. Returns `None` when no step can fail.
    pub fn fail(&mut self, description: impl Into<String>) -> Option<GenerationStep> {
        let idx = self
            .steps
            .iter()
            .position(|s| s.status == StepStatus::Processing)
            .or_else(|| self.steps.iter().position(|s| s.status == StepStatus::Waiting))?;
        let step = &mut self.steps[idx];
        step.status = StepStatus::Error;
        step.description = description.into();
        Some(step.clone())
    }

    fn transition(
        &mut self,
        kind: StepKind,
        from: StepStatus,
        to: StepStatus,
        description: Option<String>,
    ) -> Result<GenerationStep> {
        let step = &mut self.steps[kind.index()];
        if step.status != from {
            return Err(BasarError::InvalidState(format!(
                "Step '{}' is {:?}, expected {:?}",
                kind, step.status, from
            )));
        }
        step.status = to;
        if let Some(description) = description {
            step.description = description;
        }
        Ok(step.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_start_waiting() {
        let progress = GenerationProgress::new();
        assert_eq!(progress.steps().len(), 3);
        assert!(progress.steps().iter().all(|s| s.status == StepStatus::Waiting));
        assert!(progress.current().is_none());
    }

    #[test]
    fn test_steps_advance_left_to_right() {
        let mut progress = GenerationProgress::new();

        assert!(progress.start(StepKind::Structuring).is_err());

        progress.start(StepKind::Reading).unwrap();
        assert_eq!(progress.current().unwrap().kind, StepKind::Reading);
        assert!(progress.start(StepKind::Structuring).is_err());

        progress.complete(StepKind::Reading, Some("2 chapters".into())).unwrap();
        assert_eq!(progress.step(StepKind::Reading).description, "2 chapters");

        progress.start(StepKind::Structuring).unwrap();
        progress.complete(StepKind::Structuring, None).unwrap();
        progress.start(StepKind::Synthesizing).unwrap();
        progress.describe(StepKind::Synthesizing, "topic 1 of 3").unwrap();
        progress.complete(StepKind::Synthesizing, None).unwrap();

        assert!(progress.is_completed());
        assert!(progress.complete(StepKind::Synthesizing, None).is_err());
    }

    #[test]
    fn test_fail_marks_processing_step() {
        let mut progress = GenerationProgress::new();
        progress.start(StepKind::Reading).unwrap();

        let failed = progress.fail("quota exhausted").unwrap();
        assert_eq!(failed.kind, StepKind::Reading);
        assert_eq!(failed.status, StepStatus::Error);
        assert!(progress.has_failed());
        assert_eq!(progress.step(StepKind::Structuring).status, StepStatus::Waiting);
    }

    #[test]
    fn test_serialized_status_names() {
        let json = serde_json::to_value(GenerationProgress::new().step(StepKind::Reading)).unwrap();
        assert_eq!(json["kind"], "reading");
        assert_eq!(json["status"], "waiting");
    }
}
