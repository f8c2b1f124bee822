//! Configuration module for Basar.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{AnalysisPrompts, AssistantPrompts, NarrationPrompts, Prompts};
pub use settings::{
    GeneralSettings, GenerationSettings, LibrarySettings, PromptSettings, ServerSettings,
    ServiceProvider, ServiceSettings, Settings, VoiceSettings,
};
