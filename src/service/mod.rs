//! Remote generation services.
//!
//! A [`GenerationService`] does the two batch calls the course pipeline
//! needs: structuring a lecture document and synthesizing narration.
//! Both may be rate limited; retrying is the caller's job.

mod gemini;
mod openai;

pub use gemini::GeminiService;
pub use openai::OpenAIService;

use crate::config::{ServiceProvider, Settings};
use crate::error::{BasarError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// A lecture file submitted for analysis.
#[derive(Debug, Clone)]
pub struct DocumentSource {
    /// File name shown to the model and recorded on the course.
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl DocumentSource {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Read a document from disk, guessing its MIME type from the extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(BasarError::InvalidInput(format!(
                "Lecture file not found: {}",
                path.display()
            )));
        }
        let data = std::fs::read(path)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("lecture")
            .to_string();
        Ok(Self::new(name.clone(), mime_type_for(&name), data))
    }

    /// File name without its extension.
    pub fn stem(&self) -> &str {
        Path::new(&self.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.name)
    }

    /// Document content as text, when it is a text document.
    pub fn as_text(&self) -> Option<&str> {
        if self.mime_type.starts_with("text/") || self.mime_type == "application/json" {
            std::str::from_utf8(&self.data).ok()
        } else {
            None
        }
    }
}

/// MIME type from a file name's extension.
pub fn mime_type_for(name: &str) -> String {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
    .to_string()
}

/// Remote service for lecture analysis and speech synthesis.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Submit a document with an instruction; returns the raw (JSON) text answer.
    async fn analyze_document(&self, document: &DocumentSource, prompt: &str) -> Result<String>;

    /// Synthesize speech; returns s16le mono PCM at [`crate::audio::SPEECH_SAMPLE_RATE`].
    async fn synthesize_speech(&self, text: &str, voice: &str) -> Result<Vec<u8>>;

    /// Short provider name for logs and diagnostics.
    fn name(&self) -> &str;
}

/// Build the configured generation service.
pub fn create_service(settings: &Settings) -> Result<Arc<dyn GenerationService>> {
    match settings.service.provider {
        ServiceProvider::Gemini => Ok(Arc::new(GeminiService::from_settings(&settings.service)?)),
        ServiceProvider::OpenAI => Ok(Arc::new(OpenAIService::from_settings(&settings.service)?)),
    }
}

/// Voice used for topic narration with the configured provider.
pub fn narration_voice(settings: &Settings) -> &str {
    match settings.service.provider {
        ServiceProvider::Gemini => &settings.service.narration_voice,
        ServiceProvider::OpenAI => &settings.service.openai_voice,
    }
}

/// Voice used for spoken status updates with the configured provider.
pub fn status_voice(settings: &Settings) -> &str {
    match settings.service.provider {
        ServiceProvider::Gemini => &settings.service.status_voice,
        ServiceProvider::OpenAI => &settings.service.openai_voice,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_type_for() {
        assert_eq!(mime_type_for("Lecture 3.PDF"), "application/pdf");
        assert_eq!(mime_type_for("notes.md"), "text/markdown");
        assert_eq!(mime_type_for("archive"), "application/octet-stream");
    }

    #[test]
    fn test_document_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("biology.txt");
        std::fs::write(&path, "Cells are the unit of life.").unwrap();

        let doc = DocumentSource::from_path(&path).unwrap();
        assert_eq!(doc.name, "biology.txt");
        assert_eq!(doc.stem(), "biology");
        assert_eq!(doc.as_text(), Some("Cells are the unit of life."));
    }

    #[test]
    fn test_document_missing_file() {
        let result = DocumentSource::from_path(Path::new("/nonexistent/lecture.pdf"));
        assert!(matches!(result, Err(BasarError::InvalidInput(_))));
    }

    #[test]
    fn test_binary_document_has_no_text() {
        let doc = DocumentSource::new("a.pdf", "application/pdf", vec![0x25, 0x50, 0x44, 0x46]);
        assert!(doc.as_text().is_none());
    }

    #[test]
    fn test_voice_follows_provider() {
        let mut settings = Settings::default();
        assert_eq!(narration_voice(&settings), "Zephyr");
        assert_eq!(status_voice(&settings), "Kore");
        settings.service.provider = ServiceProvider::OpenAI;
        assert_eq!(narration_voice(&settings), "alloy");
    }
}
