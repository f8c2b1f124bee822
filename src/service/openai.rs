//! OpenAI chat + speech implementation of the generation service.

use super::{DocumentSource, GenerationService};
use crate::config::ServiceSettings;
use crate::error::{BasarError, Result};
use crate::openai::{create_client_with_timeout, is_api_key_configured};
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    CreateSpeechRequestArgs, ResponseFormat, SpeechModel, SpeechResponseFormat, Voice,
};
use async_openai::Client;
use async_trait::async_trait;
use tracing::{debug, instrument, warn};

/// Upper bound on inline document text sent to the chat model.
const MAX_DOCUMENT_CHARS: usize = 200_000;

/// OpenAI-backed generation service.
///
/// Chat completions cannot take arbitrary binary files, so only text
/// documents are inlined; other files are described by name.
pub struct OpenAIService {
    client: Client<OpenAIConfig>,
    analysis_model: String,
    tts_model: String,
}

impl OpenAIService {
    pub fn new(analysis_model: &str, tts_model: &str, timeout: std::time::Duration) -> Result<Self> {
        Ok(Self {
            client: create_client_with_timeout(timeout)?,
            analysis_model: analysis_model.to_string(),
            tts_model: tts_model.to_string(),
        })
    }

    pub fn from_settings(settings: &ServiceSettings) -> Result<Self> {
        if !is_api_key_configured() {
            return Err(BasarError::Config(
                "OPENAI_API_KEY is not set; export it or switch service.provider to gemini"
                    .to_string(),
            ));
        }
        Self::new(
            &settings.openai_analysis_model,
            &settings.openai_tts_model,
            settings.timeout(),
        )
    }
}

#[async_trait]
impl GenerationService for OpenAIService {
    #[instrument(skip(self, document, prompt), fields(document = %document.name))]
    async fn analyze_document(&self, document: &DocumentSource, prompt: &str) -> Result<String> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(prompt.to_string())
                .build()
                .map_err(|e| BasarError::InvalidInput(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(document_message(document))
                .build()
                .map_err(|e| BasarError::InvalidInput(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.analysis_model)
            .messages(messages)
            .response_format(ResponseFormat::JsonObject)
            .build()
            .map_err(|e| BasarError::InvalidInput(e.to_string()))?;

        let response = self.client.chat().create(request).await.map_err(api_error)?;

        let text = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| {
                BasarError::MalformedResponse("Empty response from chat model".to_string())
            })?;

        debug!("Analysis returned {} characters", text.len());
        Ok(text)
    }

    #[instrument(skip(self, text), fields(chars = text.len()))]
    async fn synthesize_speech(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        let request = CreateSpeechRequestArgs::default()
            .input(text)
            .model(SpeechModel::Other(self.tts_model.clone()))
            .voice(parse_voice(voice))
            .response_format(SpeechResponseFormat::Pcm)
            .build()
            .map_err(|e| BasarError::InvalidInput(e.to_string()))?;

        let response = self.client.audio().speech(request).await.map_err(api_error)?;
        Ok(response.bytes.to_vec())
    }

    fn name(&self) -> &str {
        "openai"
    }
}

fn document_message(document: &DocumentSource) -> String {
    match document.as_text() {
        Some(text) => {
            let text: String = text.chars().take(MAX_DOCUMENT_CHARS).collect();
            format!("Lecture file \"{}\":\n\n{}", document.name, text)
        }
        None => {
            warn!(
                "{} ({}) cannot be inlined for this provider; sending its name only",
                document.name, document.mime_type
            );
            format!(
                "Lecture file \"{}\" ({}). Its content is not available as text.",
                document.name, document.mime_type
            )
        }
    }
}

fn parse_voice(name: &str) -> Voice {
    match name.to_lowercase().as_str() {
        "echo" => Voice::Echo,
        "fable" => Voice::Fable,
        "onyx" => Voice::Onyx,
        "nova" => Voice::Nova,
        "shimmer" => Voice::Shimmer,
        _ => Voice::Alloy,
    }
}

/// The client does not expose HTTP statuses; throttling is recognized from
/// the message text ("Rate limit reached ...") by the retry layer.
fn api_error(err: OpenAIError) -> BasarError {
    BasarError::Service {
        status: None,
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_message_inlines_text() {
        let doc = DocumentSource::new("notes.txt", "text/plain", b"Photosynthesis".to_vec());
        let message = document_message(&doc);
        assert!(message.contains("notes.txt"));
        assert!(message.contains("Photosynthesis"));
    }

    #[test]
    fn test_document_message_binary() {
        let doc = DocumentSource::new("slides.pdf", "application/pdf", vec![0, 1, 2]);
        assert!(document_message(&doc).contains("not available as text"));
    }

    #[test]
    fn test_parse_voice() {
        assert!(matches!(parse_voice("Nova"), Voice::Nova));
        assert!(matches!(parse_voice("Zephyr"), Voice::Alloy));
    }
}
