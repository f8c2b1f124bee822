//! Gemini `generateContent` client.

use super::{DocumentSource, GenerationService};
use crate::audio::codec;
use crate::config::ServiceSettings;
use crate::error::{BasarError, Result};
use crate::openai::create_http_client;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Gemini REST client for analysis and text-to-speech.
pub struct GeminiService {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    analysis_model: String,
    tts_model: String,
}

impl GeminiService {
    pub fn new(
        api_key: String,
        base_url: String,
        analysis_model: String,
        tts_model: String,
        timeout: std::time::Duration,
    ) -> Result<Self> {
        Ok(Self {
            http: create_http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            analysis_model,
            tts_model,
        })
    }

    /// Build from settings; fails when the API key variable is unset.
    pub fn from_settings(settings: &ServiceSettings) -> Result<Self> {
        let api_key = settings.gemini_api_key().ok_or_else(|| {
            BasarError::Config(format!(
                "{} is not set. Export your Gemini API key first.",
                settings.gemini_api_key_env
            ))
        })?;
        Self::new(
            api_key,
            settings.gemini_base_url.clone(),
            settings.analysis_model.clone(),
            settings.tts_model.clone(),
            settings.timeout(),
        )
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }

    async fn generate(&self, model: &str, request: &GenerateRequest) -> Result<GenerateResponse> {
        let response = self
            .http
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(status_error(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            BasarError::MalformedResponse(format!("Unexpected Gemini response: {}", e))
        })
    }
}

#[async_trait]
impl GenerationService for GeminiService {
    #[instrument(skip(self, document, prompt), fields(document = %document.name))]
    async fn analyze_document(&self, document: &DocumentSource, prompt: &str) -> Result<String> {
        let request = analysis_request(document, prompt);
        let response = self.generate(&self.analysis_model, &request).await?;
        let text = response.text();
        if text.trim().is_empty() {
            return Err(BasarError::MalformedResponse(
                "Gemini returned no text for the analysis".to_string(),
            ));
        }
        debug!("Analysis returned {} characters", text.len());
        Ok(text)
    }

    #[instrument(skip(self, text), fields(chars = text.len()))]
    async fn synthesize_speech(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        let request = speech_request(text, voice);
        let response = self.generate(&self.tts_model, &request).await?;
        let data = response.audio_data().ok_or_else(|| {
            BasarError::AudioSynthesis("Gemini returned no audio data".to_string())
        })?;
        codec::decode(data)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speech_config: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

impl GenerateResponse {
    fn parts(&self) -> impl Iterator<Item = &Part> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .into_iter()
            .flat_map(|c| c.parts.iter())
    }

    /// Concatenated text parts of the first candidate.
    fn text(&self) -> String {
        self.parts().filter_map(|p| p.text.as_deref()).collect()
    }

    /// First inline audio payload of the first candidate.
    fn audio_data(&self) -> Option<&str> {
        self.parts()
            .filter_map(|p| p.inline_data.as_ref())
            .map(|d| d.data.as_str())
            .next()
    }
}

fn analysis_request(document: &DocumentSource, prompt: &str) -> GenerateRequest {
    GenerateRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![
                Part {
                    inline_data: Some(InlineData {
                        mime_type: document.mime_type.clone(),
                        data: codec::encode(&document.data),
                    }),
                    ..Default::default()
                },
                Part {
                    text: Some(prompt.to_string()),
                    ..Default::default()
                },
            ],
        }],
        generation_config: Some(GenerationConfig {
            response_mime_type: Some("application/json".to_string()),
            ..Default::default()
        }),
    }
}

fn speech_request(text: &str, voice: &str) -> GenerateRequest {
    GenerateRequest {
        contents: vec![Content {
            role: None,
            parts: vec![Part {
                text: Some(text.to_string()),
                ..Default::default()
            }],
        }],
        generation_config: Some(GenerationConfig {
            response_modalities: Some(vec!["AUDIO".to_string()]),
            speech_config: Some(serde_json::json!({
                "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": voice } }
            })),
            ..Default::default()
        }),
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Map a non-success HTTP answer to an error, keeping 429 distinguishable.
fn status_error(status: u16, body: &str) -> BasarError {
    let message = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) if env.error.status.is_empty() => env.error.message,
        Ok(env) => format!("{} ({})", env.error.message, env.error.status),
        Err(_) => body.chars().take(300).collect(),
    };

    if status == 429 {
        BasarError::RateLimited(message)
    } else {
        BasarError::Service {
            status: Some(status),
            message,
        }
    }
}
