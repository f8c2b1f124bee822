//! Configuration settings for Basar.

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub service: ServiceSettings,
    pub generation: GenerationSettings,
    pub voice: VoiceSettings,
    pub library: LibrarySettings,
    pub server: ServerSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.basar".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Remote AI provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceProvider {
    /// Google Gemini (generateContent + Live API).
    #[default]
    Gemini,
    /// OpenAI (chat completions + speech). No realtime support.
    OpenAI,
}

impl std::str::FromStr for ServiceProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" | "google" => Ok(ServiceProvider::Gemini),
            "openai" => Ok(ServiceProvider::OpenAI),
            _ => Err(format!("Unknown service provider: {}", s)),
        }
    }
}

impl std::fmt::Display for ServiceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceProvider::Gemini => write!(f, "gemini"),
            ServiceProvider::OpenAI => write!(f, "openai"),
        }
    }
}

/// Remote service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Provider used for analysis and speech synthesis.
    pub provider: ServiceProvider,
    /// Environment variable holding the Gemini API key.
    pub gemini_api_key_env: String,
    /// Base URL of the Gemini REST API.
    pub gemini_base_url: String,
    /// Model used to analyze and structure lecture files.
    pub analysis_model: String,
    /// Model used for text-to-speech.
    pub tts_model: String,
    /// Voice for topic narration.
    pub narration_voice: String,
    /// Voice for spoken status updates.
    pub status_voice: String,
    /// OpenAI chat model (openai provider only).
    pub openai_analysis_model: String,
    /// OpenAI speech model (openai provider only).
    pub openai_tts_model: String,
    /// OpenAI voice (openai provider only).
    pub openai_voice: String,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            provider: ServiceProvider::Gemini,
            gemini_api_key_env: "GEMINI_API_KEY".to_string(),
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            analysis_model: "gemini-2.5-pro".to_string(),
            tts_model: "gemini-2.5-flash-preview-tts".to_string(),
            narration_voice: "Zephyr".to_string(),
            status_voice: "Kore".to_string(),
            openai_analysis_model: "gpt-4o-mini".to_string(),
            openai_tts_model: "gpt-4o-mini-tts".to_string(),
            openai_voice: "alloy".to_string(),
            timeout_seconds: crate::openai::DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ServiceSettings {
    /// Read the Gemini API key from the configured environment variable.
    pub fn gemini_api_key(&self) -> Option<String> {
        std::env::var(&self.gemini_api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
    }

    /// Request timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Course generation pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Pause between the structuring and synthesis steps, in milliseconds.
    pub refine_pause_ms: u64,
    /// Pause before every speech synthesis call, in milliseconds.
    pub topic_pause_ms: u64,
    /// Retries for analysis and narration calls.
    pub max_retries: u32,
    /// Initial backoff for analysis and narration calls, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Retries for spoken status updates.
    pub status_max_retries: u32,
    /// Initial backoff for spoken status updates, in milliseconds.
    pub status_initial_backoff_ms: u64,
    /// Upper bound of the random jitter added to each backoff, in milliseconds.
    pub max_jitter_ms: u64,
    /// Minimum narration length requested per topic, in words.
    pub min_script_words: u32,
    /// Speak status updates while generating.
    pub announce_status: bool,
    /// Instructor name recorded on generated courses.
    pub instructor: String,
    /// University recorded on generated courses.
    pub university: String,
    /// Level label recorded on generated courses.
    pub level: String,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            refine_pause_ms: 5_000,
            topic_pause_ms: 10_000,
            max_retries: 5,
            initial_backoff_ms: 10_000,
            status_max_retries: 3,
            status_initial_backoff_ms: 5_000,
            max_jitter_ms: 2_000,
            min_script_words: 300,
            announce_status: false,
            instructor: "Basar AI".to_string(),
            university: "Jazan University".to_string(),
            level: "Auto-generated".to_string(),
        }
    }
}

impl GenerationSettings {
    /// Retry policy for analysis and narration calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.initial_backoff_ms))
            .with_max_jitter(Duration::from_millis(self.max_jitter_ms))
    }

    /// Smaller retry policy for spoken status updates.
    pub fn status_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.status_max_retries,
            Duration::from_millis(self.status_initial_backoff_ms),
        )
        .with_max_jitter(Duration::from_millis(self.max_jitter_ms))
    }

    pub fn refine_pause(&self) -> Duration {
        Duration::from_millis(self.refine_pause_ms)
    }

    pub fn topic_pause(&self) -> Duration {
        Duration::from_millis(self.topic_pause_ms)
    }
}

/// Realtime voice assistant settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceSettings {
    /// Live model used for the realtime conversation.
    pub live_model: String,
    /// Websocket endpoint of the Live API.
    pub live_url: String,
    /// Voice of the assistant.
    pub voice: String,
    /// Microphone sample rate sent to the agent.
    pub input_sample_rate: u32,
    /// Sample rate of audio received from the agent.
    pub output_sample_rate: u32,
    /// Samples per captured frame.
    pub frame_size: usize,
    /// Seconds to wait for the channel to open.
    pub connect_timeout_seconds: u64,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            live_model: "gemini-2.5-flash-native-audio-preview-12-2025".to_string(),
            live_url: "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent".to_string(),
            voice: "Kore".to_string(),
            input_sample_rate: 16_000,
            output_sample_rate: 24_000,
            frame_size: 4096,
            connect_timeout_seconds: 20,
        }
    }
}

/// Course library settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibrarySettings {
    /// Path to the SQLite course library.
    pub sqlite_path: String,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            sqlite_path: "~/.basar/library.db".to_string(),
        }
    }
}

/// HTTP API server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> crate::error::Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::BasarError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("basar")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded SQLite library path.
    pub fn library_path(&self) -> PathBuf {
        Self::expand_path(&self.library.sqlite_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_pacing_contract() {
        let settings = Settings::default();
        assert_eq!(settings.generation.topic_pause(), Duration::from_secs(10));
        assert_eq!(settings.generation.refine_pause(), Duration::from_secs(5));
        assert_eq!(settings.voice.input_sample_rate, 16_000);
        assert_eq!(settings.voice.output_sample_rate, 24_000);
        assert_eq!(settings.voice.frame_size, 4096);
    }

    #[test]
    fn test_status_policy_is_smaller() {
        let generation = GenerationSettings::default();
        let batch = generation.retry_policy();
        let status = generation.status_retry_policy();
        assert!(status.max_retries < batch.max_retries);
        assert!(status.initial_delay < batch.initial_delay);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [service]
            provider = "openai"

            [generation]
            topic_pause_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(settings.service.provider, ServiceProvider::OpenAI);
        assert_eq!(settings.generation.topic_pause_ms, 250);
        assert_eq!(settings.generation.refine_pause_ms, 5_000);
        assert_eq!(settings.server.port, 3000);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut settings = Settings::default();
        settings.voice.voice = "Puck".to_string();
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(loaded.voice.voice, "Puck");
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!("Gemini".parse::<ServiceProvider>().unwrap(), ServiceProvider::Gemini);
        assert_eq!("openai".parse::<ServiceProvider>().unwrap(), ServiceProvider::OpenAI);
        assert!("azure".parse::<ServiceProvider>().is_err());
    }
}
