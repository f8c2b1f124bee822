//! Error types for Basar.

use thiserror::Error;

/// Library-level error type for Basar operations.
#[derive(Error, Debug)]
pub enum BasarError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Microphone access denied: {0}")]
    PermissionDenied(String),

    #[error("Realtime channel error: {0}")]
    Channel(String),

    #[error("Rate limited by remote service: {0}")]
    RateLimited(String),

    #[error("Remote service error{}: {message}", status_suffix(.status))]
    Service { status: Option<u16>, message: String },

    #[error("Malformed response from remote service: {0}")]
    MalformedResponse(String),

    #[error("Audio synthesis failed: {0}")]
    AudioSynthesis(String),

    #[error("Malformed audio: {0}")]
    MalformedAudio(String),

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Resampling failed: {0}")]
    Resample(String),

    #[error("Course library error: {0}")]
    Library(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({})", s)).unwrap_or_default()
}

/// Result type alias for Basar operations.
pub type Result<T> = std::result::Result<T, BasarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_display_with_status() {
        let err = BasarError::Service {
            status: Some(503),
            message: "overloaded".to_string(),
        };
        assert_eq!(err.to_string(), "Remote service error (503): overloaded");
    }

    #[test]
    fn test_service_error_display_without_status() {
        let err = BasarError::Service {
            status: None,
            message: "connection reset".to_string(),
        };
        assert_eq!(err.to_string(), "Remote service error: connection reset");
    }
}
