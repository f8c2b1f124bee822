//! Pre-flight checks before expensive operations.
//!
//! Validates that API keys and devices are available before starting
//! operations that would otherwise fail midway.

use crate::config::{ServiceProvider, Settings};
use crate::error::{BasarError, Result};

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Generation needs the configured provider's API key.
    Generate,
    /// Voice needs the Gemini key and an audio device build.
    Voice,
    /// Browsing the library has no external requirements.
    Browse,
}

/// Run pre-flight checks for the given operation.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    match operation {
        Operation::Generate => check_provider_key(settings)?,
        Operation::Voice => {
            check_gemini_key(settings)?;
            check_audio_devices()?;
        }
        Operation::Browse => {}
    }
    Ok(())
}

fn check_provider_key(settings: &Settings) -> Result<()> {
    match settings.service.provider {
        ServiceProvider::Gemini => check_gemini_key(settings),
        ServiceProvider::OpenAI => check_env_key("OPENAI_API_KEY", "sk-..."),
    }
}

fn check_gemini_key(settings: &Settings) -> Result<()> {
    check_env_key(&settings.service.gemini_api_key_env, "AIza...")
}

fn check_env_key(var: &str, example: &str) -> Result<()> {
    match std::env::var(var) {
        Ok(key) if !key.is_empty() => Ok(()),
        Ok(_) => Err(BasarError::Config(format!(
            "{} is empty. Set it with: export {}='{}'",
            var, var, example
        ))),
        Err(_) => Err(BasarError::Config(format!(
            "{} not set. Set it with: export {}='{}'",
            var, var, example
        ))),
    }
}

fn check_audio_devices() -> Result<()> {
    if cfg!(feature = "device-audio") {
        Ok(())
    } else {
        Err(BasarError::Device(
            "this build has no audio device support; rebuild with --features device-audio"
                .to_string(),
        ))
    }
}
