//! Doctor command - verify configuration, keys and the course library.

use crate::cli::Output;
use crate::config::{Prompts, ServiceProvider, Settings};
use crate::library::{CourseLibrary, SqliteCourseLibrary};
use console::style;
use std::path::Path;

/// Check result for a single item.
#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckResult {
    fn ok(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: message.to_string(),
            hint: None,
        }
    }

    fn warning(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn error(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn print(&self) {
        let icon = match self.status {
            CheckStatus::Ok => style("✓").green(),
            CheckStatus::Warning => style("!").yellow(),
            CheckStatus::Error => style("✗").red(),
        };

        println!("  {} {} - {}", icon, style(&self.name).bold(), self.message);

        if let Some(hint) = &self.hint {
            println!("    {} {}", style("→").dim(), style(hint).dim());
        }
    }
}

/// Run all diagnostic checks.
pub async fn run_doctor(settings: &Settings, config_path: &Path) -> anyhow::Result<()> {
    Output::header("Basar Doctor");
    println!();
    println!("Checking configuration and requirements...\n");

    let mut checks = Vec::new();

    let mut section = |title: &str, results: Vec<CheckResult>| {
        println!("{}", style(title).bold());
        for check in &results {
            check.print();
        }
        println!();
        checks.extend(results);
    };

    section("API Configuration", check_api_keys(settings));
    section("Audio", vec![check_audio_support()]);
    section("Course Library", vec![check_library(&settings.library_path()).await]);
    section(
        "Configuration",
        vec![check_config_file(config_path), check_prompts(settings)],
    );

    let errors = checks.iter().filter(|c| c.status == CheckStatus::Error).count();
    let warnings = checks.iter().filter(|c| c.status == CheckStatus::Warning).count();

    if errors > 0 {
        Output::error(&format!(
            "{} error(s) found. Please fix them before using Basar.",
            errors
        ));
        std::process::exit(1);
    } else if warnings > 0 {
        Output::warning(&format!("All checks passed with {} warning(s).", warnings));
    } else {
        Output::success("All checks passed! Basar is ready to use.");
    }

    Ok(())
}

fn check_api_keys(settings: &Settings) -> Vec<CheckResult> {
    let gemini_var = &settings.service.gemini_api_key_env;
    let gemini = check_key(gemini_var, std::env::var(gemini_var).ok());
    let openai = check_key("OPENAI_API_KEY", std::env::var("OPENAI_API_KEY").ok());

    match settings.service.provider {
        // Gemini powers both generation and voice.
        ServiceProvider::Gemini => vec![gemini],
        ServiceProvider::OpenAI => vec![openai, downgrade(gemini, "needed for the voice assistant")],
    }
}

fn check_key(var: &str, value: Option<String>) -> CheckResult {
    let hint = format!("Set with: export {}='...'", var);
    match value {
        Some(key) if key.len() > 12 => {
            let masked = format!("{}...{}", &key[..4], &key[key.len() - 4..]);
            CheckResult::ok(var, &format!("configured ({})", masked))
        }
        Some(key) if key.is_empty() => CheckResult::error(var, "empty", &hint),
        Some(_) => CheckResult::warning(var, "set but looks too short", &hint),
        None => CheckResult::error(var, "not set", &hint),
    }
}

fn downgrade(mut check: CheckResult, reason: &str) -> CheckResult {
    if check.status == CheckStatus::Error {
        check.status = CheckStatus::Warning;
        check.message = format!("{} ({})", check.message, reason);
    }
    check
}

fn check_audio_support() -> CheckResult {
    if cfg!(feature = "device-audio") {
        CheckResult::ok("Audio devices", "microphone and speaker support built in")
    } else {
        CheckResult::warning(
            "Audio devices",
            "not built in (voice and playback are silent)",
            "Rebuild with: cargo install basar --features device-audio",
        )
    }
}

async fn check_library(path: &Path) -> CheckResult {
    if !path.exists() {
        return CheckResult::warning(
            "Library",
            &format!("{} (not created yet)", path.display()),
            "The library is created with the first generated course",
        );
    }
    let listed = match SqliteCourseLibrary::new(path) {
        Ok(library) => library.list().await,
        Err(e) => Err(e),
    };
    match listed {
        Ok(courses) => CheckResult::ok(
            "Library",
            &format!("{} ({} course(s))", path.display(), courses.len()),
        ),
        Err(e) => CheckResult::error(
            "Library",
            &e.to_string(),
            "Move the file away to start a fresh library",
        ),
    }
}

fn check_config_file(path: &Path) -> CheckResult {
    if path.exists() {
        CheckResult::ok("Config file", &format!("{}", path.display()))
    } else {
        CheckResult::warning(
            "Config file",
            "using defaults",
            "Create with: basar init",
        )
    }
}

fn check_prompts(settings: &Settings) -> CheckResult {
    let Some(dir) = &settings.prompts.custom_dir else {
        return CheckResult::ok("Prompts", "built-in");
    };
    match Prompts::load(Some(dir.as_str()), Some(&settings.prompts.variables)) {
        Ok(_) => CheckResult::ok("Prompts", &format!("custom ({})", dir)),
        Err(e) => CheckResult::error("Prompts", &e.to_string(), "Fix or remove the custom prompt files"),
    }
}
