//! Init command - interactive first-run setup.

use crate::cli::Output;
use crate::config::{ServiceProvider, Settings};
use console::style;
use std::io::{self, Write};
use std::path::Path;

/// Run the init command for first-time setup.
pub fn run_init(settings: &Settings, config_path: &Path) -> anyhow::Result<()> {
    Output::header("Basar Setup");
    println!();
    println!("Welcome to Basar! Let's make sure everything is configured correctly.\n");

    // Step 1: API key
    println!("{}", style("Step 1: Checking API configuration").bold().cyan());
    println!();

    let (key_var, key_url) = match settings.service.provider {
        ServiceProvider::Gemini => (
            settings.service.gemini_api_key_env.clone(),
            "https://aistudio.google.com/apikey",
        ),
        ServiceProvider::OpenAI => (
            "OPENAI_API_KEY".to_string(),
            "https://platform.openai.com/api-keys",
        ),
    };

    if std::env::var(&key_var).map(|k| k.is_empty()).unwrap_or(true) {
        Output::warning(&format!("{} environment variable is not set.", key_var));
        println!();
        println!(
            "  Basar uses the {} API to structure lectures and narrate topics.",
            settings.service.provider
        );
        println!("  Get your API key from: {}", style(key_url).underlined());
        println!();
        println!("  Set it in your shell configuration (~/.bashrc, ~/.zshrc, etc.):");
        println!("  {}", style(format!("export {}='...'", key_var)).green());
        println!();

        if !prompt_continue("Continue without API key?")? {
            println!();
            Output::info("Setup cancelled. Set your API key and run 'basar init' again.");
            return Ok(());
        }
    } else {
        Output::success(&format!("{} is configured!", key_var));
    }

    println!();

    // Step 2: directories
    println!("{}", style("Step 2: Setting up directories").bold().cyan());
    println!();

    let data_dir = settings.data_dir();
    if !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)?;
        Output::success(&format!("Created data directory: {}", data_dir.display()));
    } else {
        Output::info(&format!("Data directory exists: {}", data_dir.display()));
    }

    println!();

    // Step 3: config file
    println!("{}", style("Step 3: Configuration file").bold().cyan());
    println!();

    if config_path.exists() {
        Output::info(&format!("Config file exists: {}", config_path.display()));
    } else if prompt_continue("Create default configuration file?")? {
        settings.save_to(&config_path.to_path_buf())?;
        Output::success(&format!("Created config file: {}", config_path.display()));
        println!();
        println!("  Change values with: {}", style("basar config set <key> <value>").green());
    } else {
        Output::info("Skipped config file creation. Using defaults.");
    }

    println!();

    println!("{}", style("Setup Complete!").bold().green());
    println!();
    println!("Next steps:");
    println!("  {} Check system status", style("basar doctor").cyan());
    println!("  {} Turn a lecture into a course", style("basar generate <file>").cyan());
    println!("  {} Listen hands-free", style("basar voice --course <id>").cyan());
    println!();
    println!("For more help: {}", style("basar --help").cyan());

    Ok(())
}

/// Prompt user for yes/no confirmation.
fn prompt_continue(message: &str) -> io::Result<bool> {
    print!("{} {} ", style("?").cyan(), message);
    print!("{} ", style("[y/N]").dim());
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(is_yes(&input))
}

fn is_yes(input: &str) -> bool {
    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes(""));
        assert!(!is_yes("no"));
    }
}
