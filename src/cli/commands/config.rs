//! Config command implementation.

use crate::cli::{ConfigAction, Output};
use crate::config::Settings;
use anyhow::{anyhow, bail, Result};
use std::path::PathBuf;
use toml::Value;

/// Run the config command.
pub fn run_config(action: &ConfigAction, settings: Settings, config_path: PathBuf) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let toml_str = toml::to_string_pretty(&settings)
                .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;
            println!("{}", toml_str);
        }

        ConfigAction::Set { key, value } => {
            let updated = set_value(&settings, key, value)?;
            updated.save_to(&config_path)?;
            Output::success(&format!("Set {} = {}", key, value));
            Output::kv("File", &config_path.display().to_string());
        }

        ConfigAction::Path => {
            println!("{}", config_path.display());
        }
    }

    Ok(())
}

/// Apply `section.key = value` to the settings, validating the result.
fn set_value(settings: &Settings, key: &str, value: &str) -> Result<Settings> {
    let mut root = Value::try_from(settings)?;
    let mut path: Vec<&str> = key.split('.').collect();
    let Some(leaf) = path.pop() else {
        bail!("Empty configuration key");
    };

    let mut table = root
        .as_table_mut()
        .ok_or_else(|| anyhow!("Configuration is not a table"))?;
    for segment in path {
        table = table
            .get_mut(segment)
            .and_then(Value::as_table_mut)
            .ok_or_else(|| anyhow!("Unknown configuration section: {}", segment))?;
    }

    let parsed = match table.get(leaf) {
        Some(Value::Integer(_)) => Value::Integer(value.parse()?),
        Some(Value::Float(_)) => Value::Float(value.parse()?),
        Some(Value::Boolean(_)) => Value::Boolean(value.parse()?),
        Some(Value::String(_)) | None => Value::String(value.to_string()),
        Some(_) => bail!("{} cannot be set from the command line", key),
    };
    table.insert(leaf.to_string(), parsed);

    Ok(root.try_into()?)
}
