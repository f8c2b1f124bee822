//! Prompt templates for Basar.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Prompts {
    pub analysis: AnalysisPrompts,
    pub narration: NarrationPrompts,
    pub assistant: AssistantPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: HashMap<String, String>,
}

/// Prompt for turning a lecture into a chapter/topic structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisPrompts {
    pub user: String,
}

impl Default for AnalysisPrompts {
    fn default() -> Self {
        Self {
            user: r#"Analyze this lecture (file name: {{file_name}}).
Split it into chapters, and every chapter into topics.
For every topic write a very detailed narration script (a podcast script) in {{language}} of at least {{min_words}} words.
Respond with JSON only, in exactly this shape:
{ "title": "course title", "chapters": [ { "title": "chapter title", "topics": [ { "title": "topic title", "summaryScript": "the long narration script" } ] } ] }"#
                .to_string(),
        }
    }
}

/// Prompts wrapped around text before speech synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrationPrompts {
    /// Wraps a topic script.
    pub topic: String,
    /// Wraps a short status update.
    pub status: String,
}

impl Default for NarrationPrompts {
    fn default() -> Self {
        Self {
            topic: "Read the following text in a calm, instructive tone: {{script}}".to_string(),
            status: "Say clearly: {{text}}".to_string(),
        }
    }
}

/// Persona of the realtime voice assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantPrompts {
    pub system: String,
}

impl Default for AssistantPrompts {
    fn default() -> Self {
        Self {
            system: r#"You are the Basar smart assistant. You help blind and low-vision students navigate the platform by voice.
Speak {{language}} in a friendly, clear style.
You can help the user to:
1. Move between pages: 'landing' (home), 'library' (course library), 'details' (course details).
2. Play or stop lectures.
3. Read the smart summaries.
Always start by greeting the user and telling them you are ready to help by voice."#
                .to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        prompts
            .variables
            .insert("language".to_string(), "Modern Standard Arabic".to_string());

        if let Some(vars) = custom_variables {
            for (key, value) in vars {
                prompts.variables.insert(key.clone(), value.clone());
            }
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let analysis_path = custom_path.join("analysis.toml");
            if analysis_path.exists() {
                let content = std::fs::read_to_string(&analysis_path)?;
                prompts.analysis = toml::from_str(&content)?;
            }

            let narration_path = custom_path.join("narration.toml");
            if narration_path.exists() {
                let content = std::fs::read_to_string(&narration_path)?;
                prompts.narration = toml::from_str(&content)?;
            }

            let assistant_path = custom_path.join("assistant.toml");
            if assistant_path.exists() {
                let content = std::fs::read_to_string(&assistant_path)?;
                prompts.assistant = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(&self, template: &str, vars: &HashMap<String, String>) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }

    /// Analysis request for a lecture file.
    pub fn analysis_request(&self, file_name: &str, min_words: u32) -> String {
        let mut vars = HashMap::new();
        vars.insert("file_name".to_string(), file_name.to_string());
        vars.insert("min_words".to_string(), min_words.to_string());
        self.render_with_custom(&self.analysis.user, &vars)
    }

    /// Speech synthesis input for a topic script.
    pub fn topic_narration(&self, script: &str) -> String {
        let mut vars = HashMap::new();
        vars.insert("script".to_string(), script.to_string());
        self.render_with_custom(&self.narration.topic, &vars)
    }

    /// Speech synthesis input for a status update.
    pub fn status_narration(&self, text: &str) -> String {
        let mut vars = HashMap::new();
        vars.insert("text".to_string(), text.to_string());
        self.render_with_custom(&self.narration.status, &vars)
    }

    /// System instruction of the voice assistant.
    pub fn assistant_persona(&self) -> String {
        self.render_with_custom(&self.assistant.system, &HashMap::new())
    }
}
