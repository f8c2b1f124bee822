//! Actions the voice assistant may invoke.

use crate::error::{BasarError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

pub const NAVIGATE_TO_PAGE: &str = "navigateToPage";
pub const CONTROL_PLAYBACK: &str = "controlPlayback";

/// Acknowledgement text returned for a navigation request.
pub const NAVIGATION_DONE: &str = "Navigation completed successfully";
/// Acknowledgement text returned for a playback request.
pub const PLAYBACK_DONE: &str = "Voice command executed";

/// Playback commands understood by `controlPlayback`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackAction {
    Play,
    Stop,
    Summary,
}

impl std::str::FromStr for PlaybackAction {
    type Err = BasarError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "play" => Ok(PlaybackAction::Play),
            "stop" | "pause" => Ok(PlaybackAction::Stop),
            "summary" => Ok(PlaybackAction::Summary),
            other => Err(BasarError::InvalidInput(format!(
                "Unknown playback action: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for PlaybackAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackAction::Play => write!(f, "play"),
            PlaybackAction::Stop => write!(f, "stop"),
            PlaybackAction::Summary => write!(f, "summary"),
        }
    }
}

/// A decoded tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssistantAction {
    Navigate { page: String },
    Playback(PlaybackAction),
}

impl AssistantAction {
    /// Decode a function call by name and JSON arguments.
    pub fn parse(name: &str, args: &Value) -> Result<Self> {
        match name {
            NAVIGATE_TO_PAGE => {
                let page = string_arg(args, "page")?;
                Ok(AssistantAction::Navigate {
                    page: page.trim().to_lowercase(),
                })
            }
            CONTROL_PLAYBACK => Ok(AssistantAction::Playback(string_arg(args, "action")?.parse()?)),
            other => Err(BasarError::InvalidInput(format!("Unknown tool: {}", other))),
        }
    }

    /// Acknowledgement sent back to the agent after the action ran.
    pub fn acknowledgement(&self) -> &'static str {
        match self {
            AssistantAction::Navigate { .. } => NAVIGATION_DONE,
            AssistantAction::Playback(_) => PLAYBACK_DONE,
        }
    }
}

fn string_arg<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| BasarError::InvalidInput(format!("Missing string argument '{}'", key)))
}

/// Function declarations advertised to the agent at session setup.
pub fn function_declarations() -> Value {
    json!([
        {
            "name": NAVIGATE_TO_PAGE,
            "description": "Move the user to another page of the platform.",
            "parameters": {
                "type": "OBJECT",
                "properties": {
                    "page": {
                        "type": "STRING",
                        "description": "Requested page: landing, library, details"
                    }
                },
                "required": ["page"]
            }
        },
        {
            "name": CONTROL_PLAYBACK,
            "description": "Control the lecture player.",
            "parameters": {
                "type": "OBJECT",
                "properties": {
                    "action": {
                        "type": "STRING",
                        "description": "Action: play, stop, summary"
                    }
                },
                "required": ["action"]
            }
        }
    ])
}

/// Receiver of the assistant's actions.
#[async_trait]
pub trait AssistantActions: Send + Sync {
    async fn on_navigate(&self, page: &str);

    async fn on_play_action(&self, action: PlaybackAction);
}

/// Run a decoded action against `actions`, returning its acknowledgement.
pub async fn dispatch(actions: &dyn AssistantActions, action: &AssistantAction) -> &'static str {
    match action {
        AssistantAction::Navigate { page } => actions.on_navigate(page).await,
        AssistantAction::Playback(playback) => actions.on_play_action(*playback).await,
    }
    action.acknowledgement()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_navigation() {
        let action = AssistantAction::parse(NAVIGATE_TO_PAGE, &json!({"page": " Library "})).unwrap();
        assert_eq!(
            action,
            AssistantAction::Navigate {
                page: "library".into()
            }
        );
        assert_eq!(action.acknowledgement(), NAVIGATION_DONE);
    }

    #[test]
    fn test_parse_playback() {
        let action = AssistantAction::parse(CONTROL_PLAYBACK, &json!({"action": "summary"})).unwrap();
        assert_eq!(action, AssistantAction::Playback(PlaybackAction::Summary));
        assert_eq!(action.acknowledgement(), PLAYBACK_DONE);
    }

    #[test]
    fn test_parse_rejects_bad_calls() {
        assert!(AssistantAction::parse("deleteEverything", &json!({})).is_err());
        assert!(AssistantAction::parse(CONTROL_PLAYBACK, &json!({"action": "rewind"})).is_err());
        assert!(AssistantAction::parse(NAVIGATE_TO_PAGE, &json!({"page": 3})).is_err());
    }

    #[test]
    fn test_declarations_name_both_tools() {
        let decls = function_declarations();
        let names: Vec<&str> = decls
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec![NAVIGATE_TO_PAGE, CONTROL_PLAYBACK]);
        assert_eq!(decls[1]["parameters"]["required"][0], "action");
    }
}
