//! Voice command - hands-free conversation with the assistant.

use super::open_library;
use crate::audio::default_output;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::{Prompts, Settings};
use crate::course::format_clock;
use crate::library::resolve;
use crate::player::{LecturePlayer, PlayerEvent};
use crate::service::{create_service, narration_voice};
use crate::voice::{InboundEvent, VoiceSession};
use anyhow::Result;
use console::style;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

/// Run the voice command.
pub async fn run_voice(course: Option<String>, settings: Settings) -> Result<()> {
    preflight::check(Operation::Voice, &settings)?;

    let (player, mut player_events) = LecturePlayer::new(default_output());
    let prompts = Prompts::load(
        settings.prompts.custom_dir.as_deref(),
        Some(&settings.prompts.variables),
    )?;
    let player = match create_service(&settings) {
        Ok(service) => player.with_narrator(
            service,
            prompts,
            narration_voice(&settings),
            settings.generation.status_retry_policy(),
        ),
        Err(e) => {
            warn!("Summaries will not be narrated: {}", e);
            player
        }
    };

    if let Some(id) = course {
        let library = open_library(&settings)?;
        let selected = resolve(&library, &id).await?;
        Output::info(&format!("Opened '{}'", selected.title));
        player.select(selected);
    }

    let player = Arc::new(player);
    let mut session = VoiceSession::new(&settings, player.clone())?;

    Output::header("Basar voice assistant");
    println!(
        "  {} toggle the microphone   {} quit",
        style("v + Enter").cyan(),
        style("q + Enter").cyan()
    );
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line?.as_deref().map(str::trim) {
                    Some("v") => {
                        match session.toggle().await {
                            Ok(()) => Output::info(&format!("Session {}", session.state())),
                            Err(e) => Output::error(&e.to_string()),
                        }
                    }
                    Some("q") | None => break,
                    Some("") => {}
                    Some(other) => Output::warning(&format!("Unknown input '{}'", other)),
                }
            }
            Some(event) = session.next_event(), if session.is_active() => {
                let closed = matches!(event, InboundEvent::Closed(_));
                if let Err(e) = session.handle_event(event).await {
                    Output::error(&e.to_string());
                } else if closed {
                    Output::info("The assistant closed the session. Press v to reconnect.");
                }
            }
            Some(event) = player_events.recv() => print_player_event(&event),
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.stop().await?;
    Output::info("Goodbye");
    Ok(())
}

fn print_player_event(event: &PlayerEvent) {
    match event {
        PlayerEvent::Navigated(page) => Output::info(&format!("Opened the {} page", page)),
        PlayerEvent::Playing { title, topics, seconds } => Output::info(&format!(
            "Playing {} topic(s) of '{}' ({})",
            topics,
            title,
            format_clock(*seconds)
        )),
        PlayerEvent::Stopped => Output::info("Playback stopped"),
        PlayerEvent::Summary(Some(summary)) => {
            Output::header("Summary");
            println!("  {}", summary);
        }
        PlayerEvent::Summary(None) => Output::warning("This course has no summary"),
        PlayerEvent::NothingSelected => {
            Output::warning("No course is open; start with --course <id>")
        }
    }
}
