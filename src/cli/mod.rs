//! CLI module for Basar.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};

/// Basar - lectures turned into narrated podcast courses
///
/// Upload a lecture file to get a structured, narrated course, then listen to
/// it hands-free with a realtime voice assistant.
#[derive(Parser, Debug)]
#[command(name = "basar")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default configuration and verify requirements
    Init,

    /// Check configuration, API keys and the course library
    Doctor,

    /// Generate a narrated course from a lecture file
    Generate {
        /// Lecture file (PDF, text, slides, ...)
        file: String,

        /// Title to use instead of the one found in the document
        #[arg(short, long)]
        title: Option<String>,

        /// Speak status updates while generating
        #[arg(long)]
        announce: bool,
    },

    /// Talk to the voice assistant (press "v" + Enter to toggle, "q" to quit)
    Voice {
        /// Course to open in the player
        #[arg(long)]
        course: Option<String>,
    },

    /// List generated courses
    List,

    /// Show the chapters and topics of a course
    Show {
        /// Course id or unique id prefix
        id: String,
    },

    /// Export a course as JSON, and its narration as WAV files
    Export {
        /// Course id or unique id prefix
        id: String,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: String,

        /// Skip writing WAV files
        #[arg(long)]
        no_audio: bool,
    },

    /// Delete a course from the library
    Delete {
        /// Course id or unique id prefix
        id: String,
    },

    /// Start HTTP API server
    Serve {
        /// Host to bind to (defaults to the configured host)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (defaults to the configured port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "generation.topic_pause_ms")
        key: String,
        /// Configuration value
        value: String,
    },

    /// Show configuration file path
    Path,
}
