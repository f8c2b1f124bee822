//! Basar - lectures turned into narrated podcast courses
//!
//! Basar takes a lecture file, asks a remote model to structure it into
//! chapters and topics with a narration script per topic, and synthesizes
//! each script to speech. A realtime voice assistant lets the listener
//! navigate and control playback hands-free.
//!
//! # Architecture
//!
//! - `config` - Settings and prompt templates
//! - `audio` - PCM codec, frame assembly, gapless playback, devices
//! - `retry` - Bounded exponential backoff for rate-limited calls
//! - `service` - Batch generation service (analysis and speech)
//! - `course` - Course artifact and outline types
//! - `pipeline` - Document to course generation with step tracking
//! - `voice` - Realtime voice session and its channel
//! - `player` - Lecture player driven by the assistant
//! - `library` - Persistent course storage
//!
//! # Example
//!
//! ```rust,no_run
//! use basar::config::Settings;
//! use basar::pipeline::{CoursePipeline, NoopObserver};
//! use basar::service::DocumentSource;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let pipeline = CoursePipeline::new(&settings)?;
//!
//!     let document = DocumentSource::from_path("lecture.pdf".as_ref())?;
//!     let course = pipeline.run(&document, &NoopObserver).await?;
//!     println!("{} topics, {} voiced", course.topic_count(), course.narrated_topic_count());
//!
//!     Ok(())
//! }
//! ```

pub mod audio;
pub mod cli;
pub mod config;
pub mod course;
pub mod error;
pub mod library;
pub mod openai;
pub mod pipeline;
pub mod player;
pub mod retry;
pub mod service;
pub mod voice;

pub use error::{BasarError, Result};
