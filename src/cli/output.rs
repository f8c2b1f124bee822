//! CLI output formatting utilities.

use crate::course::{format_clock, CourseArtifact};
use crate::library::CourseSummary;
use crate::pipeline::{GenerationStep, StepStatus};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    pub fn list_item(msg: &str) {
        println!("  {} {}", style("*").cyan(), msg);
    }

    /// One line per stored course.
    pub fn course_summary(course: &CourseSummary) {
        println!(
            "  {} {} ({}, {}, {} chapters, {}/{} topics voiced, {})",
            style("*").cyan(),
            style(&course.title).bold(),
            style(short_id(&course.id)).dim(),
            course.category,
            course.chapter_count,
            course.narrated_count,
            course.topic_count,
            format_clock(course.duration_seconds)
        );
    }

    /// Chapters and topics of a course.
    pub fn course_outline(course: &CourseArtifact) {
        for (c, chapter) in course.chapters.iter().enumerate() {
            println!(
                "\n  {} {} {}",
                style(format!("{}.", c + 1)).cyan(),
                style(&chapter.title).bold(),
                style(format_clock(chapter.duration_seconds)).dim()
            );
            for (t, topic) in chapter.topics.iter().enumerate() {
                let marker = if topic.has_audio() {
                    style("~").green()
                } else {
                    style("-").yellow()
                };
                println!(
                    "     {} {}.{} {} ({})",
                    marker,
                    c + 1,
                    t + 1,
                    topic.title,
                    topic.duration
                );
            }
        }
    }

    /// Render a pipeline step as a single line.
    pub fn step_line(step: &GenerationStep) -> String {
        let badge = match step.status {
            StepStatus::Waiting => style("waiting").dim(),
            StepStatus::Processing => style("working").cyan(),
            StepStatus::Completed => style("done").green(),
            StepStatus::Error => style("error").red().bold(),
        };
        format!("[{}] {}: {}", badge, step.kind.title(), step.description)
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        // The template is a literal; fall back to the default style if it is ever rejected.
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(spinner_style);
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// First block of a UUID, enough to address a course from the CLI.
pub fn short_id(id: &str) -> &str {
    id.split('-').next().unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("3f2a9c1e-aaaa-bbbb"), "3f2a9c1e");
        assert_eq!(short_id("plain"), "plain");
    }
}
