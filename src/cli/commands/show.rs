//! Show command implementation.

use super::open_library;
use crate::cli::Output;
use crate::config::Settings;
use crate::course::format_clock;
use crate::library::resolve;
use anyhow::Result;

/// Run the show command.
pub async fn run_show(id: &str, settings: Settings) -> Result<()> {
    let library = open_library(&settings)?;
    let course = resolve(&library, id).await?;

    Output::header(&course.title);
    Output::kv("Id", &course.id);
    Output::kv("Instructor", &course.instructor);
    Output::kv("University", &course.university);
    Output::kv("Level", &course.level);
    Output::kv("Category", &course.category.to_string());
    Output::kv("Source", &course.source_file);
    Output::kv("Duration", &format_clock(course.duration_seconds));
    Output::kv(
        "Voiced topics",
        &format!("{}/{}", course.narrated_topic_count(), course.topic_count()),
    );
    Output::kv("Created", &course.created_at.format("%Y-%m-%d %H:%M").to_string());

    println!();
    println!("  {}", course.description);
    if let Some(summary) = &course.smart_summary {
        println!("  {}", summary);
    }

    Output::course_outline(&course);
    Ok(())
}
