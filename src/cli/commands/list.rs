//! List command implementation.

use super::open_library;
use crate::cli::Output;
use crate::config::Settings;
use crate::course::format_clock;
use crate::library::CourseLibrary;
use anyhow::Result;

/// Run the list command.
pub async fn run_list(settings: Settings) -> Result<()> {
    let library = open_library(&settings)?;

    let courses = match library.list().await {
        Ok(courses) => courses,
        Err(e) => {
            Output::error(&format!("Failed to list courses: {}", e));
            return Err(e.into());
        }
    };

    if courses.is_empty() {
        Output::info("No courses yet. Use 'basar generate <file>' to create one.");
        return Ok(());
    }

    Output::header(&format!("Courses ({})", courses.len()));
    println!();
    for course in &courses {
        Output::course_summary(course);
    }

    let total: f64 = courses.iter().map(|c| c.duration_seconds).sum();
    println!();
    Output::kv("Total courses", &courses.len().to_string());
    Output::kv("Total listening time", &format_clock(total));

    Ok(())
}
