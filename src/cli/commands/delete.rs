//! Delete command implementation.

use super::open_library;
use crate::cli::Output;
use crate::config::Settings;
use crate::library::{resolve, CourseLibrary};
use anyhow::Result;

/// Run the delete command.
pub async fn run_delete(id: &str, settings: Settings) -> Result<()> {
    let library = open_library(&settings)?;
    let course = resolve(&library, id).await?;

    if library.delete(&course.id).await? {
        Output::success(&format!("Deleted '{}'", course.title));
    } else {
        Output::warning(&format!("Course {} was already gone", course.id));
    }
    Ok(())
}
