//! Persistent course library.
//!
//! Provides a trait-based interface over the storage of generated courses.

mod memory;
mod sqlite;

pub use memory::MemoryCourseLibrary;
pub use sqlite::SqliteCourseLibrary;

use crate::course::{Category, CourseArtifact};
use crate::error::{BasarError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Listing entry for a stored course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseSummary {
    pub id: String,
    pub title: String,
    pub category: Category,
    pub source_file: String,
    pub chapter_count: usize,
    pub topic_count: usize,
    /// Topics with narration audio.
    pub narrated_count: usize,
    pub duration_seconds: f64,
    pub created_at: DateTime<Utc>,
}

impl From<&CourseArtifact> for CourseSummary {
    fn from(course: &CourseArtifact) -> Self {
        Self {
            id: course.id.clone(),
            title: course.title.clone(),
            category: course.category,
            source_file: course.source_file.clone(),
            chapter_count: course.chapters.len(),
            topic_count: course.topic_count(),
            narrated_count: course.narrated_topic_count(),
            duration_seconds: course.duration_seconds,
            created_at: course.created_at,
        }
    }
}

/// Storage for generated courses.
#[async_trait]
pub trait CourseLibrary: Send + Sync {
    /// Insert or replace a course.
    async fn save(&self, course: &CourseArtifact) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<CourseArtifact>>;

    /// All courses, newest first.
    async fn list(&self) -> Result<Vec<CourseSummary>>;

    /// Remove a course. Returns whether it existed.
    async fn delete(&self, id: &str) -> Result<bool>;
}

/// Find a course by full id or unique id prefix.
pub async fn resolve(library: &dyn CourseLibrary, id_or_prefix: &str) -> Result<CourseArtifact> {
    if let Some(course) = library.get(id_or_prefix).await? {
        return Ok(course);
    }

    let matches: Vec<CourseSummary> = library
        .list()
        .await?
        .into_iter()
        .filter(|c| c.id.starts_with(id_or_prefix))
        .collect();

    match matches.as_slice() {
        [only] => library
            .get(&only.id)
            .await?
            .ok_or_else(|| BasarError::NotFound(format!("Course {}", only.id))),
        [] => Err(BasarError::NotFound(format!("No course matches '{}'", id_or_prefix))),
        _ => Err(BasarError::InvalidInput(format!(
            "'{}' matches {} courses; use a longer id",
            id_or_prefix,
            matches.len()
        ))),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::course::{Chapter, Topic, TopicAudio};

    /// A small course with one narrated and one text-only topic.
    pub(crate) fn sample_course(id: &str, title: &str) -> CourseArtifact {
        let chapter = Chapter::new(
            "Introduction".into(),
            "Auto-extracted chapter".into(),
            vec![
                Topic::narrated(
                    "Overview".into(),
                    "script".into(),
                    TopicAudio::new(vec![0; 48_000], 24_000, 1),
                ),
                Topic::text_only("Details".into(), "more script".into()),
            ],
        );
        CourseArtifact {
            id: id.to_string(),
            title: title.to_string(),
            instructor: "Basar AI".into(),
            university: "Jazan University".into(),
            level: "Auto-generated".into(),
            description: "Generated".into(),
            category: Category::Personal,
            smart_summary: Some(format!("This lecture covers {}.", title)),
            source_file: format!("{}.pdf", title),
            duration_seconds: chapter.duration_seconds,
            chapters: vec![chapter],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_summary_counts() {
        let summary = CourseSummary::from(&sample_course("c1", "Physics"));
        assert_eq!(summary.chapter_count, 1);
        assert_eq!(summary.topic_count, 2);
        assert_eq!(summary.narrated_count, 1);
        assert_eq!(summary.duration_seconds, 1.0);
    }

    #[tokio::test]
    async fn test_resolve_by_prefix() {
        let library = MemoryCourseLibrary::new();
        library.save(&sample_course("abc-123", "Physics")).await.unwrap();
        library.save(&sample_course("abd-456", "Chemistry")).await.unwrap();

        assert_eq!(resolve(&library, "abc-123").await.unwrap().title, "Physics");
        assert_eq!(resolve(&library, "abd").await.unwrap().title, "Chemistry");
        assert!(matches!(
            resolve(&library, "ab").await,
            Err(BasarError::InvalidInput(_))
        ));
        assert!(matches!(
            resolve(&library, "zzz").await,
            Err(BasarError::NotFound(_))
        ));
    }
}
