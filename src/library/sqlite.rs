//! SQLite-based course library.
//!
//! Each course is stored as one JSON document next to the columns needed
//! for listing, so `list` never deserializes audio payloads.

use super::{CourseLibrary, CourseSummary};
use crate::course::{Category, CourseArtifact};
use crate::error::{BasarError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS courses (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        category TEXT NOT NULL,
        source_file TEXT NOT NULL,
        chapter_count INTEGER NOT NULL,
        topic_count INTEGER NOT NULL,
        narrated_count INTEGER NOT NULL,
        duration_seconds REAL NOT NULL,
        created_at TEXT NOT NULL,
        course_json TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_courses_created_at ON courses(created_at);
"#;

pub struct SqliteCourseLibrary {
    conn: Mutex<Connection>,
}

impl SqliteCourseLibrary {
    /// Open (or create) the library at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Opened course library at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory library (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| BasarError::Library(format!("Failed to acquire lock: {}", e)))
    }
}

fn parse_category(value: &str) -> Category {
    match value {
        "enrolled" => Category::Enrolled,
        _ => Category::Personal,
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl CourseLibrary for SqliteCourseLibrary {
    #[instrument(skip(self, course), fields(id = %course.id))]
    async fn save(&self, course: &CourseArtifact) -> Result<()> {
        let json = serde_json::to_string(course)?;
        let summary = CourseSummary::from(course);
        let conn = self.lock()?;

        conn.execute(
            r#"
            INSERT OR REPLACE INTO courses
                (id, title, category, source_file, chapter_count, topic_count,
                 narrated_count, duration_seconds, created_at, course_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                summary.id,
                summary.title,
                summary.category.to_string(),
                summary.source_file,
                summary.chapter_count as i64,
                summary.topic_count as i64,
                summary.narrated_count as i64,
                summary.duration_seconds,
                summary.created_at.to_rfc3339(),
                json,
            ],
        )?;

        debug!("Saved course '{}'", course.title);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, id: &str) -> Result<Option<CourseArtifact>> {
        let conn = self.lock()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT course_json FROM courses WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        json.map(|j| serde_json::from_str(&j).map_err(BasarError::from))
            .transpose()
    }

    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<CourseSummary>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, title, category, source_file, chapter_count, topic_count,
                   narrated_count, duration_seconds, created_at
            FROM courses
            ORDER BY created_at DESC
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            let category: String = row.get(2)?;
            let created_at: String = row.get(8)?;
            Ok(CourseSummary {
                id: row.get(0)?,
                title: row.get(1)?,
                category: parse_category(&category),
                source_file: row.get(3)?,
                chapter_count: row.get::<_, i64>(4)? as usize,
                topic_count: row.get::<_, i64>(5)? as usize,
                narrated_count: row.get::<_, i64>(6)? as usize,
                duration_seconds: row.get(7)?,
                created_at: parse_timestamp(&created_at),
            })
        })?;

        let summaries = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(summaries)
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM courses WHERE id = ?1", params![id])?;
        if deleted > 0 {
            info!("Deleted course {}", id);
        }
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::tests::sample_course;

    #[tokio::test]
    async fn test_sqlite_library() {
        let library = SqliteCourseLibrary::in_memory().unwrap();
        let course = sample_course("course-1", "Anatomy");

        library.save(&course).await.unwrap();

        let listed = library.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "course-1");
        assert_eq!(listed[0].narrated_count, 1);
        assert_eq!(listed[0].category, Category::Personal);

        let loaded = library.get("course-1").await.unwrap().unwrap();
        assert_eq!(loaded.chapters[0].topics[0].audio, course.chapters[0].topics[0].audio);
        assert!(loaded.chapters[0].topics[1].duration.is_text_only());

        assert!(library.delete("course-1").await.unwrap());
        assert!(library.list().await.unwrap().is_empty());
        assert!(library.get("course-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_replaces_existing() {
        let library = SqliteCourseLibrary::in_memory().unwrap();
        let mut course = sample_course("course-1", "Anatomy");
        library.save(&course).await.unwrap();

        course.title = "Human Anatomy".into();
        library.save(&course).await.unwrap();

        let listed = library.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "Human Anatomy");
    }

    #[tokio::test]
    async fn test_library_file_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("library.db");

        {
            let library = SqliteCourseLibrary::new(&path).unwrap();
            library.save(&sample_course("c1", "Optics")).await.unwrap();
        }

        let reopened = SqliteCourseLibrary::new(&path).unwrap();
        assert_eq!(reopened.list().await.unwrap()[0].title, "Optics");
    }
}
