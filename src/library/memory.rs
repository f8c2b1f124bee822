//! In-memory course library.
//!
//! Useful for testing and for the HTTP server without persistence.

use super::{CourseLibrary, CourseSummary};
use crate::course::CourseArtifact;
use crate::error::{BasarError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

pub struct MemoryCourseLibrary {
    courses: RwLock<HashMap<String, CourseArtifact>>,
}

impl MemoryCourseLibrary {
    pub fn new() -> Self {
        Self {
            courses: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryCourseLibrary {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> BasarError {
    BasarError::Library("Library lock poisoned".to_string())
}

#[async_trait]
impl CourseLibrary for MemoryCourseLibrary {
    async fn save(&self, course: &CourseArtifact) -> Result<()> {
        let mut courses = self.courses.write().map_err(poisoned)?;
        courses.insert(course.id.clone(), course.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<CourseArtifact>> {
        let courses = self.courses.read().map_err(poisoned)?;
        Ok(courses.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<CourseSummary>> {
        let courses = self.courses.read().map_err(poisoned)?;
        let mut summaries: Vec<CourseSummary> = courses.values().map(CourseSummary::from).collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut courses = self.courses.write().map_err(poisoned)?;
        Ok(courses.remove(id).is_some())
    }
}
