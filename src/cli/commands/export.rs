//! Export command implementation.

use super::open_library;
use crate::audio::write_wav;
use crate::cli::Output;
use crate::config::Settings;
use crate::course::CourseArtifact;
use crate::library::resolve;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Run the export command.
///
/// Writes `<output>/<course-slug>/course.json` and, unless `no_audio` is set,
/// one WAV file per voiced topic next to it. The JSON keeps the narration
/// only when no WAV files are written.
pub async fn run_export(id: &str, output: &str, no_audio: bool, settings: Settings) -> Result<()> {
    let library = open_library(&settings)?;
    let course = resolve(&library, id).await?;

    let dir = Path::new(output).join(slug(&course.title));
    std::fs::create_dir_all(&dir)?;

    let files = if no_audio {
        Vec::new()
    } else {
        write_topic_audio(&course, &dir)?
    };

    let json = if no_audio {
        serde_json::to_string_pretty(&course)?
    } else {
        serde_json::to_string_pretty(&without_audio(&course))?
    };
    let json_path = dir.join("course.json");
    std::fs::write(&json_path, json)?;

    Output::success(&format!("Exported '{}' to {}", course.title, dir.display()));
    Output::kv("Course", &json_path.display().to_string());
    Output::kv("Audio files", &files.len().to_string());
    Ok(())
}

fn write_topic_audio(course: &CourseArtifact, dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for (c, chapter) in course.chapters.iter().enumerate() {
        for (t, topic) in chapter.topics.iter().enumerate() {
            let Some(audio) = &topic.audio else {
                continue;
            };
            let path = dir.join(format!("{:02}-{:02}-{}.wav", c + 1, t + 1, slug(&topic.title)));
            write_wav(&path, &audio.pcm, audio.sample_rate, audio.channels)?;
            files.push(path);
        }
    }
    Ok(files)
}

fn without_audio(course: &CourseArtifact) -> CourseArtifact {
    let mut course = course.clone();
    for chapter in &mut course.chapters {
        for topic in &mut chapter.topics {
            topic.audio = None;
        }
    }
    course
}

/// File-name friendly version of a title.
fn slug(title: &str) -> String {
    let slug: String = title
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let slug = slug
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        "course".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::tests::sample_course;

    #[test]
    fn test_slug() {
        assert_eq!(slug("Intro to Cell Biology!"), "intro-to-cell-biology");
        assert_eq!(slug("???"), "course");
    }

    #[test]
    fn test_topic_audio_written_for_voiced_topics() {
        let dir = tempfile::tempdir().unwrap();
        let course = sample_course("c1", "Anatomy");

        let files = write_topic_audio(&course, dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("01-01-overview.wav"));
        assert!(files[0].exists());

        let stripped = without_audio(&course);
        assert_eq!(stripped.narrated_topic_count(), 0);
        assert_eq!(stripped.duration_seconds, course.duration_seconds);
    }
}
