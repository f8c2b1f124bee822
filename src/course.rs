//! Course artifacts produced by the generation pipeline.

use crate::audio::pcm_duration_secs;
use crate::error::{BasarError, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use uuid::Uuid;

/// Where a course came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Assigned through the university.
    Enrolled,
    /// Generated from a file the student uploaded.
    #[default]
    Personal,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Enrolled => write!(f, "enrolled"),
            Category::Personal => write!(f, "personal"),
        }
    }
}

/// Playing time of a topic, chapter or course.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DurationMarker {
    /// Narrated audio of the given length.
    Estimated { seconds: f64 },
    /// No audio; the content is available as text only.
    TextOnly,
}

impl DurationMarker {
    pub fn seconds(&self) -> f64 {
        match self {
            DurationMarker::Estimated { seconds } => *seconds,
            DurationMarker::TextOnly => 0.0,
        }
    }

    pub fn is_text_only(&self) -> bool {
        matches!(self, DurationMarker::TextOnly)
    }
}

impl std::fmt::Display for DurationMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DurationMarker::TextOnly => write!(f, "text only"),
            DurationMarker::Estimated { seconds } => write!(f, "{}", format_clock(*seconds)),
        }
    }
}

/// Format seconds as `m:ss` or `h:mm:ss`.
pub fn format_clock(seconds: f64) -> String {
    let total = seconds.round().max(0.0) as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

/// Narrated audio attached to a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicAudio {
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved s16le PCM, base64 in serialized form.
    #[serde(with = "base64_pcm")]
    pub pcm: Vec<u8>,
}

impl TopicAudio {
    pub fn new(pcm: Vec<u8>, sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            pcm,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        pcm_duration_secs(self.pcm.len(), self.sample_rate, self.channels)
    }
}

mod base64_pcm {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&crate::audio::codec::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        crate::audio::codec::decode(&text).map_err(serde::de::Error::custom)
    }
}

/// One narrated topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub title: String,
    /// Narration script.
    pub script: String,
    pub audio: Option<TopicAudio>,
    pub duration: DurationMarker,
}

impl Topic {
    /// Topic with synthesized narration.
    pub fn narrated(title: String, script: String, audio: TopicAudio) -> Self {
        let duration = DurationMarker::Estimated {
            seconds: audio.duration_secs(),
        };
        Self {
            id: Uuid::new_v4().to_string(),
            title,
            script,
            audio: Some(audio),
            duration,
        }
    }

    /// Topic whose narration could not be synthesized.
    pub fn text_only(title: String, script: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title,
            script,
            audio: None,
            duration: DurationMarker::TextOnly,
        }
    }

    pub fn has_audio(&self) -> bool {
        self.audio.as_ref().is_some_and(|a| !a.pcm.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub duration_seconds: f64,
    pub topics: Vec<Topic>,
}

impl Chapter {
    pub fn new(title: String, summary: String, topics: Vec<Topic>) -> Self {
        let duration_seconds = topics.iter().map(|t| t.duration.seconds()).sum();
        Self {
            id: Uuid::new_v4().to_string(),
            title,
            summary,
            duration_seconds,
            topics,
        }
    }
}

/// A generated course, immutable once assembled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseArtifact {
    pub id: String,
    pub title: String,
    pub instructor: String,
    pub university: String,
    pub level: String,
    pub description: String,
    pub category: Category,
    pub smart_summary: Option<String>,
    pub source_file: String,
    pub duration_seconds: f64,
    pub chapters: Vec<Chapter>,
    pub created_at: DateTime<Utc>,
}

impl CourseArtifact {
    pub fn topic_count(&self) -> usize {
        self.chapters.iter().map(|c| c.topics.len()).sum()
    }

    pub fn narrated_topic_count(&self) -> usize {
        self.topics().filter(|t| t.has_audio()).count()
    }

    /// All topics in document order.
    pub fn topics(&self) -> impl Iterator<Item = &Topic> {
        self.chapters.iter().flat_map(|c| c.topics.iter())
    }

    /// Look up a topic by chapter and topic index (both zero-based).
    pub fn topic(&self, chapter: usize, topic: usize) -> Option<&Topic> {
        self.chapters.get(chapter)?.topics.get(topic)
    }
}

/// Chapter/topic structure returned by the analysis call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseOutline {
    #[serde(default)]
    pub title: Option<String>,
    pub chapters: Vec<ChapterOutline>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterOutline {
    pub title: String,
    pub topics: Vec<TopicOutline>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicOutline {
    pub title: String,
    #[serde(rename = "summaryScript", alias = "summary_script", alias = "script")]
    pub script: String,
}

impl CourseOutline {
    /// Parse the analysis response, tolerating markdown fences around the JSON.
    pub fn parse(response: &str) -> Result<Self> {
        let json = extract_json_object(response);

        let outline: CourseOutline = serde_json::from_str(json).map_err(|e| {
            BasarError::MalformedResponse(format!(
                "Failed to parse course structure: {}. Response was: {}",
                e,
                preview(response, 500)
            ))
        })?;

        if outline.topic_count() == 0 {
            return Err(BasarError::MalformedResponse(
                "Course structure contains no topics".to_string(),
            ));
        }

        Ok(outline)
    }

    pub fn topic_count(&self) -> usize {
        self.chapters.iter().map(|c| c.topics.len()).sum()
    }
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("valid regex"))
}

fn extract_json_object(response: &str) -> &str {
    if let Some(inner) = fence_regex().captures(response).and_then(|c| c.get(1)) {
        return inner.as_str();
    }

    match (response.find('{'), response.rfind('}')) {
        (Some(start), Some(end)) if end > start => &response[start..=end],
        _ => response,
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Whitespace-separated word count.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_outline() {
        let json = r#"{
            "title": "Cell Biology",
            "chapters": [
                {"title": "Membranes", "topics": [
                    {"title": "Lipid bilayer", "summaryScript": "The membrane is..."}
                ]},
                {"title": "Organelles", "topics": [
                    {"title": "Mitochondria", "summaryScript": "Powerhouse"},
                    {"title": "Ribosomes", "summaryScript": "Protein factories"}
                ]}
            ]
        }"#;

        let outline = CourseOutline::parse(json).unwrap();
        assert_eq!(outline.title.as_deref(), Some("Cell Biology"));
        assert_eq!(outline.chapters.len(), 2);
        assert_eq!(outline.topic_count(), 3);
        assert_eq!(outline.chapters[1].topics[0].script, "Powerhouse");
    }

    #[test]
    fn test_parse_outline_with_markdown_fence() {
        let response = "Here is the course:\n```json\n{\"chapters\": [{\"title\": \"A\", \"topics\": [{\"title\": \"t\", \"summaryScript\": \"s\"}]}]}\n```\nEnjoy.";
        let outline = CourseOutline::parse(response).unwrap();
        assert_eq!(outline.title, None);
        assert_eq!(outline.topic_count(), 1);
    }

    #[test]
    fn test_parse_outline_rejects_wrong_shape() {
        assert!(matches!(
            CourseOutline::parse("{\"title\": \"x\", \"sections\": []}"),
            Err(BasarError::MalformedResponse(_))
        ));
        assert!(matches!(
            CourseOutline::parse("I could not read this file."),
            Err(BasarError::MalformedResponse(_))
        ));
        assert!(matches!(
            CourseOutline::parse("{\"chapters\": []}"),
            Err(BasarError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_duration_marker_display() {
        assert_eq!(DurationMarker::TextOnly.to_string(), "text only");
        assert_eq!(DurationMarker::Estimated { seconds: 125.4 }.to_string(), "2:05");
        assert_eq!(format_clock(3_725.0), "1:02:05");
    }

    #[test]
    fn test_chapter_duration_ignores_text_only() {
        let audio = TopicAudio::new(vec![0; 48_000 * 2], 24_000, 1);
        let chapter = Chapter::new(
            "Ch".into(),
            "summary".into(),
            vec![
                Topic::narrated("a".into(), "s".into(), audio),
                Topic::text_only("b".into(), "s".into()),
            ],
        );
        assert_eq!(chapter.duration_seconds, 2.0);
        assert!(chapter.topics[1].duration.is_text_only());
    }

    #[test]
    fn test_topic_audio_serializes_as_base64() {
        let topic = Topic::narrated(
            "a".into(),
            "s".into(),
            TopicAudio::new(vec![1, 2, 3, 4], 24_000, 1),
        );
        let json = serde_json::to_value(&topic).unwrap();
        assert_eq!(json["audio"]["pcm"], "AQIDBA==");
        assert_eq!(json["duration"]["kind"], "estimated");

        let back: Topic = serde_json::from_value(json).unwrap();
        assert_eq!(back, topic);
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("  one two\nthree  "), 3);
    }
}
