//! HTTP API server for integration with other systems.
//!
//! Provides REST endpoints for browsing the course library, streaming topic
//! narration as WAV, and running generation jobs in the background.

use super::open_library;
use crate::audio::wav_bytes;
use crate::cli::Output;
use crate::config::Settings;
use crate::course::CourseArtifact;
use crate::error::BasarError;
use crate::library::{CourseLibrary, CourseSummary};
use crate::pipeline::{CoursePipeline, GenerationProgress, GenerationStep, PipelineObserver};
use crate::service::{mime_type_for, DocumentSource};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Shared application state.
struct AppState {
    library: Arc<dyn CourseLibrary>,
    pipeline: Option<Arc<CoursePipeline>>,
    jobs: Arc<Mutex<HashMap<String, Job>>>,
}

/// Run the HTTP API server.
pub async fn run_serve(host: Option<String>, port: Option<u16>, settings: Settings) -> anyhow::Result<()> {
    let library: Arc<dyn CourseLibrary> = Arc::new(open_library(&settings)?);
    let pipeline = match CoursePipeline::new(&settings) {
        Ok(pipeline) => Some(Arc::new(pipeline)),
        Err(e) => {
            Output::warning(&format!("Generation disabled: {}", e));
            None
        }
    };

    let state = Arc::new(AppState {
        library,
        pipeline,
        jobs: Arc::new(Mutex::new(HashMap::new())),
    });

    let host = host.unwrap_or_else(|| settings.server.host.clone());
    let port = port.unwrap_or(settings.server.port);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("Basar API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET    /health");
    Output::kv("List courses", "GET    /courses");
    Output::kv("Get course", "GET    /courses/{id}");
    Output::kv("Delete course", "DELETE /courses/{id}");
    Output::kv("Topic audio", "GET    /courses/{id}/chapters/{c}/topics/{t}/audio");
    Output::kv("Generate", "POST   /generate");
    Output::kv("Job status", "GET    /jobs/{id}");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, router(state)).await?;

    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/courses", get(list_courses))
        .route("/courses/{id}", get(get_course).delete(delete_course))
        .route(
            "/courses/{id}/chapters/{chapter}/topics/{topic}/audio",
            get(topic_audio),
        )
        .route("/generate", post(generate))
        .route("/jobs/{id}", get(job_status))
        .layer(cors)
        .with_state(state)
}

// === Request/Response Types ===

#[derive(Deserialize)]
struct GenerateRequest {
    /// Path of a lecture file readable by the server.
    #[serde(default)]
    path: Option<String>,
    /// File name of an uploaded lecture.
    #[serde(default)]
    name: Option<String>,
    /// Base64 contents of an uploaded lecture.
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum JobState {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
struct Job {
    id: String,
    document: String,
    state: JobState,
    steps: Vec<GenerationStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    course_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip)]
    finished_at: Option<Instant>,
}

/// How long a finished job stays queryable.
const JOB_RETENTION: Duration = Duration::from_secs(60 * 60);

#[derive(Serialize)]
struct CourseListResponse {
    courses: Vec<CourseSummary>,
    total: usize,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn failure(err: BasarError) -> Response {
    let status = match err {
        BasarError::NotFound(_) => StatusCode::NOT_FOUND,
        BasarError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, err.to_string())
}

fn lock_jobs(jobs: &Mutex<HashMap<String, Job>>) -> MutexGuard<'_, HashMap<String, Job>> {
    jobs.lock().unwrap_or_else(|p| p.into_inner())
}

/// Drop jobs that finished more than [`JOB_RETENTION`] before `now`.
fn prune_jobs(jobs: &mut HashMap<String, Job>, now: Instant) {
    jobs.retain(|_, job| match job.finished_at {
        Some(finished) => now.saturating_duration_since(finished) < JOB_RETENTION,
        None => true,
    });
}

/// Copies pipeline progress into the job table.
struct JobObserver {
    jobs: Arc<Mutex<HashMap<String, Job>>>,
    id: String,
}

impl PipelineObserver for JobObserver {
    fn on_step_update(&self, step: &GenerationStep) {
        let mut jobs = lock_jobs(&self.jobs);
        if let Some(job) = jobs.get_mut(&self.id) {
            if let Some(slot) = job.steps.iter_mut().find(|s| s.kind == step.kind) {
                *slot = step.clone();
            }
        }
    }

    fn on_artifact_ready(&self, artifact: &CourseArtifact) {
        info!("Job {} produced course {}", self.id, artifact.id);
    }
}

impl GenerateRequest {
    fn into_document(self) -> Result<DocumentSource, BasarError> {
        if let Some(path) = self.path {
            return DocumentSource::from_path(std::path::Path::new(&path));
        }
        match (self.name, self.data) {
            (Some(name), Some(data)) => {
                let bytes = general_purpose::STANDARD
                    .decode(data.trim())
                    .map_err(|e| BasarError::InvalidInput(format!("Invalid base64 data: {}", e)))?;
                let mime_type = self.mime_type.unwrap_or_else(|| mime_type_for(&name));
                Ok(DocumentSource::new(name, mime_type, bytes))
            }
            _ => Err(BasarError::InvalidInput(
                "Provide either 'path' or both 'name' and 'data'".to_string(),
            )),
        }
    }
}

// === Handlers ===

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn list_courses(State(state): State<Arc<AppState>>) -> Response {
    match state.library.list().await {
        Ok(courses) => Json(CourseListResponse {
            total: courses.len(),
            courses,
        })
        .into_response(),
        Err(e) => failure(e),
    }
}

async fn get_course(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.library.get(&id).await {
        Ok(Some(course)) => Json(course).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("Course not found: {}", id)),
        Err(e) => failure(e),
    }
}

async fn delete_course(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.library.delete(&id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, format!("Course not found: {}", id)),
        Err(e) => failure(e),
    }
}

/// Narration of one topic as a WAV file. Indices are zero-based.
async fn topic_audio(
    State(state): State<Arc<AppState>>,
    Path((id, chapter, topic)): Path<(String, usize, usize)>,
) -> Response {
    let course = match state.library.get(&id).await {
        Ok(Some(course)) => course,
        Ok(None) => {
            return error_response(StatusCode::NOT_FOUND, format!("Course not found: {}", id))
        }
        Err(e) => return failure(e),
    };

    let Some(topic) = course.topic(chapter, topic) else {
        return error_response(StatusCode::NOT_FOUND, "No such topic");
    };
    let Some(audio) = &topic.audio else {
        return error_response(StatusCode::NOT_FOUND, "This topic is available as text only");
    };

    match wav_bytes(&audio.pcm, audio.sample_rate, audio.channels) {
        Ok(bytes) => ([(header::CONTENT_TYPE, "audio/wav")], bytes).into_response(),
        Err(e) => failure(e),
    }
}

async fn generate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateRequest>,
) -> Response {
    let Some(pipeline) = state.pipeline.clone() else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Generation is not configured on this server",
        );
    };
    let document = match req.into_document() {
        Ok(document) => document,
        Err(e) => return failure(e),
    };

    let id = Uuid::new_v4().to_string();
    let job = Job {
        id: id.clone(),
        document: document.name.clone(),
        state: JobState::Running,
        steps: GenerationProgress::new().steps().to_vec(),
        course_id: None,
        error: None,
        finished_at: None,
    };
    {
        let mut jobs = lock_jobs(&state.jobs);
        prune_jobs(&mut jobs, Instant::now());
        jobs.insert(id.clone(), job.clone());
    }
    info!("Started job {} for {}", id, document.name);

    let jobs = state.jobs.clone();
    let library = state.library.clone();
    tokio::spawn(async move {
        let observer = JobObserver {
            jobs: jobs.clone(),
            id: id.clone(),
        };
        let outcome = match pipeline.run(&document, &observer).await {
            Ok(course) => library.save(&course).await.map(|_| course.id),
            Err(e) => Err(e),
        };

        let mut jobs = lock_jobs(&jobs);
        let Some(job) = jobs.get_mut(&id) else {
            warn!("Job {} vanished before completion", id);
            return;
        };
        job.finished_at = Some(Instant::now());
        match outcome {
            Ok(course_id) => {
                job.state = JobState::Completed;
                job.course_id = Some(course_id);
            }
            Err(e) => {
                error!("Job {} failed: {}", id, e);
                job.state = JobState::Failed;
                job.error = Some(e.to_string());
            }
        }
    });

    (StatusCode::ACCEPTED, Json(job)).into_response()
}

async fn job_status(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let mut jobs = lock_jobs(&state.jobs);
    prune_jobs(&mut jobs, Instant::now());
    match jobs.get(&id) {
        Some(job) => Json(job.clone()).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("Job not found: {}", id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GenerationSettings, Prompts};
    use crate::error::Result;
    use crate::library::tests::sample_course;
    use crate::library::MemoryCourseLibrary;
    use crate::pipeline::{StatusAnnouncer, StepStatus};
    use crate::service::GenerationService;
    use async_trait::async_trait;
    use axum::body::to_bytes;
    use std::time::Duration;

    struct Scripted;

    #[async_trait]
    impl GenerationService for Scripted {
        async fn analyze_document(&self, _: &DocumentSource, _: &str) -> Result<String> {
            Ok(r#"{"title":"Optics","chapters":[{"title":"Light","topics":[{"title":"Waves","summaryScript":"Light is a wave."}]}]}"#.to_string())
        }

        async fn synthesize_speech(&self, _: &str, _: &str) -> Result<Vec<u8>> {
            Ok(vec![0; 4_800])
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn state(with_pipeline: bool) -> Arc<AppState> {
        let pipeline = with_pipeline.then(|| {
            let settings = GenerationSettings {
                refine_pause_ms: 0,
                topic_pause_ms: 0,
                ..Default::default()
            };
            Arc::new(CoursePipeline::with_components(
                settings,
                Prompts::default(),
                Arc::new(Scripted),
                "Zephyr",
                StatusAnnouncer::disabled(),
            ))
        });
        Arc::new(AppState {
            library: Arc::new(MemoryCourseLibrary::new()),
            pipeline,
            jobs: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_course_routes() {
        let state = state(false);
        state.library.save(&sample_course("c1", "Anatomy")).await.unwrap();

        let listed = body_json(list_courses(State(state.clone())).await).await;
        assert_eq!(listed["total"], 1);
        assert_eq!(listed["courses"][0]["title"], "Anatomy");

        let missing = get_course(State(state.clone()), Path("nope".into())).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let deleted = delete_course(State(state.clone()), Path("c1".into())).await;
        assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_topic_audio_is_wav() {
        let state = state(false);
        state.library.save(&sample_course("c1", "Anatomy")).await.unwrap();

        let voiced = topic_audio(State(state.clone()), Path(("c1".into(), 0, 0))).await;
        assert_eq!(voiced.status(), StatusCode::OK);
        assert_eq!(voiced.headers()[header::CONTENT_TYPE], "audio/wav");
        let bytes = to_bytes(voiced.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..4], b"RIFF");

        let text_only = topic_audio(State(state), Path(("c1".into(), 0, 1))).await;
        assert_eq!(text_only.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_generate_without_pipeline() {
        let request = GenerateRequest {
            path: None,
            name: Some("notes.txt".into()),
            data: Some(general_purpose::STANDARD.encode("notes")),
            mime_type: None,
        };
        let response = generate(State(state(false)), Json(request)).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_generate_job_completes() {
        let state = state(true);
        let request = GenerateRequest {
            path: None,
            name: Some("optics.txt".into()),
            data: Some(general_purpose::STANDARD.encode("Light and waves")),
            mime_type: None,
        };

        let accepted = generate(State(state.clone()), Json(request)).await;
        assert_eq!(accepted.status(), StatusCode::ACCEPTED);
        let id = body_json(accepted).await["id"].as_str().unwrap().to_string();

        let mut job = None;
        for _ in 0..200 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let current = lock_jobs(&state.jobs).get(&id).cloned().unwrap();
            if current.state != JobState::Running {
                job = Some(current);
                break;
            }
        }

        let job = job.expect("job finished");
        assert_eq!(job.state, JobState::Completed);
        assert!(job.finished_at.is_some());
        assert!(job.steps.iter().all(|s| s.status == StepStatus::Completed));

        let course_id = job.course_id.unwrap();
        let course = state.library.get(&course_id).await.unwrap().unwrap();
        assert_eq!(course.title, "Optics");
    }

    #[test]
    fn test_finished_jobs_expire() {
        let job = |id: &str, finished_at: Option<Instant>| Job {
            id: id.into(),
            document: "notes.txt".into(),
            state: if finished_at.is_some() { JobState::Completed } else { JobState::Running },
            steps: Vec::new(),
            course_id: None,
            error: None,
            finished_at,
        };
        let finished = Instant::now();
        let mut jobs = HashMap::new();
        jobs.insert("running".to_string(), job("running", None));
        jobs.insert("done".to_string(), job("done", Some(finished)));

        prune_jobs(&mut jobs, finished + Duration::from_secs(60));
        assert_eq!(jobs.len(), 2);

        prune_jobs(&mut jobs, finished + JOB_RETENTION + Duration::from_secs(1));
        assert_eq!(jobs.len(), 1);
        assert!(jobs.contains_key("running"));
    }

    #[test]
    fn test_request_needs_a_document() {
        let request = GenerateRequest {
            path: None,
            name: Some("x.pdf".into()),
            data: None,
            mime_type: None,
        };
        assert!(matches!(
            request.into_document(),
            Err(BasarError::InvalidInput(_))
        ));
    }
}
