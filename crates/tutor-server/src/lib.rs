pub mod collector;
pub mod config;

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};
use tutor_ai::{
    BackendError, ChatCompletionsClient, DEFAULT_SYSTEM_PROMPT, HintError, HintReply, HintRequest,
    HintService, HintState, Submission, TextCompletion, TutorRegistry, lock_session,
};
use tutor_core::{FaceVerdict, GradeError, MeshSnapshot, SubmissionOutcome, SubmissionRecord};
use tutor_mesh::{ConvertError, MeshObject, QuestionDocument, Workspace};

pub use collector::{CollectorError, HttpCollector, RecordSink, spawn_delivery};
pub use config::{CONFIG_ENV, ConfigError, ServerConfig};

const UNKNOWN_QUESTION: &str = "current exercise";

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Collector(#[from] CollectorError),
}

/// Everything the handlers share. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    config: Arc<ServerConfig>,
    workspace: Workspace,
    hints: Arc<HintService>,
    tutors: Arc<TutorRegistry>,
    collector: Option<Arc<dyn RecordSink>>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        backend: Arc<dyn TextCompletion>,
        collector: Option<Arc<dyn RecordSink>>,
    ) -> Self {
        let hints = Arc::new(HintService::new(
            DEFAULT_SYSTEM_PROMPT,
            backend,
            config.max_concurrent_calls,
            config.llm.timeout(),
        ));
        let tutors = Arc::new(TutorRegistry::new(
            Arc::clone(&hints),
            config.hints_per_session,
            config.max_turns_kept,
        ));
        Self {
            workspace: Workspace::new(&config.data_dir),
            config: Arc::new(config),
            hints,
            tutors,
            collector,
        }
    }

    /// Builds the chat-completions client and, when configured, the collector.
    pub fn from_config(config: ServerConfig) -> Result<Self, StartupError> {
        let backend = ChatCompletionsClient::new(config.llm.clone())?;
        let collector = match &config.collector_url {
            Some(url) => Some(Arc::new(HttpCollector::new(url.clone())?) as Arc<dyn RecordSink>),
            None => None,
        };
        Ok(Self::new(config, Arc::new(backend), collector))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/convert", post(convert))
        .route("/llm/hint", post(llm_hint))
        .route("/tutor/{id}/actions", post(record_actions))
        .route("/tutor/{id}/submit", post(submit))
        .route("/tutor/{id}/hint", post(request_hint).get(hint_state))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

#[derive(Debug, Serialize, Deserialize)]
struct HealthResponse {
    status: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ConvertResponse {
    status: String,
    job_id: String,
    json_path: String,
    fbx_path: String,
}

#[derive(Debug, Deserialize)]
struct ActionsRequest {
    #[serde(default = "default_action_count")]
    count: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ActionsResponse {
    actions: u32,
}

#[derive(Debug, Deserialize)]
struct SubmitRequest {
    target: Vec<MeshObject>,
    user: Vec<MeshObject>,
    tolerance: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SubmitResponse {
    passed: bool,
    matched: Vec<bool>,
    faces: Vec<FaceReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    record: Option<SubmissionRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FaceReport {
    object: String,
    face: usize,
    verdict: FaceVerdict,
}

#[derive(Debug, Deserialize)]
struct TutorHintRequest {
    target: Vec<MeshObject>,
    user: Vec<MeshObject>,
    tolerance: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TutorHintResponse {
    hint_state: HintState,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stderr: Option<String>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
    output: Option<(String, String)>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            output: None,
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    fn conversion(err: ConvertError) -> Self {
        if matches!(err, ConvertError::InvalidDocument(_)) {
            return Self::bad_request(err.to_string());
        }

        let message = err.to_string();
        let output = match err {
            ConvertError::ProcessFailed { stdout, stderr, .. } => (stdout, stderr),
            _ => (String::new(), String::new()),
        };
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message,
            output: Some(output),
        }
    }
}

impl From<GradeError> for ApiError {
    fn from(err: GradeError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl From<HintError> for ApiError {
    fn from(err: HintError) -> Self {
        match err {
            HintError::MissingSessionId | HintError::MissingPrompt => {
                Self::bad_request(err.to_string())
            }
            HintError::NoHintsRemaining => Self::conflict(err.to_string()),
            HintError::Backend(err) => Self::internal(format!("hint backend failed: {err}")),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (stdout, stderr) = match self.output {
            Some((stdout, stderr)) => (Some(stdout), Some(stderr)),
            None => (None, None),
        };
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
                stdout,
                stderr,
            }),
        )
            .into_response()
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn convert(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ConvertResponse>, ApiError> {
    let document: QuestionDocument = parse_json(&body)?;
    let job = state
        .workspace
        .convert(&state.config.converter, &document)
        .await
        .map_err(|err| {
            error!(question = %document.question_name, %err, "conversion failed");
            ApiError::conversion(err)
        })?;

    info!(job_id = %job.job_id, model = %job.model_path.display(), "conversion finished");
    Ok(Json(ConvertResponse {
        status: "success".to_string(),
        job_id: job.job_id,
        json_path: job.json_path.display().to_string(),
        fbx_path: job.model_path.display().to_string(),
    }))
}

async fn llm_hint(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<HintReply>, ApiError> {
    let request: HintRequest = parse_json(&body)?;
    let reply = state.hints.ask(request).await?;
    Ok(Json(reply))
}

async fn record_actions(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<ActionsResponse>, ApiError> {
    let request = if body.is_empty() {
        ActionsRequest {
            count: default_action_count(),
        }
    } else {
        parse_json::<ActionsRequest>(&body)?
    };

    let tutor = state.tutors.get_or_create(&id);
    let actions = lock_session(&tutor).record_actions(request.count);
    Ok(Json(ActionsResponse { actions }))
}

async fn submit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<SubmitResponse>, ApiError> {
    let request: SubmitRequest = parse_json(&body)?;
    let info = state
        .workspace
        .read_info()
        .await
        .map_err(|err| ApiError::conflict(format!("no question has been loaded: {err}")))?;

    let targets = snapshots(&request.target);
    let user = snapshots(&request.user);
    let tutor = state.tutors.get_or_create(&id);
    let outcome = lock_session(&tutor).submit(Submission {
        question_name: &info.question_name,
        baseline: info.baseline(),
        targets: &targets,
        user: &user,
        tolerance: request.tolerance.unwrap_or(state.config.tolerance),
    })?;

    if outcome.passed()
        && let Some(sink) = &state.collector
    {
        spawn_delivery(Arc::clone(sink), outcome.record.clone());
    }

    Ok(Json(submit_response(&request.target, outcome)))
}

async fn request_hint(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<TutorHintResponse>), ApiError> {
    let request: TutorHintRequest = parse_json(&body)?;
    let question_name = match state.workspace.read_info().await {
        Ok(info) => info.question_name,
        Err(err) => {
            debug!(%err, "hint requested without question info");
            UNKNOWN_QUESTION.to_string()
        }
    };

    let tutor = state.tutors.get_or_create(&id);
    let hint_state = lock_session(&tutor).request_hint(
        &question_name,
        snapshots(&request.target),
        snapshots(&request.user),
        request.tolerance.unwrap_or(state.config.tolerance),
    )?;
    Ok((StatusCode::ACCEPTED, Json(TutorHintResponse { hint_state })))
}

async fn hint_state(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<HintState>, ApiError> {
    let tutor = state
        .tutors
        .get(&id)
        .ok_or_else(|| ApiError::not_found(format!("unknown tutor session: {id}")))?;
    let hint_state = lock_session(&tutor).hint_state();
    Ok(Json(hint_state))
}

fn submit_response(target: &[MeshObject], outcome: SubmissionOutcome) -> SubmitResponse {
    let mut matched = Vec::new();
    let mut faces = Vec::new();
    for (index, grade) in outcome.report.objects.iter().enumerate() {
        let object = target
            .get(index)
            .map(|object| object.name.clone())
            .unwrap_or_default();
        matched.extend_from_slice(grade.matches.flags());
        faces.extend(
            grade
                .verdicts
                .iter()
                .enumerate()
                .map(|(face, verdict)| FaceReport {
                    object: object.clone(),
                    face,
                    verdict: *verdict,
                }),
        );
    }

    let passed = outcome.passed();
    SubmitResponse {
        passed,
        matched,
        faces,
        score: passed.then_some(outcome.record.score),
        record: passed.then_some(outcome.record),
    }
}

fn snapshots(objects: &[MeshObject]) -> Vec<MeshSnapshot> {
    objects.iter().map(MeshObject::to_snapshot).collect()
}

fn default_action_count() -> u32 {
    1
}

fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    if body.is_empty() {
        return Err(ApiError::bad_request("request body is required"));
    }

    serde_json::from_slice(body)
        .map_err(|err| ApiError::bad_request(format!("invalid JSON body: {err}")))
}
