use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Multipart, Path, Query, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::service::{ImmediateResult, StatusReport, SubmitAccepted, SubmitRequest};
use crate::task::{GenerationTask, TaskStatus, TaskStore};

#[derive(Clone, Debug)]
pub struct DevServiceConfig {
    pub port: u16,
    pub starting_credits: u32,
    pub polls_to_complete: u32,
    pub cost: u32,
    pub unavailable_message: Option<String>,
    pub public_base_url: Option<String>,
    /// JSON file the job table is snapshotted to and restored from.
    pub store_path: Option<PathBuf>,
    /// How many jobs and how many uploads are kept before the oldest go.
    pub retain: usize,
}

impl Default for DevServiceConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            starting_credits: 10,
            polls_to_complete: 3,
            cost: 1,
            unavailable_message: None,
            public_base_url: None,
            store_path: None,
            retain: 256,
        }
    }
}

pub struct DevState {
    pub config: DevServiceConfig,
    pub base_url: String,
    pub jobs: TaskStore,
    credits: Mutex<HashMap<String, u32>>,
    uploads: Mutex<VecDeque<(String, Vec<u8>)>>,
    upload_seq: AtomicUsize,
}

impl DevState {
    pub fn new(config: DevServiceConfig, base_url: String) -> Self {
        let jobs = match &config.store_path {
            Some(path) => TaskStore::with_snapshot(path.clone(), config.retain),
            None => TaskStore::new(config.retain),
        };
        Self {
            config,
            base_url,
            jobs,
            credits: Mutex::new(HashMap::new()),
            uploads: Mutex::new(VecDeque::new()),
            upload_seq: AtomicUsize::new(1),
        }
    }

    fn keep_upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<String, ApiError> {
        let mut uploads = self
            .uploads
            .lock()
            .map_err(|_| ApiError::Internal("upload table lock error".to_string()))?;
        let key = format!("{}-{}", self.upload_seq.fetch_add(1, Ordering::SeqCst), file_name);
        uploads.push_back((key.clone(), bytes));
        while uploads.len() > self.config.retain.max(1) {
            uploads.pop_front();
        }
        Ok(key)
    }

    fn upload(&self, key: &str) -> Option<Vec<u8>> {
        let uploads = self.uploads.lock().ok()?;
        uploads
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, bytes)| bytes.clone())
    }

    pub fn balance(&self, token: &str) -> u32 {
        self.credits
            .lock()
            .ok()
            .and_then(|map| map.get(token).copied())
            .unwrap_or(self.config.starting_credits)
    }

    fn charge(&self, token: &str) -> Result<(), ApiError> {
        let mut map = self
            .credits
            .lock()
            .map_err(|_| ApiError::Internal("credit ledger lock error".to_string()))?;
        let balance = map
            .entry(token.to_string())
            .or_insert(self.config.starting_credits);
        if *balance < self.config.cost {
            return Err(ApiError::InsufficientCredits {
                required: self.config.cost,
                available: *balance,
            });
        }
        *balance -= self.config.cost;
        Ok(())
    }

    fn result_url(&self, task_id: &str) -> String {
        format!("{}/results/{}.png", self.base_url, task_id)
    }

    /// Next status for a job given how many times it has been polled.
    fn scripted_report(&self, task: &GenerationTask, polls: u32) -> StatusReport {
        let prompt = task.prompt.as_str();
        let status = |status| StatusReport {
            status,
            result_urls: Vec::new(),
            error: None,
        };
        if prompt.contains("[stall]") {
            return status(TaskStatus::Processing);
        }
        if polls < self.config.polls_to_complete {
            return status(if polls <= 1 {
                TaskStatus::Pending
            } else {
                TaskStatus::Processing
            });
        }
        if prompt.contains("[fail]") {
            return StatusReport {
                status: TaskStatus::Failed,
                result_urls: Vec::new(),
                error: Some("content policy violation".to_string()),
            };
        }
        if prompt.contains("[empty]") {
            return status(TaskStatus::Completed);
        }
        StatusReport {
            status: TaskStatus::Completed,
            result_urls: vec![self.result_url(&task.task_id)],
            error: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Insufficient credits")]
    InsufficientCredits { required: u32, available: u32 },
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, body) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, json!({"error": message})),
            ApiError::InsufficientCredits {
                required,
                available,
            } => (
                StatusCode::PAYMENT_REQUIRED,
                json!({"error": message, "required": required, "available": available}),
            ),
            ApiError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, json!({"message": message})),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, json!({"error": message})),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, json!({"error": message})),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, json!({"error": message})),
        };
        (status, Json(body)).into_response()
    }
}

type AppState = State<Arc<DevState>>;

/// 1x1 transparent PNG.
const PLACEHOLDER_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4,
    0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE,
    0x42, 0x60, 0x82,
];

fn bearer(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .ok_or(ApiError::Unauthorized)
}

/// Checks shared by both generation endpoints, in the order the client expects.
fn admit(state: &DevState, headers: &HeaderMap, req: &SubmitRequest) -> Result<String, ApiError> {
    let token = bearer(headers)?;
    if let Some(message) = &state.config.unavailable_message {
        return Err(ApiError::Unavailable(message.clone()));
    }
    if req.prompt.trim().is_empty() && req.image_urls.is_empty() {
        return Err(ApiError::BadRequest("prompt or image required".to_string()));
    }
    state.charge(&token)?;
    Ok(token)
}

#[derive(Debug, Deserialize, Default)]
pub struct TasksQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct StatusQuery {
    #[serde(rename = "taskId")]
    pub task_id: Option<String>,
}

pub async fn handle_health() -> Json<Value> {
    Json(json!({"status": "ok", "version": env!("CARGO_PKG_VERSION")}))
}

pub async fn handle_tasks(State(state): AppState, Query(query): Query<TasksQuery>) -> Json<Value> {
    let limit = query.limit.unwrap_or(10);
    Json(json!({"tasks": state.jobs.list(limit)}))
}

pub async fn handle_submit(
    State(state): AppState,
    headers: HeaderMap,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<SubmitAccepted>, ApiError> {
    admit(&state, &headers, &req)?;
    let task = state.jobs.create(&req);
    tracing::info!(task_id = %task.task_id, "job accepted");
    Ok(Json(SubmitAccepted {
        task_id: task.task_id,
    }))
}

pub async fn handle_status(
    State(state): AppState,
    Query(query): Query<StatusQuery>,
) -> Result<Json<StatusReport>, ApiError> {
    let task_id = query
        .task_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("taskId required".to_string()))?;
    let (task, polls) = state
        .jobs
        .record_poll(&task_id)
        .ok_or_else(|| ApiError::NotFound(format!("task not found: {}", task_id)))?;
    if task.status.is_terminal() {
        return Ok(Json(task.to_report()));
    }
    let report = state.scripted_report(&task, polls);
    state.jobs.update(&task_id, &report);
    tracing::debug!(task_id = %task_id, polls, status = ?report.status, "job polled");
    Ok(Json(report))
}

pub async fn handle_generate_image(
    State(state): AppState,
    headers: HeaderMap,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<ImmediateResult>, ApiError> {
    admit(&state, &headers, &req)?;
    let task = state.jobs.create(&req);
    let url = state.result_url(&task.task_id);
    state.jobs.update(
        &task.task_id,
        &StatusReport {
            status: TaskStatus::Completed,
            result_urls: vec![url.clone()],
            error: None,
        },
    );
    Ok(Json(ImmediateResult {
        image_url: url,
        description: Some(format!("Generated from: {}", req.prompt.trim())),
    }))
}

pub async fn handle_upload(
    State(state): AppState,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    bearer(&headers)?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(err.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = sanitize_file_name(field.file_name().unwrap_or("upload.bin"));
        let bytes = field
            .bytes()
            .await
            .map_err(|err| ApiError::BadRequest(err.to_string()))?;
        if bytes.is_empty() {
            return Err(ApiError::BadRequest("empty file".to_string()));
        }
        let key = state.keep_upload(&file_name, bytes.to_vec())?;
        tracing::info!(key = %key, "image uploaded");
        return Ok(Json(json!({"imageUrl": format!("{}/uploads/{}", state.base_url, key)})));
    }
    Err(ApiError::BadRequest("file field required".to_string()))
}

pub async fn handle_get_upload(
    State(state): AppState,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let bytes = state
        .upload(&name)
        .ok_or_else(|| ApiError::NotFound(format!("upload not found: {}", name)))?;
    let content_type = HeaderValue::from_static(content_type_for(&name));
    Ok(([(CONTENT_TYPE, content_type)], bytes).into_response())
}

/// Serves a placeholder image for every completed job.
pub async fn handle_get_result(
    State(state): AppState,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let task_id = name.strip_suffix(".png").unwrap_or(&name);
    let ready = state
        .jobs
        .get(task_id)
        .map(|task| task.status == TaskStatus::Completed && !task.result_urls.is_empty())
        .unwrap_or(false);
    if !ready {
        return Err(ApiError::NotFound(format!("result not found: {}", name)));
    }
    let content_type = HeaderValue::from_static("image/png");
    Ok(([(CONTENT_TYPE, content_type)], PLACEHOLDER_PNG).into_response())
}

pub async fn handle_credits(State(state): AppState, headers: HeaderMap) -> Result<Json<Value>, ApiError> {
    let token = bearer(&headers)?;
    Ok(Json(json!({"credits": state.balance(&token)})))
}

fn sanitize_file_name(raw: &str) -> String {
    let cleaned: String = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(raw)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '_' { c } else { '-' })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "upload.bin".to_string()
    } else {
        cleaned
    }
}

fn content_type_for(name: &str) -> &'static str {
    let lowered = name.to_lowercase();
    if lowered.ends_with(".png") {
        "image/png"
    } else if lowered.ends_with(".jpg") || lowered.ends_with(".jpeg") {
        "image/jpeg"
    } else if lowered.ends_with(".webp") {
        "image/webp"
    } else {
        "application/octet-stream"
    }
}
