use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::task::TaskStatus;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAccepted {
    pub task_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub result_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImmediateResult {
    pub image_url: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Every failure a generation can end in. `Display` is the message shown to
/// the user.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("Please sign in to generate images")]
    Unauthorized,

    #[error("Insufficient credits: {required} required, {available} available")]
    InsufficientCredits { required: u32, available: u32 },

    #[error("{}", .0.as_deref().unwrap_or("Service temporarily unavailable. Please try again later."))]
    Unavailable(Option<String>),

    #[error("{}", .message.as_deref().unwrap_or("Failed to generate image"))]
    Api { status: u16, message: Option<String> },

    #[error("No task ID received")]
    MissingTaskId,

    #[error("{}", .0.as_deref().unwrap_or("Generation failed"))]
    JobFailed(Option<String>),

    #[error("Task completed but no result URL found")]
    EmptyResult,

    #[error("Network error. Please check your connection and try again.")]
    Connectivity,

    #[error("Request timed out. Please try again.")]
    RequestTimeout,

    #[error("Failed to generate image: {0}")]
    Transport(String),

    #[error("Unexpected response from server: {0}")]
    Parse(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("{0}")]
    MissingInput(&'static str),

    #[error("A generation is already in progress")]
    Busy,

    #[error("{0} is not supported by this service")]
    Unsupported(&'static str),
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GenerationError::RequestTimeout
        } else if err.is_connect() {
            GenerationError::Connectivity
        } else if err.is_decode() {
            GenerationError::Parse(err.to_string())
        } else {
            GenerationError::Transport(err.to_string())
        }
    }
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn submit(
        &self,
        token: Option<&str>,
        request: &SubmitRequest,
    ) -> Result<SubmitAccepted, GenerationError>;

    async fn status(&self, token: Option<&str>, task_id: &str) -> Result<StatusReport, GenerationError>;

    async fn generate_now(
        &self,
        _token: Option<&str>,
        _request: &SubmitRequest,
    ) -> Result<ImmediateResult, GenerationError> {
        Err(GenerationError::Unsupported("immediate generation"))
    }
}

#[async_trait]
pub trait ImageUploader: Send + Sync {
    /// Stores the image and returns a publicly fetchable URL.
    async fn upload(
        &self,
        token: Option<&str>,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, GenerationError>;
}
