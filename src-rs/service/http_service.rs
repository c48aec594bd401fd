use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::types::{
    GenerationError, GenerationService, ImageUploader, ImmediateResult, StatusReport, SubmitAccepted,
    SubmitRequest,
};
use crate::config::ClientConfig;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskIdBody {
    task_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadBody {
    image_url: Option<String>,
}

#[derive(Deserialize)]
struct CreditsBody {
    credits: u32,
}

/// reqwest client for the generation service endpoints.
#[derive(Clone)]
pub struct HttpGenerationService {
    cfg: ClientConfig,
    client: Client,
}

impl HttpGenerationService {
    pub fn new(cfg: ClientConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(cfg.request_timeout)
            .build()
            .map_err(|err| GenerationError::Transport(err.to_string()))?;
        Ok(Self { cfg, client })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.cfg
    }

    pub async fn fetch_credits(&self, token: Option<&str>) -> Result<u32, GenerationError> {
        let resp = self
            .client
            .get(self.cfg.endpoint(&self.cfg.credits_path))
            .headers(auth_headers(token))
            .send()
            .await?;
        let body: CreditsBody = read_json(map_error_status(resp).await?).await?;
        Ok(body.credits)
    }
}

#[async_trait]
impl GenerationService for HttpGenerationService {
    async fn submit(
        &self,
        token: Option<&str>,
        request: &SubmitRequest,
    ) -> Result<SubmitAccepted, GenerationError> {
        let resp = self
            .client
            .post(self.cfg.endpoint(&self.cfg.submit_path))
            .headers(auth_headers(token))
            .json(request)
            .send()
            .await?;
        let body: TaskIdBody = read_json(map_error_status(resp).await?).await?;
        match body.task_id {
            Some(task_id) if !task_id.is_empty() => Ok(SubmitAccepted { task_id }),
            _ => Err(GenerationError::MissingTaskId),
        }
    }

    async fn status(&self, token: Option<&str>, task_id: &str) -> Result<StatusReport, GenerationError> {
        let resp = self
            .client
            .get(self.cfg.endpoint(&self.cfg.status_path))
            .headers(auth_headers(token))
            .query(&[("taskId", task_id)])
            .send()
            .await?;
        read_json(map_error_status(resp).await?).await
    }

    async fn generate_now(
        &self,
        token: Option<&str>,
        request: &SubmitRequest,
    ) -> Result<ImmediateResult, GenerationError> {
        let resp = self
            .client
            .post(self.cfg.endpoint(&self.cfg.generate_path))
            .headers(auth_headers(token))
            .json(request)
            .send()
            .await?;
        read_json(map_error_status(resp).await?).await
    }
}

#[async_trait]
impl ImageUploader for HttpGenerationService {
    async fn upload(
        &self,
        token: Option<&str>,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, GenerationError> {
        let form = Form::new().part("file", Part::bytes(bytes).file_name(file_name.to_string()));
        let resp = self
            .client
            .post(self.cfg.endpoint(&self.cfg.upload_path))
            .headers(auth_headers(token))
            .multipart(form)
            .send()
            .await?;
        let resp = map_error_status(resp).await.map_err(|err| match err {
            GenerationError::Api { message, .. } => {
                GenerationError::Upload(message.unwrap_or_else(|| "server rejected the file".to_string()))
            }
            other => other,
        })?;
        let body: UploadBody = read_json(resp).await?;
        body.image_url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| GenerationError::Upload("no image URL returned".to_string()))
    }
}

fn auth_headers(token: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(token) = token {
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
            headers.insert(AUTHORIZATION, value);
        }
    }
    headers
}

async fn map_error_status(resp: Response) -> Result<Response, GenerationError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body: Value = resp.json().await.unwrap_or(Value::Null);
    Err(classify_status(status, &body))
}

fn classify_status(status: StatusCode, body: &Value) -> GenerationError {
    let field = |name: &str| body.get(name).and_then(|v| v.as_str()).map(str::to_string);
    let count = |name: &str| {
        body.get(name)
            .and_then(|v| v.as_u64())
            .map(|n| n.min(u64::from(u32::MAX)) as u32)
            .unwrap_or(0)
    };
    match status {
        StatusCode::UNAUTHORIZED => GenerationError::Unauthorized,
        StatusCode::PAYMENT_REQUIRED => GenerationError::InsufficientCredits {
            required: count("required"),
            available: count("available"),
        },
        StatusCode::SERVICE_UNAVAILABLE => GenerationError::Unavailable(field("message")),
        _ => GenerationError::Api {
            status: status.as_u16(),
            message: field("error"),
        },
    }
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, GenerationError> {
    let text = resp.text().await?;
    serde_json::from_str(&text).map_err(|err| GenerationError::Parse(err.to_string()))
}
