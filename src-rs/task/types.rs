use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::service::{StatusReport, SubmitRequest};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// Client-side view of one remote generation job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationTask {
    pub task_id: String,
    pub status: TaskStatus,
    pub result_urls: Vec<String>,
    pub error: Option<String>,
    pub prompt: String,
    pub image_urls: Vec<String>,
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl GenerationTask {
    pub fn new(task_id: &str, request: &SubmitRequest) -> Self {
        Self {
            task_id: task_id.to_string(),
            status: TaskStatus::Pending,
            result_urls: Vec::new(),
            error: None,
            prompt: request.prompt.clone(),
            image_urls: request.image_urls.clone(),
            metadata: request.metadata.clone(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Folds a status report into the record and returns whether the status moved.
    /// Terminal states are sticky; reports after completion are ignored.
    pub fn apply(&mut self, report: &StatusReport) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        let moved = self.status != report.status;
        self.status = report.status;
        match report.status {
            TaskStatus::Completed => self.result_urls = report.result_urls.clone(),
            TaskStatus::Failed => self.error = report.error.clone(),
            _ => {}
        }
        if self.status.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        moved
    }

    pub fn to_report(&self) -> StatusReport {
        StatusReport {
            status: self.status,
            result_urls: self.result_urls.clone(),
            error: self.error.clone(),
        }
    }
}
