use serde::{Deserialize, Serialize};

use crate::service::GenerationError;
use crate::task::GenerationTask;

pub const TIMEOUT_MESSAGE: &str =
    "Generation is taking longer than expected. Please check back later.";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedImage {
    /// First entry of `result_urls`; the artifact to display.
    pub url: String,
    pub result_urls: Vec<String>,
    pub task_id: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GenerationOutcome {
    Success(GeneratedImage),
    Failed(GenerationError),
    TimedOut { task_id: String, attempts: u32 },
    Cancelled { task_id: Option<String> },
}

impl GenerationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, GenerationOutcome::Success(_))
    }

    pub fn image_url(&self) -> Option<&str> {
        match self {
            GenerationOutcome::Success(image) => Some(&image.url),
            _ => None,
        }
    }

    /// User-visible message for the non-success paths.
    pub fn message(&self) -> Option<String> {
        match self {
            GenerationOutcome::Success(_) | GenerationOutcome::Cancelled { .. } => None,
            GenerationOutcome::Failed(err) => Some(err.to_string()),
            GenerationOutcome::TimedOut { .. } => Some(TIMEOUT_MESSAGE.to_string()),
        }
    }
}

/// Result of one poller run.
#[derive(Clone, Debug)]
pub struct TaskRun {
    pub outcome: GenerationOutcome,
    pub task: Option<GenerationTask>,
    /// Status requests issued, including transient failures.
    pub attempts: u32,
}
