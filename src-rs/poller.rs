use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::PollConfig;
use crate::service::{GenerationError, GenerationService, Session, StatusReport, SubmitRequest};
use crate::result::{GeneratedImage, GenerationOutcome, TaskRun};
use crate::task::{GenerationTask, TaskStatus};

/// What a single status check means for the loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Attempt {
    InProgress(TaskStatus),
    /// The check itself failed. The attempt is consumed, not escalated.
    Transient(GenerationError),
    Terminal(GenerationOutcome),
}

pub fn classify_attempt(task_id: &str, result: Result<StatusReport, GenerationError>) -> Attempt {
    let report = match result {
        Ok(report) => report,
        Err(err) => return Attempt::Transient(err),
    };
    match report.status {
        TaskStatus::Pending | TaskStatus::Processing => Attempt::InProgress(report.status),
        TaskStatus::Failed => Attempt::Terminal(GenerationOutcome::Failed(GenerationError::JobFailed(
            report.error.filter(|msg| !msg.trim().is_empty()),
        ))),
        TaskStatus::Completed => match report.result_urls.first() {
            Some(url) => Attempt::Terminal(GenerationOutcome::Success(GeneratedImage {
                url: url.clone(),
                result_urls: report.result_urls.clone(),
                task_id: Some(task_id.to_string()),
                description: None,
            })),
            None => Attempt::Terminal(GenerationOutcome::Failed(GenerationError::EmptyResult)),
        },
    }
}

/// Submits a generation job and polls it to a terminal state.
pub struct TaskPoller {
    service: Arc<dyn GenerationService>,
    session: Arc<dyn Session>,
    config: PollConfig,
}

impl TaskPoller {
    pub fn new(service: Arc<dyn GenerationService>, session: Arc<dyn Session>, config: PollConfig) -> Self {
        Self {
            service,
            session,
            config,
        }
    }

    pub fn config(&self) -> PollConfig {
        self.config
    }

    pub async fn run(&self, request: SubmitRequest, cancel: &CancellationToken) -> TaskRun {
        self.run_observed(request, cancel, &|_| {}).await
    }

    /// Like `run`, but hands the task record to `observe` once it is accepted
    /// and again after every status report that changes it.
    pub async fn run_observed(
        &self,
        request: SubmitRequest,
        cancel: &CancellationToken,
        observe: &(dyn Fn(&GenerationTask) + Send + Sync),
    ) -> TaskRun {
        let token = self.session.auth_token();

        let submitted = tokio::select! {
            biased;
            _ = cancel.cancelled() => return cancelled(None, 0),
            result = self.service.submit(token.as_deref(), &request) => result,
        };
        let accepted = match submitted {
            Ok(accepted) => accepted,
            Err(err) => {
                tracing::warn!(%err, "generation submit rejected");
                return TaskRun {
                    outcome: GenerationOutcome::Failed(err),
                    task: None,
                    attempts: 0,
                };
            }
        };

        let task_id = accepted.task_id;
        let mut task = GenerationTask::new(&task_id, &request);
        observe(&task);
        tracing::info!(
            task_id = %task_id,
            interval_ms = self.config.poll_interval.as_millis() as u64,
            max_attempts = self.config.max_attempts,
            "generation submitted"
        );

        let mut attempts = 0;
        while attempts < self.config.max_attempts {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return cancelled(Some(task), attempts),
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            attempts += 1;
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return cancelled(Some(task), attempts),
                result = self.service.status(token.as_deref(), &task_id) => result,
            };
            if let Ok(report) = &result {
                if task.apply(report) {
                    observe(&task);
                }
            }

            match classify_attempt(&task_id, result) {
                Attempt::InProgress(status) => {
                    tracing::debug!(task_id = %task_id, attempt = attempts, ?status, "task in progress");
                }
                Attempt::Transient(err) => {
                    tracing::warn!(task_id = %task_id, attempt = attempts, %err, "status check failed");
                }
                Attempt::Terminal(outcome) => {
                    self.finish(&task_id, &outcome).await;
                    return TaskRun {
                        outcome,
                        task: Some(task),
                        attempts,
                    };
                }
            }
        }

        tracing::warn!(task_id = %task_id, attempts, "generation timed out");
        TaskRun {
            outcome: GenerationOutcome::TimedOut {
                task_id,
                attempts,
            },
            task: Some(task),
            attempts,
        }
    }

    /// Single-request generation for tools whose endpoint answers with the image.
    pub async fn run_immediate(&self, request: SubmitRequest, cancel: &CancellationToken) -> TaskRun {
        let token = self.session.auth_token();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return cancelled(None, 0),
            result = self.service.generate_now(token.as_deref(), &request) => result,
        };
        let outcome = match result {
            Ok(done) if !done.image_url.is_empty() => GenerationOutcome::Success(GeneratedImage {
                url: done.image_url.clone(),
                result_urls: vec![done.image_url],
                task_id: None,
                description: done.description,
            }),
            Ok(_) => GenerationOutcome::Failed(GenerationError::EmptyResult),
            Err(err) => GenerationOutcome::Failed(err),
        };
        self.finish("immediate", &outcome).await;
        TaskRun {
            outcome,
            task: None,
            attempts: 0,
        }
    }

    async fn finish(&self, task_id: &str, outcome: &GenerationOutcome) {
        match outcome {
            GenerationOutcome::Success(image) => {
                tracing::info!(task_id, url = %image.url, "generation completed");
                self.session.refresh_credits().await;
            }
            GenerationOutcome::Failed(err) => {
                tracing::warn!(task_id, %err, "generation failed");
            }
            _ => {}
        }
    }
}

fn cancelled(task: Option<GenerationTask>, attempts: u32) -> TaskRun {
    let task_id = task.as_ref().map(|task| task.task_id.clone());
    tracing::info!(task_id = ?task_id, attempts, "generation abandoned");
    TaskRun {
        outcome: GenerationOutcome::Cancelled { task_id },
        task,
        attempts,
    }
}
