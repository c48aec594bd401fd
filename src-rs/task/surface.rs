use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use super::types::GenerationTask;
use crate::config::{GenerationMode, PollConfig, ToolSpec};
use crate::poller::TaskPoller;
use crate::result::{GenerationOutcome, TaskRun};
use crate::service::{GenerationError, GenerationService, ImageUploader, Session, SubmitRequest};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageSource {
    Url(String),
    Local { file_name: String, bytes: Vec<u8> },
}

#[derive(Clone, Debug, Default)]
pub struct ToolInput {
    pub prompt: String,
    pub images: Vec<ImageSource>,
    pub metadata: BTreeMap<String, String>,
    pub aspect_ratio: Option<String>,
}

/// What one tool page renders.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SurfaceState {
    pub is_generating: bool,
    pub generated_image: Option<String>,
    pub description: Option<String>,
    pub error: Option<String>,
    pub active_task: Option<GenerationTask>,
}

/// One tool page: tracks at most one in-flight generation.
pub struct ToolSurface {
    spec: ToolSpec,
    service: Arc<dyn GenerationService>,
    uploader: Option<Arc<dyn ImageUploader>>,
    session: Arc<dyn Session>,
    state: Mutex<SurfaceState>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl ToolSurface {
    pub fn new(spec: ToolSpec, service: Arc<dyn GenerationService>, session: Arc<dyn Session>) -> Self {
        Self {
            spec,
            service,
            uploader: None,
            session,
            state: Mutex::new(SurfaceState::default()),
            cancel: Mutex::new(None),
        }
    }

    pub fn with_uploader(mut self, uploader: Arc<dyn ImageUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    pub fn snapshot(&self) -> SurfaceState {
        self.state.lock().map(|state| state.clone()).unwrap_or_default()
    }

    pub async fn generate(&self, input: ToolInput) -> GenerationOutcome {
        if let Err(err) = self.preflight(&input) {
            return self.reject(err);
        }

        let cancel = match self.begin() {
            Some(cancel) => cancel,
            None => return GenerationOutcome::Failed(GenerationError::Busy),
        };

        let run = match self.resolve_images(input.images, &cancel).await {
            Ok(image_urls) => {
                let mut metadata = input.metadata;
                metadata
                    .entry("tool".to_string())
                    .or_insert_with(|| self.spec.slug.to_string());
                let request = SubmitRequest {
                    prompt: input.prompt.trim().to_string(),
                    image_urls,
                    metadata,
                    aspect_ratio: input.aspect_ratio,
                };
                self.execute(request, &cancel).await
            }
            Err(err) => TaskRun {
                outcome: GenerationOutcome::Failed(err),
                task: None,
                attempts: 0,
            },
        };

        self.complete(&cancel, &run);
        run.outcome
    }

    /// Stops tracking the in-flight task. The remote job keeps running and
    /// `active_task` keeps its last known record.
    pub fn abandon(&self) {
        if let Ok(mut slot) = self.cancel.lock() {
            if let Some(cancel) = slot.take() {
                cancel.cancel();
            }
        }
        self.with_state(|state| state.is_generating = false);
    }

    fn preflight(&self, input: &ToolInput) -> Result<(), GenerationError> {
        if self.session.auth_token().is_none() {
            return Err(GenerationError::Unauthorized);
        }
        self.spec
            .inputs
            .check(!input.images.is_empty(), !input.prompt.trim().is_empty())
            .map_err(GenerationError::MissingInput)?;
        if let Some(available) = self.session.cached_credits() {
            if available < self.spec.credit_cost {
                return Err(GenerationError::InsufficientCredits {
                    required: self.spec.credit_cost,
                    available,
                });
            }
        }
        Ok(())
    }

    /// Records a local rejection unless another run owns the surface.
    fn reject(&self, err: GenerationError) -> GenerationOutcome {
        let Ok(mut state) = self.state.lock() else {
            return GenerationOutcome::Failed(err);
        };
        if state.is_generating {
            return GenerationOutcome::Failed(GenerationError::Busy);
        }
        state.error = Some(err.to_string());
        GenerationOutcome::Failed(err)
    }

    fn begin(&self) -> Option<CancellationToken> {
        let mut state = self.state.lock().ok()?;
        if state.is_generating {
            return None;
        }
        let cancel = CancellationToken::new();
        let mut slot = self.cancel.lock().ok()?;
        *slot = Some(cancel.clone());
        state.is_generating = true;
        state.error = None;
        state.generated_image = None;
        state.description = None;
        state.active_task = None;
        Some(cancel)
    }

    async fn resolve_images(
        &self,
        images: Vec<ImageSource>,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, GenerationError> {
        let token = self.session.auth_token();
        let mut urls = Vec::with_capacity(images.len());
        for image in images {
            match image {
                ImageSource::Url(url) => urls.push(url),
                ImageSource::Local { file_name, bytes } => {
                    let uploader = self
                        .uploader
                        .as_ref()
                        .ok_or(GenerationError::Unsupported("image upload"))?;
                    if cancel.is_cancelled() {
                        break;
                    }
                    let url = uploader.upload(token.as_deref(), &file_name, bytes).await?;
                    tracing::debug!(file_name = %file_name, url = %url, "image uploaded");
                    urls.push(url);
                }
            }
        }
        Ok(urls)
    }

    async fn execute(&self, request: SubmitRequest, cancel: &CancellationToken) -> TaskRun {
        let config = match self.spec.mode {
            GenerationMode::Polled(config) => config,
            GenerationMode::Immediate => PollConfig::default(),
        };
        let poller = TaskPoller::new(self.service.clone(), self.session.clone(), config);
        let observe = |task: &GenerationTask| {
            if !cancel.is_cancelled() {
                self.with_state(|state| state.active_task = Some(task.clone()));
            }
        };
        match self.spec.mode {
            GenerationMode::Polled(_) => poller.run_observed(request, cancel, &observe).await,
            GenerationMode::Immediate => poller.run_immediate(request, cancel).await,
        }
    }

    fn complete(&self, cancel: &CancellationToken, run: &TaskRun) {
        // An abandoned run no longer owns the surface; a newer run may.
        if cancel.is_cancelled() {
            return;
        }
        if let Ok(mut slot) = self.cancel.lock() {
            *slot = None;
        }
        self.with_state(|state| {
            state.is_generating = false;
            state.active_task = run.task.clone();
            match &run.outcome {
                GenerationOutcome::Success(image) => {
                    state.generated_image = Some(image.url.clone());
                    state.description = image.description.clone();
                }
                outcome => state.error = outcome.message(),
            }
        });
    }

    fn with_state(&self, update: impl FnOnce(&mut SurfaceState)) {
        if let Ok(mut state) = self.state.lock() {
            update(&mut state);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::ToolPreset;
    use crate::service::ImmediateResult;
    use crate::poller::testing::{completed, report, CountingSession, ScriptedService};
    use crate::task::TaskStatus;

    struct PrefixUploader;

    #[async_trait]
    impl ImageUploader for PrefixUploader {
        async fn upload(
            &self,
            _token: Option<&str>,
            file_name: &str,
            _bytes: Vec<u8>,
        ) -> Result<String, GenerationError> {
            Ok(format!("https://cdn/{}", file_name))
        }
    }

    fn image_input(prompt: &str) -> ToolInput {
        ToolInput {
            prompt: prompt.to_string(),
            images: vec![ImageSource::Url("https://cdn/hand.png".to_string())],
            ..ToolInput::default()
        }
    }

    fn surface(preset: ToolPreset, service: Arc<ScriptedService>, session: CountingSession) -> ToolSurface {
        ToolSurface::new(preset.spec(), service, Arc::new(session))
    }

    #[tokio::test(start_paused = true)]
    async fn success_populates_state() {
        let service = Arc::new(ScriptedService::sequential(|_| Ok(completed("https://x/nails.png"))));
        let surface = surface(ToolPreset::NailColorChanger, service.clone(), CountingSession::signed_in());

        let outcome = surface.generate(image_input("glossy red")).await;

        assert!(outcome.is_success());
        let state = surface.snapshot();
        assert!(!state.is_generating);
        assert_eq!(state.generated_image.as_deref(), Some("https://x/nails.png"));
        assert_eq!(state.error, None);
        assert_eq!(state.active_task.unwrap().status, TaskStatus::Completed);
        let sent = service.submitted.lock().unwrap()[0].clone();
        assert_eq!(sent.metadata.get("tool").map(String::as_str), Some("nail-color-changer"));
    }

    #[tokio::test(start_paused = true)]
    async fn nail_tool_polls_every_ten_seconds() {
        let service = Arc::new(ScriptedService::sequential(|poll| match poll {
            1 => Ok(report(TaskStatus::Processing)),
            _ => Ok(completed("https://x/nails.png")),
        }));
        let surface = surface(ToolPreset::NailColorChanger, service, CountingSession::signed_in());
        let started = tokio::time::Instant::now();

        surface.generate(image_input("matte black")).await;

        assert!(started.elapsed() >= Duration::from_secs(20));
    }

    #[tokio::test]
    async fn signed_out_user_is_asked_to_sign_in() {
        let service = Arc::new(ScriptedService::sequential(|_| Ok(completed("u"))));
        let session = CountingSession {
            token: None,
            ..CountingSession::signed_in()
        };
        let surface = surface(ToolPreset::ClothesChanger, service.clone(), session);

        let outcome = surface.generate(image_input("")).await;

        assert_eq!(outcome, GenerationOutcome::Failed(GenerationError::Unauthorized));
        assert_eq!(
            surface.snapshot().error.as_deref(),
            Some("Please sign in to generate images")
        );
        assert_eq!(service.submits.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_prompt_is_rejected_locally() {
        let service = Arc::new(ScriptedService::sequential(|_| Ok(completed("u"))));
        let surface = surface(ToolPreset::ObjectRemover, service, CountingSession::signed_in());

        let outcome = surface.generate(image_input("   ")).await;

        assert_eq!(
            outcome,
            GenerationOutcome::Failed(GenerationError::MissingInput("Please enter a prompt"))
        );
    }

    #[tokio::test]
    async fn advisory_credit_check_uses_cached_balance() {
        let service = Arc::new(ScriptedService::sequential(|_| Ok(completed("u"))));
        let session = CountingSession {
            credits: Some(0),
            ..CountingSession::signed_in()
        };
        let surface = surface(ToolPreset::JewelryTryOn, service, session);

        let outcome = surface.generate(image_input("")).await;

        assert_eq!(
            outcome,
            GenerationOutcome::Failed(GenerationError::InsufficientCredits {
                required: 1,
                available: 0
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn second_generate_while_busy_is_refused() {
        let service = Arc::new(ScriptedService::sequential(|poll| match poll {
            1 => Ok(report(TaskStatus::Processing)),
            _ => Ok(completed("https://x/coat.png")),
        }));
        let surface = surface(ToolPreset::ClothesChanger, service.clone(), CountingSession::signed_in());

        let (first, second) = tokio::join!(surface.generate(image_input("")), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            surface.generate(image_input("")).await
        });

        assert!(first.is_success());
        assert_eq!(second, GenerationOutcome::Failed(GenerationError::Busy));
        assert_eq!(service.submits.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(surface.snapshot().error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn abandon_frees_the_surface_for_a_new_task() {
        let service = Arc::new(ScriptedService::new(
            |n| {
                Ok(crate::service::SubmitAccepted {
                    task_id: format!("task-{}", n),
                })
            },
            |task_id, _| match task_id {
                "task-1" => Ok(report(TaskStatus::Processing)),
                _ => Ok(completed("https://x/second.png")),
            },
        ));
        let surface = surface(ToolPreset::ClothesChanger, service.clone(), CountingSession::signed_in());

        let (first, _) = tokio::join!(surface.generate(image_input("")), async {
            tokio::time::sleep(Duration::from_secs(7)).await;
            surface.abandon();
        });
        assert!(matches!(first, GenerationOutcome::Cancelled { .. }));
        assert!(!surface.snapshot().is_generating);

        let second = surface.generate(image_input("")).await;
        assert_eq!(second.image_url(), Some("https://x/second.png"));
        let state = surface.snapshot();
        assert_eq!(state.active_task.unwrap().task_id, "task-2");
        assert_eq!(state.error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn active_task_is_visible_while_polling() {
        let service = Arc::new(ScriptedService::sequential(|_| Ok(report(TaskStatus::Processing))));
        let surface = surface(ToolPreset::ClothesChanger, service, CountingSession::signed_in());

        let (_, mid_run) = tokio::join!(surface.generate(image_input("")), async {
            tokio::time::sleep(Duration::from_secs(12)).await;
            let state = surface.snapshot();
            surface.abandon();
            state
        });

        assert!(mid_run.is_generating);
        let task = mid_run.active_task.unwrap();
        assert_eq!(task.task_id, "task-1");
        assert_eq!(task.status, TaskStatus::Processing);
        let after = surface.snapshot();
        assert!(!after.is_generating);
        assert_eq!(after.active_task.unwrap().task_id, "task-1");
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_input_during_a_run_leaves_state_alone() {
        let service = Arc::new(ScriptedService::sequential(|poll| match poll {
            1 => Ok(report(TaskStatus::Processing)),
            _ => Ok(completed("https://x/bag.png")),
        }));
        let surface = surface(ToolPreset::ObjectRemover, service, CountingSession::signed_in());

        let (first, second) = tokio::join!(surface.generate(image_input("remove the bag")), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let outcome = surface.generate(image_input("  ")).await;
            (outcome, surface.snapshot())
        });

        assert!(first.is_success());
        assert_eq!(second.0, GenerationOutcome::Failed(GenerationError::Busy));
        assert!(second.1.is_generating);
        assert_eq!(second.1.error, None);
        assert_eq!(surface.snapshot().error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_message_lands_in_error_field() {
        let service = Arc::new(ScriptedService::sequential(|_| Ok(report(TaskStatus::Pending))));
        let surface = surface(ToolPreset::BodyEditor, service, CountingSession::signed_in());

        surface.generate(image_input("slimmer waist")).await;

        let state = surface.snapshot();
        assert!(state.error.unwrap().contains("taking longer than expected"));
        assert!(state.generated_image.is_none());
        assert!(!state.is_generating);
    }

    #[tokio::test]
    async fn local_images_are_uploaded_before_submission() {
        let service = Arc::new(ScriptedService::sequential(|_| Ok(completed("unused"))));
        *service.immediate.lock().unwrap() = Some(Ok(ImmediateResult {
            image_url: "https://x/anime.png".to_string(),
            description: None,
        }));
        let surface = surface(ToolPreset::AnimeConverter, service.clone(), CountingSession::signed_in())
            .with_uploader(Arc::new(PrefixUploader));

        let outcome = surface
            .generate(ToolInput {
                images: vec![ImageSource::Local {
                    file_name: "me.jpg".to_string(),
                    bytes: vec![1, 2, 3],
                }],
                ..ToolInput::default()
            })
            .await;

        assert_eq!(outcome.image_url(), Some("https://x/anime.png"));
        let sent = service.submitted.lock().unwrap()[0].clone();
        assert_eq!(sent.image_urls, vec!["https://cdn/me.jpg".to_string()]);
        assert_eq!(service.status_calls(), 0);
    }

    #[tokio::test]
    async fn local_image_without_uploader_fails() {
        let service = Arc::new(ScriptedService::sequential(|_| Ok(completed("u"))));
        let surface = surface(ToolPreset::AnimeConverter, service, CountingSession::signed_in());

        let outcome = surface
            .generate(ToolInput {
                images: vec![ImageSource::Local {
                    file_name: "me.jpg".to_string(),
                    bytes: vec![],
                }],
                ..ToolInput::default()
            })
            .await;

        assert_eq!(
            outcome,
            GenerationOutcome::Failed(GenerationError::Unsupported("image upload"))
        );
        assert!(!surface.snapshot().is_generating);
    }
}
