use std::sync::Arc;
use std::time::Duration;

use axum::routing::post;
use axum::{Json, Router};
use imagegen_rs::api::{DevServer, DevServiceConfig};
use imagegen_rs::service::{
    GenerationError, GenerationService, HttpGenerationService, HttpSession, Session, StaticSession,
    SubmitRequest,
};
use imagegen_rs::task::{ImageSource, ToolInput, ToolSurface};
use imagegen_rs::{ClientConfig, GenerationOutcome, PollConfig, TaskPoller, ToolPreset};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

const TOKEN: &str = "dev-user";

async fn start(config: DevServiceConfig) -> String {
    let server = DevServer::bind(DevServiceConfig { port: 0, ..config }).expect("bind dev server");
    let base_url = server.base_url().to_string();
    tokio::spawn(server.serve());
    base_url
}

/// Serves a hand-written router, for service behaviour the dev server never produces.
fn stub(router: Router) -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind stub");
    listener.set_nonblocking(true).expect("nonblocking");
    let base_url = format!("http://{}", listener.local_addr().expect("stub addr"));
    let server = axum::Server::from_tcp(listener).expect("stub server");
    tokio::spawn(server.serve(router.into_make_service()));
    base_url
}

fn client(base_url: &str) -> HttpGenerationService {
    HttpGenerationService::new(ClientConfig {
        base_url: base_url.to_string(),
        request_timeout: Duration::from_secs(5),
        ..ClientConfig::default()
    })
    .expect("http client")
}

fn quick() -> PollConfig {
    PollConfig::new(Duration::from_millis(10), 30)
}

fn request(prompt: &str) -> SubmitRequest {
    SubmitRequest {
        prompt: prompt.to_string(),
        image_urls: vec!["https://cdn/in.png".to_string()],
        ..SubmitRequest::default()
    }
}

fn poller(base_url: &str, token: Option<&str>, config: PollConfig) -> TaskPoller {
    TaskPoller::new(
        Arc::new(client(base_url)),
        Arc::new(StaticSession::new(token.map(str::to_string), None)),
        config,
    )
}

#[tokio::test]
async fn polled_job_completes_and_refreshes_credits() {
    let base_url = start(DevServiceConfig::default()).await;
    let service = client(&base_url);
    let session = Arc::new(HttpSession::new(service.clone(), Some(TOKEN.to_string())));
    let poller = TaskPoller::new(Arc::new(service), session.clone(), quick());

    let run = poller.run(request("red coat"), &CancellationToken::new()).await;

    let url = run.outcome.image_url().expect("image url").to_string();
    assert!(url.starts_with(&base_url) && url.ends_with(".png"), "{}", url);
    assert_eq!(run.attempts, 3);
    assert_eq!(session.cached_credits(), Some(9));
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let base_url = start(DevServiceConfig::default()).await;

    let run = poller(&base_url, None, quick())
        .run(request("x"), &CancellationToken::new())
        .await;

    assert_eq!(run.outcome, GenerationOutcome::Failed(GenerationError::Unauthorized));
    assert_eq!(run.attempts, 0);
}

#[tokio::test]
async fn empty_balance_reports_required_and_available() {
    let base_url = start(DevServiceConfig {
        starting_credits: 0,
        cost: 5,
        ..DevServiceConfig::default()
    })
    .await;

    let run = poller(&base_url, Some(TOKEN), quick())
        .run(request("x"), &CancellationToken::new())
        .await;

    assert_eq!(
        run.outcome,
        GenerationOutcome::Failed(GenerationError::InsufficientCredits {
            required: 5,
            available: 0
        })
    );
}

#[tokio::test]
async fn unavailable_service_message_is_verbatim() {
    let base_url = start(DevServiceConfig {
        unavailable_message: Some("Image model is warming up".to_string()),
        ..DevServiceConfig::default()
    })
    .await;

    let run = poller(&base_url, Some(TOKEN), quick())
        .run(request("x"), &CancellationToken::new())
        .await;

    assert_eq!(run.outcome.message().as_deref(), Some("Image model is warming up"));
}

#[tokio::test]
async fn failed_job_and_empty_result() {
    let base_url = start(DevServiceConfig::default()).await;
    let poller = poller(&base_url, Some(TOKEN), quick());

    let failed = poller.run(request("[fail] tiara"), &CancellationToken::new()).await;
    let empty = poller.run(request("[empty] ring"), &CancellationToken::new()).await;

    assert_eq!(failed.outcome.message().as_deref(), Some("content policy violation"));
    assert_eq!(empty.outcome, GenerationOutcome::Failed(GenerationError::EmptyResult));
}

#[tokio::test]
async fn stalled_job_times_out() {
    let base_url = start(DevServiceConfig::default()).await;

    let run = poller(&base_url, Some(TOKEN), PollConfig::new(Duration::from_millis(5), 4))
        .run(request("[stall] necklace"), &CancellationToken::new())
        .await;

    assert!(matches!(run.outcome, GenerationOutcome::TimedOut { attempts: 4, .. }));
}

#[tokio::test]
async fn unknown_task_is_an_api_error() {
    let base_url = start(DevServiceConfig::default()).await;

    let err = client(&base_url).status(Some(TOKEN), "task_missing").await.unwrap_err();

    assert!(matches!(err, GenerationError::Api { status: 404, .. }), "{:?}", err);
}

#[tokio::test]
async fn refused_connection_is_connectivity_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let run = poller(&format!("http://127.0.0.1:{}", port), Some(TOKEN), quick())
        .run(request("x"), &CancellationToken::new())
        .await;

    assert_eq!(run.outcome, GenerationOutcome::Failed(GenerationError::Connectivity));
}

#[tokio::test]
async fn surface_uploads_then_generates_immediately() {
    let base_url = start(DevServiceConfig::default()).await;
    let service = Arc::new(client(&base_url));
    let session = Arc::new(HttpSession::new(client(&base_url), Some(TOKEN.to_string())));
    let surface = ToolSurface::new(ToolPreset::AnimeConverter.spec(), service.clone(), session)
        .with_uploader(service);

    let outcome = surface
        .generate(ToolInput {
            images: vec![ImageSource::Local {
                file_name: "selfie.png".to_string(),
                bytes: vec![0x89, b'P', b'N', b'G'],
            }],
            ..ToolInput::default()
        })
        .await;

    assert!(outcome.is_success(), "{:?}", outcome);
    let state = surface.snapshot();
    assert!(!state.is_generating);
    assert!(state.description.is_some());

    let tasks: Value = reqwest::get(format!("{}/tasks", base_url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let uploaded = tasks["tasks"][0]["imageUrls"][0].as_str().unwrap().to_string();
    let bytes = reqwest::get(uploaded).await.unwrap().bytes().await.unwrap();
    assert_eq!(bytes.to_vec(), vec![0x89, b'P', b'N', b'G']);
}

#[tokio::test]
async fn accepted_without_task_id_is_a_failure() {
    let base_url = stub(Router::new().route(
        "/api/generate",
        post(|| async { Json(json!({"ok": true})) }),
    ));

    let run = poller(&base_url, Some(TOKEN), quick())
        .run(request("x"), &CancellationToken::new())
        .await;

    assert_eq!(run.outcome, GenerationOutcome::Failed(GenerationError::MissingTaskId));
    assert_eq!(run.outcome.message().as_deref(), Some("No task ID received"));
    assert_eq!(run.attempts, 0);
}

#[tokio::test]
async fn slow_service_is_a_request_timeout() {
    let base_url = stub(Router::new().route(
        "/api/generate",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({"taskId": "late"}))
        }),
    ));
    let service = HttpGenerationService::new(ClientConfig {
        base_url: base_url.clone(),
        request_timeout: Duration::from_millis(200),
        ..ClientConfig::default()
    })
    .expect("http client");

    let err = service.submit(Some(TOKEN), &request("x")).await.unwrap_err();
    assert_eq!(err, GenerationError::RequestTimeout);

    let run = TaskPoller::new(
        Arc::new(service),
        Arc::new(StaticSession::new(Some(TOKEN.to_string()), None)),
        quick(),
    )
    .run(request("x"), &CancellationToken::new())
    .await;
    assert_eq!(run.outcome, GenerationOutcome::Failed(GenerationError::RequestTimeout));
}

#[tokio::test]
async fn result_urls_serve_an_image() {
    let base_url = start(DevServiceConfig::default()).await;

    let run = poller(&base_url, Some(TOKEN), quick())
        .run(request("blue dress"), &CancellationToken::new())
        .await;
    let url = run.outcome.image_url().expect("image url").to_string();

    let resp = reqwest::get(&url).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(
        resp.headers()[reqwest::header::CONTENT_TYPE].to_str().unwrap(),
        "image/png"
    );
    let bytes = resp.bytes().await.unwrap();
    assert_eq!(bytes[..8].to_vec(), b"\x89PNG\r\n\x1a\n".to_vec());

    let missing = reqwest::get(format!("{}/results/task_nope.png", base_url)).await.unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
}
