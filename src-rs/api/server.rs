use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::api::handlers::{
    handle_credits, handle_generate_image, handle_get_result, handle_get_upload, handle_health,
    handle_status, handle_submit, handle_tasks, handle_upload, DevServiceConfig, DevState,
};

/// Local stand-in for the remote generation service.
pub struct DevServer {
    listener: TcpListener,
    pub state: Arc<DevState>,
}

impl DevServer {
    pub fn bind(config: DevServiceConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], config.port)))?;
        listener.set_nonblocking(true)?;
        let port = listener.local_addr()?.port();
        let base_url = config
            .public_base_url
            .clone()
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", port));
        Ok(Self {
            listener,
            state: Arc::new(DevState::new(config, base_url)),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn base_url(&self) -> &str {
        &self.state.base_url
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(handle_health))
            .route("/tasks", get(handle_tasks))
            .route("/api/generate", post(handle_submit))
            .route("/api/task-status", get(handle_status))
            .route("/api/generate-image", post(handle_generate_image))
            .route("/api/upload", post(handle_upload))
            .route("/api/credits", get(handle_credits))
            .route("/uploads/:name", get(handle_get_upload))
            .route("/results/:name", get(handle_get_result))
            .with_state(self.state.clone())
    }

    pub async fn serve(self) -> Result<(), String> {
        let app = self.router();
        axum::Server::from_tcp(self.listener)
            .map_err(|err| err.to_string())?
            .serve(app.into_make_service())
            .await
            .map_err(|err| err.to_string())
    }
}
