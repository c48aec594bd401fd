use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use crate::api::DevServiceConfig;
use crate::config::{ClientConfig, ToolPreset};
use crate::service::{GenerationError, HttpGenerationService, HttpSession};
use crate::task::ToolSurface;

fn env_opt(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => None,
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_opt(key).and_then(|raw| raw.parse::<T>().ok())
}

/// Installs the global subscriber. `RUST_LOG` wins over the default `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub fn load_client_config() -> ClientConfig {
    let mut cfg = ClientConfig::default();
    if let Some(base) = env_opt("IMAGEGEN_BASE_URL") {
        cfg.base_url = base;
    }
    if let Some(path) = env_opt("IMAGEGEN_SUBMIT_PATH") {
        cfg.submit_path = path;
    }
    if let Some(path) = env_opt("IMAGEGEN_STATUS_PATH") {
        cfg.status_path = path;
    }
    if let Some(path) = env_opt("IMAGEGEN_GENERATE_PATH") {
        cfg.generate_path = path;
    }
    if let Some(path) = env_opt("IMAGEGEN_UPLOAD_PATH") {
        cfg.upload_path = path;
    }
    if let Some(path) = env_opt("IMAGEGEN_CREDITS_PATH") {
        cfg.credits_path = path;
    }
    if let Some(secs) = env_parse::<u64>("IMAGEGEN_TIMEOUT_SECS") {
        cfg.request_timeout = Duration::from_secs(secs.max(1));
    }
    cfg.token = env_opt("IMAGEGEN_TOKEN");
    cfg
}

pub fn load_dev_service_config() -> DevServiceConfig {
    let mut cfg = DevServiceConfig::default();
    if let Some(port) = env_parse::<u16>("PORT") {
        cfg.port = port;
    }
    if let Some(credits) = env_parse::<u32>("IMAGEGEN_DEV_CREDITS") {
        cfg.starting_credits = credits;
    }
    if let Some(polls) = env_parse::<u32>("IMAGEGEN_DEV_POLLS") {
        cfg.polls_to_complete = polls;
    }
    if let Some(cost) = env_parse::<u32>("IMAGEGEN_DEV_COST") {
        cfg.cost = cost;
    }
    if let Some(retain) = env_parse::<usize>("IMAGEGEN_DEV_RETAIN") {
        cfg.retain = retain;
    }
    cfg.unavailable_message = env_opt("IMAGEGEN_DEV_UNAVAILABLE");
    cfg.store_path = env_opt("IMAGEGEN_DEV_STORE").map(PathBuf::from);
    cfg
}

/// Wires a tool surface to the HTTP service, with uploads and credit refresh.
pub fn build_surface(cfg: &ClientConfig, preset: ToolPreset) -> Result<ToolSurface, GenerationError> {
    let service = HttpGenerationService::new(cfg.clone())?;
    let session = Arc::new(HttpSession::new(service.clone(), cfg.token.clone()));
    let service = Arc::new(service);
    Ok(ToolSurface::new(preset.spec(), service.clone(), session).with_uploader(service))
}
