use std::path::Path;

use imagegen_rs::helpers::{build_surface, load_client_config};
use imagegen_rs::service::HttpGenerationService;
use imagegen_rs::task::{ImageSource, ToolInput, ToolSurface};
use imagegen_rs::GenerationOutcome;

use crate::models::CLIConfig;

/// One tool surface plus a handle for balance lookups.
pub struct GenClient {
    pub surface: ToolSurface,
    service: HttpGenerationService,
    token: Option<String>,
}

impl GenClient {
    pub fn new(cfg: &CLIConfig) -> Result<Self, String> {
        let mut client_cfg = load_client_config();
        client_cfg.base_url = cfg.base_url.clone();
        client_cfg.token = cfg.token.clone();
        let surface = build_surface(&client_cfg, cfg.tool).map_err(|err| err.to_string())?;
        let service = HttpGenerationService::new(client_cfg).map_err(|err| err.to_string())?;
        Ok(Self {
            surface,
            service,
            token: cfg.token.clone(),
        })
    }

    pub async fn generate(&self, input: ToolInput) -> GenerationOutcome {
        self.surface.generate(input).await
    }

    pub async fn credits(&self) -> Result<u32, String> {
        self.service
            .fetch_credits(self.token.as_deref())
            .await
            .map_err(|err| err.to_string())
    }
}

pub async fn read_image(path: &str) -> Result<ImageSource, String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|err| format!("{}: {}", path, err))?;
    let file_name = Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload.bin")
        .to_string();
    Ok(ImageSource::Local { file_name, bytes })
}
