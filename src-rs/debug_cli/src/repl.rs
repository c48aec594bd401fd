use std::collections::BTreeMap;

use imagegen_rs::task::{ImageSource, ToolInput};
use imagegen_rs::ToolPreset;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::client::{read_image, GenClient};
use crate::models::CLIConfig;
use crate::render;

pub struct REPL {
    pub config: CLIConfig,
    pub client: GenClient,
    pub images: Vec<ImageSource>,
}

impl REPL {
    pub fn new(config: CLIConfig, client: GenClient) -> Self {
        Self {
            config,
            client,
            images: Vec::new(),
        }
    }

    pub async fn run(&mut self) {
        render::banner(&self.config);
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            render::prompt(self.config.tool);
            let line = match lines.next_line().await {
                Ok(Some(line)) => line.trim().to_string(),
                _ => break,
            };
            if line.is_empty() {
                continue;
            }
            if line.starts_with('/') {
                if self.handle_command(&line).await {
                    break;
                }
                continue;
            }
            self.send(&line).await;
        }
    }

    async fn handle_command(&mut self, line: &str) -> bool {
        let mut parts = line.splitn(2, ' ');
        let cmd = parts.next().unwrap_or("").trim_start_matches('/');
        let rest = parts.next().unwrap_or("").trim();
        match cmd {
            "exit" | "quit" => return true,
            "help" => render::help(),
            "tools" => render::tools(self.config.tool),
            "tool" => {
                if rest.is_empty() {
                    render::info(&format!("tool: {}", self.config.tool));
                } else {
                    match rest.parse::<ToolPreset>() {
                        Ok(tool) => {
                            self.config.tool = tool;
                            self.rebuild("tool updated");
                        }
                        Err(err) => render::error(&err),
                    }
                }
            }
            "image" => {
                if rest.is_empty() {
                    render::images(&self.images);
                } else {
                    self.images.push(ImageSource::Url(rest.to_string()));
                    render::info("image attached");
                }
            }
            "upload" => {
                if rest.is_empty() {
                    render::error("usage: /upload <path>");
                } else {
                    match read_image(rest).await {
                        Ok(image) => {
                            self.images.push(image);
                            render::info("image attached");
                        }
                        Err(err) => render::error(&err),
                    }
                }
            }
            "clear-images" => {
                self.images.clear();
                render::info("images cleared");
            }
            "ratio" => {
                if rest.is_empty() {
                    self.config.aspect_ratio = None;
                    render::info("aspect ratio cleared");
                } else {
                    self.config.aspect_ratio = Some(rest.to_string());
                    render::info("aspect ratio updated");
                }
            }
            "credits" => match self.client.credits().await {
                Ok(credits) => render::info(&format!("credits: {}", credits)),
                Err(err) => render::error(&err),
            },
            "state" => render::state(&self.client.surface.snapshot()),
            "config" => render::config(&self.config),
            "base" => {
                if rest.is_empty() {
                    render::info(&format!("base: {}", self.config.base_url));
                } else {
                    self.config.base_url = rest.to_string();
                    self.rebuild("base url updated");
                }
            }
            "token" => {
                if rest.is_empty() {
                    render::info(&format!("signed in: {}", self.config.token.is_some()));
                } else {
                    self.config.token = Some(rest.to_string());
                    self.rebuild("token updated");
                }
            }
            _ => render::info("unknown command, type /help"),
        }
        false
    }

    fn rebuild(&mut self, done: &str) {
        match GenClient::new(&self.config) {
            Ok(client) => {
                self.client = client;
                render::info(done);
            }
            Err(err) => render::error(&err),
        }
    }

    async fn send(&mut self, line: &str) {
        let input = ToolInput {
            prompt: line.to_string(),
            images: self.images.clone(),
            metadata: BTreeMap::new(),
            aspect_ratio: self.config.aspect_ratio.clone(),
        };
        let client = &self.client;
        tokio::select! {
            outcome = client.generate(input) => {
                render::outcome(&outcome, self.config.debug);
                if outcome.is_success() {
                    self.images.clear();
                }
            }
            _ = tokio::signal::ctrl_c() => {
                client.surface.abandon();
                render::info("generation abandoned; the remote job may still finish");
            }
        }
    }
}
