use std::env;

use imagegen_rs::helpers::load_client_config;
use imagegen_rs::ToolPreset;

use crate::models::CLIConfig;

const DEFAULT_TOOL: ToolPreset = ToolPreset::ClothesChanger;

pub fn parse_config() -> CLIConfig {
    let client = load_client_config();
    let mut cfg = CLIConfig {
        base_url: client.base_url,
        token: client.token,
        tool: env_tool("IMAGEGEN_TOOL").unwrap_or(DEFAULT_TOOL),
        aspect_ratio: None,
        debug: env_bool("IMAGEGEN_DEBUG", false),
    };

    let args: Vec<String> = env::args().collect();
    let mut idx = 1;
    while idx < args.len() {
        match args[idx].as_str() {
            "--base" => {
                if let Some(value) = args.get(idx + 1) {
                    cfg.base_url = value.clone();
                    idx += 1;
                }
            }
            "--token" => {
                if let Some(value) = args.get(idx + 1) {
                    cfg.token = Some(value.clone());
                    idx += 1;
                }
            }
            "--tool" => {
                if let Some(value) = args.get(idx + 1) {
                    match value.parse::<ToolPreset>() {
                        Ok(tool) => cfg.tool = tool,
                        Err(err) => eprintln!("{}", err),
                    }
                    idx += 1;
                }
            }
            "--ratio" => {
                if let Some(value) = args.get(idx + 1) {
                    cfg.aspect_ratio = Some(value.clone());
                    idx += 1;
                }
            }
            "--debug" => {
                if let Some(value) = args.get(idx + 1) {
                    if value.starts_with('-') {
                        cfg.debug = true;
                    } else if let Ok(parsed) = value.parse::<bool>() {
                        cfg.debug = parsed;
                        idx += 1;
                    } else {
                        cfg.debug = true;
                    }
                } else {
                    cfg.debug = true;
                }
            }
            _ => {}
        }
        idx += 1;
    }

    cfg
}

fn env_tool(key: &str) -> Option<ToolPreset> {
    env::var(key).ok().and_then(|raw| raw.parse::<ToolPreset>().ok())
}

fn env_bool(key: &str, fallback: bool) -> bool {
    match env::var(key) {
        Ok(value) => value.parse::<bool>().unwrap_or(fallback),
        Err(_) => fallback,
    }
}
