use std::io::{self, Write};

use imagegen_rs::task::{ImageSource, SurfaceState};
use imagegen_rs::{GenerationMode, GenerationOutcome, ToolPreset};

use crate::models::CLIConfig;

pub fn banner(cfg: &CLIConfig) {
    println!("Image Generation Debug CLI");
    println!("API: {}", cfg.base_url);
    println!("Tool: {}  Signed in: {}", cfg.tool.spec().title, cfg.token.is_some());
    println!("Type /help for commands.");
}

pub fn prompt(tool: ToolPreset) {
    print!("{}> ", tool);
    let _ = io::stdout().flush();
}

pub fn help() {
    println!("Commands:");
    println!("  /help                 Show commands");
    println!("  /exit | /quit         Exit");
    println!("  /tools                List tools");
    println!("  /tool <slug>          Switch tool");
    println!("  /image <url>          Attach an image by URL");
    println!("  /upload <path>        Attach a local image (uploaded on generate)");
    println!("  /clear-images         Drop attached images");
    println!("  /ratio <w:h>          Set aspect ratio");
    println!("  /credits              Show credit balance");
    println!("  /state                Show surface state");
    println!("  /config               Show current config");
    println!("  /base <url>           Update base URL");
    println!("  /token <token>        Update bearer token");
    println!("Anything else is sent as the prompt. Ctrl-C abandons a running generation.");
}

pub fn tools(current: ToolPreset) {
    for preset in ToolPreset::ALL {
        let spec = preset.spec();
        let mode = match spec.mode {
            GenerationMode::Polled(cfg) => format!(
                "polled every {}s, {} attempts",
                cfg.poll_interval.as_secs(),
                cfg.max_attempts
            ),
            GenerationMode::Immediate => "immediate".to_string(),
        };
        let marker = if preset == current { "*" } else { " " };
        println!("{} {:<22} {} ({})", marker, spec.slug, spec.title, mode);
    }
}

pub fn outcome(outcome: &GenerationOutcome, debug: bool) {
    match outcome {
        GenerationOutcome::Success(image) => {
            println!("image> {}", image.url);
            if let Some(description) = &image.description {
                println!("  {}", description);
            }
            if debug && image.result_urls.len() > 1 {
                for url in &image.result_urls[1..] {
                    println!("  also: {}", url);
                }
            }
        }
        GenerationOutcome::Cancelled { task_id } => match task_id {
            Some(id) => println!("abandoned task {}", id),
            None => println!("abandoned"),
        },
        other => error(&other.message().unwrap_or_default()),
    }
}

pub fn state(state: &SurfaceState) {
    println!("state:");
    println!("  generating: {}", state.is_generating);
    println!("  image: {}", state.generated_image.clone().unwrap_or_default());
    println!("  error: {}", state.error.clone().unwrap_or_default());
    if let Some(task) = &state.active_task {
        println!("  task: {} [{:?}]", task.task_id, task.status);
    }
}

pub fn images(images: &[ImageSource]) {
    if images.is_empty() {
        println!("no images attached");
        return;
    }
    for image in images {
        match image {
            ImageSource::Url(url) => println!("  url: {}", url),
            ImageSource::Local { file_name, bytes } => {
                println!("  file: {} ({} bytes)", file_name, bytes.len())
            }
        }
    }
}

pub fn config(cfg: &CLIConfig) {
    println!("config:");
    println!("  base: {}", cfg.base_url);
    println!("  tool: {}", cfg.tool);
    println!("  ratio: {}", cfg.aspect_ratio.clone().unwrap_or_default());
    println!("  debug: {}", cfg.debug);
    println!("  signed in: {}", cfg.token.is_some());
}

pub fn info(msg: &str) {
    println!("{}", msg);
}

pub fn error(msg: &str) {
    eprintln!("error: {}", msg);
}
