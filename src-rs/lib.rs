pub mod config;
pub mod helpers;
pub mod poller;
pub mod result;

#[path = "service/lib.rs"]
pub mod service;
#[path = "task/lib.rs"]
pub mod task;
#[path = "api/lib.rs"]
pub mod api;

pub use config::{ClientConfig, GenerationMode, InputRule, PollConfig, ToolPreset, ToolSpec};
pub use poller::TaskPoller;
pub use result::{GeneratedImage, GenerationOutcome, TaskRun};
