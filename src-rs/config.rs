use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

/// Fixed-interval, bounded polling. Worst-case wait is
/// `poll_interval * max_attempts`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollConfig {
    pub poll_interval: Duration,
    pub max_attempts: u32,
}

impl PollConfig {
    pub fn new(poll_interval: Duration, max_attempts: u32) -> Self {
        let max_attempts = if max_attempts == 0 {
            DEFAULT_MAX_ATTEMPTS
        } else {
            max_attempts
        };
        Self {
            poll_interval,
            max_attempts,
        }
    }

    pub fn fast() -> Self {
        Self::new(Duration::from_secs(5), DEFAULT_MAX_ATTEMPTS)
    }

    pub fn slow() -> Self {
        Self::new(Duration::from_secs(10), DEFAULT_MAX_ATTEMPTS)
    }

    pub fn max_wait(&self) -> Duration {
        self.poll_interval * self.max_attempts
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::fast()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenerationMode {
    /// Submit, receive a task id, poll the status endpoint.
    Polled(PollConfig),
    /// One request answering with the image directly.
    Immediate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputRule {
    ImageRequired,
    PromptRequired,
    ImageAndPrompt,
    ImageOrPrompt,
}

impl InputRule {
    /// Returns the missing input, if any.
    pub fn check(&self, has_image: bool, has_prompt: bool) -> Result<(), &'static str> {
        match self {
            InputRule::ImageRequired if !has_image => Err("Please upload an image first"),
            InputRule::PromptRequired if !has_prompt => Err("Please enter a prompt"),
            InputRule::ImageAndPrompt if !has_image => Err("Please upload an image first"),
            InputRule::ImageAndPrompt if !has_prompt => Err("Please enter a prompt"),
            InputRule::ImageOrPrompt if !has_image && !has_prompt => {
                Err("Please upload an image or enter a prompt")
            }
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolPreset {
    AnimeConverter,
    HairstyleChanger,
    ClothesChanger,
    BodyEditor,
    NailColorChanger,
    JewelryTryOn,
    ObjectRemover,
    InfographicGenerator,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolSpec {
    pub preset: ToolPreset,
    pub slug: &'static str,
    pub title: &'static str,
    pub mode: GenerationMode,
    pub inputs: InputRule,
    pub credit_cost: u32,
}

impl ToolPreset {
    pub const ALL: [ToolPreset; 8] = [
        ToolPreset::AnimeConverter,
        ToolPreset::HairstyleChanger,
        ToolPreset::ClothesChanger,
        ToolPreset::BodyEditor,
        ToolPreset::NailColorChanger,
        ToolPreset::JewelryTryOn,
        ToolPreset::ObjectRemover,
        ToolPreset::InfographicGenerator,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            ToolPreset::AnimeConverter => "anime-converter",
            ToolPreset::HairstyleChanger => "hairstyle-changer",
            ToolPreset::ClothesChanger => "clothes-changer",
            ToolPreset::BodyEditor => "body-editor",
            ToolPreset::NailColorChanger => "nail-color-changer",
            ToolPreset::JewelryTryOn => "jewelry-try-on",
            ToolPreset::ObjectRemover => "object-remover",
            ToolPreset::InfographicGenerator => "infographic-generator",
        }
    }

    pub fn spec(&self) -> ToolSpec {
        let (title, mode, inputs) = match self {
            ToolPreset::AnimeConverter => (
                "Anime Converter",
                GenerationMode::Immediate,
                InputRule::ImageRequired,
            ),
            ToolPreset::HairstyleChanger => (
                "Hairstyle Changer",
                GenerationMode::Immediate,
                InputRule::ImageAndPrompt,
            ),
            ToolPreset::ClothesChanger => (
                "Clothes Changer",
                GenerationMode::Polled(PollConfig::fast()),
                InputRule::ImageRequired,
            ),
            ToolPreset::BodyEditor => (
                "Body Editor",
                GenerationMode::Polled(PollConfig::fast()),
                InputRule::ImageAndPrompt,
            ),
            ToolPreset::NailColorChanger => (
                "Nail Color Changer",
                GenerationMode::Polled(PollConfig::slow()),
                InputRule::ImageAndPrompt,
            ),
            ToolPreset::JewelryTryOn => (
                "Jewelry Try-On",
                GenerationMode::Polled(PollConfig::slow()),
                InputRule::ImageRequired,
            ),
            ToolPreset::ObjectRemover => (
                "Object Remover",
                GenerationMode::Polled(PollConfig::fast()),
                InputRule::ImageAndPrompt,
            ),
            ToolPreset::InfographicGenerator => (
                "Infographic Generator",
                GenerationMode::Immediate,
                InputRule::PromptRequired,
            ),
        };
        ToolSpec {
            preset: *self,
            slug: self.slug(),
            title,
            mode,
            inputs,
            credit_cost: 1,
        }
    }
}

impl fmt::Display for ToolPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for ToolPreset {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim().to_lowercase();
        ToolPreset::ALL
            .iter()
            .copied()
            .find(|preset| preset.slug() == wanted)
            .ok_or_else(|| format!("unknown tool: {}", raw))
    }
}

/// Remote endpoints of the generation service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub submit_path: String,
    pub status_path: String,
    pub generate_path: String,
    pub upload_path: String,
    pub credits_path: String,
    pub request_timeout: Duration,
    pub token: Option<String>,
}

impl ClientConfig {
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            submit_path: "/api/generate".to_string(),
            status_path: "/api/task-status".to_string(),
            generate_path: "/api/generate-image".to_string(),
            upload_path: "/api/upload".to_string(),
            credits_path: "/api/credits".to_string(),
            request_timeout: Duration::from_secs(60),
            token: None,
        }
    }
}
