use imagegen_rs::ToolPreset;

#[derive(Clone, Debug)]
pub struct CLIConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub tool: ToolPreset,
    pub aspect_ratio: Option<String>,
    pub debug: bool,
}
