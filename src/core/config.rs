use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::services::llm::LlmConfig;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Directory whose `*.md` files replace the built-in prompt templates.
    #[serde(default)]
    pub prompts_dir: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_max_json_retries")]
    pub max_json_retries: usize,
    #[serde(default = "default_temperature")]
    pub json_temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub json_max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub reply_temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub reply_max_tokens: u32,
    #[serde(default = "default_max_ranked_chapters")]
    pub max_ranked_chapters: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_json_retries: default_max_json_retries(),
            json_temperature: default_temperature(),
            json_max_tokens: default_max_tokens(),
            reply_temperature: default_temperature(),
            reply_max_tokens: default_max_tokens(),
            max_ranked_chapters: default_max_ranked_chapters(),
        }
    }
}

fn default_max_json_retries() -> usize {
    2
}
fn default_temperature() -> f32 {
    0.6
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_max_ranked_chapters() -> usize {
    5
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("{} not found, using built-in defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml_ng::to_string(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}
