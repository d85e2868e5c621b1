use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Debug;

use crate::core::conversation::{ChatMessage, Role};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String, // "openai", "gemini" or "ollama"
    #[serde(default = "default_request_delay")]
    pub request_delay_ms: u64,
    pub openai: Option<OpenAIConfig>,
    pub gemini: Option<GeminiConfig>,
    pub ollama: Option<OllamaConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            request_delay_ms: default_request_delay(),
            openai: None,
            gemini: None,
            ollama: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OpenAIConfig {
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            base_url: default_openai_base_url(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self { api_key: None, model: default_model() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_request_delay() -> u64 {
    500
}
fn default_model() -> String {
    "gemini-2.0-flash-lite".to_string()
}
// Gemini speaks the OpenAI chat-completions dialect here.
fn default_openai_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta/openai".to_string()
}
fn default_ollama_base_url() -> String {
    "http://127.0.0.1:11434".to_string()
}
fn default_ollama_model() -> String {
    "llama3.1".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChatParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait LlmClient: Send + Sync + Debug {
    async fn chat(&self, messages: &[ChatMessage], params: &ChatParams) -> Result<String>;
}

pub fn create_llm(config: &LlmConfig) -> Result<Box<dyn LlmClient>> {
    info!("Initializing LLM client for provider: {}", config.provider);
    match config.provider.as_str() {
        "openai" => {
            let cfg = config.openai.clone().unwrap_or_default();
            let api_key = resolve_api_key(cfg.api_key.as_deref(), &["OPENAI_API_KEY", "GEMINI_API_KEY"])
                .context("OpenAI-compatible provider needs llm.openai.api_key, OPENAI_API_KEY or GEMINI_API_KEY")?;
            Ok(Box::new(OpenAIClient::new(&api_key, &cfg.model, &cfg.base_url)))
        }
        "gemini" => {
            let cfg = config.gemini.clone().unwrap_or_default();
            let api_key = resolve_api_key(cfg.api_key.as_deref(), &["GEMINI_API_KEY"])
                .context("Gemini provider needs llm.gemini.api_key or GEMINI_API_KEY")?;
            Ok(Box::new(GeminiClient::new(&api_key, &cfg.model)))
        }
        "ollama" => {
            let cfg = config.ollama.clone().unwrap_or_default();
            Ok(Box::new(OllamaClient::new(&cfg.base_url, &cfg.model)))
        }
        _ => Err(anyhow!("Unknown LLM provider: {}", config.provider)),
    }
}

fn resolve_api_key(configured: Option<&str>, env_vars: &[&str]) -> Result<String> {
    if let Some(key) = configured.filter(|k| !k.trim().is_empty()) {
        return Ok(key.to_string());
    }
    env_vars
        .iter()
        .find_map(|name| env::var(name).ok().filter(|v| !v.trim().is_empty()))
        .ok_or_else(|| anyhow!("API key is missing"))
}

// --- Gemini ---
#[derive(Debug)]
struct GeminiClient {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiClient {
    fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiError>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContentResponse>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Deserialize)]
struct GeminiPartResponse {
    text: String,
}

#[derive(Deserialize, Debug)]
struct GeminiError {
    message: String,
}

impl GeminiRequest {
    fn from_messages(messages: &[ChatMessage], params: &ChatParams) -> Self {
        let system_parts: Vec<GeminiPart> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| GeminiPart { text: m.content.clone() })
            .collect();

        let contents = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| GeminiContent {
                role: match m.role {
                    Role::Assistant => "model".to_string(),
                    _ => "user".to_string(),
                },
                parts: vec![GeminiPart { text: m.content.clone() }],
            })
            .collect();

        Self {
            contents,
            system_instruction: if system_parts.is_empty() {
                None
            } else {
                Some(GeminiSystemInstruction { parts: system_parts })
            },
            generation_config: GeminiGenerationConfig {
                temperature: params.temperature,
                max_output_tokens: params.max_tokens,
            },
        }
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn chat(&self, messages: &[ChatMessage], params: &ChatParams) -> Result<String> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );

        let request_body = GeminiRequest::from_messages(messages, params);

        let resp = self.client.post(&url)
            .json(&request_body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let error_text = resp.text().await?;
            return Err(anyhow!("Gemini API error: {}", error_text));
        }

        let response_text = resp.text().await?;
        let result: GeminiResponse = match serde_json::from_str(&response_text) {
            Ok(r) => r,
            Err(e) => return Err(anyhow!("Failed to parse Gemini response: {}. Body: {}", e, response_text)),
        };

        if let Some(err) = result.error {
            return Err(anyhow!("Gemini API returned error: {}", err.message));
        }

        if let Some(candidates) = result.candidates {
            if let Some(first) = candidates.first() {
                if let Some(content) = &first.content {
                    if !content.parts.is_empty() {
                        return Ok(content.parts.iter().map(|p| p.text.as_str()).collect());
                    }
                }

                let reason = first.finish_reason.as_deref().unwrap_or("UNKNOWN");
                return Err(anyhow!("Gemini response empty. Finish reason: {}", reason));
            }
        }

        Err(anyhow!("Gemini response format unexpected or empty. Body: {}", response_text))
    }
}

// --- Ollama ---
#[derive(Debug)]
struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaClient {
    fn new(base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: OllamaMessageResponse,
}

#[derive(Deserialize)]
struct OllamaMessageResponse {
    content: String,
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn chat(&self, messages: &[ChatMessage], params: &ChatParams) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);

        let request_body = OllamaRequest {
            model: &self.model,
            messages,
            stream: false,
            options: OllamaOptions {
                temperature: params.temperature,
                num_predict: params.max_tokens,
            },
        };

        let resp = self.client.post(&url)
            .json(&request_body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let error_text = resp.text().await?;
            return Err(anyhow!("Ollama API error: {}", error_text));
        }

        let result: OllamaResponse = resp.json().await?;
        Ok(result.message.content)
    }
}

// --- OpenAI ---

#[derive(Debug)]
struct OpenAIClient {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAIClient {
    fn new(api_key: &str, model: &str, base_url: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessageResponse,
}

#[derive(Deserialize)]
struct OpenAIMessageResponse {
    content: Option<String>,
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn chat(&self, messages: &[ChatMessage], params: &ChatParams) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let request_body = OpenAIRequest {
            model: &self.model,
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        };

        let resp = self.client.post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request_body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await?;
            return Err(anyhow!("OpenAI API error ({}): {}", status, error_text));
        }

        let result: OpenAIResponse = resp.json().await?;
        if let Some(choice) = result.choices.first() {
             if let Some(content) = &choice.message.content {
                 return Ok(content.clone());
             }
        }

        Err(anyhow!("OpenAI response empty or missing content"))
    }
}
