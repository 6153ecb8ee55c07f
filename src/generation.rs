//! Text generation provider abstraction and implementations.
//!
//! Mirrors [`crate::embedding`]: a [`GenerationProvider`] trait with Gemini,
//! OpenAI, Ollama and disabled backends, built once by [`create_provider`]
//! and injected into the [`Responder`](crate::responder::Responder).
//!
//! Each call sends one fully rendered prompt and returns the generated text.
//! A response withheld by the service's content policy is an error, not an
//! empty answer.

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::GenerationConfig;
use crate::http;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn model_name(&self) -> &str;

    /// Fails with the reason when the provider cannot be used (e.g. missing credential).
    fn ensure_configured(&self) -> Result<()> {
        Ok(())
    }

    /// Generate a completion for a single rendered prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

// ============ Disabled Provider ============

pub struct DisabledGenerator {
    reason: String,
}

impl DisabledGenerator {
    pub fn new() -> Self {
        Self {
            reason: "Generation provider is disabled".to_string(),
        }
    }

    pub fn with_reason(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Default for DisabledGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationProvider for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn ensure_configured(&self) -> Result<()> {
        bail!("{}", self.reason)
    }
    async fn generate(&self, _prompt: &str) -> Result<String> {
        bail!("{}", self.reason)
    }
}

// ============ Gemini ============

/// Calls `POST {base}/models/{model}:generateContent`.
/// Requires `GOOGLE_API_KEY` (or `GEMINI_API_KEY`).
pub struct GeminiGenerator {
    model: String,
    temperature: f32,
    base_url: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = http::api_key(&["GOOGLE_API_KEY", "GEMINI_API_KEY"])?;
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| "gemini-2.5-flash".to_string());
        Ok(Self {
            model: model.trim_start_matches("models/").to_string(),
            temperature: config.temperature,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            api_key,
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl GenerationProvider for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": self.temperature },
        });
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let json = http::post_json_with_retry("Gemini generation", self.max_retries, || {
            self.client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
        })
        .await?;

        parse_gemini_response(&json)
    }
}

/// Join the text parts of the first candidate; a blocked prompt or a
/// safety-stopped candidate is an error.
fn parse_gemini_response(json: &serde_json::Value) -> Result<String> {
    if let Some(reason) = json
        .pointer("/promptFeedback/blockReason")
        .and_then(|r| r.as_str())
    {
        bail!("Gemini rejected the prompt (content policy: {})", reason);
    }

    let candidate = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| anyhow::anyhow!("Gemini returned no candidates"))?;

    let finish = candidate
        .get("finishReason")
        .and_then(|f| f.as_str())
        .unwrap_or("");
    let parts = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array());

    let text: String = parts
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        match finish {
            "SAFETY" | "PROHIBITED_CONTENT" | "BLOCKLIST" | "SPII" => {
                bail!("Gemini withheld the response (content policy: {})", finish)
            }
            _ => bail!("Gemini returned an empty response (finish reason: {})", finish),
        }
    }
    Ok(text)
}

// ============ OpenAI ============

/// Calls the chat completions endpoint with a single user message.
/// Requires `OPENAI_API_KEY`.
pub struct OpenAIGenerator {
    model: String,
    temperature: f32,
    base_url: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = http::api_key(&["OPENAI_API_KEY"])?;
        Ok(Self {
            model: config
                .model
                .clone()
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            temperature: config.temperature,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            api_key,
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl GenerationProvider for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let url = format!("{}/chat/completions", self.base_url);

        let json = http::post_json_with_retry("OpenAI chat", self.max_retries, || {
            self.client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
        })
        .await?;

        parse_openai_response(&json)
    }
}

fn parse_openai_response(json: &serde_json::Value) -> Result<String> {
    let choice = json
        .pointer("/choices/0")
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing choices"))?;
    if choice.get("finish_reason").and_then(|f| f.as_str()) == Some("content_filter") {
        bail!("OpenAI withheld the response (content policy)");
    }
    choice
        .pointer("/message/content")
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing message content"))
}

// ============ Ollama ============

/// Calls `POST /api/generate` on a local Ollama instance (non-streaming).
pub struct OllamaGenerator {
    model: String,
    temperature: f32,
    url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.clone().unwrap_or_else(|| "llama3.1".to_string()),
            temperature: config.temperature,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OLLAMA_BASE_URL.to_string()),
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl GenerationProvider for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": self.temperature },
        });
        let url = format!("{}/api/generate", self.url);

        let json = http::post_json_with_retry("Ollama generation", self.max_retries, || {
            self.client.post(&url).json(&body)
        })
        .await?;

        json.get("response")
            .and_then(|r| r.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response field"))
    }
}

// ============ Factory ============

/// Create the generation provider named by `config.provider`.
pub fn create_provider(config: &GenerationConfig) -> Result<Box<dyn GenerationProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledGenerator::new())),
        "gemini" => Ok(Box::new(GeminiGenerator::new(config)?)),
        "openai" => Ok(Box::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Box::new(OllamaGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}
