//! LLM-backed content generator
//!
//! Talks to an Ollama-compatible `/api/generate` endpoint and asks for a
//! JSON draft `{"title": …, "body": …}`. Models often wrap JSON in markdown
//! fences or chatter around it, so the JSON object is extracted before
//! parsing; a response with no JSON at all is used verbatim as the body.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ContentGenerator, GeneratedContent, GenerationError, GenerationResult};
use crate::models::Draft;

/// Configuration for the LLM generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Ollama endpoint URL (default: http://localhost:11434)
    pub endpoint: String,

    /// Model name to use
    pub model: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Temperature for generation (0.0 - 1.0)
    pub temperature: f32,

    /// Extra instructions appended to every prompt (tone, length, language)
    pub style: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "qwen2.5:7b".to_string(),
            timeout_secs: 120,
            max_tokens: 1024,
            temperature: 0.7,
            style: None,
        }
    }
}

impl LlmConfig {
    /// Create config from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            endpoint: std::env::var("OLLAMA_ENDPOINT").unwrap_or(defaults.endpoint),
            model: std::env::var("OLLAMA_MODEL").unwrap_or(defaults.model),
            timeout_secs: std::env::var("OLLAMA_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_secs),
            max_tokens: std::env::var("OLLAMA_MAX_TOKENS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_tokens),
            temperature: std::env::var("OLLAMA_TEMPERATURE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.temperature),
            style: std::env::var("OLLAMA_STYLE").ok(),
        }
    }
}

/// Ollama generate request
#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

/// Ollama generation options
#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Ollama generate response
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    #[serde(default)]
    error: Option<String>,
}

/// Draft as the model is asked to return it
#[derive(Debug, Deserialize)]
struct ModelDraft {
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    error: Option<String>,
}

/// Content generator backed by an Ollama model
pub struct LlmGenerator {
    client: Client,
    config: LlmConfig,
}

impl LlmGenerator {
    /// Create a generator with custom config
    pub fn with_config(config: LlmConfig) -> GenerationResult<Self> {
        url::Url::parse(&config.endpoint)
            .map_err(|e| GenerationError::InvalidConfig(format!("endpoint: {e}")))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    /// Create a generator from environment variables
    pub fn from_env() -> GenerationResult<Self> {
        Self::with_config(LlmConfig::from_env())
    }

    /// Configuration in use
    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn build_prompt(&self, topic: &str) -> String {
        let mut prompt = format!(
            "Write a short social media post about the following topic.\n\
             Topic: {topic}\n\n\
             Respond with a single JSON object and nothing else:\n\
             {{\"title\": \"<short headline>\", \"body\": \"<post text>\"}}\n"
        );
        if let Some(style) = &self.config.style {
            prompt.push_str("\nStyle: ");
            prompt.push_str(style);
            prompt.push('\n');
        }
        prompt
    }

    async fn complete(&self, prompt: String) -> GenerationResult<String> {
        let url = format!("{}/api/generate", self.config.endpoint.trim_end_matches('/'));

        let request = OllamaRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Backend { status, body });
        }

        let ollama: OllamaResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        if let Some(error) = ollama.error {
            return Err(GenerationError::Rejected(error));
        }

        Ok(ollama.response)
    }
}

/// Parse model output into generator content
fn parse_draft(response: &str) -> GeneratedContent {
    match extract_json(response) {
        Some(json) => match serde_json::from_str::<ModelDraft>(json) {
            Ok(model) => GeneratedContent {
                draft: Draft::new(model.title.trim(), model.body.trim()),
                attachment: None,
                error: model.error,
            },
            Err(e) => {
                tracing::debug!(error = %e, "Model JSON did not match draft shape, using raw text");
                GeneratedContent::new(Draft::new("", response.trim()))
            }
        },
        None => GeneratedContent::new(Draft::new("", response.trim())),
    }
}

/// Extract a JSON object from markdown code blocks or raw text
fn extract_json(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        if let Some(end) = text[start + 7..].find("```") {
            return Some(text[start + 7..start + 7 + end].trim());
        }
    }

    if let Some(start) = text.find("```") {
        let after_start = &text[start + 3..];
        // Skip language identifier if present
        let content_start = after_start.find('\n').map_or(0, |i| i + 1);
        if let Some(end) = after_start[content_start..].find("```") {
            let block = after_start[content_start..content_start + end].trim();
            if block.starts_with('{') {
                return Some(block);
            }
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[async_trait]
impl ContentGenerator for LlmGenerator {
    fn name(&self) -> &str {
        "llm"
    }

    async fn generate(&self, topic: &str) -> GenerationResult<GeneratedContent> {
        tracing::debug!(topic = %topic, model = %self.config.model, "Generating draft");
        let response = self.complete(self.build_prompt(topic)).await?;
        let content = parse_draft(&response);
        tracing::info!(
            topic = %topic,
            chars = content.draft.char_count(),
            "Draft generated"
        );
        Ok(content)
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.config.endpoint.trim_end_matches('/'));
        self.client.get(&url).send().await.is_ok()
    }
}
