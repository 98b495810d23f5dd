//! LLM backend trait and the model-serving implementation.
//!
//! Databricks model serving exposes every foundation model behind one
//! OpenAI-compatible base URL (`<host>/serving-endpoints`); the model is
//! picked per request, so a single backend serves the whole catalog.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("API error [{status}]: {message}")]
    ApiError { status: u16, message: String },
}

// ── Request / Response ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,   // "system" | "user" | "assistant"
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    pub messages: Vec<Message>,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl LlmRequest {
    /// The usual system + user pair.
    pub fn chat(model: impl Into<String>, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system), Message::user(user)],
            model: model.into(),
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    /// `stop`, `length`, … as reported by the endpoint.
    pub finish_reason: Option<String>,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl LlmResponse {
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }

    /// The endpoint stopped because it ran out of output tokens.
    pub fn was_truncated(&self) -> bool {
        self.finish_reason.as_deref() == Some("length")
    }
}

// ── Trait ─────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError>;
    fn base_url(&self) -> &str;
}

// ── Helper: parse OpenAI-style response ──────────────────────────────────────

fn parse_openai_response(json: &serde_json::Value, fallback_model: &str) -> LlmResponse {
    let choice = &json["choices"][0];
    LlmResponse {
        content: choice["message"]["content"]
            .as_str()
            .unwrap_or("")
            .trim()
            .to_string(),
        model: json["model"]
            .as_str()
            .unwrap_or(fallback_model)
            .to_string(),
        finish_reason:     choice["finish_reason"].as_str().map(str::to_string),
        prompt_tokens:     json["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        completion_tokens: json["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
    }
}

async fn check_response_status(resp: reqwest::Response) -> Result<serde_json::Value, LlmError> {
    let status = resp.status().as_u16();
    let text = resp.text().await?;
    if status >= 400 {
        let body: serde_json::Value = serde_json::from_str(&text).unwrap_or_default();
        let msg = body["error"]["message"]
            .as_str()
            .or_else(|| body["message"].as_str())
            .map(str::to_string)
            .unwrap_or(text);
        return Err(LlmError::ApiError { status, message: msg });
    }
    Ok(serde_json::from_str(&text)?)
}

// ── Model serving (OpenAI-compatible) ────────────────────────────────────────

pub struct ServingEndpointBackend {
    pub base_url: String,
    api_key: SecretString,
    client: reqwest::Client,
}

impl ServingEndpointBackend {
    pub fn new(base_url: impl Into<String>, api_key: SecretString) -> Self {
        Self::with_client(base_url, api_key, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, api_key: SecretString, client: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, api_key, client }
    }
}

#[async_trait]
impl LlmBackend for ServingEndpointBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model":       req.model,
            "messages":    req.messages,
            "max_tokens":  req.max_tokens.unwrap_or(1000),
            "temperature": req.temperature.unwrap_or(0.1),
        });

        tracing::info!(model = %req.model, "Calling model serving endpoint");
        let resp = self.client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;
        let json = check_response_status(resp).await?;
        let parsed = parse_openai_response(&json, &req.model);
        tracing::debug!(
            model = %parsed.model,
            prompt_tokens = parsed.prompt_tokens,
            completion_tokens = parsed.completion_tokens,
            finish_reason = parsed.finish_reason.as_deref().unwrap_or("-"),
            "Completion received"
        );
        Ok(parsed)
    }

    fn base_url(&self) -> &str { &self.base_url }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
