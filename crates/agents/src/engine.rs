use std::collections::VecDeque;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use hearth_core::EnginePrompt;
use parking_lot::Mutex;
use reqwest::Client;

const DEFAULT_MODEL: &str = "gpt-4.1-mini";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Opaque text generator behind plan synthesis and chat.
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &EnginePrompt) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn from_env() -> Option<Self> {
        let api_key = env_value("HEARTH_OPENAI_API_KEY")?;
        let mut config = Self::new(api_key);
        if let Some(model) = env_value("HEARTH_OPENAI_MODEL") {
            config.model = model;
        }
        if let Some(base_url) = env_value("HEARTH_OPENAI_BASE_URL") {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }
        Some(config)
    }
}

fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Reasoning engine backed by the OpenAI Responses API.
pub struct OpenAiResponsesEngine {
    config: OpenAiConfig,
    http: Client,
}

impl OpenAiResponsesEngine {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(6))
            .timeout(Duration::from_secs(120))
            .build()
            .context("failed to build reasoning engine HTTP client")?;
        Ok(Self { config, http })
    }
}

#[async_trait]
impl ReasoningEngine for OpenAiResponsesEngine {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, prompt: &EnginePrompt) -> Result<String> {
        let payload = serde_json::json!({
            "model": self.config.model,
            "input": [
                {
                    "role": "system",
                    "content": [
                        { "type": "input_text", "text": prompt.system }
                    ]
                },
                {
                    "role": "user",
                    "content": [
                        { "type": "input_text", "text": prompt.user }
                    ]
                }
            ]
        });

        let response = self
            .http
            .post(format!("{}/responses", self.config.base_url))
            .bearer_auth(self.config.api_key.as_str())
            .json(&payload)
            .send()
            .await
            .context("reasoning engine request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "reasoning engine non-success status {}: {}",
                status.as_u16(),
                hearth_core::preview(&body, 400)
            );
        }

        let body: serde_json::Value = response
            .json()
            .await
            .context("reasoning engine response parse failed")?;
        extract_output_text(&body)
            .filter(|value| !value.trim().is_empty())
            .context("reasoning engine output text missing")
    }
}

fn extract_output_text(payload: &serde_json::Value) -> Option<String> {
    if let Some(value) = payload.get("output_text").and_then(|value| value.as_str()) {
        return Some(value.to_string());
    }
    let output = payload.get("output")?.as_array()?;
    let mut chunks = Vec::new();
    for item in output {
        let Some(content) = item.get("content").and_then(|value| value.as_array()) else {
            continue;
        };
        for content_item in content {
            let is_text = content_item
                .get("type")
                .and_then(|value| value.as_str())
                .is_some_and(|value| value == "output_text");
            if let Some(text) = content_item
                .get("text")
                .and_then(|value| value.as_str())
                .filter(|_| is_text)
            {
                chunks.push(text.to_string());
            }
        }
    }
    if chunks.is_empty() {
        None
    } else {
        Some(chunks.join("\n\n"))
    }
}

/// OpenAI-backed engine when configured, otherwise [`UnavailableEngine`].
pub fn build_engine(config: Option<OpenAiConfig>) -> Result<Arc<dyn ReasoningEngine>> {
    Ok(match config {
        Some(config) => Arc::new(OpenAiResponsesEngine::new(config)?),
        None => Arc::new(UnavailableEngine),
    })
}

/// Stand-in used when no engine credential is configured.
#[derive(Debug, Default)]
pub struct UnavailableEngine;

#[async_trait]
impl ReasoningEngine for UnavailableEngine {
    fn model_name(&self) -> &str {
        "unavailable"
    }

    async fn complete(&self, _prompt: &EnginePrompt) -> Result<String> {
        anyhow::bail!("reasoning engine is not configured (set HEARTH_OPENAI_API_KEY)")
    }
}

/// Replays queued replies in order and records every prompt it sees.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    prompts: Mutex<Vec<EnginePrompt>>,
}

impl ScriptedEngine {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|reply| Ok(reply.into())).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies.lock().push_back(Ok(reply.into()));
    }

    pub fn push_failure(&self, message: impl Into<String>) {
        self.replies.lock().push_back(Err(message.into()));
    }

    pub fn prompts(&self) -> Vec<EnginePrompt> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl ReasoningEngine for ScriptedEngine {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &EnginePrompt) -> Result<String> {
        self.prompts.lock().push(prompt.clone());
        match self.replies.lock().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => anyhow::bail!("scripted engine has no reply left"),
        }
    }
}
