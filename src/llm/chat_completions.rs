use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::PipelineError;

use super::{estimate_tokens, GenerateRequest, GenerateResponse, LlmClient};

/// Chat-completions dialect adapter (§6): `POST /v1/chat/completions`,
/// health via `GET /health` (falls back to `GET /models`). Speaks the
/// OpenAI-compatible wire format shared by most self-hosted backends.
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    base_url: String,
    default_model: String,
    config: LlmConfig,
}

impl ChatCompletionsClient {
    pub fn new(config: LlmConfig, default_model: impl Into<String>) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .timeout(std::time::Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| PipelineError::LlmUnavailable {
                cause: format!("failed to build HTTP client: {e}"),
                elapsed_ms: 0,
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            default_model: default_model.into(),
            config,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[allow(dead_code)]
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    #[allow(dead_code)]
    total_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    model: String,
    usage: Option<ChatUsage>,
}

#[async_trait]
impl LlmClient for ChatCompletionsClient {
    async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse, PipelineError> {
        let start = Instant::now();
        let model = req.model.clone().unwrap_or_else(|| self.default_model.clone());

        let mut messages = Vec::new();
        if let Some(system) = &req.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system.clone(),
            });
        }
        let combined_for_estimate = format!(
            "{}{}",
            req.system_prompt.as_deref().unwrap_or(""),
            req.prompt
        );
        messages.push(ChatMessage {
            role: "user",
            content: req.prompt,
        });

        let prompt_tokens = estimate_tokens(&combined_for_estimate);
        let max_tokens = super::budget_max_tokens(
            req.max_tokens,
            prompt_tokens,
            self.config.context_window,
            self.config.output_reserve,
            self.config.safety_margin,
            self.config.hard_min_tokens,
        );

        let payload = ChatRequest {
            model: model.clone(),
            messages,
            temperature: req.temperature,
            max_tokens,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| PipelineError::LlmUnavailable {
                cause: format!("chat-completions request error: {e}"),
                elapsed_ms: start.elapsed().as_millis() as u64,
            })?;

        if !response.status().is_success() {
            return Err(PipelineError::LlmUnavailable {
                cause: format!("chat-completions HTTP error: {}", response.status()),
                elapsed_ms: start.elapsed().as_millis() as u64,
            });
        }

        let body: ChatResponse = response.json().await.map_err(|e| PipelineError::LlmUnavailable {
            cause: format!("chat-completions response decode error: {e}"),
            elapsed_ms: start.elapsed().as_millis() as u64,
        })?;

        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        let tokens_used = body.usage.as_ref().and_then(|u| u.completion_tokens);

        Ok(GenerateResponse {
            content,
            model: body.model,
            tokens_used,
            processing_time_ms: start.elapsed().as_millis() as u64,
            metadata: serde_json::Value::Null,
        })
    }

    async fn health_check(&self) -> bool {
        if let Ok(resp) = self.client.get(format!("{}/health", self.base_url)).send().await {
            if resp.status().is_success() {
                return true;
            }
        }
        self.client
            .get(format!("{}/models", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}
