use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::LlmConfig;
use crate::error::PipelineError;

use super::{estimate_tokens, GenerateRequest, GenerateResponse, LlmClient};

/// Plain-generate dialect adapter (§6): `POST /api/generate`,
/// health via `GET /api/tags`. Matches Ollama's wire format.
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    default_model: String,
    config: LlmConfig,
}

impl OllamaClient {
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
struct OllamaOptions {
    temperature: f64,
    num_ctx: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    model: String,
    eval_count: Option<u32>,
    total_duration: Option<u64>,
    load_duration: Option<u64>,
    prompt_eval_count: Option<u32>,
    eval_duration: Option<u64>,
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse, PipelineError> {
        let start = Instant::now();
        let model = req.model.clone().unwrap_or_else(|| self.default_model.clone());

        let prompt_tokens = estimate_tokens(&req.prompt);
        let max_tokens = req.max_tokens.map(|requested| {
            super::budget_max_tokens(
                Some(requested),
                prompt_tokens,
                self.config.context_window,
                self.config.output_reserve,
                self.config.safety_margin,
                self.config.hard_min_tokens,
            )
        });

        let payload = OllamaRequest {
            model: model.clone(),
            prompt: req.prompt,
            stream: false,
            options: OllamaOptions {
                temperature: req.temperature,
                num_ctx: self.config.context_window,
                num_predict: max_tokens,
            },
            system: req.system_prompt,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| PipelineError::LlmUnavailable {
                cause: format!("ollama request error: {e}"),
                elapsed_ms: start.elapsed().as_millis() as u64,
            })?;

        if !response.status().is_success() {
            return Err(PipelineError::LlmUnavailable {
                cause: format!("ollama HTTP error: {}", response.status()),
                elapsed_ms: start.elapsed().as_millis() as u64,
            });
        }

        let body: OllamaResponse = response.json().await.map_err(|e| PipelineError::LlmUnavailable {
            cause: format!("ollama response decode error: {e}"),
            elapsed_ms: start.elapsed().as_millis() as u64,
        })?;

        let processing_time_ms = start.elapsed().as_millis() as u64;
        Ok(GenerateResponse {
            content: body.response,
            model: body.model,
            tokens_used: body.eval_count,
            processing_time_ms,
            metadata: json!({
                "total_duration": body.total_duration,
                "load_duration": body.load_duration,
                "prompt_eval_count": body.prompt_eval_count,
                "eval_duration": body.eval_duration,
            }),
        })
    }

    async fn health_check(&self) -> bool {
        match self.client.get(format!("{}/api/tags", self.base_url)).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}
