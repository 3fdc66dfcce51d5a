//! Typed `generate`/`health_check` LLM adapter (§4.2), with two wire
//! dialects (plain-generate, chat-completions) behind one trait.

mod chat_completions;
mod ollama;
pub mod testing;

pub use chat_completions::ChatCompletionsClient;
pub use ollama::OllamaClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub content: String,
    pub model: String,
    pub tokens_used: Option<u32>,
    pub processing_time_ms: u64,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// The abstract LLM backend capability. Two concrete adapters
/// (`OllamaClient`, `ChatCompletionsClient`) implement it over raw HTTP;
/// tests use `testing::ScriptedLlmClient`.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse, PipelineError>;
    async fn health_check(&self) -> bool;
}

/// Cheap token estimation proxy: `len(text) / 4`.
pub fn estimate_tokens(text: &str) -> u32 {
    (text.len() as u32 / 4).max(1)
}

/// Safe `max_tokens_out = min(requested_or_reserve, ctx - estimated_input - margin)`,
/// clamped to a hard minimum with a warning if the budget collapses below it (§4.2).
pub fn budget_max_tokens(
    requested: Option<u32>,
    prompt_tokens_estimate: u32,
    ctx: u32,
    output_reserve: u32,
    safety_margin: u32,
    hard_min: u32,
) -> u32 {
    let available = ctx.saturating_sub(prompt_tokens_estimate).saturating_sub(safety_margin);
    let wanted = requested.unwrap_or(output_reserve);
    let budget = wanted.min(available);
    if budget < hard_min {
        tracing::warn!(
            budget,
            hard_min,
            prompt_tokens_estimate,
            ctx,
            "token budget collapsed below hard minimum; clamping"
        );
        hard_min
    } else {
        budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_tokens_uses_length_over_four() {
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens(&"a".repeat(400)), 100);
    }

    #[test]
    fn budget_clamps_to_hard_minimum_when_input_is_too_large() {
        let result = budget_max_tokens(Some(500), 8000, 8192, 1024, 256, 256);
        assert_eq!(result, 256);
    }

    #[test]
    fn budget_respects_requested_when_room_allows() {
        let result = budget_max_tokens(Some(300), 100, 8192, 1024, 256, 256);
        assert_eq!(result, 300);
    }

    #[test]
    fn budget_falls_back_to_reserve_when_nothing_requested() {
        let result = budget_max_tokens(None, 100, 8192, 512, 256, 256);
        assert_eq!(result, 512);
    }
}
