//! In-memory LLM fake for tests, in the shape of the teacher's
//! `MockLlmCaller`: a queue of scripted responses, replayed in order,
//! with every call recorded for later assertions.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::PipelineError;

use super::{GenerateRequest, GenerateResponse, LlmClient};

pub struct ScriptedLlmClient {
    responses: Mutex<Vec<Result<GenerateResponse, String>>>,
    calls: Mutex<Vec<GenerateRequest>>,
    healthy: bool,
}

impl ScriptedLlmClient {
    pub fn new(responses: Vec<GenerateResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Ok).collect()),
            calls: Mutex::new(Vec::new()),
            healthy: true,
        }
    }

    pub fn with_content(contents: Vec<&str>) -> Self {
        Self::new(
            contents
                .into_iter()
                .map(|c| GenerateResponse {
                    content: c.to_string(),
                    model: "scripted".to_string(),
                    tokens_used: Some(10),
                    processing_time_ms: 1,
                    metadata: serde_json::Value::Null,
                })
                .collect(),
        )
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<GenerateRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse, PipelineError> {
        self.calls.lock().unwrap().push(req);
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(PipelineError::LlmUnavailable {
                cause: "ScriptedLlmClient: no more programmed responses".to_string(),
                elapsed_ms: 0,
            });
        }
        match responses.remove(0) {
            Ok(resp) => Ok(resp),
            Err(cause) => Err(PipelineError::LlmUnavailable { cause, elapsed_ms: 0 }),
        }
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }
}
