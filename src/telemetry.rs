use std::sync::Mutex;

/// Per-stage timing and error counters, owned by the orchestrator and
/// passed explicitly. Mirrors the teacher's single-mutex trace pattern:
/// observational only, never consulted by the pipeline's own logic.
#[derive(Debug, Default)]
pub struct PipelineTelemetry {
    inner: Mutex<TelemetryInner>,
}

#[derive(Debug, Default, Clone)]
struct TelemetryInner {
    records: Vec<StageRecord>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StageRecord {
    pub stage: &'static str,
    pub elapsed_ms: u64,
    pub llm_calls: u32,
    pub error: Option<String>,
}

impl PipelineTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_stage(&self, stage: &'static str, elapsed_ms: u64, llm_calls: u32, error: Option<String>) {
        let mut guard = self.inner.lock().expect("telemetry mutex poisoned");
        guard.records.push(StageRecord {
            stage,
            elapsed_ms,
            llm_calls,
            error,
        });
    }

    pub fn records(&self) -> Vec<StageRecord> {
        self.inner.lock().expect("telemetry mutex poisoned").records.clone()
    }
}

/// Per-request candidate-retrieval telemetry (§4.6 step 4).
#[derive(Debug, Clone, serde::Serialize)]
pub struct RetrievalTelemetry {
    pub request_id: String,
    pub catalog_size: usize,
    pub candidates_before_budget: usize,
    pub rows_sent: usize,
    pub budget_used_tokens: u32,
    pub headroom_left_pct: i32,
    pub retrieval_ms: u64,
}
