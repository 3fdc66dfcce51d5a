use thiserror::Error;

/// The crate-wide error taxonomy. Every fallible public operation returns
/// one of these variants; stages never invent their own error types.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("LLM unavailable: {cause} (after {elapsed_ms}ms)")]
    LlmUnavailable { cause: String, elapsed_ms: u64 },

    #[error("LLM response failed {kind} validation: {cause}")]
    LlmParse {
        kind: &'static str,
        cause: String,
        raw_response: String,
    },

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("tool index query failed: {0}")]
    Index(String),

    #[error("tool '{0}' selected but not present in the catalog")]
    CatalogLookupMiss(String),

    #[error("record invariant violated: {field}: {reason}")]
    Schema { field: &'static str, reason: String },

    #[error("dependency graph error: {0}")]
    Dependency(String),

    #[error("plan failed validation: {0}")]
    Validation(String),

    #[error("cancelled: {0}")]
    Cancelled(&'static str),
}

impl PipelineError {
    /// The stable taxonomy tag used in the structured `ErrorReport`.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::LlmUnavailable { .. } => "LlmUnavailable",
            PipelineError::LlmParse { .. } => "LlmParse",
            PipelineError::Embedding(_) => "Embedding",
            PipelineError::Index(_) => "Index",
            PipelineError::CatalogLookupMiss(_) => "CatalogLookupMiss",
            PipelineError::Schema { .. } => "Schema",
            PipelineError::Dependency(_) => "Dependency",
            PipelineError::Validation(_) => "Validation",
            PipelineError::Cancelled(_) => "Cancelled",
        }
    }
}

/// Structured, user-visible failure record the orchestrator builds from a
/// `PipelineError` before handing it back to the caller.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ErrorReport {
    pub kind: &'static str,
    pub stage: &'static str,
    pub cause_chain: Vec<String>,
    pub elapsed_ms: u64,
}

impl ErrorReport {
    pub fn from_error(stage: &'static str, err: &PipelineError, elapsed_ms: u64) -> Self {
        let mut cause_chain = vec![err.to_string()];
        let mut source = std::error::Error::source(err);
        while let Some(s) = source {
            cause_chain.push(s.to_string());
            source = s.source();
        }
        Self {
            kind: err.kind(),
            stage,
            cause_chain,
            elapsed_ms,
        }
    }
}
