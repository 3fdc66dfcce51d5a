use std::collections::HashMap;
use tokio::time::Instant;

/// Per-request context threaded through every stage: a deadline, an
/// environment hint used by policy synthesis, and an opaque map carried
/// through to the `Decision` record unchanged.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub deadline: Option<Instant>,
    pub environment: Option<String>,
    pub extra: HashMap<String, serde_json::Value>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn is_production(&self) -> bool {
        self.environment.as_deref() == Some("production")
    }

    /// Remaining time budget, or `None` if no deadline was set.
    pub fn remaining(&self) -> Option<std::time::Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.remaining(), Some(d) if d.is_zero())
    }
}
