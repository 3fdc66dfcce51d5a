//! Versioned, validated records exchanged between pipeline stages.
//!
//! Every record is an immutable value: construction validates all
//! invariants named in the data model and returns `PipelineError::Schema`
//! on violation. Stages treat a schema error as an internal bug — it
//! means some stage emitted a malformed record.

pub mod decision;
pub mod plan;
pub mod selection;

pub use decision::{ConfidenceLevel, Decision, DecisionType, Entity, Intent, IntentCategory, NextStage, RiskLevel};
pub use plan::{
    ExecutionMetadata, ObservabilityConfig, Plan, RollbackStep, SafetyCheck, SafetyFailureAction,
    SafetyStage, Step,
};
pub use selection::{ExecutionPolicy, Selection, SelectedTool};

use chrono::Utc;
use uuid::Uuid;

/// Builds an opaque, time-prefixed id: `{prefix}_{YYYYMMDD_HHMMSS}_{8 hex}`.
pub fn make_id(prefix: &str) -> String {
    let now = Utc::now().format("%Y%m%d_%H%M%S");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{now}_{}", &suffix[..8])
}
