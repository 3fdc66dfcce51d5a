use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub description: String,
    pub tool: String,
    #[serde(default)]
    pub inputs: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub preconditions: Vec<String>,
    #[serde(default)]
    pub success_criteria: Vec<String>,
    #[serde(default)]
    pub failure_handling: String,
    pub estimated_duration_s: u32,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub execution_order: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyStage {
    Before,
    During,
    After,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyFailureAction {
    Abort,
    Warn,
    Continue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyCheck {
    pub check: String,
    pub stage: SafetyStage,
    pub failure_action: SafetyFailureAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackStep {
    pub step_id: String,
    pub rollback_action: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub metrics_to_collect: Vec<String>,
    pub logs_to_monitor: Vec<String>,
    pub alerts_to_set: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanBody {
    pub steps: Vec<Step>,
    pub safety_checks: Vec<SafetyCheck>,
    pub rollback_plan: Vec<RollbackStep>,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    pub total_estimated_time_s: u32,
    pub risk_factors: Vec<String>,
    pub approval_points: Vec<String>,
    pub checkpoint_steps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub plan: PlanBody,
    pub execution_metadata: ExecutionMetadata,
    pub timestamp: DateTime<Utc>,
    pub processing_time_ms: u64,
}

/// The tool+action combinations treated as destructive (§4.8.3).
pub fn is_destructive(tool: &str, inputs: &HashMap<String, serde_json::Value>) -> bool {
    let action = inputs
        .get("action")
        .or_else(|| inputs.get("operation"))
        .and_then(|v| v.as_str())
        .unwrap_or("");

    match tool {
        "systemctl" => matches!(
            action,
            "start" | "stop" | "restart" | "enable" | "disable" | "reload"
        ),
        "file_manager" | "config_manager" => true,
        "docker" => matches!(action, "start" | "stop" | "restart" | "remove" | "create" | "build"),
        "network_tools" => matches!(action, "configure" | "restart" | "modify"),
        _ => false,
    }
}

impl Plan {
    /// Validates all Plan-level invariants from §3/§8. Called once by the
    /// planner right after construction.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.plan.steps.is_empty() {
            return Err(PipelineError::Validation("plan has no steps".to_string()));
        }

        let ids: HashSet<&str> = self.plan.steps.iter().map(|s| s.id.as_str()).collect();
        if ids.len() != self.plan.steps.len() {
            return Err(PipelineError::Validation("step ids are not unique".to_string()));
        }

        let resolver = crate::stage_c::dependency::DependencyGraph::build(&self.plan.steps);
        resolver
            .check_acyclic()
            .map_err(|e| PipelineError::Validation(format!("dependency graph: {e}")))?;

        let mut seen_orders = HashSet::new();
        for step in &self.plan.steps {
            if !seen_orders.insert(step.execution_order) {
                return Err(PipelineError::Validation(format!(
                    "duplicate execution_order {}",
                    step.execution_order
                )));
            }
        }
        if !resolver.is_valid_topological_order(&self.plan.steps) {
            return Err(PipelineError::Validation(
                "execution_order is not a valid topological numbering".to_string(),
            ));
        }

        if self.plan.safety_checks.is_empty() {
            return Err(PipelineError::Validation("plan has no safety checks".to_string()));
        }

        let rollback_ids: HashSet<&str> = self.plan.rollback_plan.iter().map(|r| r.step_id.as_str()).collect();
        for step in &self.plan.steps {
            if is_destructive(&step.tool, &step.inputs) {
                let has_before_check = self
                    .plan
                    .safety_checks
                    .iter()
                    .any(|c| c.stage == SafetyStage::Before && c.check.contains(step.tool.as_str()))
                    || self.plan.safety_checks.iter().any(|c| c.stage == SafetyStage::Before);
                if !has_before_check {
                    return Err(PipelineError::Validation(format!(
                        "destructive step {} has no before-stage safety check",
                        step.id
                    )));
                }
            }
        }

        let total: u32 = self.plan.steps.iter().map(|s| s.estimated_duration_s).sum();
        if total == 0 {
            return Err(PipelineError::Validation(
                "total_estimated_time_s must be > 0".to_string(),
            ));
        }
        if self.execution_metadata.total_estimated_time_s != total {
            return Err(PipelineError::Validation(
                "total_estimated_time_s does not match the sum of step durations".to_string(),
            ));
        }

        let _ = rollback_ids; // rollback completeness per-policy is checked by the safety planner, not here
        Ok(())
    }
}
