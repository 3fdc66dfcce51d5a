use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::record::decision::{NextStage, RiskLevel};

use super::make_id;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedTool {
    pub tool_name: String,
    pub justification: String,
    pub inputs_needed: Vec<String>,
    pub execution_order: u32,
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPolicy {
    pub requires_approval: bool,
    pub production_environment: bool,
    pub risk_level: RiskLevel,
    pub max_execution_time_s: u32,
    pub parallel_execution: bool,
    pub rollback_required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selection {
    pub selection_id: String,
    pub decision_id: String,
    pub timestamp: DateTime<Utc>,
    pub selected_tools: Vec<SelectedTool>,
    pub total_tools: usize,
    pub policy: ExecutionPolicy,
    pub additional_inputs_needed: Vec<String>,
    pub environment_requirements: HashMap<String, serde_json::Value>,
    pub selection_confidence: f64,
    pub next_stage: NextStage,
    pub ready_for_execution: bool,
}

pub struct SelectionBuilder {
    decision_id: String,
    selected_tools: Vec<SelectedTool>,
    policy: ExecutionPolicy,
    additional_inputs_needed: Vec<String>,
    environment_requirements: HashMap<String, serde_json::Value>,
    selection_confidence: f64,
    next_stage: NextStage,
}

impl SelectionBuilder {
    pub fn new(
        decision_id: impl Into<String>,
        selected_tools: Vec<SelectedTool>,
        policy: ExecutionPolicy,
        selection_confidence: f64,
        next_stage: NextStage,
    ) -> Self {
        Self {
            decision_id: decision_id.into(),
            selected_tools,
            policy,
            additional_inputs_needed: Vec::new(),
            environment_requirements: HashMap::new(),
            selection_confidence,
            next_stage,
        }
    }

    pub fn additional_inputs_needed(mut self, inputs: Vec<String>) -> Self {
        self.additional_inputs_needed = inputs;
        self
    }

    pub fn environment_requirements(mut self, reqs: HashMap<String, serde_json::Value>) -> Self {
        self.environment_requirements = reqs;
        self
    }

    pub fn build(self) -> Result<Selection, PipelineError> {
        let mut seen_orders = HashSet::new();
        for tool in &self.selected_tools {
            if !seen_orders.insert(tool.execution_order) {
                return Err(PipelineError::Schema {
                    field: "selected_tools[].execution_order",
                    reason: format!("duplicate execution_order {}", tool.execution_order),
                });
            }
        }

        let names: HashSet<&str> = self.selected_tools.iter().map(|t| t.tool_name.as_str()).collect();
        for tool in &self.selected_tools {
            for dep in &tool.depends_on {
                if !names.contains(dep.as_str()) {
                    return Err(PipelineError::Schema {
                        field: "selected_tools[].depends_on",
                        reason: format!("'{dep}' does not name a selected tool"),
                    });
                }
            }
        }

        let ready_for_execution = self.additional_inputs_needed.is_empty()
            && (self.selected_tools.is_empty()
                || self
                    .selected_tools
                    .iter()
                    .all(|t| t.depends_on.iter().all(|d| names.contains(d.as_str()))));

        let total_tools = self.selected_tools.len();

        Ok(Selection {
            selection_id: make_id("sel"),
            decision_id: self.decision_id,
            timestamp: Utc::now(),
            selected_tools: self.selected_tools,
            total_tools,
            policy: self.policy,
            additional_inputs_needed: self.additional_inputs_needed,
            environment_requirements: self.environment_requirements,
            selection_confidence: self.selection_confidence,
            next_stage: self.next_stage,
            ready_for_execution,
        })
    }
}
