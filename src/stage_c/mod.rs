//! Stage C: execution planning (§4.8). Turns a ready `Selection` into a
//! validated `Plan`: step generation via one LLM call, dependency
//! resolution, safety checks, and resource/observability planning.

pub mod dependency;
mod resource;
mod safety;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::config::PlannerConfig;
use crate::error::PipelineError;
use crate::llm::{GenerateRequest, LlmClient};
use crate::parser::{self, ParsedStep};
use crate::prompts::{PromptKind, PromptRegistry};
use crate::record::decision::Decision;
use crate::record::plan::{is_destructive, Plan, PlanBody, RollbackStep, Step};
use crate::record::selection::Selection;

pub struct Planner {
    llm: Arc<dyn LlmClient>,
    prompts: PromptRegistry,
    config: PlannerConfig,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, config: PlannerConfig) -> Self {
        Self {
            llm,
            prompts: PromptRegistry::new(),
            config,
        }
    }

    pub async fn create_plan(&self, decision: &Decision, selection: &Selection) -> Result<Plan, PipelineError> {
        let started = Instant::now();

        let mut vars = HashMap::new();
        vars.insert("request", decision.original_request.clone());
        vars.insert("intent", serde_json::to_string(&decision.intent).unwrap_or_default());
        vars.insert("entities", serde_json::to_string(&decision.entities).unwrap_or_default());
        vars.insert(
            "selected_tools",
            serde_json::to_string(&selection.selected_tools).unwrap_or_default(),
        );
        let rendered = self.prompts.render(PromptKind::Planning, &vars)?;

        let response = self
            .llm
            .generate(GenerateRequest {
                prompt: rendered.user,
                system_prompt: Some(rendered.system),
                temperature: 0.1,
                max_tokens: None,
                model: None,
            })
            .await?;

        let parsed_steps = parser::parse_planning_steps(&response.content)?;
        if parsed_steps.is_empty() {
            return Err(PipelineError::Validation("planner produced zero steps".to_string()));
        }

        let steps: Vec<Step> = parsed_steps.into_iter().map(to_step).collect();
        let steps = dependency::resolve_dependencies(steps)?;

        let safety_checks = safety::generate_safety_checks(&steps, &selection.policy);

        let rollback_plan = build_rollback_plan(&steps, selection.policy.rollback_required);

        let observability = resource::build_observability(&steps, selection.policy.risk_level);
        let execution_metadata = resource::build_execution_metadata(
            &steps,
            selection.policy.risk_level,
            selection.policy.requires_approval,
            &self.config,
        );

        let plan = Plan {
            plan: PlanBody {
                steps,
                safety_checks,
                rollback_plan,
                observability,
            },
            execution_metadata,
            timestamp: Utc::now(),
            processing_time_ms: started.elapsed().as_millis() as u64,
        };

        plan.validate()?;
        Ok(plan)
    }
}

fn to_step(parsed: ParsedStep) -> Step {
    let inputs: HashMap<String, serde_json::Value> = parsed.inputs.into_iter().collect();
    Step {
        id: parsed.id.unwrap_or_else(|| crate::record::make_id("step")),
        description: parsed.description,
        tool: parsed.tool,
        inputs,
        preconditions: parsed.preconditions,
        success_criteria: parsed.success_criteria,
        failure_handling: parsed.failure_handling,
        estimated_duration_s: parsed.estimated_duration_s.max(0.0) as u32,
        depends_on: parsed.depends_on,
        execution_order: 0,
    }
}

fn build_rollback_plan(steps: &[Step], rollback_required: bool) -> Vec<RollbackStep> {
    if !rollback_required {
        return Vec::new();
    }
    steps
        .iter()
        .filter(|s| is_destructive(&s.tool, &s.inputs))
        .map(|s| RollbackStep {
            step_id: s.id.clone(),
            rollback_action: format!("revert the effect of {} on {}", s.tool, s.id),
        })
        .collect()
}
