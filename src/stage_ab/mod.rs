//! Stage AB: semantic tool selection (§4.6, §4.7). Embeds the request,
//! retrieves a token-budgeted candidate slice from the tool index, asks
//! the LLM to pick the minimal subset, validates the picks against the
//! authoritative catalog, and synthesizes an execution policy.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use crate::config::{LlmConfig, RetrievalConfig};
use crate::error::PipelineError;
use crate::llm::{GenerateRequest, LlmClient};
use crate::parser;
use crate::prompts::{PromptKind, PromptRegistry};
use crate::record::decision::{Decision, NextStage, RiskLevel};
use crate::record::selection::{ExecutionPolicy, Selection, SelectedTool, SelectionBuilder};
use crate::retrieval::{CandidateTool, Embedder, ToolCatalog, ToolIndex};
use crate::telemetry::RetrievalTelemetry;

const SUDO_TOOLS: [&str; 6] = ["systemctl", "iptables", "useradd", "usermod", "apt", "yum"];

/// Inputs always available to a step regardless of extracted entities
/// (§4.7 step 6); never counted toward `additional_inputs_needed`.
const ALWAYS_AVAILABLE_INPUTS: [&str; 3] = ["user_request", "timestamp", "decision_id"];

/// Entity type to the set of input names it can satisfy (§4.7 step 6).
fn entity_input_names(entity_type: &str) -> &'static [&'static str] {
    match entity_type {
        "service" => &["service_name", "service"],
        "hostname" => &["hostname", "host", "target"],
        "command" => &["command", "cmd"],
        "file_path" => &["path", "file", "file_path"],
        "port" => &["port"],
        "environment" => &["environment", "env"],
        _ => &[],
    }
}

pub struct Selector {
    llm: Arc<dyn LlmClient>,
    prompts: PromptRegistry,
    catalog: Arc<dyn ToolCatalog>,
    index: Arc<dyn ToolIndex>,
    embedder: Arc<dyn Embedder>,
    llm_config: LlmConfig,
    retrieval_config: RetrievalConfig,
}

impl Selector {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        catalog: Arc<dyn ToolCatalog>,
        index: Arc<dyn ToolIndex>,
        embedder: Arc<dyn Embedder>,
        llm_config: LlmConfig,
        retrieval_config: RetrievalConfig,
    ) -> Self {
        Self {
            llm,
            prompts: PromptRegistry::new(),
            catalog,
            index,
            embedder,
            llm_config,
            retrieval_config,
        }
    }

    pub async fn process(&self, decision: &Decision) -> Result<(Selection, RetrievalTelemetry), PipelineError> {
        let started = Instant::now();
        let request = &decision.original_request;

        let vector = match self.embedder.embed(request).await {
            Ok(vector) => Some(vector),
            Err(err) if self.retrieval_config.fallback_to_keyword => {
                tracing::warn!(error = %err, "embedder failed, falling back to keyword-only retrieval");
                None
            }
            Err(err) => return Err(err),
        };
        let (_, max_rows) =
            self.index
                .calculate_token_budget(self.llm_config.context_window, &self.retrieval_config, self.llm_config.output_reserve);

        let platform_filter = decision
            .context
            .get("platform")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let candidates = self
            .index
            .retrieve_candidates(request, vector.as_deref(), platform_filter.as_deref(), max_rows)
            .await?;
        let candidates_before_budget = self.index.catalog_size().await;

        let retrieval_telemetry = RetrievalTelemetry {
            request_id: decision.decision_id.clone(),
            catalog_size: candidates_before_budget,
            candidates_before_budget: candidates.len(),
            rows_sent: candidates.len(),
            budget_used_tokens: (candidates.len() as u32) * self.retrieval_config.tokens_per_row_est,
            headroom_left_pct: headroom_pct(&candidates, max_rows),
            retrieval_ms: started.elapsed().as_millis() as u64,
        };

        if candidates.is_empty() {
            let selection = SelectionBuilder::new(
                decision.decision_id.clone(),
                vec![],
                empty_policy(decision),
                decision.overall_confidence,
                NextStage::StageD,
            )
            .build()?;
            return Ok((selection, retrieval_telemetry));
        }

        let selection = self.select_tools(decision, &candidates).await?;
        Ok((selection, retrieval_telemetry))
    }

    async fn select_tools(
        &self,
        decision: &Decision,
        candidates: &[CandidateTool],
    ) -> Result<Selection, PipelineError> {
        let mut vars = HashMap::new();
        vars.insert("request", decision.original_request.clone());
        vars.insert("candidates", serde_json::to_string(candidates).unwrap_or_default());
        let rendered = self.prompts.render(PromptKind::ToolSelection, &vars)?;

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

        let parsed = parser::parse_tool_selection(&response.content)?;

        let by_id: HashMap<&str, &CandidateTool> = candidates.iter().map(|c| (c.id.as_str(), c)).collect();

        if parsed.select.is_empty() {
            let selection = SelectionBuilder::new(
                decision.decision_id.clone(),
                vec![],
                empty_policy(decision),
                parsed.confidence,
                NextStage::StageD,
            )
            .build()?;
            return Ok(selection);
        }

        let mut selected_names = HashSet::new();
        let mut tool_specs = Vec::new();
        for picked in &parsed.select {
            let candidate = by_id
                .get(picked.id.as_str())
                .ok_or_else(|| PipelineError::CatalogLookupMiss(picked.id.clone()))?;
            let spec = self
                .catalog
                .get_by_name(&candidate.name)
                .await
                .ok_or_else(|| PipelineError::CatalogLookupMiss(candidate.name.clone()))?;
            selected_names.insert(spec.name.clone());
            tool_specs.push((picked, spec));
        }

        let mut selected_tools = Vec::with_capacity(tool_specs.len());
        let mut additional_inputs: HashSet<String> = HashSet::new();
        let mut environment_requirements: HashMap<String, serde_json::Value> = HashMap::new();
        let mut rollback_required = false;

        let known_entity_inputs: HashSet<&'static str> = decision
            .entities
            .iter()
            .flat_map(|e| entity_input_names(&e.entity_type).iter().copied())
            .collect();

        for (order, (picked, spec)) in tool_specs.iter().enumerate() {
            let depends_on: Vec<String> = spec
                .dependencies
                .iter()
                .filter(|dep| selected_names.contains(*dep))
                .cloned()
                .collect();

            for input in &spec.inputs_needed {
                if !known_entity_inputs.contains(input.as_str()) && !ALWAYS_AVAILABLE_INPUTS.contains(&input.as_str()) {
                    additional_inputs.insert(input.clone());
                }
            }

            if SUDO_TOOLS.contains(&spec.name.as_str()) {
                environment_requirements.insert("sudo_required".to_string(), serde_json::Value::Bool(true));
            }
            if !spec.production_safe && decision.context.get("environment").and_then(|v| v.as_str()) == Some("production") {
                rollback_required = true;
            }

            selected_tools.push(SelectedTool {
                tool_name: spec.name.clone(),
                justification: picked.why.clone(),
                inputs_needed: spec.inputs_needed.clone(),
                execution_order: (order + 1) as u32,
                depends_on,
            });
        }

        let risk_level = parse_risk(&parsed.risk_level).unwrap_or(decision.risk_level).max(decision.risk_level);
        rollback_required = rollback_required || matches!(risk_level, RiskLevel::High | RiskLevel::Critical);

        let policy = ExecutionPolicy {
            requires_approval: decision.requires_approval || matches!(risk_level, RiskLevel::High | RiskLevel::Critical),
            production_environment: decision.context.get("environment").and_then(|v| v.as_str()) == Some("production"),
            risk_level,
            max_execution_time_s: if selected_tools.len() > 3 { 600 } else { 300 },
            parallel_execution: selected_tools.len() > 1 && risk_level == RiskLevel::Low,
            rollback_required,
        };

        let next_stage = if selected_tools.is_empty() { NextStage::StageD } else { NextStage::StageC };

        SelectionBuilder::new(decision.decision_id.clone(), selected_tools, policy, parsed.confidence, next_stage)
            .additional_inputs_needed(additional_inputs.into_iter().collect())
            .environment_requirements(environment_requirements)
            .build()
    }
}

fn empty_policy(decision: &Decision) -> ExecutionPolicy {
    ExecutionPolicy {
        requires_approval: decision.requires_approval,
        production_environment: decision.context.get("environment").and_then(|v| v.as_str()) == Some("production"),
        risk_level: decision.risk_level,
        max_execution_time_s: 0,
        parallel_execution: false,
        rollback_required: false,
    }
}

fn parse_risk(raw: &str) -> Option<RiskLevel> {
    match raw.to_lowercase().as_str() {
        "low" => Some(RiskLevel::Low),
        "medium" => Some(RiskLevel::Medium),
        "high" => Some(RiskLevel::High),
        "critical" => Some(RiskLevel::Critical),
        _ => None,
    }
}

fn headroom_pct(candidates: &[CandidateTool], max_rows: usize) -> i32 {
    if max_rows == 0 {
        return 0;
    }
    let used = candidates.len().min(max_rows);
    (((max_rows - used) as f64 / max_rows as f64) * 100.0) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedLlmClient;
    use crate::record::decision::{DecisionBuilder, DecisionType, Intent, IntentCategory};
    use crate::retrieval::testing::{FakeEmbedder, InMemoryCatalog, InMemoryIndex};
    use crate::retrieval::ToolSpec;

    fn decision() -> Decision {
        DecisionBuilder::new(
            DecisionType::Action,
            Intent {
                category: IntentCategory::Automation,
                action: "restart_service".to_string(),
                confidence: 0.9,
                capabilities: vec![],
            },
            0.9,
            RiskLevel::High,
            "restart nginx",
            NextStage::StageAb,
        )
        .build()
        .unwrap()
    }

    fn selector(llm_responses: Vec<&str>) -> Selector {
        let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::with_content(llm_responses));
        let catalog: Arc<dyn ToolCatalog> = Arc::new(InMemoryCatalog::new(vec![ToolSpec {
            name: "systemctl".to_string(),
            description: "control services".to_string(),
            platform: Some("linux".to_string()),
            capabilities: vec!["service_control".to_string()],
            inputs_needed: vec!["service_name".to_string()],
            permission_level: "elevated".to_string(),
            production_safe: true,
            dependencies: vec![],
        }]));
        let index: Arc<dyn ToolIndex> = Arc::new(InMemoryIndex::new(vec![CandidateTool {
            id: "tool_1".to_string(),
            name: "systemctl".to_string(),
            desc: "control services".to_string(),
            tags: vec!["service".to_string()],
            platform: Some("linux".to_string()),
            cost: 1.0,
        }]));
        let embedder: Arc<dyn Embedder> = Arc::new(FakeEmbedder::new(16));
        Selector::new(llm, catalog, index, embedder, LlmConfig::default(), RetrievalConfig::default())
    }

    #[tokio::test]
    async fn selects_tool_and_flags_sudo_requirement() {
        let selector = selector(vec![
            r#"{"intent": {}, "entities": [], "select": [{"id": "tool_1", "why": "restarts the service"}], "confidence": 0.9, "risk_level": "high"}"#,
        ]);
        let (selection, _) = selector.process(&decision()).await.unwrap();
        assert_eq!(selection.selected_tools.len(), 1);
        assert_eq!(selection.selected_tools[0].tool_name, "systemctl");
        assert_eq!(
            selection.environment_requirements.get("sudo_required"),
            Some(&serde_json::Value::Bool(true))
        );
        assert_eq!(selection.next_stage, NextStage::StageC);
        assert!(selection.policy.rollback_required);
    }

    #[tokio::test]
    async fn empty_selection_routes_to_stage_d() {
        let selector = selector(vec![
            r#"{"intent": {}, "entities": [], "select": [], "confidence": 0.4, "risk_level": "low"}"#,
        ]);
        let (selection, _) = selector.process(&decision()).await.unwrap();
        assert!(selection.selected_tools.is_empty());
        assert_eq!(selection.next_stage, NextStage::StageD);
    }

    #[tokio::test]
    async fn high_risk_selection_is_not_parallel_and_keeps_the_default_time_budget() {
        let selector = selector(vec![
            r#"{"intent": {}, "entities": [], "select": [{"id": "tool_1", "why": "restarts the service"}], "confidence": 0.9, "risk_level": "high"}"#,
        ]);
        let (selection, _) = selector.process(&decision()).await.unwrap();
        assert!(!selection.policy.parallel_execution);
        assert_eq!(selection.policy.max_execution_time_s, 300);
    }

    #[test]
    fn service_name_entity_satisfies_either_spelling() {
        assert!(entity_input_names("service").contains(&"service_name"));
        assert!(entity_input_names("service").contains(&"service"));
        assert!(entity_input_names("hostname").contains(&"target"));
    }

    #[tokio::test]
    async fn embedder_failure_falls_back_to_keyword_search() {
        use crate::retrieval::testing::FailingEmbedder;

        let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::with_content(vec![
            r#"{"intent": {}, "entities": [], "select": [{"id": "tool_1", "why": "restarts the service"}], "confidence": 0.9, "risk_level": "high"}"#,
        ]));
        let catalog: Arc<dyn ToolCatalog> = Arc::new(InMemoryCatalog::new(vec![ToolSpec {
            name: "systemctl".to_string(),
            description: "control services".to_string(),
            platform: Some("linux".to_string()),
            capabilities: vec!["service_control".to_string()],
            inputs_needed: vec!["service_name".to_string()],
            permission_level: "elevated".to_string(),
            production_safe: true,
            dependencies: vec![],
        }]));
        let index: Arc<dyn ToolIndex> = Arc::new(InMemoryIndex::new(vec![CandidateTool {
            id: "tool_1".to_string(),
            name: "systemctl".to_string(),
            desc: "control services".to_string(),
            tags: vec!["service".to_string()],
            platform: Some("linux".to_string()),
            cost: 1.0,
        }]));
        let embedder: Arc<dyn Embedder> = Arc::new(FailingEmbedder);
        let selector = Selector::new(llm, catalog, index, embedder, LlmConfig::default(), RetrievalConfig::default());

        let (selection, _) = selector.process(&decision()).await.unwrap();
        assert_eq!(selection.selected_tools.len(), 1);
    }
}
