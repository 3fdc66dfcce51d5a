//! End-to-end scenarios covering the full request -> decision -> plan
//! path, using scripted LLM responses and in-memory retrieval fakes.

use std::sync::Arc;

use ops_decision_pipeline::config::PipelineConfig;
use ops_decision_pipeline::llm::testing::ScriptedLlmClient;
use ops_decision_pipeline::llm::LlmClient;
use ops_decision_pipeline::orchestrator::build_with_shared_llm;
use ops_decision_pipeline::record::decision::{IntentCategory, RiskLevel};
use ops_decision_pipeline::retrieval::testing::{FakeEmbedder, InMemoryCatalog, InMemoryIndex};
use ops_decision_pipeline::retrieval::{CandidateTool, ToolSpec};
use ops_decision_pipeline::PipelineOutcome;

fn tool_spec(name: &str, inputs_needed: Vec<&str>) -> ToolSpec {
    ToolSpec {
        name: name.to_string(),
        description: format!("{name} tool"),
        platform: Some("linux".to_string()),
        capabilities: vec![],
        inputs_needed: inputs_needed.into_iter().map(String::from).collect(),
        permission_level: "standard".to_string(),
        production_safe: true,
        dependencies: vec![],
    }
}

fn candidate(id: &str, name: &str) -> CandidateTool {
    CandidateTool {
        id: id.to_string(),
        name: name.to_string(),
        desc: format!("{name} tool"),
        tags: vec![],
        platform: Some("linux".to_string()),
        cost: 1.0,
    }
}

fn full_catalog() -> (Arc<dyn ops_decision_pipeline::retrieval::ToolCatalog>, Arc<dyn ops_decision_pipeline::retrieval::ToolIndex>) {
    let catalog = InMemoryCatalog::new(vec![
        tool_spec("systemctl", vec!["service_name"]),
        tool_spec("asset_inventory", vec![]),
        tool_spec("prometheus_metrics", vec!["target"]),
        tool_spec("config_manager", vec!["target"]),
    ]);
    let index = InMemoryIndex::new(vec![
        candidate("tool_systemctl", "systemctl"),
        candidate("tool_asset", "asset_inventory"),
        candidate("tool_metrics", "prometheus_metrics"),
        candidate("tool_config", "config_manager"),
    ]);
    (Arc::new(catalog), Arc::new(index))
}

fn build(responses: Vec<&str>) -> ops_decision_pipeline::Orchestrator {
    let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::with_content(responses));
    let (catalog, index) = full_catalog();
    let embedder: Arc<dyn ops_decision_pipeline::retrieval::Embedder> = Arc::new(FakeEmbedder::new(16));
    build_with_shared_llm(llm, catalog, index, embedder, PipelineConfig::default())
}

#[tokio::test]
async fn restart_service_request_selects_systemctl_and_plans_a_before_check() {
    let orchestrator = build(vec![
        r#"{"category": "automation", "action": "restart_service", "confidence": 0.9, "capabilities": ["service_control"]}"#,
        r#"{"entities": [{"type": "service", "value": "nginx", "confidence": 0.95}, {"type": "hostname", "value": "web-server-01", "confidence": 0.9}]}"#,
        r#"{"confidence": 0.92, "risk": "medium", "reasoning": "routine service restart on a single named host"}"#,
        r#"{"intent": {}, "entities": [], "select": [{"id": "tool_systemctl", "why": "restarts the service"}], "confidence": 0.9, "risk_level": "medium"}"#,
        r#"[{"id": "step_1", "tool": "systemctl", "description": "restart nginx", "inputs": {"action": "restart"}, "estimated_duration_s": 5}]"#,
    ]);

    let outcome = orchestrator.run("restart nginx on web-server-01", None).await.unwrap();
    match outcome {
        PipelineOutcome::Ready { decision, selection, plan } => {
            assert_eq!(decision.intent.category, IntentCategory::Automation);
            assert_eq!(decision.intent.action, "restart_service");
            assert!(decision.overall_confidence >= 0.8);
            assert!(decision.entities.iter().any(|e| e.entity_type == "service" && e.value == "nginx"));
            assert!(decision.entities.iter().any(|e| e.entity_type == "hostname"));
            assert_eq!(selection.selected_tools.len(), 1);
            assert_eq!(selection.selected_tools[0].tool_name, "systemctl");
            assert!(plan.plan.steps.iter().any(|s| s.tool == "systemctl"));
            assert!(plan.plan.safety_checks.iter().any(|c| c.stage == ops_decision_pipeline::record::plan::SafetyStage::Before));
        }
        other => panic!("expected Ready outcome, got {other:?}"),
    }
}

#[tokio::test]
async fn list_assets_request_never_selects_the_metrics_tool() {
    let orchestrator = build(vec![
        r#"{"category": "asset_management", "action": "list_assets", "confidence": 0.95, "capabilities": []}"#,
        r#"{"entities": []}"#,
        r#"{"intent": {}, "entities": [], "select": [{"id": "tool_asset", "why": "lists known assets"}], "confidence": 0.95, "risk_level": "low"}"#,
        r#"[{"id": "step_1", "tool": "asset_inventory", "description": "list linux servers", "inputs": {}, "estimated_duration_s": 3}]"#,
    ]);

    let outcome = orchestrator.run("show me all Linux servers", None).await.unwrap();
    match outcome {
        PipelineOutcome::Ready { decision, selection, plan } => {
            assert_eq!(decision.intent.category, IntentCategory::AssetManagement);
            assert_eq!(decision.risk_level, RiskLevel::Low);
            assert!(!decision.requires_approval);
            assert_eq!(selection.selected_tools.len(), 1);
            assert!(!selection.selected_tools.iter().any(|t| t.tool_name.contains("prometheus")));
            assert!(plan.plan.rollback_plan.is_empty());
        }
        other => panic!("expected Ready outcome, got {other:?}"),
    }
}

#[tokio::test]
async fn emergency_restore_is_critical_and_requires_approval_on_every_step() {
    let orchestrator = build(vec![
        r#"{"category": "automation", "action": "emergency_response", "confidence": 0.95, "capabilities": []}"#,
        r#"{"entities": [{"type": "database", "value": "primary", "confidence": 0.8}, {"type": "hostname", "value": "db-primary-01", "confidence": 0.85}]}"#,
        r#"{"intent": {}, "entities": [], "select": [{"id": "tool_config", "why": "restores configuration state"}], "confidence": 0.95, "risk_level": "critical"}"#,
        r#"[{"id": "step_1", "tool": "config_manager", "description": "restore from backup", "inputs": {"action": "restore"}, "estimated_duration_s": 30}]"#,
    ]);

    let outcome = orchestrator
        .run("URGENT: database is down, restore from last night's backup", None)
        .await
        .unwrap();
    match outcome {
        PipelineOutcome::Ready { decision, plan, .. } => {
            assert_eq!(decision.risk_level, RiskLevel::Critical);
            assert!(decision.requires_approval);
            let step_ids: Vec<&str> = plan.plan.steps.iter().map(|s| s.id.as_str()).collect();
            assert_eq!(plan.execution_metadata.approval_points, step_ids);
            assert!(!plan.execution_metadata.checkpoint_steps.is_empty());
            assert!(plan.plan.steps.iter().all(|s| plan
                .plan
                .safety_checks
                .iter()
                .any(|c| c.stage == ops_decision_pipeline::record::plan::SafetyStage::Before)));
        }
        other => panic!("expected Ready outcome, got {other:?}"),
    }
}

#[tokio::test]
async fn information_question_short_circuits_before_selection_or_planning() {
    let orchestrator = build(vec![
        r#"{"category": "information", "action": "show", "confidence": 0.95, "capabilities": []}"#,
        r#"{"entities": []}"#,
    ]);

    let outcome = orchestrator.run("what is kubernetes", None).await.unwrap();
    match outcome {
        PipelineOutcome::InfoOnly { decision } => {
            assert_eq!(decision.intent.category, IntentCategory::Information);
            assert!(decision.overall_confidence >= 0.9);
        }
        other => panic!("expected InfoOnly outcome, got {other:?}"),
    }
}

#[tokio::test]
async fn cpu_usage_request_is_monitoring_not_asset_management() {
    let orchestrator = build(vec![
        r#"{"category": "monitoring", "action": "check_resource_usage", "confidence": 0.85, "capabilities": []}"#,
        r#"{"entities": [{"type": "hostname", "value": "web-01", "confidence": 0.9}]}"#,
        r#"{"intent": {}, "entities": [], "select": [{"id": "tool_metrics", "why": "reports CPU usage"}], "confidence": 0.85, "risk_level": "low"}"#,
        r#"[{"id": "step_1", "tool": "prometheus_metrics", "description": "fetch cpu usage", "inputs": {}, "estimated_duration_s": 2}]"#,
    ]);

    let outcome = orchestrator.run("show me CPU usage on web-01", None).await.unwrap();
    match outcome {
        PipelineOutcome::Ready { decision, selection, .. } => {
            assert_ne!(decision.intent.category, IntentCategory::AssetManagement);
            assert!(!selection
                .selected_tools
                .iter()
                .any(|t| ["asset", "inventory", "cmdb"].iter().any(|kw| t.tool_name.contains(kw))));
        }
        other => panic!("expected Ready outcome, got {other:?}"),
    }
}

#[test]
fn oversized_request_clamps_output_budget_to_the_hard_minimum() {
    use ops_decision_pipeline::llm::budget_max_tokens;

    let huge_prompt_tokens = 9000;
    let clamped = budget_max_tokens(Some(1024), huge_prompt_tokens, 8192, 1024, 256, 256);
    assert_eq!(clamped, 256);
}
