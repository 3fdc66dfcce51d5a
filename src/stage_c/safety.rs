//! Safety check synthesis (§4.8.3): the union of a risk-based generator,
//! a tool/action-specific generator, an environment-specific generator,
//! and a fixed set of baseline checks.

use crate::record::decision::RiskLevel;
use crate::record::plan::{is_destructive, SafetyCheck, SafetyFailureAction, SafetyStage, Step};
use crate::record::selection::ExecutionPolicy;

pub fn generate_safety_checks(steps: &[Step], policy: &ExecutionPolicy) -> Vec<SafetyCheck> {
    let mut checks = Vec::new();

    checks.extend(risk_based_checks(policy));
    for step in steps {
        checks.extend(tool_specific_checks(step));
    }
    if policy.production_environment {
        checks.extend(environment_checks());
    }
    checks.extend(baseline_checks(steps));

    checks
}

fn risk_based_checks(policy: &ExecutionPolicy) -> Vec<SafetyCheck> {
    let mut checks = vec![abort(SafetyStage::Before, "perform a minimal health check on affected targets")];

    if matches!(policy.risk_level, RiskLevel::Medium | RiskLevel::High | RiskLevel::Critical) {
        checks.push(abort(SafetyStage::Before, "validate service health before proceeding"));
        checks.push(warn(SafetyStage::During, "monitor resource usage during execution"));
    }
    if matches!(policy.risk_level, RiskLevel::High | RiskLevel::Critical) {
        checks.push(abort(SafetyStage::Before, "back up current state before making changes"));
        checks.push(abort(SafetyStage::Before, "validate a rollback plan is in place"));
        checks.push(warn(SafetyStage::During, "monitor execution in real time"));
    }
    if policy.risk_level == RiskLevel::Critical {
        checks.push(abort(SafetyStage::Before, "obtain secondary approval from a second operator"));
        checks.push(abort(SafetyStage::Before, "confirm execution falls within an approved maintenance window"));
    }

    if policy.requires_approval {
        checks.push(abort(SafetyStage::Before, "confirm manual approval was obtained"));
    }
    if !policy.parallel_execution {
        checks.push(warn(SafetyStage::Before, "confirm steps run sequentially, not in parallel"));
    }

    checks
}

fn tool_specific_checks(step: &Step) -> Vec<SafetyCheck> {
    let action = step
        .inputs
        .get("action")
        .or_else(|| step.inputs.get("operation"))
        .and_then(|v| v.as_str())
        .unwrap_or("");

    match step.tool.as_str() {
        "systemctl" => vec![
            abort(SafetyStage::Before, format!("check service dependencies before {action} on {}", step.tool)),
            warn(SafetyStage::After, "verify the service reached its expected state"),
        ],
        "file_manager" => vec![
            abort(SafetyStage::Before, "verify target file paths exist and are writable"),
            abort(SafetyStage::Before, "back up affected files before modification"),
        ],
        "config_manager" => vec![
            abort(SafetyStage::Before, "validate configuration syntax before applying"),
            warn(SafetyStage::After, "verify the running configuration matches the intended state"),
        ],
        "docker" => vec![
            abort(SafetyStage::Before, format!("verify container/image state before {action}")),
            warn(SafetyStage::During, "monitor container health during the operation"),
        ],
        "network_tools" => vec![
            abort(SafetyStage::Before, "confirm no active sessions depend on the current network configuration"),
            abort(SafetyStage::Before, "validate a rollback route exists before changing network state"),
        ],
        "journalctl" | "ps" | "info_display" => vec![warn(SafetyStage::Before, format!("confirm {} is reachable", step.tool))],
        _ => vec![
            abort(SafetyStage::Before, format!("verify {} is available before use", step.tool)),
            warn(SafetyStage::During, format!("monitor execution of {}", step.tool)),
        ],
    }
}

fn environment_checks() -> Vec<SafetyCheck> {
    vec![
        abort(SafetyStage::Before, "confirm production approval was obtained"),
        abort(SafetyStage::Before, "confirm a backup was created"),
        abort(SafetyStage::Before, "confirm the rollback plan is ready"),
    ]
}

fn baseline_checks(steps: &[Step]) -> Vec<SafetyCheck> {
    let mut checks = vec![
        abort(SafetyStage::Before, "validate all step inputs"),
        abort(SafetyStage::Before, "verify permissions for all steps are sufficient"),
        abort(SafetyStage::Before, "verify system state preconditions for all steps are met"),
    ];
    if steps.iter().any(|s| is_destructive(&s.tool, &s.inputs)) {
        checks.push(abort(SafetyStage::Before, "create a checkpoint before running destructive steps"));
    }
    checks.push(warn(SafetyStage::After, "verify all success criteria were met after execution"));
    checks
}

fn abort(stage: SafetyStage, check: impl Into<String>) -> SafetyCheck {
    SafetyCheck {
        check: check.into(),
        stage,
        failure_action: SafetyFailureAction::Abort,
    }
}

fn warn(stage: SafetyStage, check: impl Into<String>) -> SafetyCheck {
    SafetyCheck {
        check: check.into(),
        stage,
        failure_action: SafetyFailureAction::Warn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn step(tool: &str) -> Step {
        Step {
            id: "s1".to_string(),
            description: "x".to_string(),
            tool: tool.to_string(),
            inputs: HashMap::new(),
            preconditions: vec![],
            success_criteria: vec![],
            failure_handling: "abort".to_string(),
            estimated_duration_s: 5,
            depends_on: vec![],
            execution_order: 1,
        }
    }

    fn policy(risk: RiskLevel, production: bool) -> ExecutionPolicy {
        ExecutionPolicy {
            requires_approval: matches!(risk, RiskLevel::High | RiskLevel::Critical),
            production_environment: production,
            risk_level: risk,
            max_execution_time_s: 300,
            parallel_execution: false,
            rollback_required: matches!(risk, RiskLevel::High | RiskLevel::Critical),
        }
    }

    #[test]
    fn destructive_step_gets_a_before_rollback_check() {
        let mut restart = step("systemctl");
        restart.inputs.insert("action".to_string(), serde_json::Value::String("restart".to_string()));
        let checks = generate_safety_checks(&[restart], &policy(RiskLevel::High, false));
        assert!(checks.iter().any(|c| c.check.contains("rollback plan is in place")));
        assert!(checks.iter().any(|c| c.check.contains("dependencies")));
    }

    #[test]
    fn production_adds_environment_checks() {
        let checks = generate_safety_checks(&[step("ps")], &policy(RiskLevel::Low, true));
        assert!(checks.iter().any(|c| c.check.contains("backup was created")));
    }

    #[test]
    fn medium_risk_adds_resource_monitoring() {
        let checks = generate_safety_checks(&[step("ps")], &policy(RiskLevel::Medium, false));
        assert!(checks.iter().any(|c| c.check.contains("monitor resource usage")));
    }

    #[test]
    fn baseline_checks_always_present() {
        let checks = generate_safety_checks(&[], &policy(RiskLevel::Low, false));
        assert!(checks.iter().any(|c| c.stage == SafetyStage::Before));
        assert!(checks.iter().any(|c| c.stage == SafetyStage::After));
    }
}
