//! Resource and observability planning (§4.8.4): execution metadata
//! summarizing risk and approval points, plus a default monitoring
//! configuration derived from the tools in play.

use crate::config::PlannerConfig;
use crate::record::decision::RiskLevel;
use crate::record::plan::{is_destructive, ExecutionMetadata, ObservabilityConfig, Step};

pub fn build_execution_metadata(
    steps: &[Step],
    risk: RiskLevel,
    requires_approval: bool,
    config: &PlannerConfig,
) -> ExecutionMetadata {
    let total_estimated_time_s: u32 = steps.iter().map(|s| s.estimated_duration_s).sum();

    let mut risk_factors = Vec::new();
    if steps.iter().any(|s| is_destructive(&s.tool, &s.inputs)) {
        risk_factors.push("plan includes destructive operations".to_string());
    }
    if total_estimated_time_s > config.long_running_threshold_s {
        risk_factors.push(format!(
            "estimated runtime {total_estimated_time_s}s exceeds the long-running threshold of {}s",
            config.long_running_threshold_s
        ));
    }
    if matches!(risk, RiskLevel::High | RiskLevel::Critical) {
        risk_factors.push(format!("overall risk level is {risk:?}"));
    }

    // §4.8.4: every step requires approval at critical risk; otherwise
    // just the destructive ones, and only when approval is required at all.
    let approval_points: Vec<String> = if risk == RiskLevel::Critical {
        steps.iter().map(|s| s.id.clone()).collect()
    } else if requires_approval {
        steps
            .iter()
            .filter(|s| is_destructive(&s.tool, &s.inputs))
            .map(|s| s.id.clone())
            .collect()
    } else {
        Vec::new()
    };

    let mut checkpoint_steps: Vec<String> = steps
        .iter()
        .filter(|s| s.estimated_duration_s > config.long_running_threshold_s || is_destructive(&s.tool, &s.inputs))
        .map(|s| s.id.clone())
        .collect();
    if let Some(last) = steps.last() {
        if !checkpoint_steps.contains(&last.id) {
            checkpoint_steps.push(last.id.clone());
        }
    }

    ExecutionMetadata {
        total_estimated_time_s,
        risk_factors,
        approval_points,
        checkpoint_steps,
    }
}

pub fn build_observability(steps: &[Step], risk: RiskLevel) -> ObservabilityConfig {
    let mut metrics_to_collect = vec!["step_duration_s".to_string(), "step_success_rate".to_string()];
    let mut logs_to_monitor = Vec::new();
    let mut alerts_to_set = Vec::new();

    for tool in steps.iter().map(|s| s.tool.as_str()).collect::<std::collections::HashSet<_>>() {
        logs_to_monitor.push(format!("{tool}.log"));
    }

    if matches!(risk, RiskLevel::High | RiskLevel::Critical) {
        metrics_to_collect.push("error_rate".to_string());
        alerts_to_set.push("alert on any step failure".to_string());
    }

    ObservabilityConfig {
        metrics_to_collect,
        logs_to_monitor,
        alerts_to_set,
    }
}
