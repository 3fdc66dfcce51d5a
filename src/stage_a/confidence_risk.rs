//! Rule-based confidence and risk scoring, optionally blended with an
//! LLM opinion (§4.5 step 3).

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ClassifierConfig;
use crate::llm::{GenerateRequest, LlmClient};
use crate::parser;
use crate::prompts::{PromptKind, PromptRegistry};
use crate::record::decision::{Entity, Intent, IntentCategory, RiskLevel};

const QUESTION_WORDS: [&str; 5] = ["what is", "what are", "define", "explain", "meaning of"];

/// Rule-based confidence from four weighted factors: intent confidence
/// (0.3), entity quality over the top 3 entities (0.3), request clarity
/// (0.2), and keyword specificity (0.2). A simple self-contained question
/// (a short "what is X" with no entities) short-circuits to 0.95: there
/// is nothing ambiguous left to resolve.
pub fn rule_based_confidence(request: &str, intent: &Intent, entities: &[Entity]) -> f64 {
    let lower = request.to_lowercase();
    let word_count = request.split_whitespace().count();

    if intent.category == IntentCategory::Information
        && entities.is_empty()
        && word_count <= 8
        && QUESTION_WORDS.iter().any(|w| lower.starts_with(w) || lower.contains(w))
    {
        return 0.95;
    }

    let entity_quality = if entities.is_empty() {
        if matches!(intent.category, IntentCategory::Information | IntentCategory::Monitoring) {
            0.8
        } else {
            0.3
        }
    } else {
        let top_three = &entities[..entities.len().min(3)];
        top_three.iter().map(|e| e.confidence).sum::<f64>() / top_three.len() as f64
    };

    let clarity = if word_count < 3 {
        0.3
    } else if word_count > 40 {
        0.5
    } else {
        0.85
    };

    let specificity = if lower.split_whitespace().count() > 0
        && entities.iter().any(|e| matches!(e.entity_type.as_str(), "hostname" | "service" | "command"))
    {
        0.9
    } else {
        0.5
    };

    let score = 0.3 * intent.confidence + 0.3 * entity_quality + 0.2 * clarity + 0.2 * specificity;
    score.clamp(0.0, 1.0)
}

const CRITICAL_KEYWORDS: [&str; 9] = [
    "delete", "drop database", "format", "wipe", "destroy", "rm -rf", "restore", "urgent", "emergency",
];
const HIGH_KEYWORDS: [&str; 5] = ["stop", "shutdown", "shut down", "kill", "terminate"];
const MEDIUM_KEYWORDS: [&str; 7] = ["restart", "reboot", "configure", "update", "modify", "change", "install"];

/// Rule-based risk from keyword families, highest match wins.
pub fn rule_based_risk(request: &str) -> RiskLevel {
    let lower = request.to_lowercase();
    if CRITICAL_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return RiskLevel::Critical;
    }
    if HIGH_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return RiskLevel::High;
    }
    if MEDIUM_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return RiskLevel::Medium;
    }
    RiskLevel::Low
}

pub struct ConfidenceAndRisk {
    pub confidence: f64,
    pub risk: RiskLevel,
}

/// Runs the rule-based scorer, then blends in an LLM opinion only when
/// the rule-based result is uncertain: confidence below the configured
/// threshold, or risk sitting at medium (the ambiguous middle of the
/// scale). The blend weights are fixed: 60% LLM, 40% rule.
pub async fn score(
    llm: &Arc<dyn LlmClient>,
    prompts: &PromptRegistry,
    request: &str,
    intent: &Intent,
    entities: &[Entity],
    config: &ClassifierConfig,
) -> ConfidenceAndRisk {
    let rule_confidence = rule_based_confidence(request, intent, entities);
    let rule_risk = rule_based_risk(request);

    let needs_llm = rule_confidence < config.confidence_llm_threshold || rule_risk == RiskLevel::Medium;
    if !needs_llm {
        return ConfidenceAndRisk {
            confidence: rule_confidence,
            risk: rule_risk,
        };
    }

    match ask_llm(llm, prompts, request, intent, entities).await {
        Some((llm_confidence, llm_risk)) => ConfidenceAndRisk {
            confidence: 0.6 * llm_confidence + 0.4 * rule_confidence,
            risk: llm_risk.unwrap_or(rule_risk).max(rule_risk),
        },
        None => ConfidenceAndRisk {
            confidence: rule_confidence,
            risk: rule_risk,
        },
    }
}

async fn ask_llm(
    llm: &Arc<dyn LlmClient>,
    prompts: &PromptRegistry,
    request: &str,
    intent: &Intent,
    entities: &[Entity],
) -> Option<(f64, Option<RiskLevel>)> {
    let mut vars = HashMap::new();
    vars.insert("request", request.to_string());
    vars.insert("intent", serde_json::to_string(intent).ok()?);
    vars.insert("entities", serde_json::to_string(entities).ok()?);
    let rendered = prompts.render(PromptKind::ConfidenceAndRisk, &vars).ok()?;

    let response = llm
        .generate(GenerateRequest {
            prompt: rendered.user,
            system_prompt: Some(rendered.system),
            temperature: 0.1,
            max_tokens: None,
            model: None,
        })
        .await
        .ok()?;

    let parsed = parser::parse_confidence_and_risk(&response.content).ok()?;
    let risk = parse_risk(&parsed.risk);
    Some((parsed.confidence, risk))
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
