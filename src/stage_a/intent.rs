//! Intent classification: one LLM call with up to one retry on an
//! unparseable response, falling back to a keyword-pair rule table
//! when the LLM proves unusable (§4.5 step 1).

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ClassifierConfig;
use crate::error::PipelineError;
use crate::llm::{GenerateRequest, LlmClient};
use crate::parser::{self, ParsedIntent};
use crate::prompts::{PromptKind, PromptRegistry};
use crate::record::decision::{Intent, IntentCategory};

const MAX_ATTEMPTS: usize = 2;

pub async fn classify_intent(
    llm: &Arc<dyn LlmClient>,
    prompts: &PromptRegistry,
    request: &str,
    config: &ClassifierConfig,
) -> Intent {
    for attempt in 0..MAX_ATTEMPTS {
        match try_llm_intent(llm, prompts, request, config).await {
            Ok(intent) => return intent,
            Err(err) => {
                tracing::warn!(attempt, error = %err, "intent classification attempt failed");
            }
        }
    }
    tracing::warn!("intent classification exhausted LLM attempts, falling back to keyword rules");
    rule_based_intent(request)
}

async fn try_llm_intent(
    llm: &Arc<dyn LlmClient>,
    prompts: &PromptRegistry,
    request: &str,
    config: &ClassifierConfig,
) -> Result<Intent, PipelineError> {
    let mut vars = HashMap::new();
    vars.insert("request", request.to_string());
    let rendered = prompts.render(PromptKind::IntentClassification, &vars)?;

    let response = llm
        .generate(GenerateRequest {
            prompt: rendered.user,
            system_prompt: Some(rendered.system),
            temperature: config.intent_temperature,
            max_tokens: None,
            model: None,
        })
        .await?;

    let parsed: ParsedIntent = parser::parse_intent(&response.content)?;
    let category = parse_category(&parsed.category).ok_or_else(|| PipelineError::LlmParse {
        kind: "intent",
        cause: format!("unknown category '{}'", parsed.category),
        raw_response: response.content.clone(),
    })?;

    Ok(Intent {
        category,
        action: parsed.action,
        confidence: parsed.confidence,
        capabilities: parsed.capabilities,
    })
}

fn parse_category(raw: &str) -> Option<IntentCategory> {
    match raw.to_lowercase().as_str() {
        "automation" => Some(IntentCategory::Automation),
        "monitoring" => Some(IntentCategory::Monitoring),
        "troubleshooting" => Some(IntentCategory::Troubleshooting),
        "configuration" => Some(IntentCategory::Configuration),
        "information" => Some(IntentCategory::Information),
        "asset_management" => Some(IntentCategory::AssetManagement),
        _ => None,
    }
}

struct KeywordRule {
    keywords: &'static [&'static str],
    category: IntentCategory,
    action: &'static str,
}

const RULES: &[KeywordRule] = &[
    KeywordRule {
        keywords: &["restart", "reboot"],
        category: IntentCategory::Automation,
        action: "restart_service",
    },
    KeywordRule {
        keywords: &["stop", "shut down", "shutdown"],
        category: IntentCategory::Automation,
        action: "stop_service",
    },
    KeywordRule {
        keywords: &["start", "launch"],
        category: IntentCategory::Automation,
        action: "start_service",
    },
    KeywordRule {
        keywords: &["status", "health", "check"],
        category: IntentCategory::Monitoring,
        action: "check_status",
    },
    KeywordRule {
        keywords: &["cpu", "memory", "usage", "metrics"],
        category: IntentCategory::Monitoring,
        action: "check_resource_usage",
    },
    KeywordRule {
        keywords: &["error", "fail", "crash", "not working", "broken"],
        category: IntentCategory::Troubleshooting,
        action: "diagnose_issue",
    },
    KeywordRule {
        keywords: &["configure", "set up", "update config", "change setting"],
        category: IntentCategory::Configuration,
        action: "update_configuration",
    },
    KeywordRule {
        keywords: &["what is", "explain", "how does", "why"],
        category: IntentCategory::Information,
        action: "answer_question",
    },
    KeywordRule {
        keywords: &["list", "inventory", "which servers", "show me all"],
        category: IntentCategory::AssetManagement,
        action: "list_assets",
    },
];

/// Keyword-pair fallback used when the LLM is unavailable or its output
/// never parses. Deliberately conservative: low confidence, first match
/// wins.
pub fn rule_based_intent(request: &str) -> Intent {
    let lower = request.to_lowercase();
    for rule in RULES {
        if rule.keywords.iter().any(|k| lower.contains(k)) {
            return Intent {
                category: rule.category,
                action: rule.action.to_string(),
                confidence: 0.5,
                capabilities: Vec::new(),
            };
        }
    }
    Intent {
        category: IntentCategory::Information,
        action: "unknown".to_string(),
        confidence: 0.2,
        capabilities: Vec::new(),
    }
}
