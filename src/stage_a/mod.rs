//! Stage A: classify the request into a `Decision` (§4.5). Intent
//! classification and entity extraction run concurrently; confidence
//! and risk scoring run after, since they depend on both.

mod confidence_risk;
pub mod entities;
mod intent;

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ClassifierConfig;
use crate::context::RequestContext;
use crate::error::PipelineError;
use crate::llm::{GenerateRequest, LlmClient};
use crate::parser;
use crate::prompts::{PromptKind, PromptRegistry};
use crate::record::decision::{
    merge_entities, Decision, DecisionBuilder, DecisionType, Entity, Intent, IntentCategory, NextStage, RiskLevel,
};

pub struct Classifier {
    llm: Arc<dyn LlmClient>,
    prompts: PromptRegistry,
    config: ClassifierConfig,
}

impl Classifier {
    pub fn new(llm: Arc<dyn LlmClient>, config: ClassifierConfig) -> Self {
        Self {
            llm,
            prompts: PromptRegistry::new(),
            config,
        }
    }

    pub async fn classify(
        &self,
        request: &str,
        context: Option<&RequestContext>,
    ) -> Result<Decision, PipelineError> {
        let (intent, entities) = tokio::join!(
            intent::classify_intent(&self.llm, &self.prompts, request, &self.config),
            extract_entities(&self.llm, &self.prompts, request),
        );

        let scored = confidence_risk::score(&self.llm, &self.prompts, request, &intent, &entities, &self.config).await;

        let decision_type = if intent.category == IntentCategory::Information {
            DecisionType::Info
        } else {
            DecisionType::Action
        };
        let next_stage = route(decision_type, &intent, scored.confidence);

        let mut extra_context = HashMap::new();
        if let Some(ctx) = context {
            if let Some(environment) = &ctx.environment {
                extra_context.insert("environment".to_string(), serde_json::Value::String(environment.clone()));
            }
            for (key, value) in &ctx.extra {
                extra_context.insert(key.clone(), value.clone());
            }
        }

        DecisionBuilder::new(decision_type, intent, scored.confidence, scored.risk, request, next_stage)
            .entities(entities)
            .context(extra_context)
            .build()
    }
}

/// Simple, directly-answerable information queries skip tool selection
/// and planning entirely (§4.5 step 4).
const STAGE_D_ACTIONS: [&str; 5] = ["query", "list", "count", "show", "get"];
const STAGE_D_CONFIDENCE_THRESHOLD: f64 = 0.7;

fn route(decision_type: DecisionType, intent: &Intent, confidence: f64) -> NextStage {
    let is_simple_query = decision_type == DecisionType::Info
        && STAGE_D_ACTIONS.contains(&intent.action.as_str())
        && confidence >= STAGE_D_CONFIDENCE_THRESHOLD;
    if is_simple_query {
        NextStage::StageD
    } else {
        NextStage::StageAb
    }
}

async fn extract_entities(llm: &Arc<dyn LlmClient>, prompts: &PromptRegistry, request: &str) -> Vec<Entity> {
    let regex_entities = entities::extract_with_regex(request);
    let llm_entities = try_llm_entities(llm, prompts, request).await.unwrap_or_default();
    merge_entities(regex_entities.into_iter().chain(llm_entities).collect())
}

async fn try_llm_entities(
    llm: &Arc<dyn LlmClient>,
    prompts: &PromptRegistry,
    request: &str,
) -> Result<Vec<Entity>, PipelineError> {
    let mut vars = HashMap::new();
    vars.insert("request", request.to_string());
    let rendered = prompts.render(PromptKind::EntityExtraction, &vars)?;

    let response = llm
        .generate(GenerateRequest {
            prompt: rendered.user,
            system_prompt: Some(rendered.system),
            temperature: 0.1,
            max_tokens: None,
            model: None,
        })
        .await?;

    let parsed = parser::parse_entities(&response.content)?;
    Ok(parsed
        .into_iter()
        .filter(|e| entities::validate_entity(&Entity {
            entity_type: e.entity_type.clone(),
            value: e.value.clone(),
            confidence: e.confidence,
        }))
        .map(|e| Entity {
            entity_type: e.entity_type,
            value: e.value,
            confidence: e.confidence,
        })
        .collect())
}
