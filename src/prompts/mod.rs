//! Closed enum of prompt kinds mapped to parameterized `{system, user}`
//! templates (§4.3). Substitution is strict: every `{{variable}}` token
//! in a template must be bound, or `render` fails at render time.

use std::collections::HashMap;

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    IntentClassification,
    EntityExtraction,
    ConfidenceAndRisk,
    ToolSelection,
    Planning,
}

#[derive(Debug, Clone)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

struct Template {
    system: &'static str,
    user: &'static str,
}

pub struct PromptRegistry {
    templates: HashMap<PromptKind, Template>,
}

impl Default for PromptRegistry {
    fn default() -> Self {
        let mut templates = HashMap::new();

        templates.insert(
            PromptKind::IntentClassification,
            Template {
                system: "You are an intent classifier for an operations-automation assistant. \
Classify the user's request into exactly one category from \
[automation, monitoring, troubleshooting, configuration, information, asset_management], \
and describe the action in a short verb_noun form (e.g. restart_service, list_assets). \
Return strict JSON: {\"category\": string, \"action\": string, \"confidence\": number 0-1, \"capabilities\": [string]}.",
                user: "Request: {{request}}",
            },
        );

        templates.insert(
            PromptKind::EntityExtraction,
            Template {
                system: "Extract infrastructure entities from the user's request. \
Valid types: hostname, service, command, file_path, port, environment, ip_address, application, database, asset_id. \
Return strict JSON: {\"entities\": [{\"type\": string, \"value\": string, \"confidence\": number 0-1}]}. \
Return an empty list if no entities are present.",
                user: "Request: {{request}}",
            },
        );

        templates.insert(
            PromptKind::ConfidenceAndRisk,
            Template {
                system: "Given a classified intent and extracted entities, estimate the overall confidence \
of this classification and its operational risk level (one of low, medium, high, critical). \
Return strict JSON: {\"confidence\": number 0-1, \"risk\": string, \"reasoning\": string}.",
                user: "Request: {{request}}\nIntent: {{intent}}\nEntities: {{entities}}",
            },
        );

        templates.insert(
            PromptKind::ToolSelection,
            Template {
                system: "You are the tool selector. Your job is to select the minimal set of tools needed \
to fulfill the user's request.\n\
RULES:\n\
1. Choose the FEWEST tools necessary to satisfy the request.\n\
2. Prefer tools with broader coverage over several narrow ones.\n\
3. If no tools apply, return an empty selection.\n\
4. Return tool IDs only.\n\
Return strict JSON: {\"intent\": {\"category\": string, \"action\": string}, \"entities\": [{\"type\": string, \"value\": string}], \
\"select\": [{\"id\": string, \"why\": string}], \"confidence\": number 0-1, \"risk_level\": string, \"reasoning\": string}.",
                user: "Request: {{request}}\nCandidate tools (JSON): {{candidates}}",
            },
        );

        templates.insert(
            PromptKind::Planning,
            Template {
                system: "You are the execution planner. Given the fields below, describe only the fields \
that are actually needed to fulfill the request — do not invent unused fields.\n\
Return a JSON array of steps, each: {\"tool\": string, \"description\": string, \"inputs\": object, \
\"preconditions\": [string], \"success_criteria\": [string], \"failure_handling\": string, \"estimated_duration_s\": number}.",
                user: "Request: {{request}}\nIntent: {{intent}}\nEntities: {{entities}}\nSelected tools: {{selected_tools}}",
            },
        );

        Self { templates }
    }
}

impl PromptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(
        &self,
        kind: PromptKind,
        vars: &HashMap<&str, String>,
    ) -> Result<RenderedPrompt, PipelineError> {
        let template = self.templates.get(&kind).expect("every PromptKind has a template");
        Ok(RenderedPrompt {
            system: substitute(template.system, vars)?,
            user: substitute(template.user, vars)?,
        })
    }
}

fn substitute(template: &str, vars: &HashMap<&str, String>) -> Result<String, PipelineError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let Some(end) = rest[start..].find("}}") else {
            out.push_str(rest);
            return Ok(out);
        };
        out.push_str(&rest[..start]);
        let name = rest[start + 2..start + end].trim();
        match vars.get(name) {
            Some(value) => out.push_str(value),
            None => {
                return Err(PipelineError::Schema {
                    field: "prompt_template_variable",
                    reason: format!("unbound template variable '{name}'"),
                })
            }
        }
        rest = &rest[start + end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_with_all_variables_bound() {
        let registry = PromptRegistry::new();
        let mut vars = HashMap::new();
        vars.insert("request", "restart nginx".to_string());
        let rendered = registry.render(PromptKind::IntentClassification, &vars).unwrap();
        assert!(rendered.user.contains("restart nginx"));
        assert!(rendered.system.contains("intent classifier"));
    }

    #[test]
    fn fails_fast_on_unbound_variable() {
        let registry = PromptRegistry::new();
        let vars = HashMap::new();
        let result = registry.render(PromptKind::IntentClassification, &vars);
        assert!(matches!(result, Err(PipelineError::Schema { .. })));
    }
}
