//! Tolerant JSON extraction plus per-kind schema validation for LLM
//! responses (§4.4). Every error carries the raw response for
//! diagnostics.

use serde::Deserialize;
use serde_json::Value;

use crate::error::PipelineError;

/// Strips markdown code fences and scans for the first balanced `{...}`
/// or `[...]` region, whichever opens first, then parses it as JSON.
/// This is deliberately permissive: LLMs routinely wrap JSON in prose or
/// fenced blocks, and the planning prompt asks for a bare array rather
/// than an object.
pub fn extract_json(raw: &str) -> Result<Value, PipelineError> {
    let stripped = strip_code_fences(raw);
    let value_text = find_balanced_value(&stripped).ok_or_else(|| PipelineError::LlmParse {
        kind: "json_extraction",
        cause: "no balanced JSON value found in response".to_string(),
        raw_response: raw.to_string(),
    })?;
    serde_json::from_str(&value_text).map_err(|e| PipelineError::LlmParse {
        kind: "json_extraction",
        cause: e.to_string(),
        raw_response: raw.to_string(),
    })
}

fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        if let Some(end) = rest.rfind("```") {
            return rest[..end].trim().to_string();
        }
        return rest.trim().to_string();
    }
    trimmed.to_string()
}

/// Picks whichever of `{` or `[` opens first in the text and extracts
/// the matching balanced region for that bracket kind.
fn find_balanced_value(text: &str) -> Option<String> {
    let brace = text.find('{');
    let bracket = text.find('[');
    match (brace, bracket) {
        (Some(b), Some(k)) if k < b => find_balanced(text, b'[', b']'),
        (Some(_), _) => find_balanced(text, b'{', b'}'),
        (None, Some(_)) => find_balanced(text, b'[', b']'),
        (None, None) => None,
    }
}

fn find_balanced(text: &str, open: u8, close: u8) -> Option<String> {
    let start = text.find(open as char)?;
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escape {
                escape = false;
            } else if b == b'\\' {
                escape = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        if b == b'"' {
            in_string = true;
        } else if b == open {
            depth += 1;
        } else if b == close {
            depth -= 1;
            if depth == 0 {
                return Some(text[start..=i].to_string());
            }
        }
    }
    None
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParsedIntent {
    pub category: String,
    pub action: String,
    pub confidence: f64,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

pub fn parse_intent(raw: &str) -> Result<ParsedIntent, PipelineError> {
    let value = extract_json(raw)?;
    serde_json::from_value(value).map_err(|e| PipelineError::LlmParse {
        kind: "intent",
        cause: e.to_string(),
        raw_response: raw.to_string(),
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParsedEntity {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub value: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct ParsedEntities {
    #[serde(default)]
    entities: Vec<ParsedEntity>,
}

pub fn parse_entities(raw: &str) -> Result<Vec<ParsedEntity>, PipelineError> {
    let value = extract_json(raw)?;
    let parsed: ParsedEntities = serde_json::from_value(value).map_err(|e| PipelineError::LlmParse {
        kind: "entities",
        cause: e.to_string(),
        raw_response: raw.to_string(),
    })?;
    Ok(parsed.entities)
}

#[derive(Debug, Clone)]
pub struct ParsedConfidenceRisk {
    pub confidence: f64,
    pub risk: String,
    pub reasoning: String,
}

/// Accepts either the merged `{confidence, risk, reasoning}` shape or a
/// bare number (treated as confidence with no risk opinion).
/// Percentages (>1.0) are rescaled by 1/100.
pub fn parse_confidence_and_risk(raw: &str) -> Result<ParsedConfidenceRisk, PipelineError> {
    if let Ok(bare) = raw.trim().parse::<f64>() {
        let confidence = if bare > 1.0 { bare / 100.0 } else { bare };
        return Ok(ParsedConfidenceRisk {
            confidence,
            risk: String::new(),
            reasoning: String::new(),
        });
    }

    let value = extract_json(raw)?;
    #[derive(Deserialize)]
    struct Shape {
        confidence: f64,
        #[serde(default)]
        risk: String,
        #[serde(default)]
        reasoning: String,
    }
    let shape: Shape = serde_json::from_value(value).map_err(|e| PipelineError::LlmParse {
        kind: "confidence_and_risk",
        cause: e.to_string(),
        raw_response: raw.to_string(),
    })?;
    let confidence = if shape.confidence > 1.0 {
        shape.confidence / 100.0
    } else {
        shape.confidence
    };
    Ok(ParsedConfidenceRisk {
        confidence,
        risk: shape.risk,
        reasoning: shape.reasoning,
    })
}

/// Finds a one-word risk level as a whole word anywhere in the text.
pub fn parse_risk_word(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    for level in ["critical", "high", "medium", "low"] {
        if lower.split(|c: char| !c.is_alphanumeric()).any(|word| word == level) {
            return Some(level);
        }
    }
    None
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParsedSelectedId {
    pub id: String,
    #[serde(default)]
    pub why: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParsedToolSelection {
    pub intent: Value,
    #[serde(default)]
    pub entities: Vec<Value>,
    pub select: Vec<ParsedSelectedId>,
    pub confidence: f64,
    pub risk_level: String,
    #[serde(default = "default_reasoning")]
    pub reasoning: String,
}

fn default_reasoning() -> String {
    "No reasoning provided".to_string()
}

pub fn parse_tool_selection(raw: &str) -> Result<ParsedToolSelection, PipelineError> {
    let value = extract_json(raw)?;
    for field in ["select", "confidence", "risk_level", "intent"] {
        if value.get(field).is_none() {
            return Err(PipelineError::LlmParse {
                kind: "tool_selection",
                cause: format!("missing required field '{field}'"),
                raw_response: raw.to_string(),
            });
        }
    }
    serde_json::from_value(value).map_err(|e| PipelineError::LlmParse {
        kind: "tool_selection",
        cause: e.to_string(),
        raw_response: raw.to_string(),
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParsedStep {
    pub id: Option<String>,
    pub description: String,
    pub tool: String,
    #[serde(default)]
    pub inputs: serde_json::Map<String, Value>,
    #[serde(default)]
    pub preconditions: Vec<String>,
    #[serde(default)]
    pub success_criteria: Vec<String>,
    #[serde(default)]
    pub failure_handling: String,
    pub estimated_duration_s: f64,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParsedPlan {
    pub steps: Vec<ParsedStep>,
    #[serde(default)]
    pub safety_checks: Vec<Value>,
    #[serde(default)]
    pub rollback_plan: Vec<Value>,
}

pub fn parse_planning_steps(raw: &str) -> Result<Vec<ParsedStep>, PipelineError> {
    let value = extract_json(raw)?;
    // The planner's system prompt asks for a bare JSON array; accept
    // either a bare array or an object with a `steps` field.
    let steps_value = if value.is_array() {
        serde_json::json!({ "steps": value, "safety_checks": [], "rollback_plan": [] })
    } else {
        value
    };
    let parsed: ParsedPlan = serde_json::from_value(steps_value).map_err(|e| PipelineError::LlmParse {
        kind: "planning",
        cause: e.to_string(),
        raw_response: raw.to_string(),
    })?;
    Ok(parsed.steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_json_wrapped_in_markdown_fences() {
        let raw = "Here you go:\n```json\n{\"a\": 1}\n```\nhope that helps";
        let value = extract_json(raw).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn extracts_first_balanced_object_amid_prose() {
        let raw = "sure, {\"a\": {\"b\": 2}} is the answer";
        let value = extract_json(raw).unwrap();
        assert_eq!(value["a"]["b"], 2);
    }

    #[test]
    fn confidence_percentage_is_rescaled() {
        let parsed = parse_confidence_and_risk("{\"confidence\": 85, \"risk\": \"high\"}").unwrap();
        assert!((parsed.confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn bare_number_confidence_is_accepted() {
        let parsed = parse_confidence_and_risk("0.73").unwrap();
        assert!((parsed.confidence - 0.73).abs() < 1e-9);
    }

    #[test]
    fn risk_word_found_as_whole_word() {
        assert_eq!(parse_risk_word("the risk here is high overall"), Some("high"));
        assert_eq!(parse_risk_word("this is highly unusual"), None);
    }

    #[test]
    fn tool_selection_requires_core_fields() {
        let raw = "{\"select\": [], \"confidence\": 0.9}";
        let result = parse_tool_selection(raw);
        assert!(matches!(result, Err(PipelineError::LlmParse { .. })));
    }

    #[test]
    fn planning_accepts_bare_array() {
        let raw = "[{\"tool\": \"systemctl\", \"description\": \"restart\", \"estimated_duration_s\": 5.0}]";
        let steps = parse_planning_steps(raw).unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].tool, "systemctl");
    }
}
