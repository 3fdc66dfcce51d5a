use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

use super::make_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    Action,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentCategory {
    Automation,
    Monitoring,
    Troubleshooting,
    Configuration,
    Information,
    AssetManagement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    /// Fixed cutoffs: ≥0.8 high, ≥0.5 medium, else low. Boundary values
    /// fall into the higher bucket.
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.8 {
            ConfidenceLevel::High
        } else if confidence >= 0.5 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextStage {
    StageAb,
    StageC,
    StageD,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub category: IntentCategory,
    pub action: String,
    pub confidence: f64,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub value: String,
    pub confidence: f64,
}

/// Merges two entity sets by `(type, lowercased value)`, the higher
/// confidence copy winning ties. Used both by the Stage A entity
/// extractor and to enforce the Decision invariant on construction.
pub fn merge_entities(entities: Vec<Entity>) -> Vec<Entity> {
    let mut by_key: HashMap<(String, String), Entity> = HashMap::new();
    for entity in entities {
        let key = (entity.entity_type.clone(), entity.value.to_lowercase());
        match by_key.get(&key) {
            Some(existing) if existing.confidence >= entity.confidence => {}
            _ => {
                by_key.insert(key, entity);
            }
        }
    }
    let mut merged: Vec<Entity> = by_key.into_values().collect();
    merged.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
    merged
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub decision_id: String,
    pub timestamp: DateTime<Utc>,
    pub decision_type: DecisionType,
    pub intent: Intent,
    pub entities: Vec<Entity>,
    pub overall_confidence: f64,
    pub confidence_level: ConfidenceLevel,
    pub risk_level: RiskLevel,
    pub original_request: String,
    pub context: HashMap<String, serde_json::Value>,
    pub requires_approval: bool,
    pub next_stage: NextStage,
}

pub struct DecisionBuilder {
    decision_type: DecisionType,
    intent: Intent,
    entities: Vec<Entity>,
    overall_confidence: f64,
    risk_level: RiskLevel,
    original_request: String,
    context: HashMap<String, serde_json::Value>,
    next_stage: NextStage,
}

impl DecisionBuilder {
    pub fn new(
        decision_type: DecisionType,
        intent: Intent,
        overall_confidence: f64,
        risk_level: RiskLevel,
        original_request: impl Into<String>,
        next_stage: NextStage,
    ) -> Self {
        Self {
            decision_type,
            intent,
            entities: Vec::new(),
            overall_confidence,
            risk_level,
            original_request: original_request.into(),
            context: HashMap::new(),
            next_stage,
        }
    }

    pub fn entities(mut self, entities: Vec<Entity>) -> Self {
        self.entities = entities;
        self
    }

    pub fn context(mut self, context: HashMap<String, serde_json::Value>) -> Self {
        self.context = context;
        self
    }

    pub fn build(self) -> Result<Decision, PipelineError> {
        if !(0.0..=1.0).contains(&self.overall_confidence) {
            return Err(PipelineError::Schema {
                field: "overall_confidence",
                reason: format!("{} is out of range [0,1]", self.overall_confidence),
            });
        }
        if !(0.0..=1.0).contains(&self.intent.confidence) {
            return Err(PipelineError::Schema {
                field: "intent.confidence",
                reason: format!("{} is out of range [0,1]", self.intent.confidence),
            });
        }
        for entity in &self.entities {
            if !(0.0..=1.0).contains(&entity.confidence) {
                return Err(PipelineError::Schema {
                    field: "entities[].confidence",
                    reason: format!("{} is out of range [0,1]", entity.confidence),
                });
            }
        }

        let entities = merge_entities(self.entities);
        let confidence_level = ConfidenceLevel::from_confidence(self.overall_confidence);
        let requires_approval = matches!(self.risk_level, RiskLevel::High | RiskLevel::Critical)
            || (confidence_level == ConfidenceLevel::Low && self.decision_type == DecisionType::Action);

        Ok(Decision {
            decision_id: make_id("dec"),
            timestamp: Utc::now(),
            decision_type: self.decision_type,
            intent: self.intent,
            entities,
            overall_confidence: self.overall_confidence,
            confidence_level,
            risk_level: self.risk_level,
            original_request: self.original_request,
            context: self.context,
            requires_approval,
            next_stage: self.next_stage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent() -> Intent {
        Intent {
            category: IntentCategory::Automation,
            action: "restart_service".to_string(),
            confidence: 0.9,
            capabilities: vec!["service_control".to_string()],
        }
    }

    #[test]
    fn confidence_level_boundaries_favor_the_higher_bucket() {
        assert_eq!(ConfidenceLevel::from_confidence(0.8), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_confidence(0.5), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_confidence(0.79), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_confidence(0.49), ConfidenceLevel::Low);
    }

    #[test]
    fn requires_approval_on_high_risk() {
        let decision = DecisionBuilder::new(
            DecisionType::Action,
            intent(),
            0.9,
            RiskLevel::High,
            "restart nginx",
            NextStage::StageAb,
        )
        .build()
        .unwrap();
        assert!(decision.requires_approval);
    }

    #[test]
    fn requires_approval_on_low_confidence_action() {
        let mut low_conf_intent = intent();
        low_conf_intent.confidence = 0.3;
        let decision = DecisionBuilder::new(
            DecisionType::Action,
            low_conf_intent,
            0.3,
            RiskLevel::Low,
            "do something vague",
            NextStage::StageAb,
        )
        .build()
        .unwrap();
        assert!(decision.requires_approval);
    }

    #[test]
    fn low_confidence_info_does_not_require_approval() {
        let decision = DecisionBuilder::new(
            DecisionType::Info,
            intent(),
            0.3,
            RiskLevel::Low,
            "what is this",
            NextStage::StageD,
        )
        .build()
        .unwrap();
        assert!(!decision.requires_approval);
    }

    #[test]
    fn entities_deduplicate_by_type_and_lowercased_value_keeping_higher_confidence() {
        let entities = vec![
            Entity {
                entity_type: "hostname".to_string(),
                value: "WEB-01".to_string(),
                confidence: 0.6,
            },
            Entity {
                entity_type: "hostname".to_string(),
                value: "web-01".to_string(),
                confidence: 0.9,
            },
        ];
        let decision = DecisionBuilder::new(
            DecisionType::Action,
            intent(),
            0.9,
            RiskLevel::Medium,
            "restart on web-01",
            NextStage::StageAb,
        )
        .entities(entities)
        .build()
        .unwrap();
        assert_eq!(decision.entities.len(), 1);
        assert_eq!(decision.entities[0].confidence, 0.9);
    }

    #[test]
    fn out_of_range_confidence_is_a_schema_error() {
        let mut bad_intent = intent();
        bad_intent.confidence = 1.4;
        let result = DecisionBuilder::new(
            DecisionType::Action,
            bad_intent,
            0.5,
            RiskLevel::Low,
            "req",
            NextStage::StageAb,
        )
        .build();
        assert!(matches!(result, Err(PipelineError::Schema { .. })));
    }

    #[test]
    fn round_trips_through_json() {
        let decision = DecisionBuilder::new(
            DecisionType::Action,
            intent(),
            0.9,
            RiskLevel::Medium,
            "restart nginx on web-01",
            NextStage::StageAb,
        )
        .build()
        .unwrap();
        let json = serde_json::to_string(&decision).unwrap();
        let back: Decision = serde_json::from_str(&json).unwrap();
        assert_eq!(decision.decision_id, back.decision_id);
        assert_eq!(decision.risk_level, back.risk_level);
        assert_eq!(decision.overall_confidence, back.overall_confidence);
    }
}
