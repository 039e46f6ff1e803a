//! Adaptive per-user personalization hints bundled into each task message.
//!
//! The defaults are what the coordinator falls back to when the adaptive
//! engine is slow or unreachable; tasks must never fail because of it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseStyle {
    pub detail_level: String,
    pub technical_depth: String,
    pub include_examples: bool,
    pub structured_format: bool,
    pub confidence: f64,
}

impl Default for ResponseStyle {
    fn default() -> Self {
        Self {
            detail_level: "moderate".to_string(),
            technical_depth: "medium".to_string(),
            include_examples: true,
            structured_format: true,
            confidence: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextOptimization {
    pub context_relevance_score: f64,
    pub needs_more_context: bool,
    pub context_optimization: String,
    pub confidence: f64,
}

impl Default for ContextOptimization {
    fn default() -> Self {
        Self {
            context_relevance_score: 0.5,
            needs_more_context: false,
            context_optimization: "medium".to_string(),
            confidence: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationFlow {
    pub flow_stage: String,
    pub recommended_approach: String,
    pub confidence: f64,
}

impl Default for ConversationFlow {
    fn default() -> Self {
        Self {
            flow_stage: "initial".to_string(),
            recommended_approach: "direct_answer".to_string(),
            confidence: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Personalization {
    pub personalization_level: String,
    pub confidence: f64,
}

impl Default for Personalization {
    fn default() -> Self {
        Self {
            personalization_level: "minimal".to_string(),
            confidence: 0.3,
        }
    }
}

/// Top-level recommendations block returned by the adaptive engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendations {
    #[serde(default)]
    pub response_style: ResponseStyle,
    #[serde(default)]
    pub context_optimization: ContextOptimization,
    #[serde(default)]
    pub conversation_flow: ConversationFlow,
    #[serde(default)]
    pub personalization: Personalization,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    0.4
}

impl Default for Recommendations {
    fn default() -> Self {
        Self {
            response_style: ResponseStyle::default(),
            context_optimization: ContextOptimization::default(),
            conversation_flow: ConversationFlow::default(),
            personalization: Personalization::default(),
            confidence: default_confidence(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_block_shape() {
        let defaults = Recommendations::default();

        assert_eq!(defaults.response_style.detail_level, "moderate");
        assert_eq!(defaults.response_style.technical_depth, "medium");
        assert!(defaults.response_style.include_examples);
        assert!(defaults.response_style.structured_format);
        assert_eq!(defaults.personalization.personalization_level, "minimal");
        assert!((defaults.confidence - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_payload_fills_defaults() {
        // The adaptive engine may omit sections; missing keys fall back
        let parsed: Recommendations =
            serde_json::from_str(r#"{"confidence": 0.9}"#).unwrap();

        assert!((parsed.confidence - 0.9).abs() < f64::EPSILON);
        assert_eq!(parsed.conversation_flow.flow_stage, "initial");
    }
}
