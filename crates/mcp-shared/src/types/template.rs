//! DAG templates: named, ordered stage plans plus selection hints.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::task::Stage;

/// Predicate hints used only when *selecting* a template, never during
/// execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateConditions {
    #[serde(default)]
    pub complexity: String,
    #[serde(default)]
    pub requires_web_search: bool,
    #[serde(default)]
    pub direct_answer: bool,
}

/// A named, ordered list of stages defining one way to answer a query.
/// Immutable at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagTemplate {
    pub name: String,
    pub description: String,
    pub stages: Vec<Stage>,
    #[serde(default)]
    pub conditions: TemplateConditions,
    pub estimated_duration_ms: u64,
}

/// Registry of known templates, keyed by unique name.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: HashMap<String, DagTemplate>,
}

impl TemplateRegistry {
    /// Registry preloaded with the built-in flows.
    pub fn builtin() -> Self {
        let mut templates = HashMap::new();
        for template in builtin_templates() {
            templates.insert(template.name.clone(), template);
        }
        Self { templates }
    }

    pub fn get(&self, name: &str) -> Option<&DagTemplate> {
        self.templates.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn builtin_templates() -> Vec<DagTemplate> {
    use Stage::*;

    vec![
        DagTemplate {
            name: "standard_query".to_string(),
            description: "Standard question answering flow for most queries".to_string(),
            stages: vec![
                IntentAnalysis,
                EmbeddingLookup,
                ExecutorReasoning,
                Moderation,
                ResponsePackaging,
            ],
            conditions: TemplateConditions {
                complexity: "medium".to_string(),
                requires_web_search: false,
                direct_answer: false,
            },
            estimated_duration_ms: 15_000,
        },
        DagTemplate {
            name: "simple_lookup".to_string(),
            description: "Simple document lookup without complex reasoning".to_string(),
            stages: vec![EmbeddingLookup, ResponsePackaging],
            conditions: TemplateConditions {
                complexity: "low".to_string(),
                requires_web_search: false,
                direct_answer: true,
            },
            estimated_duration_ms: 5_000,
        },
        DagTemplate {
            name: "complex_research".to_string(),
            description: "Complex multi-step research with web augmentation".to_string(),
            stages: vec![
                IntentAnalysis,
                EmbeddingLookup,
                WebSearch,
                ExecutorReasoning,
                Moderation,
                ResponsePackaging,
            ],
            conditions: TemplateConditions {
                complexity: "high".to_string(),
                requires_web_search: true,
                direct_answer: false,
            },
            estimated_duration_ms: 30_000,
        },
        DagTemplate {
            name: "web_enhanced".to_string(),
            description: "Web search enhanced response for current information".to_string(),
            stages: vec![
                IntentAnalysis,
                WebSearch,
                EmbeddingLookup,
                ExecutorReasoning,
                Moderation,
                ResponsePackaging,
            ],
            conditions: TemplateConditions {
                complexity: "medium".to_string(),
                requires_web_search: true,
                direct_answer: false,
            },
            estimated_duration_ms: 20_000,
        },
        DagTemplate {
            name: "quick_answer".to_string(),
            description: "Ultra-fast response for simple factual queries".to_string(),
            stages: vec![EmbeddingLookup, ExecutorReasoning, ResponsePackaging],
            conditions: TemplateConditions {
                complexity: "very_low".to_string(),
                requires_web_search: false,
                direct_answer: true,
            },
            estimated_duration_ms: 3_000,
        },
    ]
}
