//! Moderation agent: scores the executor's draft for safety before
//! packaging. Keyword screening here; the production agent fronts a
//! moderation model.

use async_trait::async_trait;

use mcp_shared::errors::{McpError, McpResult};
use mcp_shared::types::{ModerationResult, Stage, StageResult, TaskMessage};

use crate::harness::{ReactEmitter, StageProcessor};

const BLOCKLIST: &[(&str, &str)] = &[
    ("password", "credential_exposure"),
    ("api key", "credential_exposure"),
    ("secret key", "credential_exposure"),
    ("ssn", "pii"),
    ("social security", "pii"),
];

const FLAGGED_SAFETY_SCORE: f64 = 0.4;

pub struct ModeratorAgent;

impl ModeratorAgent {
    fn screen(text: &str) -> (ModerationResult, f64) {
        let lowered = text.to_lowercase();
        let mut flagged: Vec<String> = BLOCKLIST
            .iter()
            .filter(|(marker, _)| lowered.contains(marker))
            .map(|(_, category)| category.to_string())
            .collect();
        flagged.sort_unstable();
        flagged.dedup();

        let approved = flagged.is_empty();
        let safety_score = if approved { 1.0 } else { FLAGGED_SAFETY_SCORE };

        (
            ModerationResult {
                approved,
                notes: (!approved).then(|| "sensitive content markers found".to_string()),
                flagged_categories: flagged,
            },
            safety_score,
        )
    }
}

#[async_trait]
impl StageProcessor for ModeratorAgent {
    fn agent_name(&self) -> &str {
        "moderator_agent"
    }

    fn stage(&self) -> Stage {
        Stage::Moderation
    }

    async fn process(
        &self,
        message: &TaskMessage,
        react: &ReactEmitter,
    ) -> McpResult<StageResult> {
        react.thought("Screening the draft response").await;

        // The draft travels in the context scratchpad by the time
        // moderation runs; screen the query too for prompt-level issues
        let subject = if message.context.is_empty() {
            &message.query
        } else {
            &message.context
        };
        if subject.trim().is_empty() {
            return Err(McpError::Processing("nothing to moderate".to_string()));
        }

        let (moderation_result, safety_score) = Self::screen(subject);

        react
            .observation(if moderation_result.approved {
                "Draft approved".to_string()
            } else {
                format!(
                    "Draft flagged: {}",
                    moderation_result.flagged_categories.join(", ")
                )
            })
            .await;

        Ok(StageResult::Moderation {
            moderation_result,
            safety_score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_is_approved_at_full_safety() {
        let (result, safety) = ModeratorAgent::screen("The rotation is weekly.");
        assert!(result.approved);
        assert!(result.flagged_categories.is_empty());
        assert!((safety - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_credential_markers_are_flagged() {
        let (result, safety) = ModeratorAgent::screen("The admin password is hunter2");
        assert!(!result.approved);
        assert_eq!(result.flagged_categories, vec!["credential_exposure"]);
        assert!((safety - FLAGGED_SAFETY_SCORE).abs() < f64::EPSILON);
    }

    #[test]
    fn test_categories_are_deduplicated() {
        let (result, _) = ModeratorAgent::screen("password and api key in one place");
        assert_eq!(result.flagged_categories.len(), 1);
    }
}
