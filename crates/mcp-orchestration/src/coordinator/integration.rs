//! Stage-result integration rules.
//!
//! Pure functions over the task record so integration is deterministic:
//! given the same sequence of stage results, the record (minus timestamps)
//! comes out byte-identical.
//!
//! Document accumulation merges with dedupe-by-id, keeping the
//! earliest-inserted hit on collision and preserving order otherwise. That
//! single rule covers both the plain lookup case (empty accumulator,
//! equivalent to assignment) and the web-enhanced case where web hits arrive
//! before the vector lookup.

use mcp_shared::types::{DocumentHit, StageResult, TaskRecord};

/// Apply one stage's result to the task record.
pub fn integrate(record: &mut TaskRecord, result: &StageResult) {
    match result {
        StageResult::IntentAnalysis {
            intent_classification,
            processing_strategy,
        } => {
            record.intent_classification = Some(intent_classification.clone());
            record.processing_strategy = Some(processing_strategy.clone());
        }
        StageResult::EmbeddingLookup { documents, context } => {
            merge_documents(&mut record.vector_hits, documents);
            record.context = context.clone();
        }
        StageResult::WebSearch { documents, .. } => {
            merge_documents(&mut record.vector_hits, documents);
        }
        StageResult::ExecutorReasoning {
            response,
            reasoning_metadata,
        } => {
            record.ai_response = Some(response.clone());
            record.reasoning_metadata = Some(reasoning_metadata.clone());
        }
        StageResult::Moderation {
            moderation_result,
            safety_score,
        } => {
            record.moderation_result = Some(moderation_result.clone());
            record.safety_score = Some(*safety_score);
        }
    }
}

/// Append `incoming` to `existing`, skipping ids already present. The
/// earliest-inserted entry wins a collision; relative order is preserved.
pub fn merge_documents(existing: &mut Vec<DocumentHit>, incoming: &[DocumentHit]) {
    for document in incoming {
        if !existing.iter().any(|hit| hit.id == document.id) {
            existing.push(document.clone());
        }
    }
}
