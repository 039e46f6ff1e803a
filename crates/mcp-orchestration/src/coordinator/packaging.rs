//! Response packaging: the terminal stage, executed inline by the
//! coordinator.
//!
//! Assembles the final payload from the integrated record: the executor's
//! content, the accumulated (already deduplicated) sources in insertion
//! order, the confidence clamp `min(ai_confidence, safety_score)`, and the
//! chronological ReAct history.

use chrono::Utc;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use mcp_shared::errors::{McpError, McpResult};
use mcp_shared::messaging::router::RESPONSE_READY_CHANNEL;
use mcp_shared::messaging::Broker;
use mcp_shared::state::StateManager;
use mcp_shared::taskstore::TaskStore;
use mcp_shared::types::{
    FinalResponse, ProgressEvent, ResponseMetadata, Stage, TaskStatus,
};

const DEFAULT_AI_CONFIDENCE: f64 = 0.8;
const DEFAULT_SAFETY_SCORE: f64 = 1.0;

/// Package the final response, mark the task complete, and announce it.
pub async fn package_response(
    store: &TaskStore,
    broker: &Broker,
    state: &StateManager,
    task_id: Uuid,
) -> McpResult<FinalResponse> {
    let record = store
        .get_task(task_id)
        .await?
        .ok_or(McpError::TaskNotFound(task_id))?;

    let mut react_steps = store.react_stream(task_id).await?;
    react_steps.sort_by_key(|step| step.timestamp);

    let content = record
        .ai_response
        .as_ref()
        .map(|response| response.content.clone())
        .unwrap_or_else(|| record.context.clone());
    let ai_confidence = record
        .ai_response
        .as_ref()
        .map(|response| response.confidence_score)
        .unwrap_or(DEFAULT_AI_CONFIDENCE);
    let safety_score = record.safety_score.unwrap_or(DEFAULT_SAFETY_SCORE);
    let confidence = ai_confidence.min(safety_score);

    let agent_count = {
        let mut agents: Vec<&str> = react_steps.iter().map(|step| step.agent.as_str()).collect();
        agents.sort_unstable();
        agents.dedup();
        agents.len()
    };

    let mut completed_stages = record.completed_stages.clone();
    completed_stages.push(Stage::ResponsePackaging);

    let response = FinalResponse {
        content,
        sources: record.vector_hits.clone(),
        confidence,
        task_id,
        template: record.template.clone(),
        completed_stages: completed_stages.clone(),
        metadata: ResponseMetadata {
            total_stages: record.plan.len(),
            duration_ms: (Utc::now() - record.started_at).num_milliseconds(),
            agent_count,
            react_steps_count: react_steps.len(),
            documents_processed: record.vector_hits.len(),
            safety_score,
        },
        react_steps,
    };

    let updated = store
        .update_task(task_id, |task| {
            // An abort that landed while packaging ran wins
            if task.status != TaskStatus::InProgress {
                return;
            }
            task.completed_stages.push(Stage::ResponsePackaging);
            task.current_stage = None;
            task.status = TaskStatus::Complete;
            task.progress_percentage = 100;
            task.response = Some(response.clone());
        })
        .await?;
    if updated.status != TaskStatus::Complete {
        return Ok(response);
    }

    store
        .emit_progress(ProgressEvent {
            task_id,
            stage: "complete".to_string(),
            message: "Task completed successfully".to_string(),
            timestamp: Utc::now(),
            metadata: Some(json!({
                "final_response": true,
                "response_length": response.content.len(),
                "source_count": response.sources.len(),
                "react_steps_count": response.metadata.react_steps_count,
                "final_confidence": response.confidence,
            })),
            progress: Some(100),
        })
        .await?;

    broker
        .publish_json(
            RESPONSE_READY_CHANNEL,
            &json!({
                "task_id": task_id,
                "user_id": updated.user_id,
                "response": response,
            }),
        )
        .await?;

    if let Err(err) = state.update_task_state(&updated).await {
        tracing::warn!(task_id = %task_id, error = %err, "Durable store lagging; reconciler will catch up");
    }
    let _ = state
        .log_stage_event(
            task_id,
            Stage::ResponsePackaging.as_str(),
            "complete",
            "Response packaged",
            None,
        )
        .await;

    info!(
        task_id = %task_id,
        sources = response.sources.len(),
        confidence = response.confidence,
        "Packaged final response"
    );

    Ok(response)
}
