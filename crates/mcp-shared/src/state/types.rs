//! Analytics and reporting shapes returned by the state manager.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Heartbeats older than this mark an agent unhealthy regardless of its
/// last reported status.
pub const HEARTBEAT_FRESHNESS_SECONDS: i64 = 300;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskSummary {
    pub total_tasks: i64,
    pub completed_tasks: i64,
    pub failed_tasks: i64,
    pub active_tasks: i64,
    pub avg_duration_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateUsage {
    pub template: String,
    pub count: i64,
    pub avg_duration_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlyBucket {
    pub hour: DateTime<Utc>,
    pub tasks: i64,
    pub completed: i64,
    /// Percentage, one decimal place
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAnalytics {
    pub period: String,
    pub task_summary: TaskSummary,
    pub template_usage: Vec<TemplateUsage>,
    pub hourly_breakdown: Vec<HourlyBucket>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPerformanceRow {
    pub agent_name: String,
    pub total_tasks: i64,
    pub successful_tasks: i64,
    pub success_rate: f64,
    pub avg_duration_ms: i64,
    pub min_duration_ms: i64,
    pub max_duration_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHealthRow {
    pub agent_name: String,
    pub status: String,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub cpu_usage: Option<f64>,
    pub memory_usage: Option<f64>,
    pub queue_size: i64,
    pub processed_tasks: i64,
    pub failed_tasks: i64,
    pub is_healthy: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPerformanceSummary {
    pub period: String,
    pub agent_performance: Vec<AgentPerformanceRow>,
    pub agent_health: Vec<AgentHealthRow>,
    pub generated_at: DateTime<Utc>,
}

/// One append-only stage log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageLogEntry {
    pub task_id: Uuid,
    pub stage: String,
    pub action: String,
    pub message: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskHistoryEntry {
    pub task_id: Uuid,
    pub query: String,
    pub template: String,
    pub status: String,
    pub progress_percentage: i32,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub duration_ms: i64,
}

/// One decimal place, matching the analytics contract.
pub fn percentage(part: i64, whole: i64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    ((part as f64 / whole as f64) * 1000.0).round() / 10.0
}

/// Whether a health row counts as healthy right now.
pub fn heartbeat_is_fresh(
    status: &str,
    last_heartbeat: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    status == "healthy"
        && last_heartbeat
            .map(|beat| (now - beat).num_seconds() < HEARTBEAT_FRESHNESS_SECONDS)
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_rounds_to_one_decimal() {
        assert_eq!(percentage(1, 3), 33.3);
        assert_eq!(percentage(2, 3), 66.7);
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(5, 5), 100.0);
    }

    #[test]
    fn test_heartbeat_freshness() {
        let now = Utc::now();
        assert!(heartbeat_is_fresh("healthy", Some(now), now));
        assert!(!heartbeat_is_fresh(
            "healthy",
            Some(now - chrono::Duration::seconds(301)),
            now
        ));
        assert!(!heartbeat_is_fresh("unhealthy", Some(now), now));
        assert!(!heartbeat_is_fresh("healthy", None, now));
    }
}
