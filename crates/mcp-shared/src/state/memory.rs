//! In-memory state backend. Same aggregation semantics as the Postgres
//! queries, computed over plain vectors; used by tests and local runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Timelike, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::types::{
    AgentHealthMetrics, AgentHealthStatus, AgentPerformanceSample, TaskRecord, TaskStatus,
};

use super::types::{
    heartbeat_is_fresh, percentage, AgentHealthRow, AgentPerformanceRow, AgentPerformanceSummary,
    HourlyBucket, StageLogEntry, TaskAnalytics, TaskHistoryEntry, TaskSummary, TemplateUsage,
};

#[derive(Debug, Clone)]
struct HealthRow {
    status: AgentHealthStatus,
    last_heartbeat: DateTime<Utc>,
    cpu_usage: Option<f64>,
    memory_usage: Option<f64>,
    queue_size: u32,
    processed_tasks: u64,
    failed_tasks: u64,
}

#[derive(Clone)]
pub struct InMemoryState {
    inner: Arc<StateInner>,
}

struct StateInner {
    tasks: Mutex<HashMap<Uuid, TaskRecord>>,
    stage_logs: Mutex<Vec<StageLogEntry>>,
    samples: Mutex<Vec<(AgentPerformanceSample, DateTime<Utc>)>>,
    health: Mutex<HashMap<String, HealthRow>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemoryState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StateInner {
                tasks: Mutex::new(HashMap::new()),
                stage_logs: Mutex::new(Vec::new()),
                samples: Mutex::new(Vec::new()),
                health: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn upsert_task(&self, record: &TaskRecord) {
        lock(&self.inner.tasks).insert(record.task_id, record.clone());
    }

    pub fn log_stage_event(
        &self,
        task_id: Uuid,
        stage: &str,
        action: &str,
        message: &str,
        metadata: Option<JsonValue>,
    ) {
        lock(&self.inner.stage_logs).push(StageLogEntry {
            task_id,
            stage: stage.to_string(),
            action: action.to_string(),
            message: message.to_string(),
            metadata: metadata.unwrap_or_else(|| JsonValue::Object(Default::default())),
            created_at: Utc::now(),
        });
    }

    pub fn get_stage_logs(&self, task_id: Uuid) -> Vec<StageLogEntry> {
        lock(&self.inner.stage_logs)
            .iter()
            .filter(|row| row.task_id == task_id)
            .cloned()
            .collect()
    }

    pub fn record_agent_performance(&self, sample: AgentPerformanceSample) {
        lock(&self.inner.samples).push((sample, Utc::now()));
    }

    pub fn update_agent_health(
        &self,
        agent_name: &str,
        status: AgentHealthStatus,
        metrics: Option<&AgentHealthMetrics>,
    ) {
        let mut health = lock(&self.inner.health);
        let entry = health.entry(agent_name.to_string()).or_insert(HealthRow {
            status,
            last_heartbeat: Utc::now(),
            cpu_usage: None,
            memory_usage: None,
            queue_size: 0,
            processed_tasks: 0,
            failed_tasks: 0,
        });

        entry.status = status;
        entry.last_heartbeat = Utc::now();
        if let Some(metrics) = metrics {
            entry.cpu_usage = metrics.cpu_usage;
            entry.memory_usage = metrics.memory_usage;
            entry.queue_size = metrics.queue_size;
            entry.processed_tasks += metrics.processed_tasks;
            entry.failed_tasks += metrics.failed_tasks;
        }
    }

    pub fn get_task_analytics(&self, hours: i64) -> TaskAnalytics {
        let since = Utc::now() - Duration::hours(hours);
        let tasks = lock(&self.inner.tasks);
        let recent: Vec<&TaskRecord> = tasks
            .values()
            .filter(|task| task.started_at >= since)
            .collect();

        let duration_ms =
            |task: &TaskRecord| (task.updated_at - task.started_at).num_milliseconds();

        let mut summary = TaskSummary {
            total_tasks: recent.len() as i64,
            ..Default::default()
        };
        let mut total_duration = 0i64;
        for task in &recent {
            match task.status {
                TaskStatus::Complete => summary.completed_tasks += 1,
                TaskStatus::Failed => summary.failed_tasks += 1,
                TaskStatus::InProgress => summary.active_tasks += 1,
                TaskStatus::Aborted => {}
            }
            total_duration += duration_ms(task);
        }
        if !recent.is_empty() {
            summary.avg_duration_ms = total_duration / recent.len() as i64;
        }

        let mut by_template: HashMap<&str, (i64, i64)> = HashMap::new();
        for task in &recent {
            let entry = by_template.entry(task.template.as_str()).or_default();
            entry.0 += 1;
            entry.1 += duration_ms(task);
        }
        let mut template_usage: Vec<TemplateUsage> = by_template
            .into_iter()
            .map(|(template, (count, duration))| TemplateUsage {
                template: template.to_string(),
                count,
                avg_duration_ms: duration / count,
            })
            .collect();
        template_usage.sort_by(|a, b| b.count.cmp(&a.count).then(a.template.cmp(&b.template)));

        let mut by_hour: HashMap<DateTime<Utc>, (i64, i64)> = HashMap::new();
        for task in &recent {
            let hour = task
                .started_at
                .with_minute(0)
                .and_then(|t| t.with_second(0))
                .and_then(|t| t.with_nanosecond(0))
                .unwrap_or(task.started_at);
            let entry = by_hour.entry(hour).or_default();
            entry.0 += 1;
            if task.status == TaskStatus::Complete {
                entry.1 += 1;
            }
        }
        let mut hourly_breakdown: Vec<HourlyBucket> = by_hour
            .into_iter()
            .map(|(hour, (tasks, completed))| HourlyBucket {
                hour,
                tasks,
                completed,
                success_rate: percentage(completed, tasks),
            })
            .collect();
        hourly_breakdown.sort_by_key(|bucket| bucket.hour);

        TaskAnalytics {
            period: format!("last_{hours}_hours"),
            task_summary: summary,
            template_usage,
            hourly_breakdown,
            generated_at: Utc::now(),
        }
    }

    pub fn get_agent_performance_summary(&self, hours: i64) -> AgentPerformanceSummary {
        let since = Utc::now() - Duration::hours(hours);
        let now = Utc::now();

        let samples = lock(&self.inner.samples);
        let mut by_agent: HashMap<&str, Vec<&AgentPerformanceSample>> = HashMap::new();
        for (sample, created_at) in samples.iter() {
            if *created_at >= since {
                by_agent
                    .entry(sample.agent_name.as_str())
                    .or_default()
                    .push(sample);
            }
        }

        let mut agent_performance: Vec<AgentPerformanceRow> = by_agent
            .into_iter()
            .map(|(agent, samples)| {
                let total = samples.len() as i64;
                let successful = samples.iter().filter(|s| s.success).count() as i64;
                let durations: Vec<i64> = samples.iter().map(|s| s.duration_ms).collect();
                AgentPerformanceRow {
                    agent_name: agent.to_string(),
                    total_tasks: total,
                    successful_tasks: successful,
                    success_rate: percentage(successful, total),
                    avg_duration_ms: durations.iter().sum::<i64>() / total,
                    min_duration_ms: durations.iter().copied().min().unwrap_or(0),
                    max_duration_ms: durations.iter().copied().max().unwrap_or(0),
                }
            })
            .collect();
        agent_performance
            .sort_by(|a, b| b.total_tasks.cmp(&a.total_tasks).then(a.agent_name.cmp(&b.agent_name)));

        let health = lock(&self.inner.health);
        let mut agent_health: Vec<AgentHealthRow> = health
            .iter()
            .map(|(agent, row)| AgentHealthRow {
                agent_name: agent.clone(),
                status: row.status.as_str().to_string(),
                last_heartbeat: Some(row.last_heartbeat),
                cpu_usage: row.cpu_usage,
                memory_usage: row.memory_usage,
                queue_size: row.queue_size as i64,
                processed_tasks: row.processed_tasks as i64,
                failed_tasks: row.failed_tasks as i64,
                is_healthy: heartbeat_is_fresh(
                    row.status.as_str(),
                    Some(row.last_heartbeat),
                    now,
                ),
            })
            .collect();
        agent_health.sort_by(|a, b| a.agent_name.cmp(&b.agent_name));

        AgentPerformanceSummary {
            period: format!("last_{hours}_hours"),
            agent_performance,
            agent_health,
            generated_at: now,
        }
    }

    pub fn get_task_history(&self, user_id: &str, limit: i64) -> Vec<TaskHistoryEntry> {
        let tasks = lock(&self.inner.tasks);
        let mut entries: Vec<TaskHistoryEntry> = tasks
            .values()
            .filter(|task| task.user_id == user_id)
            .map(|task| TaskHistoryEntry {
                task_id: task.task_id,
                query: task.query.clone(),
                template: task.template.clone(),
                status: task.status.as_str().to_string(),
                progress_percentage: task.progress_percentage as i32,
                started_at: task.started_at,
                updated_at: task.updated_at,
                duration_ms: (task.updated_at - task.started_at).num_milliseconds(),
            })
            .collect();
        entries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        entries.truncate(limit.max(0) as usize);
        entries
    }

    pub fn prune_old_data(&self, cutoff: DateTime<Utc>) -> (u64, u64) {
        let mut logs = lock(&self.inner.stage_logs);
        let before_logs = logs.len();
        logs.retain(|row| row.created_at >= cutoff);
        let pruned_logs = (before_logs - logs.len()) as u64;

        let mut samples = lock(&self.inner.samples);
        let before_samples = samples.len();
        samples.retain(|(_, created_at)| *created_at >= cutoff);
        let pruned_samples = (before_samples - samples.len()) as u64;

        (pruned_logs, pruned_samples)
    }
}

impl Default for InMemoryState {
    fn default() -> Self {
        Self::new()
    }
}
