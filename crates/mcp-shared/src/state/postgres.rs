//! Postgres state backend. Runtime-checked queries; the analytics SQL mirrors
//! the in-memory computations exactly so both backends report the same
//! numbers.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::errors::McpResult;
use crate::types::{
    AgentHealthMetrics, AgentHealthStatus, AgentPerformanceSample, TaskRecord,
};

use super::types::{
    heartbeat_is_fresh, percentage, AgentHealthRow, AgentPerformanceRow, AgentPerformanceSummary,
    HourlyBucket, StageLogEntry, TaskAnalytics, TaskHistoryEntry, TaskSummary, TemplateUsage,
};

/// Embedded migrations for the durable tables.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

pub async fn persist_task_start(pool: &PgPool, record: &TaskRecord) -> McpResult<()> {
    sqlx::query(
        r#"
        INSERT INTO task_histories (
            id, user_id, query, plan, template, status,
            current_stage, completed_stages, context,
            progress_percentage, started_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (id) DO UPDATE SET
            status = EXCLUDED.status,
            current_stage = EXCLUDED.current_stage,
            progress_percentage = EXCLUDED.progress_percentage,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(record.task_id)
    .bind(&record.user_id)
    .bind(&record.query)
    .bind(serde_json::to_value(&record.plan)?)
    .bind(&record.template)
    .bind(record.status.as_str())
    .bind(record.current_stage.map(|stage| stage.as_str()))
    .bind(serde_json::to_value(&record.completed_stages)?)
    .bind(&record.context)
    .bind(record.progress_percentage as i32)
    .bind(record.started_at)
    .bind(record.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn update_task_state(pool: &PgPool, record: &TaskRecord) -> McpResult<()> {
    sqlx::query(
        r#"
        UPDATE task_histories SET
            status = $1,
            current_stage = $2,
            completed_stages = $3,
            context = $4,
            response = $5,
            error = $6,
            progress_percentage = $7,
            updated_at = $8
        WHERE id = $9
        "#,
    )
    .bind(record.status.as_str())
    .bind(record.current_stage.map(|stage| stage.as_str()))
    .bind(serde_json::to_value(&record.completed_stages)?)
    .bind(&record.context)
    .bind(
        record
            .response
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?,
    )
    .bind(&record.error)
    .bind(record.progress_percentage as i32)
    .bind(record.updated_at)
    .bind(record.task_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn log_stage_event(
    pool: &PgPool,
    task_id: Uuid,
    stage: &str,
    action: &str,
    message: &str,
    metadata: Option<JsonValue>,
) -> McpResult<()> {
    sqlx::query(
        r#"
        INSERT INTO task_stage_logs (task_id, stage, action, message, metadata, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(task_id)
    .bind(stage)
    .bind(action)
    .bind(message)
    .bind(metadata.unwrap_or_else(|| JsonValue::Object(Default::default())))
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_stage_logs(pool: &PgPool, task_id: Uuid) -> McpResult<Vec<StageLogEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT task_id, stage, action, message, metadata, created_at
        FROM task_stage_logs
        WHERE task_id = $1
        ORDER BY created_at
        "#,
    )
    .bind(task_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(StageLogEntry {
                task_id: row.try_get("task_id")?,
                stage: row.try_get("stage")?,
                action: row.try_get("action")?,
                message: row.try_get("message")?,
                metadata: row.try_get("metadata")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .collect()
}

pub async fn record_agent_performance(
    pool: &PgPool,
    sample: &AgentPerformanceSample,
) -> McpResult<()> {
    sqlx::query(
        r#"
        INSERT INTO agent_performance (
            agent_name, task_id, stage, duration_ms, success,
            error_message, metadata, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(&sample.agent_name)
    .bind(sample.task_id)
    .bind(sample.stage.as_str())
    .bind(sample.duration_ms)
    .bind(sample.success)
    .bind(&sample.error_message)
    .bind(
        sample
            .metadata
            .clone()
            .unwrap_or_else(|| JsonValue::Object(Default::default())),
    )
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn update_agent_health(
    pool: &PgPool,
    agent_name: &str,
    status: AgentHealthStatus,
    metrics: Option<&AgentHealthMetrics>,
) -> McpResult<()> {
    let now = Utc::now();
    let (cpu, memory, queue_size, processed, failed) = match metrics {
        Some(metrics) => (
            metrics.cpu_usage,
            metrics.memory_usage,
            metrics.queue_size as i32,
            metrics.processed_tasks as i64,
            metrics.failed_tasks as i64,
        ),
        None => (None, None, 0, 0, 0),
    };

    sqlx::query(
        r#"
        INSERT INTO agent_health (
            agent_name, status, last_heartbeat, cpu_usage, memory_usage,
            queue_size, processed_tasks, failed_tasks, metadata, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, '{}'::jsonb, $9, $9)
        ON CONFLICT (agent_name) DO UPDATE SET
            status = EXCLUDED.status,
            last_heartbeat = EXCLUDED.last_heartbeat,
            cpu_usage = EXCLUDED.cpu_usage,
            memory_usage = EXCLUDED.memory_usage,
            queue_size = EXCLUDED.queue_size,
            processed_tasks = agent_health.processed_tasks + EXCLUDED.processed_tasks,
            failed_tasks = agent_health.failed_tasks + EXCLUDED.failed_tasks,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(agent_name)
    .bind(status.as_str())
    .bind(now)
    .bind(cpu)
    .bind(memory)
    .bind(queue_size)
    .bind(processed)
    .bind(failed)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_task_analytics(pool: &PgPool, hours: i64) -> McpResult<TaskAnalytics> {
    let since = Utc::now() - chrono::Duration::hours(hours);

    let summary_row = sqlx::query(
        r#"
        SELECT
            COUNT(*) AS total_tasks,
            COUNT(*) FILTER (WHERE status = 'complete') AS completed_tasks,
            COUNT(*) FILTER (WHERE status = 'failed') AS failed_tasks,
            COUNT(*) FILTER (WHERE status = 'in_progress') AS active_tasks,
            COALESCE(AVG(EXTRACT(EPOCH FROM (updated_at - started_at)) * 1000), 0)::BIGINT
                AS avg_duration_ms
        FROM task_histories
        WHERE started_at >= $1
        "#,
    )
    .bind(since)
    .fetch_one(pool)
    .await?;

    let task_summary = TaskSummary {
        total_tasks: summary_row.try_get("total_tasks")?,
        completed_tasks: summary_row.try_get("completed_tasks")?,
        failed_tasks: summary_row.try_get("failed_tasks")?,
        active_tasks: summary_row.try_get("active_tasks")?,
        avg_duration_ms: summary_row.try_get("avg_duration_ms")?,
    };

    let template_rows = sqlx::query(
        r#"
        SELECT
            template,
            COUNT(*) AS count,
            COALESCE(AVG(EXTRACT(EPOCH FROM (updated_at - started_at)) * 1000), 0)::BIGINT
                AS avg_duration_ms
        FROM task_histories
        WHERE started_at >= $1
        GROUP BY template
        ORDER BY count DESC, template
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    let template_usage = template_rows
        .into_iter()
        .map(|row| {
            Ok(TemplateUsage {
                template: row.try_get("template")?,
                count: row.try_get("count")?,
                avg_duration_ms: row.try_get("avg_duration_ms")?,
            })
        })
        .collect::<McpResult<Vec<_>>>()?;

    let hourly_rows = sqlx::query(
        r#"
        SELECT
            DATE_TRUNC('hour', started_at) AS hour,
            COUNT(*) AS tasks,
            COUNT(*) FILTER (WHERE status = 'complete') AS completed
        FROM task_histories
        WHERE started_at >= $1
        GROUP BY hour
        ORDER BY hour
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    let hourly_breakdown = hourly_rows
        .into_iter()
        .map(|row| {
            let tasks: i64 = row.try_get("tasks")?;
            let completed: i64 = row.try_get("completed")?;
            Ok(HourlyBucket {
                hour: row.try_get::<DateTime<Utc>, _>("hour")?,
                tasks,
                completed,
                success_rate: percentage(completed, tasks),
            })
        })
        .collect::<McpResult<Vec<_>>>()?;

    Ok(TaskAnalytics {
        period: format!("last_{hours}_hours"),
        task_summary,
        template_usage,
        hourly_breakdown,
        generated_at: Utc::now(),
    })
}

pub async fn get_agent_performance_summary(
    pool: &PgPool,
    hours: i64,
) -> McpResult<AgentPerformanceSummary> {
    let since = Utc::now() - chrono::Duration::hours(hours);
    let now = Utc::now();

    let performance_rows = sqlx::query(
        r#"
        SELECT
            agent_name,
            COUNT(*) AS total_tasks,
            COUNT(*) FILTER (WHERE success) AS successful_tasks,
            AVG(duration_ms)::BIGINT AS avg_duration_ms,
            MIN(duration_ms) AS min_duration_ms,
            MAX(duration_ms) AS max_duration_ms
        FROM agent_performance
        WHERE created_at >= $1
        GROUP BY agent_name
        ORDER BY total_tasks DESC, agent_name
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    let agent_performance = performance_rows
        .into_iter()
        .map(|row| {
            let total: i64 = row.try_get("total_tasks")?;
            let successful: i64 = row.try_get("successful_tasks")?;
            Ok(AgentPerformanceRow {
                agent_name: row.try_get("agent_name")?,
                total_tasks: total,
                successful_tasks: successful,
                success_rate: percentage(successful, total),
                avg_duration_ms: row.try_get("avg_duration_ms")?,
                min_duration_ms: row.try_get("min_duration_ms")?,
                max_duration_ms: row.try_get("max_duration_ms")?,
            })
        })
        .collect::<McpResult<Vec<_>>>()?;

    let health_rows = sqlx::query(
        r#"
        SELECT
            agent_name, status, last_heartbeat, cpu_usage, memory_usage,
            queue_size, processed_tasks, failed_tasks
        FROM agent_health
        ORDER BY agent_name
        "#,
    )
    .fetch_all(pool)
    .await?;

    let agent_health = health_rows
        .into_iter()
        .map(|row| {
            let status: String = row.try_get("status")?;
            let last_heartbeat: Option<DateTime<Utc>> = row.try_get("last_heartbeat")?;
            Ok(AgentHealthRow {
                agent_name: row.try_get("agent_name")?,
                is_healthy: heartbeat_is_fresh(&status, last_heartbeat, now),
                status,
                last_heartbeat,
                cpu_usage: row.try_get("cpu_usage")?,
                memory_usage: row.try_get("memory_usage")?,
                queue_size: row.try_get::<i32, _>("queue_size")? as i64,
                processed_tasks: row.try_get("processed_tasks")?,
                failed_tasks: row.try_get("failed_tasks")?,
            })
        })
        .collect::<McpResult<Vec<_>>>()?;

    Ok(AgentPerformanceSummary {
        period: format!("last_{hours}_hours"),
        agent_performance,
        agent_health,
        generated_at: now,
    })
}

pub async fn get_task_history(
    pool: &PgPool,
    user_id: &str,
    limit: i64,
) -> McpResult<Vec<TaskHistoryEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT
            id, query, template, status, progress_percentage,
            started_at, updated_at,
            (EXTRACT(EPOCH FROM (updated_at - started_at)) * 1000)::BIGINT AS duration_ms
        FROM task_histories
        WHERE user_id = $1
        ORDER BY started_at DESC
        LIMIT $2
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(TaskHistoryEntry {
                task_id: row.try_get("id")?,
                query: row.try_get("query")?,
                template: row.try_get("template")?,
                status: row.try_get("status")?,
                progress_percentage: row.try_get("progress_percentage")?,
                started_at: row.try_get("started_at")?,
                updated_at: row.try_get("updated_at")?,
                duration_ms: row.try_get("duration_ms")?,
            })
        })
        .collect()
}

pub async fn prune_old_data(pool: &PgPool, cutoff: DateTime<Utc>) -> McpResult<(u64, u64)> {
    let logs = sqlx::query("DELETE FROM task_stage_logs WHERE created_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await?
        .rows_affected();

    let samples = sqlx::query("DELETE FROM agent_performance WHERE created_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await?
        .rows_affected();

    Ok((logs, samples))
}
