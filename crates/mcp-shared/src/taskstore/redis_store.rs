//! Redis task store backend.
//!
//! Records and stage results are JSON strings under TTL; streams are lists
//! trimmed to the retention window; progress and ReAct writes also fan out
//! on `ai:progress:{id}` / `react:{id}` for live subscribers.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::errors::McpResult;
use crate::types::{ProgressEvent, ReActStep, Recommendations, Stage, StageResult, TaskRecord};

use super::STREAM_KEEP;

#[derive(Clone)]
pub struct RedisTaskStore {
    conn: ConnectionManager,
    ttl_seconds: u64,
}

fn task_key(task_id: Uuid) -> String {
    format!("task:{task_id}")
}

fn progress_key(task_id: Uuid) -> String {
    format!("stream.progress:{task_id}")
}

fn react_key(task_id: Uuid) -> String {
    format!("stream.react:{task_id}")
}

fn stage_result_key(task_id: Uuid, stage: Stage) -> String {
    format!("stage_result:{task_id}:{stage}")
}

fn adaptive_key(task_id: Uuid) -> String {
    format!("adaptive:{task_id}")
}

fn user_tasks_key(user_id: &str) -> String {
    format!("user:{user_id}:tasks")
}

impl RedisTaskStore {
    pub async fn connect(url: &str, ttl: Duration) -> McpResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            ttl_seconds: ttl.as_secs(),
        })
    }

    pub async fn put_task(&self, record: &TaskRecord) -> McpResult<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(record)?;
        let _: () = conn
            .set_ex(task_key(record.task_id), payload, self.ttl_seconds)
            .await?;
        Ok(())
    }

    pub async fn get_task(&self, task_id: Uuid) -> McpResult<Option<TaskRecord>> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn.get(task_key(task_id)).await?;
        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn append_bounded(&self, key: &str, entry: String) -> McpResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.rpush(key, entry).await?;
        let _: () = conn.ltrim(key, -(STREAM_KEEP as isize), -1).await?;
        let _: () = conn.expire(key, self.ttl_seconds as i64).await?;
        Ok(())
    }

    async fn read_stream<T: serde::de::DeserializeOwned>(&self, key: &str) -> McpResult<Vec<T>> {
        let mut conn = self.conn.clone();
        let entries: Vec<String> = conn.lrange(key, 0, -1).await?;
        let mut parsed = Vec::with_capacity(entries.len());
        for entry in entries {
            parsed.push(serde_json::from_str(&entry)?);
        }
        Ok(parsed)
    }

    pub async fn emit_progress(&self, event: &ProgressEvent) -> McpResult<()> {
        let payload = serde_json::to_string(event)?;
        self.append_bounded(&progress_key(event.task_id), payload.clone())
            .await?;

        let mut conn = self.conn.clone();
        let _: () = conn
            .publish(format!("ai:progress:{}", event.task_id), payload)
            .await?;
        Ok(())
    }

    pub async fn progress_stream(&self, task_id: Uuid) -> McpResult<Vec<ProgressEvent>> {
        self.read_stream(&progress_key(task_id)).await
    }

    pub async fn append_react(&self, step: &ReActStep) -> McpResult<()> {
        let payload = serde_json::to_string(step)?;
        self.append_bounded(&react_key(step.task_id), payload.clone())
            .await?;

        let mut conn = self.conn.clone();
        let _: () = conn
            .publish(format!("react:{}", step.task_id), payload)
            .await?;
        Ok(())
    }

    pub async fn react_stream(&self, task_id: Uuid) -> McpResult<Vec<ReActStep>> {
        self.read_stream(&react_key(task_id)).await
    }

    pub async fn put_stage_result(&self, task_id: Uuid, result: &StageResult) -> McpResult<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(result)?;
        let _: () = conn
            .set_ex(
                stage_result_key(task_id, result.stage()),
                payload,
                self.ttl_seconds,
            )
            .await?;
        Ok(())
    }

    pub async fn get_stage_result(
        &self,
        task_id: Uuid,
        stage: Stage,
    ) -> McpResult<Option<StageResult>> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn.get(stage_result_key(task_id, stage)).await?;
        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn put_recommendations(
        &self,
        task_id: Uuid,
        recommendations: &Recommendations,
    ) -> McpResult<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(recommendations)?;
        let _: () = conn
            .set_ex(adaptive_key(task_id), payload, self.ttl_seconds)
            .await?;
        Ok(())
    }

    pub async fn get_recommendations(&self, task_id: Uuid) -> McpResult<Option<Recommendations>> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn.get(adaptive_key(task_id)).await?;
        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn index_user_task(&self, user_id: &str, task_id: Uuid) -> McpResult<()> {
        let mut conn = self.conn.clone();
        let key = user_tasks_key(user_id);
        let _: () = conn.lpush(&key, task_id.to_string()).await?;
        // Keep the user index around twice as long as any one task
        let _: () = conn.expire(&key, (self.ttl_seconds * 2) as i64).await?;
        Ok(())
    }

    pub async fn list_user_tasks(&self, user_id: &str, limit: usize) -> McpResult<Vec<Uuid>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .lrange(user_tasks_key(user_id), 0, limit as isize - 1)
            .await?;
        Ok(ids
            .into_iter()
            .filter_map(|id| Uuid::parse_str(&id).ok())
            .collect())
    }

    pub async fn scan_tasks(&self) -> McpResult<Vec<TaskRecord>> {
        let mut conn = self.conn.clone();
        let mut keys: Vec<String> = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg("task:*")
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        let mut records = Vec::new();
        for key in keys {
            let payload: Option<String> = conn.get(&key).await?;
            if let Some(json) = payload {
                // Skip records that fail to parse rather than aborting the scan
                if let Ok(record) = serde_json::from_str::<TaskRecord>(&json) {
                    records.push(record);
                }
            }
        }
        Ok(records)
    }

    pub async fn ping(&self) -> bool {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .is_ok()
    }
}
