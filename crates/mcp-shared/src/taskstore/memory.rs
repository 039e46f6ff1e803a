//! In-memory task store with emulated TTL. Serves the same durable-tail
//! contract as the Redis store; channel fan-out is a production concern and
//! is not emulated here; tests read the stream tails.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::types::{ProgressEvent, ReActStep, Recommendations, Stage, StageResult, TaskRecord};

use super::STREAM_KEEP;

#[derive(Clone)]
struct Expiring<T> {
    value: T,
    expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct InMemoryTaskStore {
    inner: Arc<Inner>,
    ttl: chrono::Duration,
}

struct Inner {
    tasks: DashMap<Uuid, Expiring<TaskRecord>>,
    stage_results: DashMap<(Uuid, Stage), StageResult>,
    recommendations: DashMap<Uuid, Recommendations>,
    progress: Mutex<HashMap<Uuid, VecDeque<ProgressEvent>>>,
    react: Mutex<HashMap<Uuid, VecDeque<ReActStep>>>,
    user_tasks: Mutex<HashMap<String, Vec<Uuid>>>,
}

impl InMemoryTaskStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                tasks: DashMap::new(),
                stage_results: DashMap::new(),
                recommendations: DashMap::new(),
                progress: Mutex::new(HashMap::new()),
                react: Mutex::new(HashMap::new()),
                user_tasks: Mutex::new(HashMap::new()),
            }),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(600)),
        }
    }

    pub fn put_task(&self, record: &TaskRecord) {
        self.inner.tasks.insert(
            record.task_id,
            Expiring {
                value: record.clone(),
                expires_at: Utc::now() + self.ttl,
            },
        );
    }

    pub fn get_task(&self, task_id: Uuid) -> Option<TaskRecord> {
        let entry = self.inner.tasks.get(&task_id)?;
        if entry.expires_at <= Utc::now() {
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn emit_progress(&self, event: ProgressEvent) {
        let mut streams = self
            .inner
            .progress
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        let stream = streams.entry(event.task_id).or_default();
        stream.push_back(event);
        while stream.len() > STREAM_KEEP {
            stream.pop_front();
        }
    }

    pub fn progress_stream(&self, task_id: Uuid) -> Vec<ProgressEvent> {
        self.inner
            .progress
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&task_id)
            .map(|stream| stream.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn append_react(&self, step: ReActStep) {
        let mut streams = self.inner.react.lock().unwrap_or_else(|p| p.into_inner());
        let stream = streams.entry(step.task_id).or_default();
        stream.push_back(step);
        while stream.len() > STREAM_KEEP {
            stream.pop_front();
        }
    }

    pub fn react_stream(&self, task_id: Uuid) -> Vec<ReActStep> {
        self.inner
            .react
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&task_id)
            .map(|stream| stream.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn put_stage_result(&self, task_id: Uuid, result: StageResult) {
        self.inner
            .stage_results
            .insert((task_id, result.stage()), result);
    }

    pub fn get_stage_result(&self, task_id: Uuid, stage: Stage) -> Option<StageResult> {
        self.inner
            .stage_results
            .get(&(task_id, stage))
            .map(|entry| entry.clone())
    }

    pub fn put_recommendations(&self, task_id: Uuid, recommendations: Recommendations) {
        self.inner.recommendations.insert(task_id, recommendations);
    }

    pub fn get_recommendations(&self, task_id: Uuid) -> Option<Recommendations> {
        self.inner
            .recommendations
            .get(&task_id)
            .map(|entry| entry.clone())
    }

    pub fn index_user_task(&self, user_id: &str, task_id: Uuid) {
        self.inner
            .user_tasks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .entry(user_id.to_string())
            .or_default()
            .insert(0, task_id);
    }

    pub fn list_user_tasks(&self, user_id: &str, limit: usize) -> Vec<Uuid> {
        self.inner
            .user_tasks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(user_id)
            .map(|ids| ids.iter().take(limit).copied().collect())
            .unwrap_or_default()
    }

    pub fn scan_tasks(&self) -> Vec<TaskRecord> {
        let now = Utc::now();
        self.inner
            .tasks
            .iter()
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone())
            .collect()
    }
}
