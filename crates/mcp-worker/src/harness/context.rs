//! ReAct emission handle passed into `process`.

use tracing::warn;
use uuid::Uuid;

use mcp_shared::messaging::Broker;
use mcp_shared::types::{ReActStep, StepKind};

/// Emits ReAct steps for one in-flight stage on the task's ReAct channel.
///
/// Emission is best-effort: a failed publish is logged and swallowed so the
/// stage's real work never fails because an observer couldn't be notified.
#[derive(Clone)]
pub struct ReactEmitter {
    broker: Broker,
    agent: String,
    task_id: Uuid,
}

impl ReactEmitter {
    pub(crate) fn new(broker: Broker, agent: impl Into<String>, task_id: Uuid) -> Self {
        Self {
            broker,
            agent: agent.into(),
            task_id,
        }
    }

    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    pub async fn thought(&self, message: impl Into<String>) {
        self.emit(StepKind::Thought, message.into()).await;
    }

    pub async fn action(&self, message: impl Into<String>) {
        self.emit(StepKind::Action, message.into()).await;
    }

    pub async fn observation(&self, message: impl Into<String>) {
        self.emit(StepKind::Observation, message.into()).await;
    }

    pub(crate) async fn emit(&self, kind: StepKind, message: String) {
        let step = ReActStep::new(self.task_id, self.agent.clone(), kind, message);
        if let Err(err) = self.broker.publish_react(&step).await {
            warn!(
                task_id = %self.task_id,
                agent = %self.agent,
                error = %err,
                "ReAct emission failed"
            );
        }
    }
}
