//! # ReAct Forwarder
//!
//! The one long-running subscriber: pattern-subscribes every per-task ReAct
//! channel, relays each step to the task's frontend channel with a
//! normalized payload, and appends it to the task's durable ReAct stream.
//!
//! Stateless apart from the subscription itself: if it falls over, it
//! resubscribes with backoff and the streams remain the source of truth for
//! anything missed by live listeners.

use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use mcp_shared::messaging::{Broker, BusEvent};
use mcp_shared::taskstore::TaskStore;
use mcp_shared::types::ReActStep;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct ReActForwarder {
    broker: Broker,
    store: TaskStore,
}

impl ReActForwarder {
    pub fn new(broker: Broker, store: TaskStore) -> Self {
        Self { broker, store }
    }

    /// Spawn the forwarding loop. Restarts the subscription on failure with
    /// exponential backoff; exits only on cancellation.
    pub fn spawn(self, token: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut backoff = INITIAL_BACKOFF;

            loop {
                if token.is_cancelled() {
                    break;
                }

                let pattern = self.broker.router().react_pattern();
                match self.broker.subscribe_pattern(pattern).await {
                    Ok(mut subscription) => {
                        info!(pattern = %pattern, "ReAct forwarding active");
                        backoff = INITIAL_BACKOFF;

                        loop {
                            tokio::select! {
                                _ = token.cancelled() => return,
                                event = subscription.next() => match event {
                                    Some(event) => self.forward(event).await,
                                    // Subscription ended; resubscribe
                                    None => break,
                                }
                            }
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "ReAct subscription failed");
                    }
                }

                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }

            info!("ReAct forwarder stopped");
        })
    }

    async fn forward(&self, event: BusEvent) {
        let step: ReActStep = match serde_json::from_str(&event.payload) {
            Ok(step) => step,
            Err(err) => {
                warn!(channel = %event.channel, error = %err, "Dropping malformed ReAct payload");
                return;
            }
        };

        let normalized = json!({
            "type": "react",
            "step": step.step,
            "content": step.message,
            "agent": step.agent,
            "timestamp": step.timestamp,
        });
        let frontend_channel = self.broker.router().frontend_channel(step.task_id);
        if let Err(err) = self.broker.publish_json(&frontend_channel, &normalized).await {
            warn!(task_id = %step.task_id, error = %err, "Frontend relay failed");
        }

        if let Err(err) = self.store.append_react(step.clone()).await {
            warn!(task_id = %step.task_id, error = %err, "ReAct stream append failed");
        }

        debug!(task_id = %step.task_id, agent = %step.agent, "Forwarded ReAct step");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcp_shared::types::StepKind;
    use uuid::Uuid;

    async fn wait_for_stream_len(store: &TaskStore, task_id: Uuid, len: usize) {
        for _ in 0..100 {
            if store.react_stream(task_id).await.unwrap().len() >= len {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("react stream never reached {len} entries");
    }

    #[tokio::test]
    async fn test_steps_are_relayed_and_appended() {
        let broker = Broker::in_memory(100);
        let store = TaskStore::new_in_memory(Duration::from_secs(600));
        let token = CancellationToken::new();
        let handle = ReActForwarder::new(broker.clone(), store.clone()).spawn(token.clone());

        // Give the forwarder a beat to subscribe
        tokio::time::sleep(Duration::from_millis(30)).await;

        let task_id = Uuid::new_v4();
        let frontend_channel = broker.router().frontend_channel(task_id);
        let mut frontend = broker.subscribe(&frontend_channel).await.unwrap();

        let step = ReActStep::new(task_id, "executor_agent", StepKind::Thought, "reasoning");
        broker.publish_react(&step).await.unwrap();

        wait_for_stream_len(&store, task_id, 1).await;
        let appended = store.react_stream(task_id).await.unwrap();
        assert_eq!(appended[0].agent, "executor_agent");
        assert_eq!(appended[0].step, StepKind::Thought);

        let relayed = frontend.next().await.unwrap();
        let payload: serde_json::Value = serde_json::from_str(&relayed.payload).unwrap();
        assert_eq!(payload["type"], "react");
        assert_eq!(payload["step"], "thought");
        assert_eq!(payload["content"], "reasoning");
        assert_eq!(payload["agent"], "executor_agent");

        token.cancel();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn test_malformed_payload_is_dropped_not_fatal() {
        let broker = Broker::in_memory(100);
        let store = TaskStore::new_in_memory(Duration::from_secs(600));
        let token = CancellationToken::new();
        let handle = ReActForwarder::new(broker.clone(), store.clone()).spawn(token.clone());
        tokio::time::sleep(Duration::from_millis(30)).await;

        let task_id = Uuid::new_v4();
        broker
            .events()
            .publish(&broker.router().react_channel(task_id), "not json")
            .await
            .unwrap();

        // A good step after the bad one still gets through
        let step = ReActStep::new(task_id, "intent_agent", StepKind::Action, "classify");
        broker.publish_react(&step).await.unwrap();

        wait_for_stream_len(&store, task_id, 1).await;
        assert_eq!(store.react_stream(task_id).await.unwrap().len(), 1);

        token.cancel();
        let _ = handle.await;
    }
}
