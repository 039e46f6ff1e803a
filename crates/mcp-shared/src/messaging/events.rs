//! # Event Bus
//!
//! Fire-and-forget pub/sub with two backends: Redis channels in production,
//! `tokio::sync::broadcast` in memory for tests. Delivery is best-effort;
//! anything that needs durability reads the task store streams instead.
//!
//! `wait_for_event` is the coordinator's completion-wait primitive: it
//! subscribes, returns the first payload whose `task_id` matches, and
//! reports a timeout as `Ok(None)`; a timeout is an ordinary outcome here,
//! not an exception. The subscription is dropped on every exit path, which
//! unsubscribes.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value as JsonValue;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::McpResult;

const BROADCAST_CAPACITY: usize = 256;
const SUBSCRIPTION_BUFFER: usize = 128;

/// One event observed on a channel.
#[derive(Debug, Clone)]
pub struct BusEvent {
    pub channel: String,
    pub payload: String,
}

/// The pub/sub backend.
#[derive(Clone)]
pub enum EventBus {
    Redis(RedisEvents),
    InMemory(InMemoryEvents),
}

impl EventBus {
    pub async fn connect_redis(url: &str) -> McpResult<Self> {
        Ok(Self::Redis(RedisEvents::connect(url).await?))
    }

    pub fn new_in_memory() -> Self {
        Self::InMemory(InMemoryEvents::new())
    }

    /// Publish a payload on a channel. Fan-out to every subscriber; no
    /// subscriber is not an error.
    pub async fn publish(&self, channel: &str, payload: &str) -> McpResult<()> {
        match self {
            Self::Redis(bus) => bus.publish(channel, payload).await,
            Self::InMemory(bus) => {
                bus.publish(channel, payload);
                Ok(())
            }
        }
    }

    /// Subscribe to a single literal channel.
    pub async fn subscribe(&self, channel: &str) -> McpResult<EventSubscription> {
        match self {
            Self::Redis(bus) => bus.subscribe(channel, false).await,
            Self::InMemory(bus) => Ok(bus.subscribe(channel)),
        }
    }

    /// Subscribe to a glob pattern (trailing `*` only for the in-memory bus,
    /// full Redis glob in production).
    pub async fn subscribe_pattern(&self, pattern: &str) -> McpResult<EventSubscription> {
        match self {
            Self::Redis(bus) => bus.subscribe(pattern, true).await,
            Self::InMemory(bus) => Ok(bus.subscribe_pattern(pattern)),
        }
    }

    /// Wait for the first JSON payload on `channel` whose `task_id` field
    /// matches. Returns `Ok(None)` on timeout.
    pub async fn wait_for_event(
        &self,
        channel: &str,
        task_id: Uuid,
        timeout: Duration,
    ) -> McpResult<Option<JsonValue>> {
        let mut subscription = self.subscribe(channel).await?;
        let deadline = tokio::time::Instant::now() + timeout;
        let wanted = task_id.to_string();

        loop {
            match tokio::time::timeout_at(deadline, subscription.next()).await {
                // Deadline reached
                Err(_) => return Ok(None),
                // Subscription closed underneath us; nothing more will arrive
                Ok(None) => return Ok(None),
                Ok(Some(event)) => match serde_json::from_str::<JsonValue>(&event.payload) {
                    Ok(value)
                        if value.get("task_id").and_then(JsonValue::as_str)
                            == Some(wanted.as_str()) =>
                    {
                        return Ok(Some(value));
                    }
                    Ok(_) => continue,
                    Err(err) => {
                        debug!(channel = %channel, error = %err, "Ignoring unparseable event");
                        continue;
                    }
                },
            }
        }
    }

    pub async fn health_check(&self) -> bool {
        match self {
            Self::Redis(bus) => bus.ping().await,
            Self::InMemory(_) => true,
        }
    }
}

/// A live subscription; drop to unsubscribe.
pub enum EventSubscription {
    Stream(mpsc::Receiver<BusEvent>),
    Broadcast(broadcast::Receiver<BusEvent>),
}

impl EventSubscription {
    pub async fn next(&mut self) -> Option<BusEvent> {
        match self {
            Self::Stream(rx) => rx.recv().await,
            Self::Broadcast(rx) => loop {
                match rx.recv().await {
                    Ok(event) => return Some(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped = skipped, "Event subscription lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            },
        }
    }
}

// =============================================================================
// Redis backend
// =============================================================================

#[derive(Clone)]
pub struct RedisEvents {
    client: redis::Client,
    publisher: ConnectionManager,
}

impl RedisEvents {
    pub async fn connect(url: &str) -> McpResult<Self> {
        let client = redis::Client::open(url).map_err(crate::errors::McpError::from)?;
        let publisher = ConnectionManager::new(client.clone()).await?;
        Ok(Self { client, publisher })
    }

    async fn publish(&self, channel: &str, payload: &str) -> McpResult<()> {
        let mut conn = self.publisher.clone();
        let _: () = conn.publish(channel, payload).await?;
        Ok(())
    }

    /// Each subscription holds its own pub/sub connection; dropping the
    /// receiver tears the connection (and the server-side subscription) down.
    async fn subscribe(&self, target: &str, pattern: bool) -> McpResult<EventSubscription> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        if pattern {
            pubsub.psubscribe(target).await?;
        } else {
            pubsub.subscribe(target).await?;
        }

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(message) = stream.next().await {
                let channel = message.get_channel_name().to_string();
                let payload: String = match message.get_payload() {
                    Ok(payload) => payload,
                    Err(_) => continue,
                };
                if tx.send(BusEvent { channel, payload }).await.is_err() {
                    // Receiver dropped; exiting drops the pub/sub connection
                    break;
                }
            }
        });

        Ok(EventSubscription::Stream(rx))
    }

    async fn ping(&self) -> bool {
        let mut conn = self.publisher.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .is_ok()
    }
}

// =============================================================================
// In-memory backend
// =============================================================================

#[derive(Clone)]
pub struct InMemoryEvents {
    inner: Arc<BusInner>,
}

struct BusInner {
    channels: DashMap<String, broadcast::Sender<BusEvent>>,
    patterns: Mutex<Vec<(String, broadcast::Sender<BusEvent>)>>,
}

impl InMemoryEvents {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                channels: DashMap::new(),
                patterns: Mutex::new(Vec::new()),
            }),
        }
    }

    fn publish(&self, channel: &str, payload: &str) {
        let event = BusEvent {
            channel: channel.to_string(),
            payload: payload.to_string(),
        };

        if let Some(sender) = self.inner.channels.get(channel) {
            let _ = sender.send(event.clone());
        }

        let mut patterns = self
            .inner
            .patterns
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        patterns.retain(|(_, sender)| sender.receiver_count() > 0);
        for (pattern, sender) in patterns.iter() {
            if pattern_matches(pattern, channel) {
                let _ = sender.send(event.clone());
            }
        }
    }

    fn subscribe(&self, channel: &str) -> EventSubscription {
        let receiver = self
            .inner
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(BROADCAST_CAPACITY).0)
            .subscribe();
        EventSubscription::Broadcast(receiver)
    }

    fn subscribe_pattern(&self, pattern: &str) -> EventSubscription {
        let (sender, receiver) = broadcast::channel(BROADCAST_CAPACITY);
        self.inner
            .patterns
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((pattern.to_string(), sender));
        EventSubscription::Broadcast(receiver)
    }
}

impl Default for InMemoryEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// Trailing-star glob, the only shape the core subscribes with.
fn pattern_matches(pattern: &str, channel: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => channel.starts_with(prefix),
        None => pattern == channel,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = EventBus::new_in_memory();
        let mut sub = bus.subscribe("ai:intent:complete").await.unwrap();

        bus.publish("ai:intent:complete", r#"{"task_id":"x"}"#)
            .await
            .unwrap();

        let event = sub.next().await.unwrap();
        assert_eq!(event.channel, "ai:intent:complete");
        assert!(event.payload.contains("task_id"));
    }

    #[tokio::test]
    async fn test_pattern_subscription_sees_all_task_channels() {
        let bus = EventBus::new_in_memory();
        let mut sub = bus.subscribe_pattern("ai:react:*").await.unwrap();

        bus.publish("ai:react:abc", "one").await.unwrap();
        bus.publish("ai:progress:abc", "filtered").await.unwrap();
        bus.publish("ai:react:def", "two").await.unwrap();

        assert_eq!(sub.next().await.unwrap().payload, "one");
        assert_eq!(sub.next().await.unwrap().payload, "two");
    }

    #[tokio::test]
    async fn test_wait_for_event_matches_task_id() {
        let bus = EventBus::new_in_memory();
        let wanted = Uuid::new_v4();
        let other = Uuid::new_v4();

        let waiter = {
            let bus = bus.clone();
            tokio::spawn(async move {
                bus.wait_for_event("ai:embedding:complete", wanted, Duration::from_secs(5))
                    .await
            })
        };

        // Give the waiter a beat to subscribe
        tokio::time::sleep(Duration::from_millis(20)).await;
        bus.publish(
            "ai:embedding:complete",
            &format!(r#"{{"task_id":"{other}","success":true}}"#),
        )
        .await
        .unwrap();
        bus.publish(
            "ai:embedding:complete",
            &format!(r#"{{"task_id":"{wanted}","success":true}}"#),
        )
        .await
        .unwrap();

        let value = waiter.await.unwrap().unwrap().unwrap();
        assert_eq!(value["task_id"], wanted.to_string());
    }

    #[tokio::test]
    async fn test_wait_for_event_times_out_as_none() {
        let bus = EventBus::new_in_memory();
        let result = bus
            .wait_for_event("ai:moderation:complete", Uuid::new_v4(), Duration::from_millis(30))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_pattern_matching() {
        assert!(pattern_matches("ai:react:*", "ai:react:123"));
        assert!(!pattern_matches("ai:react:*", "ai:progress:123"));
        assert!(pattern_matches("exact", "exact"));
        assert!(!pattern_matches("exact", "exactly"));
    }
}
