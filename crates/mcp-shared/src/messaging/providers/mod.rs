//! # Queue Providers
//!
//! Enum dispatch over the queue backends: AMQP for production, in-memory for
//! tests. The enum pattern keeps call sites free of trait objects and makes
//! the in-memory variant a first-class citizen rather than a mock.

pub mod amqp;
pub mod in_memory;

use crate::errors::{McpError, McpResult};

pub use amqp::AmqpQueues;
pub use in_memory::{InMemoryQueues, MemConsumer};

/// Declaration parameters for one durable queue.
#[derive(Debug, Clone)]
pub struct QueueSpec {
    pub name: String,
    pub message_ttl_ms: u32,
    pub max_length: u32,
}

impl QueueSpec {
    pub fn new(name: impl Into<String>, message_ttl_ms: u32, max_length: u32) -> Self {
        Self {
            name: name.into(),
            message_ttl_ms,
            max_length,
        }
    }
}

/// Point-in-time queue counters for the control API.
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueueStatus {
    pub name: String,
    pub message_count: u32,
    pub consumer_count: u32,
    pub durable: bool,
}

/// The queue backend.
pub enum QueueProvider {
    Amqp(AmqpQueues),
    InMemory(InMemoryQueues),
}

impl QueueProvider {
    /// Connect to an AMQP broker with the given per-consumer prefetch.
    pub async fn connect_amqp(url: &str, prefetch: u16) -> McpResult<Self> {
        Ok(Self::Amqp(AmqpQueues::connect(url, prefetch).await?))
    }

    /// Fully in-process backend with the same overflow and dead-letter
    /// semantics; used by tests and local development.
    pub fn new_in_memory(max_length: usize) -> Self {
        Self::InMemory(InMemoryQueues::new(max_length))
    }

    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::Amqp(_) => "amqp",
            Self::InMemory(_) => "in_memory",
        }
    }

    /// Declare the exchange, the given queues, and the dead-letter topology.
    /// Idempotent.
    pub async fn declare_topology(&self, specs: &[QueueSpec]) -> McpResult<()> {
        match self {
            Self::Amqp(q) => q.declare_topology(specs).await,
            Self::InMemory(q) => {
                q.declare(specs);
                Ok(())
            }
        }
    }

    /// Durable publish. A queue at max length rejects the publish, surfaced
    /// as [`McpError::QueueOverflow`], never a silent drop.
    pub async fn publish(&self, queue: &str, payload: &[u8]) -> McpResult<()> {
        match self {
            Self::Amqp(q) => q.publish(queue, payload).await,
            Self::InMemory(q) => q.publish(queue, payload),
        }
    }

    /// Begin consuming a queue. Each consumer competes for messages.
    pub async fn consume(&self, queue: &str) -> McpResult<QueueConsumer> {
        match self {
            Self::Amqp(q) => Ok(QueueConsumer::Amqp(q.consume(queue).await?)),
            Self::InMemory(q) => Ok(QueueConsumer::InMemory(q.consume(queue)?)),
        }
    }

    pub async fn queue_status(&self, queue: &str) -> McpResult<QueueStatus> {
        match self {
            Self::Amqp(q) => q.queue_status(queue).await,
            Self::InMemory(q) => q.queue_status(queue),
        }
    }

    pub async fn purge(&self, queue: &str) -> McpResult<u32> {
        match self {
            Self::Amqp(q) => q.purge(queue).await,
            Self::InMemory(q) => q.purge(queue),
        }
    }

    pub async fn health_check(&self) -> bool {
        match self {
            Self::Amqp(q) => q.is_connected(),
            Self::InMemory(_) => true,
        }
    }
}

/// A message pulled from a queue, pending acknowledgment.
pub struct QueueDelivery {
    pub payload: Vec<u8>,
    /// Set when the broker already requeued this message once; the next
    /// negative acknowledgment dead-letters it.
    pub redelivered: bool,
    acker: DeliveryAcker,
}

enum DeliveryAcker {
    Amqp(lapin::acker::Acker),
    InMemory(in_memory::MemAcker),
}

impl QueueDelivery {
    pub(crate) fn amqp(payload: Vec<u8>, redelivered: bool, acker: lapin::acker::Acker) -> Self {
        Self {
            payload,
            redelivered,
            acker: DeliveryAcker::Amqp(acker),
        }
    }

    pub(crate) fn in_memory(payload: Vec<u8>, redelivered: bool, acker: in_memory::MemAcker) -> Self {
        Self {
            payload,
            redelivered,
            acker: DeliveryAcker::InMemory(acker),
        }
    }

    /// Acknowledge successful processing; removes the message for good.
    pub async fn ack(self) -> McpResult<()> {
        match self.acker {
            DeliveryAcker::Amqp(acker) => acker
                .ack(lapin::options::BasicAckOptions::default())
                .await
                .map(|_| ())
                .map_err(|e| McpError::Messaging(e.to_string())),
            DeliveryAcker::InMemory(_) => Ok(()),
        }
    }

    /// Negatively acknowledge: `requeue = true` returns the message to the
    /// queue marked redelivered, `false` routes it to the dead letter queue.
    pub async fn nack(self, requeue: bool) -> McpResult<()> {
        match self.acker {
            DeliveryAcker::Amqp(acker) => acker
                .nack(lapin::options::BasicNackOptions {
                    requeue,
                    ..Default::default()
                })
                .await
                .map(|_| ())
                .map_err(|e| McpError::Messaging(e.to_string())),
            DeliveryAcker::InMemory(acker) => {
                acker.nack(requeue);
                Ok(())
            }
        }
    }
}

/// A live consumer on one queue.
pub enum QueueConsumer {
    Amqp(lapin::Consumer),
    InMemory(MemConsumer),
}

impl QueueConsumer {
    /// Next delivery, or `None` when the consumer is cancelled.
    pub async fn next(&mut self) -> Option<McpResult<QueueDelivery>> {
        match self {
            Self::Amqp(consumer) => {
                use futures::StreamExt;
                let delivery = consumer.next().await?;
                Some(
                    delivery
                        .map(|d| QueueDelivery::amqp(d.data, d.redelivered, d.acker))
                        .map_err(|e| McpError::Messaging(e.to_string())),
                )
            }
            Self::InMemory(consumer) => consumer.next().await.map(Ok),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str) -> QueueSpec {
        QueueSpec::new(name, 600_000, 4)
    }

    #[tokio::test]
    async fn test_publish_consume_ack_round_trip() {
        let provider = QueueProvider::new_in_memory(4);
        provider.declare_topology(&[spec("intent.task")]).await.unwrap();

        provider.publish("intent.task", b"payload").await.unwrap();

        let mut consumer = provider.consume("intent.task").await.unwrap();
        let delivery = consumer.next().await.unwrap().unwrap();
        assert_eq!(delivery.payload, b"payload");
        assert!(!delivery.redelivered);
        delivery.ack().await.unwrap();

        let status = provider.queue_status("intent.task").await.unwrap();
        assert_eq!(status.message_count, 0);
    }

    #[tokio::test]
    async fn test_nack_requeue_marks_redelivered() {
        let provider = QueueProvider::new_in_memory(4);
        provider.declare_topology(&[spec("executor.task")]).await.unwrap();
        provider.publish("executor.task", b"work").await.unwrap();

        let mut consumer = provider.consume("executor.task").await.unwrap();
        let first = consumer.next().await.unwrap().unwrap();
        first.nack(true).await.unwrap();

        let second = consumer.next().await.unwrap().unwrap();
        assert!(second.redelivered);
    }

    #[tokio::test]
    async fn test_second_nack_dead_letters() {
        let provider = QueueProvider::new_in_memory(4);
        provider.declare_topology(&[spec("moderator.task")]).await.unwrap();
        provider.publish("moderator.task", b"poison").await.unwrap();

        let mut consumer = provider.consume("moderator.task").await.unwrap();
        let first = consumer.next().await.unwrap().unwrap();
        first.nack(true).await.unwrap();
        let second = consumer.next().await.unwrap().unwrap();
        second.nack(false).await.unwrap();

        let dlq = provider
            .queue_status(crate::messaging::router::DEAD_LETTER_QUEUE)
            .await
            .unwrap();
        assert_eq!(dlq.message_count, 1);

        let queue = provider.queue_status("moderator.task").await.unwrap();
        assert_eq!(queue.message_count, 0);
    }

    #[tokio::test]
    async fn test_overflow_rejects_publish() {
        let provider = QueueProvider::new_in_memory(2);
        provider.declare_topology(&[spec("websearch.task")]).await.unwrap();

        provider.publish("websearch.task", b"1").await.unwrap();
        provider.publish("websearch.task", b"2").await.unwrap();
        let err = provider.publish("websearch.task", b"3").await.unwrap_err();

        assert!(matches!(err, McpError::QueueOverflow { .. }));
    }

    #[tokio::test]
    async fn test_competing_consumers_split_messages() {
        let provider = QueueProvider::new_in_memory(16);
        provider.declare_topology(&[spec("embedding.task")]).await.unwrap();

        let mut a = provider.consume("embedding.task").await.unwrap();
        let mut b = provider.consume("embedding.task").await.unwrap();

        provider.publish("embedding.task", b"m1").await.unwrap();
        provider.publish("embedding.task", b"m2").await.unwrap();

        let d1 = a.next().await.unwrap().unwrap();
        let d2 = b.next().await.unwrap().unwrap();
        let mut seen = vec![d1.payload.clone(), d2.payload.clone()];
        seen.sort();
        assert_eq!(seen, vec![b"m1".to_vec(), b"m2".to_vec()]);

        let status = provider.queue_status("embedding.task").await.unwrap();
        assert_eq!(status.consumer_count, 2);
    }
}
