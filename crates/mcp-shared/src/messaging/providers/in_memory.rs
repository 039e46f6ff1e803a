//! In-process queue backend with broker-equivalent semantics: bounded
//! length with reject-on-overflow, competing consumers, requeue-once then
//! dead-letter. Used by tests and local development.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tokio::sync::Notify;

use crate::errors::{McpError, McpResult};
use crate::messaging::router::DEAD_LETTER_QUEUE;

use super::{QueueDelivery, QueueSpec, QueueStatus};

#[derive(Debug)]
struct MemMessage {
    payload: Vec<u8>,
    redelivered: bool,
}

#[derive(Debug)]
pub(crate) struct MemQueue {
    name: String,
    messages: Mutex<VecDeque<MemMessage>>,
    notify: Notify,
    consumers: AtomicU32,
    max_length: usize,
}

impl MemQueue {
    fn new(name: String, max_length: usize) -> Self {
        Self {
            name,
            messages: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            consumers: AtomicU32::new(0),
            max_length,
        }
    }

    fn push_back(&self, message: MemMessage) -> McpResult<()> {
        let mut messages = self.messages.lock().unwrap_or_else(|p| p.into_inner());
        if messages.len() >= self.max_length {
            return Err(McpError::QueueOverflow {
                queue: self.name.clone(),
            });
        }
        messages.push_back(message);
        drop(messages);
        self.notify.notify_one();
        Ok(())
    }

    fn push_front(&self, message: MemMessage) {
        self.messages
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_front(message);
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<MemMessage> {
        self.messages
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front()
    }

    fn len(&self) -> usize {
        self.messages.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

/// In-memory queue registry. Queues are created on first use; the dead
/// letter queue always exists.
#[derive(Debug, Clone)]
pub struct InMemoryQueues {
    queues: Arc<DashMap<String, Arc<MemQueue>>>,
    max_length: usize,
}

impl InMemoryQueues {
    pub fn new(max_length: usize) -> Self {
        let queues: DashMap<String, Arc<MemQueue>> = DashMap::new();
        // Dead letter queue is unbounded in practice; give it headroom
        queues.insert(
            DEAD_LETTER_QUEUE.to_string(),
            Arc::new(MemQueue::new(DEAD_LETTER_QUEUE.to_string(), usize::MAX)),
        );
        Self {
            queues: Arc::new(queues),
            max_length,
        }
    }

    fn queue(&self, name: &str) -> Arc<MemQueue> {
        self.queues
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemQueue::new(name.to_string(), self.max_length)))
            .clone()
    }

    fn dead_letter(&self) -> Arc<MemQueue> {
        self.queue(DEAD_LETTER_QUEUE)
    }

    pub fn declare(&self, specs: &[QueueSpec]) {
        for spec in specs {
            self.queue(&spec.name);
        }
    }

    pub fn publish(&self, queue: &str, payload: &[u8]) -> McpResult<()> {
        self.queue(queue).push_back(MemMessage {
            payload: payload.to_vec(),
            redelivered: false,
        })
    }

    pub fn consume(&self, queue: &str) -> McpResult<MemConsumer> {
        let queue = self.queue(queue);
        queue.consumers.fetch_add(1, Ordering::SeqCst);
        Ok(MemConsumer {
            queue,
            dead_letter: self.dead_letter(),
        })
    }

    pub fn queue_status(&self, queue: &str) -> McpResult<QueueStatus> {
        let queue = self.queue(queue);
        Ok(QueueStatus {
            name: queue.name.clone(),
            message_count: queue.len() as u32,
            consumer_count: queue.consumers.load(Ordering::SeqCst),
            durable: true,
        })
    }

    pub fn purge(&self, queue: &str) -> McpResult<u32> {
        let queue = self.queue(queue);
        let mut messages = queue.messages.lock().unwrap_or_else(|p| p.into_inner());
        let purged = messages.len() as u32;
        messages.clear();
        Ok(purged)
    }
}

/// One competing consumer on an in-memory queue.
pub struct MemConsumer {
    queue: Arc<MemQueue>,
    dead_letter: Arc<MemQueue>,
}

impl MemConsumer {
    /// Pop the next message, waiting until one arrives. Effectively
    /// prefetch-1: nothing is buffered beyond the delivery in hand.
    pub async fn next(&mut self) -> Option<QueueDelivery> {
        loop {
            if let Some(message) = self.queue.pop() {
                let acker = MemAcker {
                    queue: self.queue.clone(),
                    dead_letter: self.dead_letter.clone(),
                    payload: message.payload.clone(),
                };
                return Some(QueueDelivery::in_memory(
                    message.payload,
                    message.redelivered,
                    acker,
                ));
            }
            self.queue.notify.notified().await;
        }
    }
}

impl Drop for MemConsumer {
    fn drop(&mut self) {
        self.queue.consumers.fetch_sub(1, Ordering::SeqCst);
        // Wake any sibling blocked on the same queue
        self.queue.notify.notify_one();
    }
}

/// Settlement handle for an in-memory delivery.
#[derive(Debug)]
pub struct MemAcker {
    queue: Arc<MemQueue>,
    dead_letter: Arc<MemQueue>,
    payload: Vec<u8>,
}

impl MemAcker {
    pub(crate) fn nack(self, requeue: bool) {
        if requeue {
            self.queue.push_front(MemMessage {
                payload: self.payload,
                redelivered: true,
            });
        } else {
            // Dead letter queue ignores overflow
            let _ = self.dead_letter.push_back(MemMessage {
                payload: self.payload,
                redelivered: false,
            });
        }
    }
}
