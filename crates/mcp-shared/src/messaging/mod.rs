//! # Messaging
//!
//! Two transports behind one facade:
//!
//! - **Work queues** ([`QueueProvider`]): durable, competing-consumer stage
//!   queues with per-message TTL, bounded length, and dead-lettering.
//! - **Event bus** ([`EventBus`]): fire-and-forget pub/sub channels used for
//!   completion signals, ReAct steps, progress, and terminal delivery.
//!
//! Both are enums with a production variant and an in-memory variant;
//! enum dispatch, no trait objects. [`Broker`] is the domain facade the
//! coordinator and agents actually use.

pub mod client;
pub mod events;
pub mod providers;
pub mod router;

pub use client::{Broker, BrokerHealth};
pub use events::{BusEvent, EventBus, EventSubscription};
pub use providers::{QueueConsumer, QueueDelivery, QueueProvider, QueueSpec, QueueStatus};
pub use router::StageRouter;
