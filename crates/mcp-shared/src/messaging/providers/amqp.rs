//! AMQP queue backend (RabbitMQ via `lapin`).
//!
//! Topology: durable direct exchange, durable queues with per-message TTL,
//! bounded length with reject-publish overflow, and a dead-letter exchange
//! feeding one dead-letter queue. Publishes use publisher confirms so an
//! overflow rejection surfaces as an error instead of a silent drop.

use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, ConfirmSelectOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions, QueuePurgeOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::{McpError, McpResult};
use crate::messaging::router::{
    DEAD_LETTER_EXCHANGE, DEAD_LETTER_QUEUE, DEAD_LETTER_ROUTING_KEY, TASK_EXCHANGE,
};

use super::{QueueSpec, QueueStatus};

pub struct AmqpQueues {
    connection: Connection,
    channel: Channel,
}

impl AmqpQueues {
    /// Connect and open one channel with publisher confirms and the given
    /// prefetch.
    pub async fn connect(url: &str, prefetch: u16) -> McpResult<Self> {
        let connection = Connection::connect(url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;
        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await?;

        info!(prefetch = prefetch, "Connected to AMQP broker");
        Ok(Self {
            connection,
            channel,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    pub async fn declare_topology(&self, specs: &[QueueSpec]) -> McpResult<()> {
        let durable = ExchangeDeclareOptions {
            durable: true,
            ..Default::default()
        };

        self.channel
            .exchange_declare(
                TASK_EXCHANGE,
                ExchangeKind::Direct,
                durable,
                FieldTable::default(),
            )
            .await?;
        self.channel
            .exchange_declare(
                DEAD_LETTER_EXCHANGE,
                ExchangeKind::Direct,
                durable,
                FieldTable::default(),
            )
            .await?;

        self.channel
            .queue_declare(
                DEAD_LETTER_QUEUE,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        self.channel
            .queue_bind(
                DEAD_LETTER_QUEUE,
                DEAD_LETTER_EXCHANGE,
                DEAD_LETTER_ROUTING_KEY,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        for spec in specs {
            let mut arguments = FieldTable::default();
            arguments.insert(
                "x-message-ttl".into(),
                AMQPValue::LongUInt(spec.message_ttl_ms),
            );
            arguments.insert("x-max-length".into(), AMQPValue::LongUInt(spec.max_length));
            arguments.insert(
                "x-overflow".into(),
                AMQPValue::LongString("reject-publish".into()),
            );
            arguments.insert(
                "x-dead-letter-exchange".into(),
                AMQPValue::LongString(DEAD_LETTER_EXCHANGE.into()),
            );
            arguments.insert(
                "x-dead-letter-routing-key".into(),
                AMQPValue::LongString(DEAD_LETTER_ROUTING_KEY.into()),
            );

            self.channel
                .queue_declare(
                    &spec.name,
                    QueueDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    arguments,
                )
                .await?;
            // Routing key equals the queue name on the direct exchange
            self.channel
                .queue_bind(
                    &spec.name,
                    TASK_EXCHANGE,
                    &spec.name,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;

            debug!(queue = %spec.name, "Declared task queue");
        }

        Ok(())
    }

    pub async fn publish(&self, queue: &str, payload: &[u8]) -> McpResult<()> {
        let confirm = self
            .channel
            .basic_publish(
                TASK_EXCHANGE,
                queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await?
            .await?;

        match confirm {
            Confirmation::Nack(_) => Err(McpError::QueueOverflow {
                queue: queue.to_string(),
            }),
            _ => Ok(()),
        }
    }

    pub async fn consume(&self, queue: &str) -> McpResult<lapin::Consumer> {
        let tag = format!("{queue}-{}", Uuid::new_v4().simple());
        let consumer = self
            .channel
            .basic_consume(
                queue,
                &tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok(consumer)
    }

    pub async fn queue_status(&self, queue: &str) -> McpResult<QueueStatus> {
        let declared = self
            .channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    passive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        Ok(QueueStatus {
            name: queue.to_string(),
            message_count: declared.message_count(),
            consumer_count: declared.consumer_count(),
            durable: true,
        })
    }

    pub async fn purge(&self, queue: &str) -> McpResult<u32> {
        let purged = self
            .channel
            .queue_purge(queue, QueuePurgeOptions::default())
            .await?;
        Ok(purged)
    }
}
