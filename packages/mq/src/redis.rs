use std::sync::Arc;

use async_trait::async_trait;
use broccoli_queue::queue::BroccoliQueue;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::broker::{Broker, Delivery, Receipt};
use crate::config::{MqConfig, manual_ack};
use crate::error::MqError;

/// What is stored in the Redis queue for one send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireRecord {
    pub key: String,
    /// UTF-8 payload text; producers send JSON.
    pub payload: String,
}

pub async fn init_mq(config: MqConfig) -> Result<BroccoliQueue, MqError> {
    BroccoliQueue::builder(&config.url)
        .pool_connections(config.pool_size)
        .build()
        .await
        .map_err(MqError::from)
}

/// Redis-backed broker on top of broccoli_queue.
///
/// The queue is a single FIFO list, which already keeps per-key order. Commit
/// acknowledges the message; release rejects it so broccoli re-queues it under
/// its own retry policy.
pub struct RedisBroker {
    queue: Arc<BroccoliQueue>,
    topic: String,
}

impl RedisBroker {
    pub fn new(queue: Arc<BroccoliQueue>, topic: impl Into<String>) -> Self {
        Self {
            queue,
            topic: topic.into(),
        }
    }

    pub async fn connect(config: MqConfig, topic: impl Into<String>) -> Result<Self, MqError> {
        let topic = topic.into();
        let queue = init_mq(config).await?;
        info!(topic = %topic, "Connected to Redis broker");
        Ok(Self::new(Arc::new(queue), topic))
    }
}

fn into_message(
    delivery: Delivery,
) -> Result<broccoli_queue::brokers::broker::BrokerMessage<WireRecord>, MqError> {
    match delivery.receipt {
        Receipt::Redis(message) => Ok(*message),
        _ => Err(MqError::ForeignDelivery),
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn send(&self, key: &str, payload: &[u8]) -> Result<(), MqError> {
        let record = WireRecord {
            key: key.to_string(),
            payload: String::from_utf8_lossy(payload).into_owned(),
        };
        self.queue
            .publish(&self.topic, None, &record, None)
            .await?;
        Ok(())
    }

    async fn receive(&self) -> Result<Delivery, MqError> {
        let message = self
            .queue
            .consume::<WireRecord>(&self.topic, Some(manual_ack()))
            .await?;
        let key = message.payload.key.clone();
        let payload = message.payload.payload.clone().into_bytes();
        let attempt = u32::from(message.attempts) + 1;
        Ok(Delivery::new(
            key,
            payload,
            attempt,
            Receipt::Redis(Box::new(message)),
        ))
    }

    async fn commit(&self, delivery: Delivery) -> Result<(), MqError> {
        let message = into_message(delivery)?;
        self.queue.acknowledge(&self.topic, message).await?;
        Ok(())
    }

    async fn release(&self, delivery: Delivery) -> Result<(), MqError> {
        let message = into_message(delivery)?;
        self.queue.reject(&self.topic, message).await?;
        Ok(())
    }
}
