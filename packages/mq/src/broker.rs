use async_trait::async_trait;

use crate::error::MqError;
use crate::redis::WireRecord;

/// Adapter-specific handle used to commit or release a delivery.
pub(crate) enum Receipt {
    Memory { partition: usize, offset: usize },
    Redis(Box<broccoli_queue::brokers::broker::BrokerMessage<WireRecord>>),
}

/// One message handed to a consumer. Stays pending until committed or released.
pub struct Delivery {
    key: String,
    payload: Vec<u8>,
    attempt: u32,
    pub(crate) receipt: Receipt,
}

impl Delivery {
    pub(crate) fn new(key: String, payload: Vec<u8>, attempt: u32, receipt: Receipt) -> Self {
        Self {
            key,
            payload,
            attempt,
            receipt,
        }
    }

    /// Ordering key the producer sent with.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// 1 on first delivery, incremented on every redelivery.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("key", &self.key)
            .field("payload_len", &self.payload.len())
            .field("attempt", &self.attempt)
            .finish()
    }
}

/// At-least-once message channel.
///
/// Messages with the same key are delivered in send order. A delivery that is
/// neither committed nor released is handed out again after a consumer restart.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn send(&self, key: &str, payload: &[u8]) -> Result<(), MqError>;

    /// Wait for the next delivery.
    async fn receive(&self) -> Result<Delivery, MqError>;

    /// Mark a delivery as handled; it is never delivered again.
    async fn commit(&self, delivery: Delivery) -> Result<(), MqError>;

    /// Give a delivery back for redelivery.
    async fn release(&self, delivery: Delivery) -> Result<(), MqError>;
}
