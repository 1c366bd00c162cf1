use thiserror::Error;

#[derive(Debug, Error)]
pub enum MqError {
    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Delivery was not issued by this broker")]
    ForeignDelivery,
}

impl MqError {
    /// Whether retrying the same call could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, MqError::BrokerUnavailable(_))
    }
}

impl From<broccoli_queue::error::BroccoliError> for MqError {
    fn from(e: broccoli_queue::error::BroccoliError) -> Self {
        MqError::BrokerUnavailable(e.to_string())
    }
}
