use std::sync::Arc;

use common::{ProcessingTask, RetryPolicy};
use tracing::{debug, error};

use crate::broker::Broker;
use crate::error::MqError;

/// Publishes processing tasks keyed by asset id.
#[derive(Clone)]
pub struct Producer {
    broker: Arc<dyn Broker>,
    retry: RetryPolicy,
}

impl Producer {
    pub fn new(broker: Arc<dyn Broker>, retry: RetryPolicy) -> Self {
        Self { broker, retry }
    }

    /// Serialize and send `task`, retrying transient broker failures.
    ///
    /// Returns the last error once the retry policy is exhausted.
    pub async fn publish(&self, task: &ProcessingTask) -> Result<(), MqError> {
        let payload = serde_json::to_vec(task)?;
        let broker = &self.broker;
        let key = task.asset_id.as_str();
        let payload = payload.as_slice();

        let result = self
            .retry
            .run("publish_task", MqError::is_transient, move || {
                broker.send(key, payload)
            })
            .await;

        match &result {
            Ok(()) => debug!(asset_id = key, "Task published"),
            Err(e) => error!(asset_id = key, error = %e, "Failed to publish task"),
        }
        result
    }
}
