use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use common::ProcessingTask;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::broker::Broker;
use crate::error::MqError;

/// Pause after a failed receive before polling the broker again.
const RECEIVE_BACKOFF: Duration = Duration::from_secs(1);

/// Sequential task consumer with manual commit.
pub struct Consumer {
    broker: Arc<dyn Broker>,
}

impl Consumer {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }

    /// Receive tasks and hand them to `handler` one at a time until `cancel` fires.
    ///
    /// A delivery is committed only after the handler returns `Ok`. On handler
    /// error it is released for redelivery and the loop moves on. Payloads that do
    /// not decode are logged and committed so they are never retried.
    pub async fn consume<F, Fut, E>(
        &self,
        cancel: CancellationToken,
        mut handler: F,
    ) -> Result<(), MqError>
    where
        F: FnMut(ProcessingTask) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
    {
        info!("Starting task consumer");

        loop {
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Consumer cancelled, stopping");
                    return Ok(());
                }
                received = self.broker.receive() => received,
            };

            let delivery = match received {
                Ok(d) => d,
                Err(e) => {
                    error!(error = %e, "Failed to receive delivery");
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(RECEIVE_BACKOFF) => continue,
                    }
                }
            };

            let task: ProcessingTask = match serde_json::from_slice(delivery.payload()) {
                Ok(task) => task,
                Err(e) => {
                    error!(
                        key = delivery.key(),
                        error = %e,
                        "Failed to decode task, skipping poison message"
                    );
                    if let Err(e) = self.broker.commit(delivery).await {
                        error!(error = %e, "Failed to commit poison message");
                    }
                    continue;
                }
            };

            let asset_id = task.asset_id.clone();
            let attempt = delivery.attempt();

            match handler(task).await {
                Ok(()) => match self.broker.commit(delivery).await {
                    Ok(()) => debug!(asset_id = %asset_id, attempt, "Delivery committed"),
                    Err(e) => error!(asset_id = %asset_id, error = %e, "Failed to commit delivery"),
                },
                Err(e) => {
                    warn!(
                        asset_id = %asset_id,
                        attempt,
                        error = %e,
                        "Task handler failed, leaving delivery uncommitted"
                    );
                    if let Err(e) = self.broker.release(delivery).await {
                        error!(asset_id = %asset_id, error = %e, "Failed to release delivery");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use common::TransformOptions;
    use uuid::Uuid;

    use super::*;
    use crate::memory::MemoryBroker;

    fn task_bytes(id: Uuid) -> Vec<u8> {
        serde_json::to_vec(&ProcessingTask::new(id, TransformOptions::default())).unwrap()
    }

    /// Run the consumer until `seen` has `n` entries, then cancel.
    async fn run_until<F>(broker: Arc<MemoryBroker>, n: usize, fail: F) -> Vec<String>
    where
        F: Fn(&str) -> bool,
    {
        let cancel = CancellationToken::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let consumer = Consumer::new(broker);

        let stopper = cancel.clone();
        let seen_handler = Arc::clone(&seen);
        consumer
            .consume(cancel, |task| {
                let mut guard = seen_handler.lock().unwrap();
                guard.push(task.asset_id.clone());
                if guard.len() >= n {
                    stopper.cancel();
                }
                let result = if fail(&task.asset_id) {
                    Err("transform exploded")
                } else {
                    Ok(())
                };
                async move { result }
            })
            .await
            .unwrap();

        let out = seen.lock().unwrap().clone();
        out
    }

    #[tokio::test]
    async fn test_failed_task_redelivered_after_restart() {
        let broker = Arc::new(MemoryBroker::new(1));
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        broker.send(&a.to_string(), &task_bytes(a)).await.unwrap();
        broker.send(&b.to_string(), &task_bytes(b)).await.unwrap();

        let a_str = a.to_string();
        let seen = run_until(broker.clone(), 2, |id| id == a_str).await;
        assert_eq!(seen, vec![a.to_string(), b.to_string()]);

        // A stays uncommitted, B is gone.
        let backlog = broker.backlog().await;
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog[0].0, a.to_string());

        let restarted = Arc::new(broker.restart());
        let seen = run_until(restarted.clone(), 1, |_| false).await;
        assert_eq!(seen, vec![a.to_string()]);
        assert!(restarted.backlog().await.is_empty());
    }

    #[tokio::test]
    async fn test_poison_message_committed_and_skipped() {
        let broker = Arc::new(MemoryBroker::new(1));
        let good = Uuid::new_v4();
        broker.send("junk", b"{not json").await.unwrap();
        broker.send(&good.to_string(), &task_bytes(good)).await.unwrap();

        let seen = run_until(broker.clone(), 1, |_| false).await;
        assert_eq!(seen, vec![good.to_string()]);
        assert!(broker.backlog().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_stops_idle_consumer() {
        let broker = Arc::new(MemoryBroker::new(1));
        let consumer = Consumer::new(broker);
        let cancel = CancellationToken::new();

        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            consumer.consume(cancel, |_| async { Ok::<(), String>(()) }),
        )
        .await
        .expect("consumer did not stop");
        assert!(result.is_ok());
    }
}
