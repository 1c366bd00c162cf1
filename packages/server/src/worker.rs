use std::sync::Arc;

use mq::{Consumer, MqError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::assets::{AssetError, AssetService};

/// Consume processing tasks until `cancel` fires.
///
/// Validation failures are logged and acknowledged: redelivering them cannot help.
/// Every other failure leaves the delivery uncommitted.
pub async fn run_worker(
    consumer: &Consumer,
    assets: Arc<AssetService>,
    cancel: CancellationToken,
) -> Result<(), MqError> {
    info!("Starting asset worker");

    let result = consumer
        .consume(cancel, |task| {
            let assets = Arc::clone(&assets);
            async move {
                match assets.process(&task).await {
                    Ok(()) => Ok(()),
                    Err(e @ AssetError::Validation(_)) => {
                        warn!(
                            asset_id = %task.asset_id,
                            error = %e,
                            "Dropping task that failed validation"
                        );
                        Ok(())
                    }
                    Err(e) => {
                        error!(asset_id = %task.asset_id, error = %e, "Failed to process task");
                        Err(e)
                    }
                }
            }
        })
        .await;

    if let Err(e) = &result {
        error!(error = %e, "Asset worker stopped unexpectedly");
    } else {
        info!("Asset worker stopped");
    }
    result
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use common::{AssetStatus, ProcessingTask, TransformOptions};
    use mq::Broker;
    use uuid::Uuid;

    use super::*;
    use crate::test_support::Harness;
    use crate::transform::tests::PNG;

    async fn wait_for_status(h: &Harness, id: Uuid, status: AssetStatus) {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let record = h.service.get_asset(id).await.unwrap();
                if record.status == status {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("status not reached in time");
    }

    #[tokio::test]
    async fn test_worker_processes_and_commits() {
        let h = Harness::new().await;
        let good = h
            .service
            .upload(PNG, "cat.png", TransformOptions::default())
            .await
            .unwrap();
        let bad = h
            .service
            .upload(b"plain text", "notes.png", TransformOptions::default())
            .await
            .unwrap();

        // Undecodable id: dropped after validation.
        let mut malformed = ProcessingTask::new(Uuid::new_v4(), TransformOptions::default());
        malformed.asset_id = "garbage".into();
        h.broker
            .send("garbage", &serde_json::to_vec(&malformed).unwrap())
            .await
            .unwrap();

        let consumer = Consumer::new(Arc::new(h.broker.restart()));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn({
            let assets = Arc::clone(&h.service);
            let cancel = cancel.clone();
            async move { run_worker(&consumer, assets, cancel).await }
        });

        wait_for_status(&h, good.asset_id, AssetStatus::Completed).await;
        wait_for_status(&h, bad.asset_id, AssetStatus::Failed).await;

        cancel.cancel();
        handle.await.unwrap().unwrap();

        // Only the task whose processing failed is still pending.
        let pending = h.published().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].asset_id, bad.asset_id.to_string());
    }
}
