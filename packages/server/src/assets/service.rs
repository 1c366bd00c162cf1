use std::sync::Arc;

use chrono::Utc;
use common::asset::result_reference;
use common::storage::BlobStore;
use common::{
    AssetRecord, AssetStatus, BlobKey, NewAsset, ProcessedDescriptor, ProcessingTask,
    TransformOptions,
};
use mq::Producer;
use sea_orm::DatabaseConnection;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::error::{AssetError, StoreError};
use crate::repository::AssetRepository;
use crate::transaction::with_transaction;
use crate::transform::Transformer;

/// What the upload caller gets back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub asset_id: Uuid,
    pub status: AssetStatus,
    pub result_ref: String,
}

/// A record, plus the processed bytes once the asset is completed.
#[derive(Debug, Clone)]
pub struct ProcessedAsset {
    pub record: AssetRecord,
    pub data: Option<Vec<u8>>,
}

/// Orchestrates the blob store, the metadata repository and the task queue.
///
/// None of the three stores shares a transaction with the others, so every
/// operation here orders its writes so that a failure can be compensated.
pub struct AssetService {
    db: DatabaseConnection,
    blobs: Arc<dyn BlobStore>,
    producer: Producer,
    transformer: Arc<dyn Transformer>,
    base_url: String,
}

impl AssetService {
    pub fn new(
        db: DatabaseConnection,
        blobs: Arc<dyn BlobStore>,
        producer: Producer,
        transformer: Arc<dyn Transformer>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            db,
            blobs,
            producer,
            transformer,
            base_url: base_url.into(),
        }
    }

    /// Store the original, record it and schedule its transform.
    ///
    /// On success the blob, the `uploaded` record and the published task all
    /// exist; on failure none of them do (up to a logged failed compensation).
    pub async fn upload(
        &self,
        data: &[u8],
        filename: &str,
        options: TransformOptions,
    ) -> Result<UploadReceipt, AssetError> {
        let filename = filename.trim();
        if data.is_empty() {
            return Err(AssetError::Validation("image data is empty".into()));
        }
        if filename.is_empty() {
            return Err(AssetError::Validation("filename is empty".into()));
        }
        options.validate()?;

        let asset_id = Uuid::new_v4();
        let blob_key = BlobKey::original(asset_id);
        let result_ref = result_reference(&self.base_url, asset_id);

        info!(asset_id = %asset_id, filename, size = data.len(), "Uploading new asset");

        let blob = self.blobs.put(data, &blob_key).await.map_err(|e| {
            error!(asset_id = %asset_id, error = %e, "Failed to store original");
            AssetError::from(e)
        })?;

        let params = NewAsset {
            id: asset_id,
            original_name: filename.to_string(),
            blob_key: blob_key.clone(),
            size: data.len() as i64,
            format: blob.content_type,
            result_ref: Some(result_ref.clone()),
            uploaded_at: Utc::now(),
        };
        let task = ProcessingTask::new(asset_id, options);
        let producer = self.producer.clone();

        let created = with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                let record = AssetRepository::new(txn).create_asset(params).await?;
                producer.publish(&task).await?;
                Ok::<_, StoreError>(record)
            })
        })
        .await;

        let record = match created {
            Ok(record) => record,
            Err(e) => {
                error!(asset_id = %asset_id, error = %e, "Upload transaction failed");
                self.discard_blob(asset_id, &blob_key).await;
                return Err(AssetError::consistency(asset_id, e));
            }
        };

        info!(asset_id = %asset_id, status = %record.status, "Asset uploaded");

        Ok(UploadReceipt {
            asset_id,
            status: record.status,
            result_ref,
        })
    }

    /// Run the transform for one task. Safe to call again for the same task.
    pub async fn process(&self, task: &ProcessingTask) -> Result<(), AssetError> {
        let asset_id = Uuid::parse_str(&task.asset_id)
            .map_err(|e| AssetError::Validation(format!("invalid asset id {:?}: {e}", task.asset_id)))?;
        task.options.validate()?;

        let repo = AssetRepository::new(&self.db);
        let Some(record) = repo.get_by_id(asset_id).await? else {
            info!(asset_id = %asset_id, "Asset no longer exists, skipping task");
            return Ok(());
        };

        match record.status {
            AssetStatus::Failed => {
                info!(asset_id = %asset_id, "Asset already failed, skipping task");
                return Ok(());
            }
            AssetStatus::Unknown => {
                warn!(asset_id = %asset_id, "Asset has unrecognized status, skipping task");
                return Ok(());
            }
            AssetStatus::Uploaded => {
                if !repo.update_status(asset_id, AssetStatus::Processing).await? {
                    debug!(
                        asset_id = %asset_id,
                        "Asset changed before processing started, skipping task"
                    );
                    return Ok(());
                }
            }
            AssetStatus::Processing | AssetStatus::Completed => {
                debug!(asset_id = %asset_id, status = %record.status, "Resuming processing");
            }
        }

        match self.transform_and_complete(asset_id, &record, &task.options).await {
            Ok(()) => {
                info!(asset_id = %asset_id, "Asset processed");
                Ok(())
            }
            Err(e) => {
                error!(asset_id = %asset_id, error = %e, "Processing failed");
                self.mark_failed(asset_id).await;
                Err(e)
            }
        }
    }

    async fn transform_and_complete(
        &self,
        asset_id: Uuid,
        record: &AssetRecord,
        options: &TransformOptions,
    ) -> Result<(), AssetError> {
        let original = self.blobs.get(&record.blob_key).await?;

        let output = self.transformer.transform(&original, options)?;

        let processed_key = BlobKey::processed(asset_id);
        self.blobs
            .put(&output.bytes, &processed_key)
            .await
            .map_err(|e| AssetError::consistency(asset_id, e))?;

        let descriptor = ProcessedDescriptor {
            width: output.width,
            height: output.height,
            processed_key: processed_key.clone(),
            processed_at: Utc::now(),
        };

        let applied = with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                let repo = AssetRepository::new(txn);
                if !repo.update_status(asset_id, AssetStatus::Completed).await? {
                    return Ok(false);
                }
                repo.attach_processed_descriptor(asset_id, &descriptor)
                    .await?;
                Ok::<_, StoreError>(true)
            })
        })
        .await;

        match applied {
            Ok(true) => Ok(()),
            Ok(false) => {
                // Deleted or failed while we were transforming; nothing to complete.
                warn!(asset_id = %asset_id, "Asset changed during processing, discarding output");
                self.discard_unclaimed_output(asset_id, record.status, &processed_key)
                    .await;
                Ok(())
            }
            Err(e) => {
                self.discard_unclaimed_output(asset_id, record.status, &processed_key)
                    .await;
                Err(AssetError::consistency(asset_id, e))
            }
        }
    }

    /// Remove a processed blob unless a completed record still points at it.
    ///
    /// The processed key is fixed per asset, so a redelivered task writes over
    /// the same blob a completed record already serves.
    async fn discard_unclaimed_output(&self, asset_id: Uuid, seen: AssetStatus, key: &BlobKey) {
        if seen == AssetStatus::Completed {
            debug!(asset_id = %asset_id, "Keeping processed blob of completed asset");
            return;
        }

        match AssetRepository::new(&self.db)
            .get_with_processed_data(asset_id)
            .await
        {
            Ok(Some(current)) if current.processed.is_some() => {
                debug!(asset_id = %asset_id, "Processed blob is referenced, keeping it");
            }
            Ok(_) => self.discard_blob(asset_id, key).await,
            Err(e) => warn!(
                asset_id = %asset_id,
                key = %key,
                error = %e,
                "Could not check processed blob, keeping it"
            ),
        }
    }

    /// Best-effort `failed` write outside any transaction. Never retried.
    async fn mark_failed(&self, asset_id: Uuid) {
        match AssetRepository::new(&self.db)
            .update_status(asset_id, AssetStatus::Failed)
            .await
        {
            Ok(true) => info!(asset_id = %asset_id, "Asset marked failed"),
            Ok(false) => debug!(asset_id = %asset_id, "Asset not in a state that can fail"),
            Err(e) => warn!(asset_id = %asset_id, error = %e, "Failed to mark asset as failed"),
        }
    }

    /// Compensating delete. Failure is logged and swallowed.
    async fn discard_blob(&self, asset_id: Uuid, key: &BlobKey) {
        match self.blobs.delete(key).await {
            Ok(_) => info!(asset_id = %asset_id, key = %key, "Blob removed"),
            Err(e) => warn!(
                asset_id = %asset_id,
                key = %key,
                error = %e,
                "Compensating blob delete failed"
            ),
        }
    }

    /// Record with its processed descriptor, if any.
    pub async fn get_asset(&self, asset_id: Uuid) -> Result<AssetRecord, AssetError> {
        AssetRepository::new(&self.db)
            .get_with_processed_data(asset_id)
            .await?
            .ok_or(AssetError::NotFound(asset_id))
    }

    /// Record plus processed bytes when the asset is completed.
    pub async fn get_processed(&self, asset_id: Uuid) -> Result<ProcessedAsset, AssetError> {
        let record = self.get_asset(asset_id).await?;

        let data = match (&record.status, &record.processed) {
            (AssetStatus::Completed, Some(descriptor)) => {
                Some(self.blobs.get(&descriptor.processed_key).await?)
            }
            _ => None,
        };

        Ok(ProcessedAsset { record, data })
    }

    /// Remove the record and its descriptor, then both blobs.
    pub async fn delete_asset(&self, asset_id: Uuid) -> Result<(), AssetError> {
        let record = AssetRepository::new(&self.db)
            .get_by_id(asset_id)
            .await?
            .ok_or(AssetError::NotFound(asset_id))?;

        let removed = with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                let repo = AssetRepository::new(txn);
                repo.delete_processed_descriptor(asset_id).await?;
                repo.delete(asset_id).await
            })
        })
        .await?;

        if !removed {
            return Err(AssetError::NotFound(asset_id));
        }

        self.discard_blob(asset_id, &BlobKey::processed(asset_id))
            .await;
        self.discard_blob(asset_id, &record.blob_key).await;

        info!(asset_id = %asset_id, "Asset deleted");
        Ok(())
    }
}
