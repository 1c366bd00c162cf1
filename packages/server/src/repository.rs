use common::{AssetRecord, AssetStatus, BlobKey, NewAsset, ProcessedDescriptor};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::entity::{asset, processed_asset};

/// Asset metadata access over whatever executor the caller hands in.
///
/// Pass a `DatabaseTransaction` to run inside a unit of work, or the pool's
/// `DatabaseConnection` to run on an ambient connection.
pub struct AssetRepository<'a, C: ConnectionTrait> {
    conn: &'a C,
}

fn to_record(model: asset::Model, processed: Option<processed_asset::Model>) -> AssetRecord {
    AssetRecord {
        id: model.id,
        original_name: model.original_name,
        blob_key: BlobKey::from_raw(model.blob_key),
        size: model.size,
        format: model.format,
        status: AssetStatus::parse(&model.status),
        result_ref: model.result_ref,
        uploaded_at: model.uploaded_at,
        processed: processed.map(|p| ProcessedDescriptor {
            width: p.width,
            height: p.height,
            processed_key: BlobKey::from_raw(p.processed_key),
            processed_at: p.processed_at,
        }),
    }
}

impl<'a, C: ConnectionTrait> AssetRepository<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Insert a new record with status `uploaded`.
    pub async fn create_asset(&self, params: NewAsset) -> Result<AssetRecord, DbErr> {
        let model = asset::ActiveModel {
            id: Set(params.id),
            original_name: Set(params.original_name),
            blob_key: Set(params.blob_key.as_str().to_string()),
            size: Set(params.size),
            format: Set(params.format),
            status: Set(AssetStatus::Uploaded.as_str().to_string()),
            result_ref: Set(params.result_ref),
            uploaded_at: Set(params.uploaded_at),
        };
        let inserted = model.insert(self.conn).await?;
        Ok(to_record(inserted, None))
    }

    /// Move the record to `status` if its current status is a legal predecessor.
    ///
    /// Returns whether the update applied. A missing record reports `false`.
    pub async fn update_status(&self, id: Uuid, status: AssetStatus) -> Result<bool, DbErr> {
        let predecessors: Vec<&str> = status.predecessors().iter().map(|s| s.as_str()).collect();
        if predecessors.is_empty() {
            return Ok(false);
        }

        let result = asset::Entity::update_many()
            .col_expr(asset::Column::Status, Expr::value(status.as_str()))
            .filter(asset::Column::Id.eq(id))
            .filter(asset::Column::Status.is_in(predecessors))
            .exec(self.conn)
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Write the descriptor of a completed transform, keyed by asset id.
    ///
    /// Rewriting an existing descriptor keeps its original `processed_at`.
    pub async fn attach_processed_descriptor(
        &self,
        id: Uuid,
        descriptor: &ProcessedDescriptor,
    ) -> Result<(), DbErr> {
        let model = processed_asset::ActiveModel {
            asset_id: Set(id),
            width: Set(descriptor.width),
            height: Set(descriptor.height),
            processed_key: Set(descriptor.processed_key.as_str().to_string()),
            processed_at: Set(descriptor.processed_at),
        };

        processed_asset::Entity::insert(model)
            .on_conflict(
                OnConflict::column(processed_asset::Column::AssetId)
                    .update_columns([
                        processed_asset::Column::Width,
                        processed_asset::Column::Height,
                        processed_asset::Column::ProcessedKey,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.conn)
            .await?;
        Ok(())
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<AssetRecord>, DbErr> {
        Ok(asset::Entity::find_by_id(id)
            .one(self.conn)
            .await?
            .map(|m| to_record(m, None)))
    }

    /// Like [`get_by_id`](Self::get_by_id), with the processed descriptor loaded.
    pub async fn get_with_processed_data(&self, id: Uuid) -> Result<Option<AssetRecord>, DbErr> {
        Ok(asset::Entity::find_by_id(id)
            .find_also_related(processed_asset::Entity)
            .one(self.conn)
            .await?
            .map(|(m, p)| to_record(m, p)))
    }

    /// Returns whether a record was removed.
    pub async fn delete(&self, id: Uuid) -> Result<bool, DbErr> {
        let result = asset::Entity::delete_by_id(id).exec(self.conn).await?;
        Ok(result.rows_affected > 0)
    }

    /// Returns whether a descriptor was removed.
    pub async fn delete_processed_descriptor(&self, id: Uuid) -> Result<bool, DbErr> {
        let result = processed_asset::Entity::delete_by_id(id)
            .exec(self.conn)
            .await?;
        Ok(result.rows_affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::database::testing::memory_db;

    fn new_asset(id: Uuid) -> NewAsset {
        NewAsset {
            id,
            original_name: "cat.png".into(),
            blob_key: BlobKey::original(id),
            size: 16,
            format: "image/png".into(),
            result_ref: Some(format!("http://localhost/image/{id}")),
            uploaded_at: Utc::now(),
        }
    }

    fn descriptor(id: Uuid, width: i32) -> ProcessedDescriptor {
        ProcessedDescriptor {
            width,
            height: 10,
            processed_key: BlobKey::processed(id),
            processed_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let db = memory_db().await;
        let repo = AssetRepository::new(&db);
        let id = Uuid::new_v4();

        let created = repo.create_asset(new_asset(id)).await.unwrap();
        assert_eq!(created.status, AssetStatus::Uploaded);

        let fetched = repo.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(fetched.blob_key, BlobKey::original(id));
        assert_eq!(fetched.status, AssetStatus::Uploaded);
        assert!(fetched.processed.is_none());

        assert!(repo.get_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_status_is_guarded() {
        let db = memory_db().await;
        let repo = AssetRepository::new(&db);
        let id = Uuid::new_v4();
        repo.create_asset(new_asset(id)).await.unwrap();

        // uploaded -> completed skips processing
        assert!(!repo.update_status(id, AssetStatus::Completed).await.unwrap());
        assert!(repo.update_status(id, AssetStatus::Processing).await.unwrap());
        assert!(repo.update_status(id, AssetStatus::Completed).await.unwrap());
        // idempotent terminal rewrite
        assert!(repo.update_status(id, AssetStatus::Completed).await.unwrap());
        // no way back
        assert!(!repo.update_status(id, AssetStatus::Failed).await.unwrap());
        assert!(!repo.update_status(id, AssetStatus::Processing).await.unwrap());
        assert!(!repo.update_status(id, AssetStatus::Uploaded).await.unwrap());

        let fetched = repo.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(fetched.status, AssetStatus::Completed);

        assert!(
            !repo
                .update_status(Uuid::new_v4(), AssetStatus::Processing)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_descriptor_upsert_keeps_first_timestamp() {
        let db = memory_db().await;
        let repo = AssetRepository::new(&db);
        let id = Uuid::new_v4();
        repo.create_asset(new_asset(id)).await.unwrap();

        let first = descriptor(id, 100);
        repo.attach_processed_descriptor(id, &first).await.unwrap();

        let mut second = descriptor(id, 200);
        second.processed_at = Utc::now();
        repo.attach_processed_descriptor(id, &second).await.unwrap();

        let record = repo.get_with_processed_data(id).await.unwrap().unwrap();
        let stored = record.processed.unwrap();
        assert_eq!(stored.width, 200);
        assert_eq!(stored.processed_at, first.processed_at);
    }

    #[tokio::test]
    async fn test_delete() {
        let db = memory_db().await;
        let repo = AssetRepository::new(&db);
        let id = Uuid::new_v4();
        repo.create_asset(new_asset(id)).await.unwrap();
        repo.attach_processed_descriptor(id, &descriptor(id, 1))
            .await
            .unwrap();

        assert!(repo.delete_processed_descriptor(id).await.unwrap());
        assert!(!repo.delete_processed_descriptor(id).await.unwrap());
        assert!(repo.delete(id).await.unwrap());
        assert!(!repo.delete(id).await.unwrap());
        assert!(repo.get_with_processed_data(id).await.unwrap().is_none());
    }
}
