use std::future::Future;
use std::pin::Pin;

use sea_orm::{DatabaseTransaction, DbErr, TransactionTrait};
use tracing::warn;

/// Future returned by a unit-of-work closure. Borrows the transaction it runs on.
pub type TxFuture<'c, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'c>>;

/// Run `f` inside one unit of work on `conn`.
///
/// Commits when `f` returns `Ok`, rolls back when it returns `Err`. If the
/// future is dropped or panics midway, the transaction handle rolls back on drop.
///
/// `conn` may itself be a `DatabaseTransaction`; the inner scope then runs in a
/// savepoint, and the outer scope still decides the final outcome.
///
/// The closure must own what it captures (clone or move it in), since the future
/// is tied only to the transaction's lifetime.
pub async fn with_transaction<C, F, T, E>(conn: &C, f: F) -> Result<T, E>
where
    C: TransactionTrait<Transaction = DatabaseTransaction>,
    F: for<'c> FnOnce(&'c DatabaseTransaction) -> TxFuture<'c, T, E> + Send,
    T: Send,
    E: From<DbErr> + Send,
{
    let txn = conn.begin().await?;

    match f(&txn).await {
        Ok(value) => {
            txn.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = txn.rollback().await {
                warn!(error = %rollback_err, "Rollback failed");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use common::{AssetStatus, BlobKey, NewAsset};
    use sea_orm::DatabaseConnection;
    use uuid::Uuid;

    use super::*;
    use crate::database::testing::memory_db;
    use crate::repository::AssetRepository;

    fn new_asset(id: Uuid) -> NewAsset {
        NewAsset {
            id,
            original_name: "a.png".into(),
            blob_key: BlobKey::original(id),
            size: 1,
            format: "image/png".into(),
            result_ref: None,
            uploaded_at: Utc::now(),
        }
    }

    async fn exists(db: &DatabaseConnection, id: Uuid) -> bool {
        AssetRepository::new(db).get_by_id(id).await.unwrap().is_some()
    }

    #[tokio::test]
    async fn test_commits_on_ok() {
        let db = memory_db().await;
        let id = Uuid::new_v4();

        let created = with_transaction(&db, move |txn| {
            Box::pin(async move {
                AssetRepository::new(txn).create_asset(new_asset(id)).await
            })
        })
        .await
        .unwrap();

        assert_eq!(created.id, id);
        assert!(exists(&db, id).await);
    }

    #[tokio::test]
    async fn test_rolls_back_on_err() {
        let db = memory_db().await;
        let id = Uuid::new_v4();

        let result: Result<(), DbErr> = with_transaction(&db, move |txn| {
            Box::pin(async move {
                let repo = AssetRepository::new(txn);
                repo.create_asset(new_asset(id)).await?;
                repo.update_status(id, AssetStatus::Processing).await?;
                Err(DbErr::Custom("publish failed".into()))
            })
        })
        .await;

        assert!(result.is_err());
        assert!(!exists(&db, id).await);
    }

    #[tokio::test]
    async fn test_rolls_back_on_panic() {
        let db = memory_db().await;
        let id = Uuid::new_v4();

        let handle = tokio::spawn({
            let db = db.clone();
            async move {
                with_transaction(&db, move |txn| {
                    Box::pin(async move {
                        let created = AssetRepository::new(txn).create_asset(new_asset(id)).await?;
                        if created.id == id {
                            panic!("worker crashed mid-transaction");
                        }
                        Ok::<_, DbErr>(())
                    })
                })
                .await
            }
        });

        let err = handle.await.unwrap_err();
        assert!(err.is_panic());
        assert!(!exists(&db, id).await);
    }

    #[tokio::test]
    async fn test_nested_scope_uses_savepoint() {
        let db = memory_db().await;
        let outer_id = Uuid::new_v4();
        let inner_id = Uuid::new_v4();

        with_transaction(&db, move |txn| {
            Box::pin(async move {
                AssetRepository::new(txn)
                    .create_asset(new_asset(outer_id))
                    .await?;

                let inner: Result<(), DbErr> = with_transaction(txn, move |sp| {
                    Box::pin(async move {
                        AssetRepository::new(sp)
                            .create_asset(new_asset(inner_id))
                            .await?;
                        Err(DbErr::Custom("inner failure".into()))
                    })
                })
                .await;
                assert!(inner.is_err());
                Ok::<(), DbErr>(())
            })
        })
        .await
        .unwrap();

        assert!(exists(&db, outer_id).await);
        assert!(!exists(&db, inner_id).await);
    }

    #[tokio::test]
    async fn test_outer_rollback_discards_committed_savepoint() {
        let db = memory_db().await;
        let inner_id = Uuid::new_v4();

        let result: Result<(), DbErr> = with_transaction(&db, move |txn| {
            Box::pin(async move {
                with_transaction(txn, move |sp| {
                    Box::pin(async move {
                        AssetRepository::new(sp)
                            .create_asset(new_asset(inner_id))
                            .await
                            .map(|_| ())
                    })
                })
                .await?;
                Err(DbErr::Custom("outer failure".into()))
            })
        })
        .await;

        assert!(result.is_err());
        assert!(!exists(&db, inner_id).await);
    }
}
