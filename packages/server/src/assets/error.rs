use common::storage::StorageError;
use common::task::OptionsError;
use mq::MqError;
use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

use crate::transform::TransformError;

/// Failure of one of the three stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("blob store: {0}")]
    Blob(#[from] StorageError),
    #[error("database: {0}")]
    Db(#[from] DbErr),
    #[error("broker: {0}")]
    Broker(#[from] MqError),
}

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("asset {0} not found")]
    NotFound(Uuid),

    /// A store was unavailable and nothing had been changed yet.
    #[error("store unavailable: {0}")]
    TransientStore(#[from] StoreError),

    /// A later step failed after an earlier one already had an external effect.
    #[error("asset {asset_id}: {source}")]
    Consistency {
        asset_id: Uuid,
        #[source]
        source: StoreError,
    },

    #[error("transform failed: {0}")]
    Transform(#[from] TransformError),
}

impl AssetError {
    pub fn consistency(asset_id: Uuid, source: impl Into<StoreError>) -> Self {
        Self::Consistency {
            asset_id,
            source: source.into(),
        }
    }

    /// Validation failures never succeed on a retry.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Validation(_))
    }
}

impl From<DbErr> for AssetError {
    fn from(e: DbErr) -> Self {
        Self::TransientStore(StoreError::Db(e))
    }
}

impl From<StorageError> for AssetError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::SizeLimitExceeded { actual, limit } => Self::Validation(format!(
                "payload of {actual} bytes exceeds the limit of {limit} bytes"
            )),
            other => Self::TransientStore(StoreError::Blob(other)),
        }
    }
}

impl From<OptionsError> for AssetError {
    fn from(e: OptionsError) -> Self {
        Self::Validation(e.to_string())
    }
}
