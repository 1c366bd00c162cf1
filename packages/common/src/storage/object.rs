use async_trait::async_trait;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, Region};

use super::error::StorageError;
use super::hash::ContentHash;
use super::traits::{BlobInfo, BlobStore, content_type_for};
use crate::asset::BlobKey;
use crate::config::S3Config;

/// S3-compatible (MinIO, AWS) blob store. Keys map 1:1 to object names.
pub struct ObjectBlobStore {
    bucket: Box<Bucket>,
    max_size: u64,
}

impl ObjectBlobStore {
    pub fn new(config: &S3Config, max_size: u64) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
        };
        let credentials = Credentials::new(
            Some(&config.access_key),
            Some(&config.secret_key),
            None,
            None,
            None,
        )
        .map_err(|e| StorageError::Unavailable(format!("invalid S3 credentials: {e}")))?;

        let bucket = Bucket::new(&config.bucket, region, credentials).map_err(unavailable)?;
        let bucket = if config.path_style {
            bucket.with_path_style()
        } else {
            bucket
        };

        Ok(Self { bucket, max_size })
    }
}

fn unavailable(err: S3Error) -> StorageError {
    StorageError::Unavailable(err.to_string())
}

fn is_not_found(err: &S3Error) -> bool {
    matches!(err, S3Error::HttpFailWithBody(404, _))
}

fn check_status(key: &BlobKey, status: u16) -> Result<(), StorageError> {
    match status {
        200..=299 => Ok(()),
        404 => Err(StorageError::NotFound(key.to_string())),
        code => Err(StorageError::Unavailable(format!(
            "unexpected status {code} for {key}"
        ))),
    }
}

#[async_trait]
impl BlobStore for ObjectBlobStore {
    async fn put(&self, data: &[u8], key: &BlobKey) -> Result<BlobInfo, StorageError> {
        if data.len() as u64 > self.max_size {
            return Err(StorageError::SizeLimitExceeded {
                actual: data.len() as u64,
                limit: self.max_size,
            });
        }

        let content_type = content_type_for(data);
        let response = self
            .bucket
            .put_object_with_content_type(key.as_str(), data, &content_type)
            .await
            .map_err(unavailable)?;
        check_status(key, response.status_code())?;

        Ok(BlobInfo {
            key: key.clone(),
            size: data.len() as u64,
            content_type,
            etag: ContentHash::compute(data).to_hex(),
        })
    }

    async fn get(&self, key: &BlobKey) -> Result<Vec<u8>, StorageError> {
        match self.bucket.get_object(key.as_str()).await {
            Ok(response) => {
                check_status(key, response.status_code())?;
                Ok(response.bytes().to_vec())
            }
            Err(e) if is_not_found(&e) => Err(StorageError::NotFound(key.to_string())),
            Err(e) => Err(unavailable(e)),
        }
    }

    async fn exists(&self, key: &BlobKey) -> Result<bool, StorageError> {
        match self.bucket.head_object(key.as_str()).await {
            Ok((_, 404)) => Ok(false),
            Ok((_, status)) => check_status(key, status).map(|_| true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(unavailable(e)),
        }
    }

    async fn delete(&self, key: &BlobKey) -> Result<bool, StorageError> {
        // S3 deletes are idempotent and do not report whether the object existed.
        let existed = self.exists(key).await?;
        if !existed {
            return Ok(false);
        }
        let response = self
            .bucket
            .delete_object(key.as_str())
            .await
            .map_err(unavailable)?;
        check_status(key, response.status_code())?;
        Ok(true)
    }
}
