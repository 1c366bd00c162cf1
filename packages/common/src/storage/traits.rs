use async_trait::async_trait;

use super::error::StorageError;
use crate::asset::BlobKey;

/// What the store reports back after a successful write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobInfo {
    pub key: BlobKey,
    pub size: u64,
    pub content_type: String,
    /// SHA-256 of the payload, hex encoded.
    pub etag: String,
}

/// Key-addressed blob storage.
///
/// Writes overwrite: putting twice under one key leaves the second payload.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under `key`.
    async fn put(&self, data: &[u8], key: &BlobKey) -> Result<BlobInfo, StorageError>;

    /// Retrieve all bytes stored under `key`.
    async fn get(&self, key: &BlobKey) -> Result<Vec<u8>, StorageError>;

    /// Check whether a blob exists.
    async fn exists(&self, key: &BlobKey) -> Result<bool, StorageError>;

    /// Delete the blob under `key`.
    ///
    /// Returns `true` if the blob was deleted, `false` if it did not exist.
    async fn delete(&self, key: &BlobKey) -> Result<bool, StorageError>;
}

/// Sniff a MIME type from the payload's magic bytes, defaulting to octet-stream.
pub fn content_type_for(data: &[u8]) -> String {
    infer::get(data)
        .map(|t| t.mime_type().to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}
