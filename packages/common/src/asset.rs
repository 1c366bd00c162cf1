use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::asset_status::AssetStatus;

/// Which copy of an asset a blob holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobRole {
    Original,
    Processed,
}

impl BlobRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Processed => "processed",
        }
    }
}

/// Blob store key for one role of one asset: `<role>:<asset id>`.
///
/// Original and processed keys never collide, so both copies can coexist.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobKey(String);

impl BlobKey {
    pub fn new(role: BlobRole, asset_id: Uuid) -> Self {
        Self(format!("{}:{}", role.as_str(), asset_id))
    }

    pub fn original(asset_id: Uuid) -> Self {
        Self::new(BlobRole::Original, asset_id)
    }

    pub fn processed(asset_id: Uuid) -> Self {
        Self::new(BlobRole::Processed, asset_id)
    }

    /// Wrap a key read back from storage or the database.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where clients fetch the result of an asset: `<base_url>/image/<id>`.
pub fn result_reference(base_url: &str, asset_id: Uuid) -> String {
    format!("{}/image/{}", base_url.trim_end_matches('/'), asset_id)
}

/// Output of a completed transform, attached to the record on completion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedDescriptor {
    pub width: i32,
    pub height: i32,
    pub processed_key: BlobKey,
    pub processed_at: DateTime<Utc>,
}

/// Metadata of an uploaded asset as stored in the metadata repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: Uuid,
    pub original_name: String,
    pub blob_key: BlobKey,
    pub size: i64,
    pub format: String,
    pub status: AssetStatus,
    pub result_ref: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    /// Present iff `status` is `Completed` and the record was loaded with processed data.
    pub processed: Option<ProcessedDescriptor>,
}

/// Parameters for inserting a new asset record.
#[derive(Clone, Debug)]
pub struct NewAsset {
    pub id: Uuid,
    pub original_name: String,
    pub blob_key: BlobKey,
    pub size: i64,
    pub format: String,
    pub result_ref: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_role_prefixed() {
        let id = Uuid::nil();
        assert_eq!(
            BlobKey::original(id).as_str(),
            "original:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            BlobKey::processed(id).as_str(),
            "processed:00000000-0000-0000-0000-000000000000"
        );
        assert_ne!(BlobKey::original(id), BlobKey::processed(id));
    }

    #[test]
    fn test_result_reference_trims_trailing_slash() {
        let id = Uuid::nil();
        assert_eq!(
            result_reference("http://localhost:3000/", id),
            "http://localhost:3000/image/00000000-0000-0000-0000-000000000000"
        );
    }
}
