use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "asset")]
pub struct Model {
    /// UUIDv4 assigned at upload, never reused.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub original_name: String,

    /// Key of the original blob, `original:<id>`.
    #[sea_orm(unique)]
    pub blob_key: String,

    pub size: i64,
    /// Sniffed MIME type of the original.
    pub format: String,

    /// One of: uploaded, processing, completed, failed
    pub status: String,

    pub result_ref: Option<String>,

    #[sea_orm(has_one)]
    pub processed: HasOne<super::processed_asset::Entity>,

    pub uploaded_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
