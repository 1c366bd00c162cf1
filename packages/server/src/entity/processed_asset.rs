use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Output of a completed transform. Exists only while the asset is `completed`.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "processed_asset")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub asset_id: Uuid,
    #[sea_orm(belongs_to, from = "asset_id", to = "id")]
    pub asset: HasOne<super::asset::Entity>,

    pub width: i32,
    pub height: i32,
    /// `processed:<id>`
    pub processed_key: String,

    pub processed_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
