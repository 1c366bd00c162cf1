pub mod asset;
pub mod processed_asset;
