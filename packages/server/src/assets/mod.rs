mod error;
mod service;

pub use error::{AssetError, StoreError};
pub use service::{AssetService, ProcessedAsset, UploadReceipt};
