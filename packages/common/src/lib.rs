pub mod asset;
pub mod asset_status;
pub mod config;
pub mod retry;
pub mod storage;
pub mod task;

pub use asset::{AssetRecord, BlobKey, BlobRole, NewAsset, ProcessedDescriptor};
pub use asset_status::AssetStatus;
pub use retry::RetryPolicy;
pub use task::{ProcessingTask, TransformOptions};
