mod error;
mod hash;
mod traits;

pub mod filesystem;
#[cfg(feature = "object-storage")]
pub mod object;

pub use error::StorageError;
pub use hash::ContentHash;
pub use traits::{BlobInfo, BlobStore, content_type_for};
