// Object-storage abstraction for uploaded item photos.

pub mod r2;

pub use r2::R2Backend;

use crate::error::AppResult;

/// Storage backend for image blobs. When no backend is configured the
/// services fall back to storing base64 blobs in the database row.
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync {
    /// Upload an object; returns the storage path string.
    async fn upload(&self, key: &str, data: &[u8], content_type: &str) -> AppResult<String>;

    async fn download(&self, key: &str) -> AppResult<Vec<u8>>;

    async fn delete(&self, key: &str) -> AppResult<()>;

    fn bucket(&self) -> &str;
}
