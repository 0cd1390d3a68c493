pub mod memory;
pub mod provision;
pub mod s3;

pub use memory::MemoryStorage;
pub use provision::{Provisioned, provision_bucket, provision_buckets};
pub use s3::S3Storage;

use async_trait::async_trait;
use common::Result;
use common::config::{Settings, StorageBackend};
use std::sync::Arc;
use tracing::info;

/// Bucket-addressed object storage as used by the pipeline.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Fails with `Error::BucketAlreadyExists` when `bucket` is present.
    async fn create_bucket(&self, bucket: &str) -> Result<()>;
    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;
    async fn list_buckets(&self) -> Result<Vec<String>>;
    /// Keys under `prefix`, sorted ascending.
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;
    async fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> Result<()>;
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;
    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<()>;
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<()>;
}

pub async fn build_storage(settings: &Settings) -> Result<Arc<dyn ObjectStorage>> {
    match settings.storage.backend {
        StorageBackend::S3 => {
            info!(endpoint = %settings.minio.endpoint, "Using S3 object storage");
            Ok(Arc::new(S3Storage::connect(&settings.minio).await))
        }
        StorageBackend::Memory => {
            info!("Using in-memory object storage");
            Ok(Arc::new(MemoryStorage::new()))
        }
    }
}
