use super::ObjectStorage;
use async_trait::async_trait;
use common::{Error, Result};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::TryStreamExt;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use std::sync::Arc;

/// Process-local storage backend: one `InMemory` store per bucket.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    buckets: Arc<DashMap<String, Arc<InMemory>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket(&self, name: &str) -> Result<Arc<InMemory>> {
        self.buckets
            .get(name)
            .map(|store| Arc::clone(store.value()))
            .ok_or_else(|| Error::NotFound(format!("bucket {}", name)))
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        match self.buckets.entry(bucket.to_string()) {
            Entry::Occupied(_) => Err(Error::BucketAlreadyExists(bucket.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(InMemory::new()));
                Ok(())
            }
        }
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        Ok(self.buckets.contains_key(bucket))
    }

    async fn list_buckets(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.buckets.iter().map(|e| e.key().clone()).collect();
        names.sort();
        Ok(names)
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let store = self.bucket(bucket)?;
        // object_store prefixes match whole path segments; S3 prefixes are plain strings.
        let metas: Vec<_> = store.list(None).try_collect().await?;

        let mut keys: Vec<String> = metas
            .into_iter()
            .map(|meta| meta.location.to_string())
            .filter(|key| key.starts_with(prefix))
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> Result<()> {
        let store = self.bucket(bucket)?;
        store
            .put(&Path::from(key), PutPayload::from(data.to_vec()))
            .await?;
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let store = self.bucket(bucket)?;
        let bytes = store.get(&Path::from(key)).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<()> {
        let data = self.get_object(src_bucket, src_key).await?;
        self.put_object(dst_bucket, dst_key, &data).await
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<()> {
        let store = self.bucket(bucket)?;
        for key in keys {
            store.delete(&Path::from(key.as_str())).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_bucket_twice_reports_existing() {
        let storage = MemoryStorage::new();
        storage.create_bucket("weather").await.unwrap();

        let err = storage.create_bucket("weather").await.unwrap_err();
        assert!(matches!(err, Error::BucketAlreadyExists(ref b) if b == "weather"));
        assert_eq!(storage.list_buckets().await.unwrap(), vec!["weather"]);
    }

    #[tokio::test]
    async fn test_list_objects_filters_by_plain_prefix() {
        let storage = MemoryStorage::new();
        storage.create_bucket("staging").await.unwrap();
        storage.put_object("staging", "weather/b.json", b"{}").await.unwrap();
        storage.put_object("staging", "weather/a.json", b"{}").await.unwrap();
        storage.put_object("staging", "climate/a.csv", b"dt").await.unwrap();

        let keys = storage.list_objects("staging", "weather/").await.unwrap();
        assert_eq!(keys, vec!["weather/a.json", "weather/b.json"]);

        let keys = storage.list_objects("staging", "weather/a").await.unwrap();
        assert_eq!(keys, vec!["weather/a.json"]);
    }

    #[tokio::test]
    async fn test_copy_then_delete_moves_object() {
        let storage = MemoryStorage::new();
        storage.create_bucket("staging").await.unwrap();
        storage.create_bucket("archive").await.unwrap();
        storage.put_object("staging", "weather/a.json", b"{\"city\":\"Oslo\"}").await.unwrap();

        storage
            .copy_object("staging", "weather/a.json", "archive", "weather/a.json")
            .await
            .unwrap();
        storage
            .delete_objects("staging", &["weather/a.json".to_string()])
            .await
            .unwrap();

        assert!(storage.list_objects("staging", "").await.unwrap().is_empty());
        assert_eq!(
            storage.get_object("archive", "weather/a.json").await.unwrap(),
            b"{\"city\":\"Oslo\"}".to_vec()
        );
    }

    #[tokio::test]
    async fn test_missing_bucket_and_key_are_not_found() {
        let storage = MemoryStorage::new();
        assert!(matches!(
            storage.list_objects("nope", "").await,
            Err(Error::NotFound(_))
        ));

        storage.create_bucket("staging").await.unwrap();
        assert!(matches!(
            storage.get_object("staging", "missing.json").await,
            Err(Error::NotFound(_))
        ));
    }
}
