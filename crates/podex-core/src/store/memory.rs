//! In-memory object store for testing

use super::{ObjectStat, ObjectStore, ObjectStream, PutReceipt, StoreError, StoreResult};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::StreamExt;
use md5::{Digest, Md5};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Clone)]
struct StoredObject {
    data: Bytes,
    etag: String,
    metadata: HashMap<String, String>,
}

/// An in-memory object store that counts writes
#[derive(Clone, Default)]
pub struct MemoryStore {
    buckets: Arc<DashMap<String, String>>,
    objects: Arc<DashMap<(String, String), StoredObject>>,
    puts: Arc<AtomicUsize>,
    bucket_creates: Arc<AtomicUsize>,
    fail_stat: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of uploads that transferred bytes
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Number of buckets actually created
    pub fn bucket_create_count(&self) -> usize {
        self.bucket_creates.load(Ordering::SeqCst)
    }

    /// Make every stat call fail with a backend error
    pub fn fail_stat(&self, fail: bool) {
        self.fail_stat.store(fail, Ordering::SeqCst);
    }

    /// Region a bucket was created in
    pub fn bucket_region(&self, bucket: &str) -> Option<String> {
        self.buckets.get(bucket).map(|entry| entry.value().clone())
    }

    /// Stored bytes of an object
    pub fn object_bytes(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|entry| entry.value().data.clone())
    }

    /// Stored user metadata of an object
    pub fn object_metadata(&self, bucket: &str, key: &str) -> Option<HashMap<String, String>> {
        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|entry| entry.value().metadata.clone())
    }

    fn object(&self, bucket: &str, key: &str) -> StoreResult<StoredObject> {
        if !self.buckets.contains_key(bucket) {
            return Err(StoreError::BucketNotFound(bucket.to_string()));
        }
        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn host(&self) -> &str {
        "memory"
    }

    async fn bucket_exists(&self, bucket: &str) -> StoreResult<bool> {
        Ok(self.buckets.contains_key(bucket))
    }

    async fn make_bucket(&self, bucket: &str) -> StoreResult<()> {
        match self.buckets.entry(bucket.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(StoreError::BucketExists(bucket.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(crate::EXCHANGE_REGION.to_string());
                self.bucket_creates.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    async fn stat_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectStat> {
        if self.fail_stat.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected stat failure".to_string()));
        }
        let object = self.object(bucket, key)?;
        Ok(ObjectStat {
            etag: object.etag,
            size: object.data.len() as u64,
            metadata: object.metadata,
        })
    }

    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        metadata: &HashMap<String, String>,
    ) -> StoreResult<PutReceipt> {
        if !self.buckets.contains_key(bucket) {
            return Err(StoreError::BucketNotFound(bucket.to_string()));
        }
        let data = Bytes::from(tokio::fs::read(path).await?);
        let etag = hex::encode(Md5::digest(&data));
        let size = data.len() as u64;

        self.objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data,
                etag: etag.clone(),
                metadata: metadata.clone(),
            },
        );
        self.puts.fetch_add(1, Ordering::SeqCst);

        Ok(PutReceipt { etag, size })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectStream> {
        let object = self.object(bucket, key)?;
        // Serve in small chunks so readers see a real multi-chunk stream
        let chunks: Vec<StoreResult<Bytes>> = object
            .data
            .chunks(8 * 1024)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(futures::stream::iter(chunks).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::io::Write;

    #[tokio::test]
    async fn test_put_and_get() {
        let store = MemoryStore::new();
        store.make_bucket("b").await.unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![1u8; 20_000]).unwrap();

        let mut meta = HashMap::new();
        meta.insert("creator".to_string(), "pod-a".to_string());
        let receipt = store.put_file("b", "k", file.path(), &meta).await.unwrap();
        assert_eq!(receipt.size, 20_000);

        let stat = store.stat_object("b", "k").await.unwrap();
        assert_eq!(stat.etag, receipt.etag);
        assert_eq!(stat.meta("creator"), Some("pod-a"));

        let chunks: Vec<Bytes> = store.get_object("b", "k").await.unwrap().try_collect().await.unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.iter().map(|c| c.len()).sum::<usize>(), 20_000);
    }

    #[tokio::test]
    async fn test_missing_object_and_bucket() {
        let store = MemoryStore::new();
        assert!(store.stat_object("b", "k").await.unwrap_err().is_not_found());
        store.make_bucket("b").await.unwrap();
        assert!(store.stat_object("b", "k").await.unwrap_err().is_not_found());
        assert!(store.make_bucket("b").await.unwrap_err().is_bucket_exists());
        assert_eq!(store.bucket_create_count(), 1);
    }
}
