//! Storage backends the exchange protocol runs over
//!
//! The writer and reader only need five object-store calls. Production uses
//! [`S3Store`] against the spawned storage server; tests use [`MemoryStore`].

pub mod memory;
pub mod s3;

pub use memory::MemoryStore;
pub use s3::S3Store;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use podex_client::ClientError;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Result type alias using `StoreError`
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Streamed object body
pub type ObjectStream = BoxStream<'static, StoreResult<Bytes>>;

/// Errors raised by storage backends
#[derive(Error, Debug)]
pub enum StoreError {
    /// Object not found
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Bucket not found
    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    /// Bucket already exists
    #[error("bucket already exists: {0}")]
    BucketExists(String),

    /// Wire client error
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other backend failure
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } | Self::BucketNotFound(_) => true,
            Self::Client(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// Check if this reports a bucket that already exists
    pub fn is_bucket_exists(&self) -> bool {
        match self {
            Self::BucketExists(_) => true,
            Self::Client(e) => e.is_bucket_exists(),
            _ => false,
        }
    }
}

/// Object metadata returned by a stat call
#[derive(Clone, Debug, Default)]
pub struct ObjectStat {
    /// Content identifier
    pub etag: String,
    /// Size in bytes
    pub size: u64,
    /// User metadata
    pub metadata: HashMap<String, String>,
}

impl ObjectStat {
    /// Look up a user metadata entry, ignoring key case
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// Result of a successful upload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PutReceipt {
    /// Content identifier of the stored object
    pub etag: String,
    /// Bytes transferred
    pub size: u64,
}

/// Trait for object storage backends
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Host the backend talks to; empty when unresolved
    fn host(&self) -> &str;

    /// Check if a bucket exists
    async fn bucket_exists(&self, bucket: &str) -> StoreResult<bool>;

    /// Create a bucket in the exchange region
    async fn make_bucket(&self, bucket: &str) -> StoreResult<()>;

    /// Read an object's metadata without its content
    async fn stat_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectStat>;

    /// Upload a local file, replacing any existing object
    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        metadata: &HashMap<String, String>,
    ) -> StoreResult<PutReceipt>;

    /// Open a streaming read of an object
    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_lookup_ignores_case() {
        let mut stat = ObjectStat::default();
        stat.metadata.insert("Creator".to_string(), "pod-a".to_string());
        assert_eq!(stat.meta("creator"), Some("pod-a"));
        assert_eq!(stat.meta("stamp"), None);
    }

    #[test]
    fn test_client_errors_classify() {
        let err = StoreError::from(ClientError::BucketNotFound("b".to_string()));
        assert!(err.is_not_found());
        let err = StoreError::from(ClientError::from_s3_xml("", 409, Some("BucketAlreadyExists")));
        assert!(err.is_bucket_exists());
        assert!(!StoreError::Backend("boom".to_string()).is_not_found());
    }
}
