//! Common types for the client

use bytes::Bytes;
use futures::stream::BoxStream;
use std::collections::HashMap;

/// Streamed object body
pub type ByteStream = BoxStream<'static, crate::Result<Bytes>>;

/// Put object result
#[derive(Clone, Debug)]
pub struct PutObjectResult {
    /// ETag of the uploaded object
    pub etag: String,
    /// Number of bytes sent
    pub size: u64,
}

/// Head object result
#[derive(Clone, Debug)]
pub struct HeadObjectResult {
    /// ETag
    pub etag: String,
    /// Content length
    pub content_length: u64,
    /// User metadata, keys lowercased without the `x-amz-meta-` prefix
    pub metadata: HashMap<String, String>,
}

/// Get object result; the body is consumed as a stream
pub struct GetObjectResult {
    /// ETag
    pub etag: String,
    /// Content length, when the server reported one
    pub content_length: Option<u64>,
    /// User metadata
    pub metadata: HashMap<String, String>,
    /// Object body
    pub body: ByteStream,
}

impl std::fmt::Debug for GetObjectResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GetObjectResult")
            .field("etag", &self.etag)
            .field("content_length", &self.content_length)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}
