//! Object store backed by a remote S3-compatible exchange server

use super::{ObjectStat, ObjectStore, ObjectStream, PutReceipt, StoreError, StoreResult};
use crate::{Credentials, ExchangeError, Result};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use podex_client::{Config, S3Client};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Store talking to an exchange server over the S3 API
pub struct S3Store {
    client: S3Client,
    host: String,
    port: u16,
}

impl S3Store {
    /// Bind a client to `host:port` with the server's credentials.
    ///
    /// Pure construction, no request is made. An empty host is rejected.
    pub fn connect(host: &str, port: u16, credentials: &Credentials) -> Result<Self> {
        let defaults = Config::default();
        Self::connect_with_timeouts(
            host,
            port,
            credentials,
            defaults.connect_timeout,
            defaults.idle_timeout,
        )
    }

    /// Like [`S3Store::connect`] with explicit connect and idle timeouts.
    ///
    /// Neither bounds a whole transfer: a download that keeps delivering
    /// bytes runs to completion however long it takes.
    pub fn connect_with_timeouts(
        host: &str,
        port: u16,
        credentials: &Credentials,
        connect_timeout: Duration,
        idle_timeout: Option<Duration>,
    ) -> Result<Self> {
        let host = host.trim();
        if host.is_empty() {
            return Err(ExchangeError::HostUnresolved);
        }

        let authority = if host.contains(':') && !host.starts_with('[') {
            format!("[{}]:{}", host, port)
        } else {
            format!("{}:{}", host, port)
        };

        let config = Config::new(format!("http://{}", authority))
            .with_credentials(&credentials.access_key, &credentials.secret_key)
            .with_region(crate::EXCHANGE_REGION)
            .with_connect_timeout(connect_timeout)
            .with_idle_timeout(idle_timeout);
        let client = S3Client::new(config).map_err(StoreError::from)?;

        Ok(Self {
            client,
            host: host.to_string(),
            port,
        })
    }

    /// Port of the remote server
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Endpoint URL of the remote server
    pub fn endpoint(&self) -> &str {
        self.client.config().base_url()
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn host(&self) -> &str {
        &self.host
    }

    async fn bucket_exists(&self, bucket: &str) -> StoreResult<bool> {
        Ok(self.client.bucket_exists(bucket).await?)
    }

    async fn make_bucket(&self, bucket: &str) -> StoreResult<()> {
        Ok(self.client.create_bucket(bucket).await?)
    }

    async fn stat_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectStat> {
        let head = self.client.head_object(bucket, key).await?;
        Ok(ObjectStat {
            etag: head.etag,
            size: head.content_length,
            metadata: head.metadata,
        })
    }

    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        metadata: &HashMap<String, String>,
    ) -> StoreResult<PutReceipt> {
        let result = self.client.put_file(bucket, key, path, metadata).await?;
        Ok(PutReceipt {
            etag: result.etag,
            size: result.size,
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectStream> {
        let result = self.client.get_object(bucket, key).await?;
        Ok(result.body.map_err(StoreError::from).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_rejects_empty_host() {
        let creds = Credentials::new("AK", "SK");
        let err = S3Store::connect("  ", 9000, &creds).err();
        assert!(matches!(err, Some(ExchangeError::HostUnresolved)));
    }

    #[test]
    fn test_connect_builds_endpoint() {
        let creds = Credentials::new("AK", "SK");
        let store = S3Store::connect("10.128.0.12", 9000, &creds).unwrap();
        assert_eq!(store.endpoint(), "http://10.128.0.12:9000");
        assert_eq!(store.host(), "10.128.0.12");

        let store = S3Store::connect("fd00::12", 9000, &creds).unwrap();
        assert_eq!(store.endpoint(), "http://[fd00::12]:9000");
    }
}
