//! Main client implementation

use crate::{
    signing::{self, Signer},
    types::*,
    ClientError, Config, Result,
};
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::{Stream, StreamExt, TryStreamExt};
use reqwest::{header, Client, Method, Response};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument};

/// Read size used when streaming a file into a request body
const UPLOAD_CHUNK_SIZE: usize = 256 * 1024;

const META_PREFIX: &str = "x-amz-meta-";

enum Payload {
    Empty,
    Bytes(Bytes),
    File { file: tokio::fs::File, len: u64 },
}

/// S3-compatible storage client
pub struct S3Client {
    config: Config,
    http: Client,
    host_header: String,
}

impl S3Client {
    /// Create a new client with the given configuration.
    ///
    /// No network call is made; only the endpoint is validated.
    pub fn new(config: Config) -> Result<Self> {
        let url = url::Url::parse(config.base_url())
            .map_err(|e| ClientError::Config(format!("invalid endpoint {}: {}", config.endpoint, e)))?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ClientError::Config(format!("endpoint {} has no host", config.endpoint)))?;
        let host_header = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let mut headers = header::HeaderMap::new();
        let user_agent = header::HeaderValue::from_str(&config.user_agent)
            .map_err(|e| ClientError::Config(format!("invalid user agent: {}", e)))?;
        headers.insert(header::USER_AGENT, user_agent);

        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .default_headers(headers)
            .build()
            .map_err(ClientError::Http)?;

        Ok(Self {
            config,
            http,
            host_header,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    // ==================== Bucket Operations ====================

    /// Check if a bucket exists
    #[instrument(skip(self))]
    pub async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        match self
            .request(Method::HEAD, bucket, None, BTreeMap::new(), Payload::Empty)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create a bucket in the configured region
    #[instrument(skip(self))]
    pub async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let payload = if self.config.region == crate::config::DEFAULT_REGION {
            Payload::Empty
        } else {
            Payload::Bytes(Bytes::from(format!(
                r#"<CreateBucketConfiguration xmlns="http://s3.amazonaws.com/doc/2006-03-01/"><LocationConstraint>{}</LocationConstraint></CreateBucketConfiguration>"#,
                self.config.region
            )))
        };
        self.request(Method::PUT, bucket, None, BTreeMap::new(), payload)
            .await?;
        Ok(())
    }

    // ==================== Object Operations ====================

    /// Head an object (get metadata without content)
    #[instrument(skip(self))]
    pub async fn head_object(&self, bucket: &str, key: &str) -> Result<HeadObjectResult> {
        let response = self
            .request(Method::HEAD, bucket, Some(key), BTreeMap::new(), Payload::Empty)
            .await?;

        let headers = response.headers();
        Ok(HeadObjectResult {
            etag: etag_of(headers),
            content_length: content_length_of(headers).unwrap_or(0),
            metadata: user_metadata_of(headers),
        })
    }

    /// Get an object as a byte stream
    #[instrument(skip(self))]
    pub async fn get_object(&self, bucket: &str, key: &str) -> Result<GetObjectResult> {
        let response = self
            .request(Method::GET, bucket, Some(key), BTreeMap::new(), Payload::Empty)
            .await?;

        let headers = response.headers();
        let etag = etag_of(headers);
        let content_length = content_length_of(headers);
        let metadata = user_metadata_of(headers);

        let body = with_idle_timeout(
            response.bytes_stream().map_err(ClientError::from),
            self.config.idle_timeout,
        );

        Ok(GetObjectResult {
            etag,
            content_length,
            metadata,
            body,
        })
    }

    /// Upload a local file, streaming its contents, with user metadata
    #[instrument(skip(self, metadata))]
    pub async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        metadata: &HashMap<String, String>,
    ) -> Result<PutObjectResult> {
        let file = tokio::fs::File::open(path).await?;
        let len = file.metadata().await?.len();

        let mut headers = BTreeMap::new();
        headers.insert(
            header::CONTENT_TYPE.as_str().to_string(),
            "application/octet-stream".to_string(),
        );
        for (k, v) in metadata {
            headers.insert(format!("{}{}", META_PREFIX, k.to_ascii_lowercase()), v.clone());
        }

        let response = self
            .request(Method::PUT, bucket, Some(key), headers, Payload::File { file, len })
            .await?;

        Ok(PutObjectResult {
            etag: etag_of(response.headers()),
            size: len,
        })
    }

    // ==================== Helper Methods ====================

    async fn request(
        &self,
        method: Method,
        bucket: &str,
        key: Option<&str>,
        mut headers: BTreeMap<String, String>,
        payload: Payload,
    ) -> Result<Response> {
        let path = signing::encode_path(bucket, key);
        let url = format!("{}{}", self.config.base_url(), path);
        let now = Utc::now();

        let payload_hash = match &payload {
            Payload::Empty => signing::EMPTY_PAYLOAD_SHA256.to_string(),
            Payload::Bytes(data) => signing::payload_sha256(data),
            Payload::File { .. } => signing::UNSIGNED_PAYLOAD.to_string(),
        };

        headers.insert("host".to_string(), self.host_header.clone());
        headers.insert("x-amz-date".to_string(), signing::amz_date(now));
        headers.insert("x-amz-content-sha256".to_string(), payload_hash.clone());

        let signer = Signer::new(
            &self.config.access_key,
            &self.config.secret_key,
            &self.config.region,
        );
        let authorization =
            signer.authorization(method.as_str(), &path, &headers, &payload_hash, now);

        let mut req = self.http.request(method.clone(), &url);
        for (k, v) in &headers {
            // reqwest derives Host from the URL
            if k != "host" {
                req = req.header(k.as_str(), v.as_str());
            }
        }
        req = req.header(header::AUTHORIZATION, authorization);

        // An upload only hears back once the whole body is sent
        let await_response = match &payload {
            Payload::File { .. } => None,
            _ => self.config.idle_timeout,
        };

        req = match payload {
            Payload::Empty => req,
            Payload::Bytes(data) => req.body(data),
            Payload::File { file, len } => req
                .header(header::CONTENT_LENGTH, len)
                .body(reqwest::Body::wrap_stream(file_stream(file))),
        };

        debug!("Sending {} request to {}", method, url);
        let response = match await_response {
            Some(idle) => tokio::time::timeout(idle, req.send())
                .await
                .map_err(|_| ClientError::Timeout(idle))??,
            None => req.send().await?,
        };

        let status = response.status();
        if !status.is_success() {
            let header_code = response
                .headers()
                .get("x-amz-error-code")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let text = response.text().await.unwrap_or_default();
            let err = ClientError::from_s3_xml(&text, status.as_u16(), header_code.as_deref());
            return Err(match err {
                ClientError::S3Error { ref code, .. }
                    if status.as_u16() == 404 && code.starts_with("HTTP") =>
                {
                    match key {
                        Some(key) => ClientError::NotFound {
                            bucket: bucket.to_string(),
                            key: key.to_string(),
                        },
                        None => ClientError::BucketNotFound(bucket.to_string()),
                    }
                }
                other => other,
            });
        }

        Ok(response)
    }
}

fn file_stream(file: tokio::fs::File) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static {
    futures::stream::try_unfold(file, |mut file| async move {
        let mut buf = BytesMut::with_capacity(UPLOAD_CHUNK_SIZE);
        let n = file.read_buf(&mut buf).await?;
        if n == 0 {
            Ok(None)
        } else {
            Ok(Some((buf.freeze(), file)))
        }
    })
}

/// Fail a body stream that stays silent for longer than `idle`
fn with_idle_timeout<S>(body: S, idle: Option<Duration>) -> ByteStream
where
    S: Stream<Item = Result<Bytes>> + Send + 'static,
{
    let Some(idle) = idle else {
        return body.boxed();
    };

    futures::stream::unfold(Some(body.boxed()), move |state| async move {
        let mut body = state?;
        match tokio::time::timeout(idle, body.next()).await {
            Ok(Some(chunk)) => Some((chunk, Some(body))),
            Ok(None) => None,
            Err(_) => Some((Err(ClientError::Timeout(idle)), None)),
        }
    })
    .boxed()
}

fn etag_of(headers: &header::HeaderMap) -> String {
    headers
        .get(header::ETAG)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim_matches('"').to_string())
        .unwrap_or_default()
}

fn content_length_of(headers: &header::HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
}

fn user_metadata_of(headers: &header::HeaderMap) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    for (name, value) in headers.iter() {
        // HeaderName is always lowercase
        if let Some(key) = name.as_str().strip_prefix(META_PREFIX) {
            if let Ok(v) = value.to_str() {
                metadata.insert(key.to_string(), v.to_string());
            }
        }
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_endpoint_without_host() {
        let err = S3Client::new(Config::new("http://:9000")).err();
        assert!(matches!(err, Some(ClientError::Config(_))));
    }

    #[test]
    fn test_host_header_keeps_port() {
        let client = S3Client::new(Config::new("http://10.1.2.3:9000/")).unwrap();
        assert_eq!(client.host_header, "10.1.2.3:9000");
        assert_eq!(client.config().base_url(), "http://10.1.2.3:9000");
    }

    #[test]
    fn test_user_metadata_extraction() {
        let mut headers = header::HeaderMap::new();
        headers.insert("x-amz-meta-creator", "pod-a".parse().unwrap());
        headers.insert("x-amz-meta-stamp", "1700000000000000000".parse().unwrap());
        headers.insert("etag", "\"d41d8cd98f00b204e9800998ecf8427e\"".parse().unwrap());

        let meta = user_metadata_of(&headers);
        assert_eq!(meta.get("creator").map(String::as_str), Some("pod-a"));
        assert_eq!(meta.len(), 2);
        assert_eq!(etag_of(&headers), "d41d8cd98f00b204e9800998ecf8427e");
    }
}
