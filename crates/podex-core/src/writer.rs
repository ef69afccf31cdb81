//! Idempotent, ownership-aware object writes
//!
//! A write stats the remote object first. If its `stamp` matches the source
//! file's mtime nothing is sent. If another pod created it and overwrite was
//! not requested, the write is refused. Otherwise the whole file is uploaded
//! with fresh `creator` and `stamp` metadata.
//!
//! The stat and the upload are separate calls, so two first-time writers of
//! the same key can both succeed; the later upload wins. Callers that need
//! stronger ordering must serialize per key themselves.

use crate::bucket::BucketManager;
use crate::identity::LocalIdentity;
use crate::store::{ObjectStore, PutReceipt};
use crate::{ExchangeError, Result, META_CREATOR, META_STAMP};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, instrument};

/// What a put did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PutOutcome {
    /// Bytes were transferred
    Uploaded(PutReceipt),
    /// Remote object already carries this content stamp; nothing was sent
    Unchanged { stamp: String },
}

impl PutOutcome {
    /// Whether any bytes were transferred
    pub fn transferred(&self) -> bool {
        matches!(self, Self::Uploaded(_))
    }
}

/// Decimal nanoseconds since the Unix epoch, negative for earlier times
pub fn content_stamp(modified: SystemTime) -> String {
    match modified.duration_since(UNIX_EPOCH) {
        Ok(since) => since.as_nanos().to_string(),
        Err(before) => format!("-{}", before.duration().as_nanos()),
    }
}

/// Uploads files into the exchange on behalf of one pod
#[derive(Clone)]
pub struct ObjectWriter {
    store: Arc<dyn ObjectStore>,
    buckets: BucketManager,
    identity: LocalIdentity,
}

impl ObjectWriter {
    /// Create a writer recording `identity` as the creator of its uploads
    pub fn new(store: Arc<dyn ObjectStore>, identity: LocalIdentity) -> Self {
        Self {
            buckets: BucketManager::new(Arc::clone(&store)),
            store,
            identity,
        }
    }

    /// Identity written into `creator` metadata
    pub fn identity(&self) -> &LocalIdentity {
        &self.identity
    }

    /// Upload `path` to `bucket/key`.
    ///
    /// Any failure to stat the remote object, including backend errors, is
    /// treated as "no existing object" and the upload proceeds.
    #[instrument(skip(self, path), fields(from = %path.display()))]
    pub async fn put(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        overwrite: bool,
    ) -> Result<PutOutcome> {
        self.buckets.ensure_exists(bucket).await?;

        let source = tokio::fs::metadata(path).await?;
        let stamp = content_stamp(source.modified()?);
        info!(size = source.len(), stamp = %stamp, "starting upload");

        match self.store.stat_object(bucket, key).await {
            Ok(existing) => {
                if existing.meta(META_STAMP) == Some(stamp.as_str()) {
                    info!("already uploaded, stamp matches, skipping");
                    return Ok(PutOutcome::Unchanged { stamp });
                }

                let creator = existing.meta(META_CREATOR).unwrap_or_default();
                if creator != self.identity.as_str() && !overwrite {
                    error!(creator, "already uploaded by another host, skipping");
                    return Err(ExchangeError::OwnershipConflict {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                        creator: creator.to_string(),
                    });
                }
            }
            Err(e) => debug!(error = %e, "no usable remote object, uploading"),
        }

        let mut metadata = HashMap::new();
        metadata.insert(META_CREATOR.to_string(), self.identity.as_str().to_string());
        metadata.insert(META_STAMP.to_string(), stamp);

        let receipt = self
            .store
            .put_file(bucket, key, path, &metadata)
            .await
            .map_err(|source| ExchangeError::Upload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                source,
            })?;

        info!(etag = %receipt.etag, remote_size = receipt.size, "uploaded");
        Ok(PutOutcome::Uploaded(receipt))
    }
}
