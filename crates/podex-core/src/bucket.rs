//! Bucket management

use crate::store::ObjectStore;
use crate::{ExchangeError, Result};
use std::sync::Arc;
use tracing::{debug, info};

/// Ensures buckets exist before objects are written into them
#[derive(Clone)]
pub struct BucketManager {
    store: Arc<dyn ObjectStore>,
}

impl BucketManager {
    /// Create a manager over a store
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Create `bucket` in the exchange region unless it already exists.
    ///
    /// Losing a creation race to another pod counts as success.
    pub async fn ensure_exists(&self, bucket: &str) -> Result<()> {
        let exists = self
            .store
            .bucket_exists(bucket)
            .await
            .map_err(|source| ExchangeError::Bucket {
                bucket: bucket.to_string(),
                source,
            })?;
        if exists {
            debug!(bucket, "bucket already present");
            return Ok(());
        }

        match self.store.make_bucket(bucket).await {
            Ok(()) => {
                info!(bucket, region = crate::EXCHANGE_REGION, "created bucket");
                Ok(())
            }
            Err(e) if e.is_bucket_exists() => Ok(()),
            Err(source) => Err(ExchangeError::Bucket {
                bucket: bucket.to_string(),
                source,
            }),
        }
    }
}
