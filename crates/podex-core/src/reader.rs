//! Streaming object reads

use crate::store::ObjectStore;
use crate::{ExchangeError, Result};
use futures::TryStreamExt;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{info, instrument, warn};

/// Downloads objects from the exchange
#[derive(Clone)]
pub struct ObjectReader {
    store: Arc<dyn ObjectStore>,
}

impl ObjectReader {
    /// Create a reader over a store
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Copy `bucket/key` into `dest`, returning the number of bytes written.
    ///
    /// Nothing is resumed on failure; callers retry the whole fetch.
    #[instrument(skip(self, dest))]
    pub async fn fetch<W>(&self, bucket: &str, key: &str, dest: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let host = self.store.host();
        if host.is_empty() {
            return Err(ExchangeError::HostUnresolved);
        }
        info!("Requesting remote http://{}/{}/{}", host, bucket, key);

        let result = copy_object(self.store.as_ref(), bucket, key, dest).await;
        match &result {
            Ok(read) => info!(host, read, "processed"),
            Err(e) => warn!(host, error = %e, "processed"),
        }
        result
    }

    /// Fetch into a file at `path`.
    ///
    /// Data lands in a uniquely named `.partial` file beside `path` and is
    /// renamed into place only after the full object arrived. The partial
    /// file is removed on failure and when the future is dropped.
    pub async fn fetch_to_path(&self, bucket: &str, key: &str, path: &Path) -> Result<u64> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let prefix = format!(
            ".{}.",
            path.file_name().unwrap_or_default().to_string_lossy()
        );
        let (file, partial) = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".partial")
            .tempfile_in(dir)?
            .into_parts();

        let mut file = tokio::fs::File::from_std(file);
        let read = self.fetch(bucket, key, &mut file).await?;
        file.sync_all().await?;
        drop(file);

        partial.persist(path).map_err(|e| ExchangeError::Io(e.error))?;
        Ok(read)
    }
}

async fn copy_object<W>(store: &dyn ObjectStore, bucket: &str, key: &str, dest: &mut W) -> Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    // The stream is owned here and dropped on every return path
    let mut body = store.get_object(bucket, key).await?;
    let mut read = 0u64;
    while let Some(chunk) = body.try_next().await? {
        dest.write_all(&chunk).await?;
        read += chunk.len() as u64;
    }
    dest.flush().await?;
    Ok(read)
}
