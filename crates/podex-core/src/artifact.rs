//! Build artifacts as declared in build metadata
//!
//! Only the fields the exchange moves around are modelled: the artifact's
//! path relative to the build directory, its sha256 and its size.

use crate::reader::ObjectReader;
use crate::writer::{ObjectWriter, PutOutcome};
use crate::{ExchangeError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::info;

/// An artifact entry from build metadata
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Path relative to the build directory
    pub path: String,
    /// Hex sha256 of the content
    pub sha256: String,
    /// Size in bytes
    #[serde(rename = "size", default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl Artifact {
    /// Exchange key for this artifact: its file name under `prefix`
    pub fn object_key(&self, prefix: &str) -> Result<String> {
        let name = Path::new(&self.path)
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                ExchangeError::Config(format!("artifact path {:?} has no file name", self.path))
            })?;

        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            Ok(name.to_string())
        } else {
            Ok(format!("{}/{}", prefix, name))
        }
    }

    /// Check a local file against the declared checksum
    pub async fn verify(&self, path: &Path) -> Result<()> {
        let actual = sha256_file(path).await?;
        if actual.eq_ignore_ascii_case(&self.sha256) {
            Ok(())
        } else {
            Err(ExchangeError::ChecksumMismatch {
                path: path.display().to_string(),
                expected: self.sha256.clone(),
                actual,
            })
        }
    }

    /// Upload this artifact from `build_dir` to the exchange
    pub async fn stage(
        &self,
        writer: &ObjectWriter,
        bucket: &str,
        prefix: &str,
        build_dir: &Path,
        overwrite: bool,
    ) -> Result<PutOutcome> {
        let key = self.object_key(prefix)?;
        writer
            .put(bucket, &key, &build_dir.join(&self.path), overwrite)
            .await
    }

    /// Download this artifact into `dest_dir` and verify its checksum
    pub async fn retrieve(
        &self,
        reader: &ObjectReader,
        bucket: &str,
        prefix: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf> {
        let key = self.object_key(prefix)?;
        let dest = dest_dir.join(Path::new(&self.path).file_name().unwrap_or_default());

        reader.fetch_to_path(bucket, &key, &dest).await?;
        if let Err(e) = self.verify(&dest).await {
            let _ = tokio::fs::remove_file(&dest).await;
            return Err(e);
        }

        info!(key = %key, dest = %dest.display(), "artifact verified");
        Ok(dest)
    }
}

/// Hex sha256 of a file, read in chunks
pub async fn sha256_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
