//! Error types for the podex-core crate

use crate::store::StoreError;
use thiserror::Error;

/// Result type alias using `ExchangeError`
pub type Result<T> = std::result::Result<T, ExchangeError>;

/// Errors that can occur while running or using the exchange
#[derive(Error, Debug)]
pub enum ExchangeError {
    /// The randomness source could not supply key material
    #[error("entropy source failed: {0}")]
    Entropy(String),

    /// No host could be resolved for the exchange server
    #[error("exchange host is undefined")]
    HostUnresolved,

    /// The storage-server executable is not on the search path
    #[error("failed to find {name} on the search path")]
    ExecutableNotFound { name: String },

    /// The storage-server process could not be spawned
    #[error("failed to start {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Bucket could not be verified or created
    #[error("unable to validate {bucket} bucket exists: {source}")]
    Bucket {
        bucket: String,
        #[source]
        source: StoreError,
    },

    /// The remote object belongs to another creator and overwrite was not requested
    #[error("{creator} has already created {bucket}/{key}")]
    OwnershipConflict {
        bucket: String,
        key: String,
        creator: String,
    },

    /// Upload failed
    #[error("failed to upload to {bucket}/{key}: {source}")]
    Upload {
        bucket: String,
        key: String,
        #[source]
        source: StoreError,
    },

    /// Storage backend error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Fetched content does not match the declared checksum
    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExchangeError {
    /// Check if this is an ownership conflict the caller may retry with overwrite
    pub fn is_ownership_conflict(&self) -> bool {
        matches!(self, Self::OwnershipConflict { .. })
    }
}
