//! # Podex Core
//!
//! Artifact exchange between ephemeral build pods that share no volume.
//!
//! One pod starts a short-lived S3-compatible server over its local disk;
//! other pods stage and fetch artifacts through it. Writes are idempotent and
//! ownership-aware using only object metadata: a `stamp` (source mtime in
//! nanoseconds) and a `creator` (the uploading pod's identity).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │   ObjectWriter   │   ObjectReader       │
//! ├──────────────────┴──────────────────────┤
//! │             BucketManager               │
//! ├─────────────────────────────────────────┤
//! │           ObjectStore Trait             │
//! ├────────────────────┬────────────────────┤
//! │      S3Store       │    MemoryStore     │
//! ├────────────────────┴────────────────────┤
//! │  ExchangeServer (spawned storage proc)  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use podex_core::{ExchangeConfig, ExchangeServer, LocalIdentity, ObjectWriter};
//! use std::sync::Arc;
//!
//! let mut server = ExchangeServer::new(ExchangeConfig::default())?;
//! let _handle = server.start().await?;
//! let store = Arc::new(server.client()?);
//! let writer = ObjectWriter::new(store, LocalIdentity::from_kernel());
//! writer.put("builds", "fcos.qcow2", "/srv/builds/fcos.qcow2".as_ref(), false).await?;
//! ```

pub mod artifact;
pub mod bucket;
pub mod config;
pub mod credentials;
pub mod error;
pub mod identity;
pub mod reader;
pub mod server;
pub mod store;
pub mod writer;

pub use artifact::Artifact;
pub use bucket::BucketManager;
pub use config::ExchangeConfig;
pub use credentials::Credentials;
pub use error::{ExchangeError, Result};
pub use identity::{HostResolver, HostSource, LocalIdentity};
pub use reader::ObjectReader;
pub use server::{ExchangeServer, Launcher, LaunchSpec, ProcessLauncher, ServerHandle, ServerIdentity};
pub use store::{MemoryStore, ObjectStat, ObjectStore, ObjectStream, PutReceipt, S3Store, StoreError};
pub use writer::{ObjectWriter, PutOutcome};

/// Logical region label attached to every bucket the exchange creates
pub const EXCHANGE_REGION: &str = "podex-local-1";

/// Metadata key holding the uploader's identity
pub const META_CREATOR: &str = "creator";

/// Metadata key holding the source file's modification time in nanoseconds
pub const META_STAMP: &str = "stamp";
