//! # Podex Client
//!
//! The narrow slice of the S3 REST API the artifact exchange relies on.
//!
//! ## Features
//!
//! - **Bucket calls**: existence check and creation with a location constraint
//! - **Object calls**: stat (HEAD), streaming get, streaming put with user metadata
//! - **SigV4**: every request is signed with the server's static credentials
//!
//! ## Example
//!
//! ```rust,ignore
//! use podex_client::{Config, S3Client};
//!
//! #[tokio::main]
//! async fn main() -> podex_client::Result<()> {
//!     let client = S3Client::new(
//!         Config::new("http://10.0.0.7:9000").with_credentials("AK", "SK"),
//!     )?;
//!
//!     if !client.bucket_exists("builds").await? {
//!         client.create_bucket("builds").await?;
//!     }
//!     let head = client.head_object("builds", "fcos.qcow2").await?;
//!     println!("etag: {}", head.etag);
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod error;
pub mod signing;
mod types;

pub use client::S3Client;
pub use config::Config;
pub use error::{ClientError, Result};
pub use types::*;
