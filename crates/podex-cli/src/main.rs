//! Podex - artifact exchange between build pods

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use podex_core::{
    Credentials, ExchangeConfig, ExchangeServer, LocalIdentity, ObjectReader, ObjectWriter,
    ProcessLauncher, PutOutcome, S3Store,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "podex")]
#[command(about = "Stage and fetch build artifacts through an ephemeral exchange")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true, env = "PODEX_DEBUG")]
    debug: bool,

    /// Emit logs as JSON
    #[arg(long, global = true, env = "PODEX_JSON_LOGS")]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start an exchange server over a local directory
    Serve {
        /// Directory served by the exchange
        #[arg(long, env = "PODEX_DATA_DIR", default_value = "/srv/podex")]
        data_dir: PathBuf,

        /// Port the exchange listens on
        #[arg(short, long, env = "PODEX_PORT", default_value = "9000")]
        port: u16,

        /// Host to advertise instead of the pod address or kernel hostname
        #[arg(short = 'H', long, env = "PODEX_ADVERTISE_HOST")]
        host: Option<String>,

        /// Storage server executable
        #[arg(long, env = "PODEX_EXECUTABLE", default_value = "minio")]
        executable: String,

        /// Append the storage server's output here instead of stderr
        #[arg(long, env = "PODEX_SERVER_LOG")]
        server_log: Option<PathBuf>,
    },

    /// Upload a file to a remote exchange
    Put {
        #[command(flatten)]
        remote: Remote,

        /// Replace objects created by other pods
        #[arg(long)]
        overwrite: bool,

        /// Identity recorded as the object's creator (default: kernel hostname)
        #[arg(long, env = "PODEX_CREATOR")]
        creator: Option<String>,

        bucket: String,
        key: String,
        path: PathBuf,
    },

    /// Download an object from a remote exchange
    Get {
        #[command(flatten)]
        remote: Remote,

        bucket: String,
        key: String,
        dest: PathBuf,
    },
}

/// Connection details printed by `podex serve`
#[derive(Args, Debug)]
struct Remote {
    /// Exchange host
    #[arg(short = 'H', long, env = "PODEX_HOST")]
    host: String,

    /// Exchange port
    #[arg(short, long, env = "PODEX_PORT", default_value = "9000")]
    port: u16,

    #[arg(long, env = "PODEX_ACCESS_KEY")]
    access_key: String,

    #[arg(long, env = "PODEX_SECRET_KEY", hide_env_values = true)]
    secret_key: String,

    /// Seconds allowed for establishing a connection
    #[arg(long, env = "PODEX_CONNECT_TIMEOUT", default_value = "30")]
    connect_timeout: u64,

    /// Seconds without progress before a transfer is abandoned, 0 to wait forever
    #[arg(long, env = "PODEX_IDLE_TIMEOUT", default_value = "300")]
    idle_timeout: u64,
}

impl Remote {
    fn store(&self) -> anyhow::Result<Arc<S3Store>> {
        let credentials = Credentials::new(&self.access_key, &self.secret_key);
        let idle = (self.idle_timeout > 0).then(|| Duration::from_secs(self.idle_timeout));
        let store = S3Store::connect_with_timeouts(
            &self.host,
            self.port,
            &credentials,
            Duration::from_secs(self.connect_timeout),
            idle,
        )
        .with_context(|| format!("invalid exchange address {}:{}", self.host, self.port))?;
        Ok(Arc::new(store))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the server identity
    let log_level = if cli.debug { "debug" } else { "info" };
    // `podex` prefixes every workspace crate target
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("podex={}", log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    match cli.command {
        Command::Serve {
            data_dir,
            port,
            host,
            executable,
            server_log,
        } => {
            let mut config = ExchangeConfig::new(data_dir)
                .with_port(port)
                .with_executable(executable);
            if let Some(host) = host {
                config = config.with_host(host);
            }
            let mut launcher = ProcessLauncher::default();
            if let Some(path) = server_log {
                launcher = launcher.with_log_file(path);
            }
            serve(config, launcher).await
        }
        Command::Put {
            remote,
            overwrite,
            creator,
            bucket,
            key,
            path,
        } => {
            let identity = match creator {
                Some(creator) => LocalIdentity::new(creator),
                None => LocalIdentity::from_kernel(),
            };
            anyhow::ensure!(
                !identity.as_str().is_empty(),
                "no creator identity: pass --creator or run where the kernel hostname is readable"
            );

            let writer = ObjectWriter::new(remote.store()?, identity);
            match writer.put(&bucket, &key, &path, overwrite).await? {
                PutOutcome::Uploaded(receipt) => {
                    tracing::info!(etag = %receipt.etag, size = receipt.size, "{}/{} uploaded", bucket, key)
                }
                PutOutcome::Unchanged { stamp } => {
                    tracing::info!(stamp = %stamp, "{}/{} already current", bucket, key)
                }
            }
            Ok(())
        }
        Command::Get {
            remote,
            bucket,
            key,
            dest,
        } => {
            let reader = ObjectReader::new(remote.store()?);
            let read = reader.fetch_to_path(&bucket, &key, &dest).await?;
            tracing::info!(size = read, dest = %dest.display(), "{}/{} fetched", bucket, key);
            Ok(())
        }
    }
}

async fn serve(config: ExchangeConfig, launcher: ProcessLauncher) -> anyhow::Result<()> {
    let mut server = ExchangeServer::with_launcher(config, launcher)?;
    let mut handle = server.start().await?;

    let identity = server
        .identity()
        .context("exchange started without a resolved host")?;
    println!("{}", serde_json::to_string(&identity)?);

    let pid = handle.id();
    tokio::select! {
        status = handle.wait() => {
            match status? {
                Some(status) if !status.success() => {
                    anyhow::bail!("exchange server exited with {}", status)
                }
                _ => tracing::info!("exchange server exited"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            // The storage process is left running for the pod to reap
            tracing::info!(pid = ?pid, "interrupted, leaving exchange server running");
        }
    }

    Ok(())
}
