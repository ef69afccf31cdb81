//! Exchange server bootstrap
//!
//! Resolves the host this pod advertises, finds the storage-server binary on
//! the search path and spawns it over the local data directory with freshly
//! issued credentials. `start` returns as soon as the process is spawned;
//! clients must tolerate a short window before the server accepts requests.

use crate::config::ExchangeConfig;
use crate::credentials::Credentials;
use crate::identity::HostResolver;
use crate::store::S3Store;
use crate::{ExchangeError, Result};
use serde::Serialize;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};
use tracing::{error, info};

/// Everything a remote pod needs to reach a running exchange.
///
/// Serialises as `{"accesskey", "secretkey", "host", "port"}`; the served
/// directory stays local to the owning pod.
#[derive(Clone, Debug, Serialize)]
pub struct ServerIdentity {
    #[serde(flatten)]
    pub credentials: Credentials,
    pub host: String,
    pub port: u16,
    #[serde(skip)]
    pub data_dir: PathBuf,
}

/// A fully prepared storage-server invocation
#[derive(Clone)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub envs: Vec<(String, String)>,
}

impl std::fmt::Debug for LaunchSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let env_names: Vec<&str> = self.envs.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("LaunchSpec")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("envs", &env_names)
            .finish()
    }
}

/// Starts the storage-server process
pub trait Launcher: Send + Sync {
    /// Spawn the process described by `spec` without waiting for it
    fn launch(&self, spec: &LaunchSpec) -> std::io::Result<ServerHandle>;
}

/// Launcher spawning a real child process.
///
/// The child never writes to our stdout, which carries the server identity.
/// Its output goes to our stderr, or to a log file when one is set.
#[derive(Clone, Debug, Default)]
pub struct ProcessLauncher {
    log_file: Option<PathBuf>,
}

impl ProcessLauncher {
    /// Append the server's stdout and stderr to `path`
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&self, spec: &LaunchSpec) -> std::io::Result<ServerHandle> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(spec.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null());
        match &self.log_file {
            Some(path) => {
                let log = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                cmd.stdout(log.try_clone()?).stderr(log);
            }
            None => {
                cmd.stdout(Stdio::from(std::io::stderr()));
            }
        }
        // No kill_on_drop: the server outlives the handle
        let child = cmd.spawn()?;
        Ok(ServerHandle::from_child(child))
    }
}

/// Handle to a spawned storage server
#[derive(Debug)]
pub struct ServerHandle {
    child: Option<Child>,
    pid: Option<u32>,
}

impl ServerHandle {
    /// Wrap a spawned child
    pub fn from_child(child: Child) -> Self {
        let pid = child.id();
        Self {
            child: Some(child),
            pid,
        }
    }

    /// A handle that does not own the process
    pub fn detached(pid: Option<u32>) -> Self {
        Self { child: None, pid }
    }

    /// OS process id, if known
    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    /// Wait for the server to exit; `None` for detached handles
    pub async fn wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        match self.child.as_mut() {
            Some(child) => child.wait().await.map(Some),
            None => Ok(None),
        }
    }
}

/// Look up an executable by name on a `PATH`-style search path.
///
/// Names containing a path separator are checked directly.
pub fn find_executable(name: &str, search_path: Option<&OsStr>) -> Option<PathBuf> {
    if name.contains(std::path::MAIN_SEPARATOR) {
        let candidate = PathBuf::from(name);
        return is_executable(&candidate).then_some(candidate);
    }

    std::env::split_paths(search_path?)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// An ephemeral exchange server owned by this pod
pub struct ExchangeServer<L: Launcher = ProcessLauncher> {
    config: ExchangeConfig,
    credentials: Credentials,
    resolver: HostResolver,
    search_path: Option<OsString>,
    host: Option<String>,
    launcher: L,
}

impl ExchangeServer<ProcessLauncher> {
    /// Define a server with random credentials; nothing is started yet
    pub fn new(config: ExchangeConfig) -> Result<Self> {
        Self::with_launcher(config, ProcessLauncher::default())
    }
}

impl<L: Launcher> ExchangeServer<L> {
    /// Define a server that starts through a custom launcher
    pub fn with_launcher(config: ExchangeConfig, launcher: L) -> Result<Self> {
        let credentials = Credentials::generate()?;
        let resolver = HostResolver::new(config.host.clone(), config.pod_ip_env.clone());
        Ok(Self {
            config,
            credentials,
            resolver,
            search_path: None,
            host: None,
            launcher,
        })
    }

    /// Replace the host resolver
    pub fn with_resolver(mut self, resolver: HostResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Search this path instead of `$PATH` for the executable
    pub fn with_search_path(mut self, search_path: impl Into<OsString>) -> Self {
        self.search_path = Some(search_path.into());
        self
    }

    /// Issued credentials
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Configuration
    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    /// Resolved host, if resolution already happened
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Resolve the advertised host; later calls reuse the first result
    pub fn resolve_host(&mut self) -> Result<&str> {
        if self.host.is_none() {
            let (host, _) = self.resolver.resolve()?;
            self.host = Some(host);
        }
        self.host.as_deref().ok_or(ExchangeError::HostUnresolved)
    }

    /// Connection details for remote pods, once the host is resolved
    pub fn identity(&self) -> Option<ServerIdentity> {
        self.host.as_ref().map(|host| ServerIdentity {
            host: host.clone(),
            port: self.config.port,
            credentials: self.credentials.clone(),
            data_dir: self.config.data_dir.clone(),
        })
    }

    /// Spawn the storage server. Must run inside a Tokio runtime.
    pub async fn start(&mut self) -> Result<ServerHandle> {
        let host = self.resolve_host()?.to_string();
        let port = self.config.port;
        let data_dir = self.config.data_dir.display().to_string();

        info!(
            hostname = %host,
            port,
            access_key = %self.credentials.access_key,
            serv_dir = %data_dir,
            "Starting exchange server"
        );

        let search_path = self
            .search_path
            .clone()
            .or_else(|| std::env::var_os("PATH"));
        let program = find_executable(&self.config.executable, search_path.as_deref())
            .ok_or_else(|| {
                error!(executable = %self.config.executable, "storage server binary not found");
                ExchangeError::ExecutableNotFound {
                    name: self.config.executable.clone(),
                }
            })?;

        let spec = LaunchSpec {
            program,
            args: vec![
                OsString::from("server"),
                self.config.data_dir.clone().into_os_string(),
                OsString::from("--address"),
                OsString::from(format!(":{}", port)),
            ],
            envs: vec![
                (
                    self.config.access_key_env.clone(),
                    self.credentials.access_key.clone(),
                ),
                (
                    self.config.secret_key_env.clone(),
                    self.credentials.secret_key.clone(),
                ),
            ],
        };

        let handle = self.launcher.launch(&spec).map_err(|source| {
            error!(program = %spec.program.display(), error = %source, "failed to start storage server");
            ExchangeError::Launch {
                program: spec.program.display().to_string(),
                source,
            }
        })?;

        info!(pid = ?handle.id(), program = %spec.program.display(), "exchange server spawned");
        Ok(handle)
    }

    /// Client bound to this server. No request is made.
    pub fn client(&self) -> Result<S3Store> {
        let host = self.host.as_deref().ok_or(ExchangeError::HostUnresolved)?;
        S3Store::connect(host, self.config.port, &self.credentials)
    }
}
