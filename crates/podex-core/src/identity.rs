//! Host resolution and local pod identity

use crate::{ExchangeError, Result};
use std::path::Path;
use std::sync::OnceLock;
use tracing::info;

/// Kernel-exposed hostname
pub const KERNEL_HOSTNAME_PATH: &str = "/proc/sys/kernel/hostname";

static KERNEL_HOSTNAME: OnceLock<String> = OnceLock::new();

/// The kernel hostname, read once per process. Empty when unavailable.
pub fn kernel_hostname() -> &'static str {
    KERNEL_HOSTNAME.get_or_init(|| read_hostname(Path::new(KERNEL_HOSTNAME_PATH)))
}

fn read_hostname(path: &Path) -> String {
    std::fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Where the advertised host came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostSource {
    /// Explicitly configured
    Override,
    /// Pod address injected through the environment
    Environment,
    /// Kernel hostname
    Kernel,
}

/// Resolves the host an exchange server advertises.
///
/// Precedence: explicit override, then the pod-address environment variable,
/// then the kernel hostname. Blank values at any level fall through.
#[derive(Clone, Debug)]
pub struct HostResolver {
    host_override: Option<String>,
    env_var: String,
    kernel_hostname: String,
}

impl HostResolver {
    /// Resolver over the real kernel hostname
    pub fn new(host_override: Option<String>, env_var: impl Into<String>) -> Self {
        Self {
            host_override,
            env_var: env_var.into(),
            kernel_hostname: kernel_hostname().to_string(),
        }
    }

    /// Replace the kernel hostname, for tests and non-Linux hosts
    pub fn with_kernel_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.kernel_hostname = hostname.into();
        self
    }

    /// Resolve against the process environment
    pub fn resolve(&self) -> Result<(String, HostSource)> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Resolve with an injected environment lookup
    pub fn resolve_with<F>(&self, lookup: F) -> Result<(String, HostSource)>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = non_blank(self.host_override.as_deref()) {
            info!(host = %host, "Exchange will use configured hostname");
            return Ok((host, HostSource::Override));
        }

        if let Some(host) = non_blank(lookup(&self.env_var).as_deref()) {
            info!(host = %host, env = %self.env_var, "Exchange will use hostname from the environment");
            return Ok((host, HostSource::Environment));
        }

        if let Some(host) = non_blank(Some(&self.kernel_hostname)) {
            info!(host = %host, "Exchange will use kernel provided hostname");
            return Ok((host, HostSource::Kernel));
        }

        Err(ExchangeError::HostUnresolved)
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Identity recorded as the `creator` of every object this pod uploads
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalIdentity(String);

impl LocalIdentity {
    /// Use an explicit identity string
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    /// The kernel hostname of this pod
    pub fn from_kernel() -> Self {
        Self(kernel_hostname().to_string())
    }

    /// Identity as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LocalIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
