//! Exchange server configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable carrying the pod's routable address
pub const DEFAULT_POD_IP_ENV: &str = "PODEX_POD_IP";

/// Exchange server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Explicit host to advertise; wins over every other source
    pub host: Option<String>,
    /// Port the storage server listens on
    pub port: u16,
    /// Local directory served by the storage server
    pub data_dir: PathBuf,
    /// Storage-server executable name or path
    pub executable: String,
    /// Environment variable the server reads its access key from
    pub access_key_env: String,
    /// Environment variable the server reads its secret key from
    pub secret_key_env: String,
    /// Environment variable holding the pod address override
    pub pod_ip_env: String,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: 9000,
            data_dir: PathBuf::from("/srv/podex"),
            executable: "minio".to_string(),
            access_key_env: "MINIO_ACCESS_KEY".to_string(),
            secret_key_env: "MINIO_SECRET_KEY".to_string(),
            pod_ip_env: DEFAULT_POD_IP_ENV.to_string(),
        }
    }
}

impl ExchangeConfig {
    /// Create a config serving the given directory
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Set an explicit host override
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the listen port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the storage-server executable
    pub fn with_executable(mut self, executable: impl Into<String>) -> Self {
        self.executable = executable.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ExchangeConfig =
            serde_json::from_str(r#"{"port": 9100, "data_dir": "/tmp/x"}"#).unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/x"));
        assert_eq!(config.executable, "minio");
        assert_eq!(config.pod_ip_env, DEFAULT_POD_IP_ENV);
        assert!(config.host.is_none());
    }
}
