//! Client configuration

use std::time::Duration;

/// Region used when none is configured
pub const DEFAULT_REGION: &str = "us-east-1";

/// Client configuration
#[derive(Clone)]
pub struct Config {
    /// Endpoint URL, e.g. `http://10.0.0.7:9000`
    pub endpoint: String,
    /// Access key
    pub access_key: String,
    /// Secret key
    pub secret_key: String,
    /// Region used for signing and bucket creation
    pub region: String,
    /// Deadline for establishing a connection
    pub connect_timeout: Duration,
    /// Longest silence tolerated while waiting for a response or between
    /// body chunks of a download. `None` waits forever. Transfers that keep
    /// making progress are never cut off.
    pub idle_timeout: Option<Duration>,
    /// User agent string
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".to_string(),
            access_key: String::new(),
            secret_key: String::new(),
            region: DEFAULT_REGION.to_string(),
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(300)),
            user_agent: format!("podex-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("region", &self.region)
            .field("connect_timeout", &self.connect_timeout)
            .field("idle_timeout", &self.idle_timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl Config {
    /// Create a new config with the given endpoint
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Set the static credentials
    pub fn with_credentials(
        mut self,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.access_key = access_key.into();
        self.secret_key = secret_key.into();
        self
    }

    /// Set the region
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the idle timeout; `None` disables it
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Endpoint without a trailing slash
    pub fn base_url(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }
}
