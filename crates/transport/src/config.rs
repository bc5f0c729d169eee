//! Transport configuration and endpoint resolution.
//!
//! The endpoint is resolved through a priority chain:
//!
//! 1. An explicit endpoint (CLI `--host`)
//! 2. The `DOCKER_HOST` environment variable
//! 3. The platform default socket, [`DEFAULT_SOCKET_PATH`]
//!
//! `DOCKER_API_VERSION` overrides the API version prefix, which otherwise
//! defaults to [`DEFAULT_API_VERSION`].

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Socket the engine listens on by default.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/docker.sock";

/// API version every request path is prefixed with unless overridden.
pub const DEFAULT_API_VERSION: &str = "v1.24";

/// Errors raised while building a transport. These are startup failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The endpoint string is not in a recognised form.
    #[error("invalid engine endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        /// The rejected endpoint text.
        endpoint: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The HTTP client for remote hosts could not be initialised.
    #[error("failed to initialise HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

// ---------------------------------------------------------------------------

/// Where the engine is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// A local Unix domain socket.
    Unix(PathBuf),
    /// A remote host, as an `http://` or `https://` base URI.
    Remote(String),
}

impl Endpoint {
    /// Parses the forms accepted by `DOCKER_HOST`.
    ///
    /// `unix:///path` and bare absolute paths select a socket; `tcp://host:port`
    /// is treated as `http://host:port`; `http(s)://` URIs are used as given.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidEndpoint {
            endpoint: text.to_owned(),
            reason: reason.to_owned(),
        };

        let text = text.trim();
        if let Some(path) = text.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(invalid("missing socket path"));
            }
            return Ok(Endpoint::Unix(PathBuf::from(path)));
        }
        if text.starts_with('/') {
            return Ok(Endpoint::Unix(PathBuf::from(text)));
        }
        if let Some(authority) = text.strip_prefix("tcp://") {
            if authority.is_empty() {
                return Err(invalid("missing host"));
            }
            return Ok(Endpoint::Remote(format!("http://{}", authority.trim_end_matches('/'))));
        }
        if text.starts_with("http://") || text.starts_with("https://") {
            return Ok(Endpoint::Remote(text.trim_end_matches('/').to_owned()));
        }
        if text.starts_with("npipe://") || text.starts_with("ssh://") {
            return Err(invalid("scheme is not supported"));
        }
        Err(invalid("expected unix://, tcp://, http:// or https://"))
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::Unix(PathBuf::from(DEFAULT_SOCKET_PATH))
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
            Endpoint::Remote(uri) => f.write_str(uri),
        }
    }
}

// ---------------------------------------------------------------------------

/// Settings for [`HttpTransport`](crate::HttpTransport).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub endpoint: Endpoint,
    /// Path prefix such as `v1.24`; `None` sends unversioned paths.
    pub api_version: Option<String>,
    /// Per-call limit on waiting for a response. `None` waits indefinitely.
    /// Requests with `blocking` set are never limited.
    pub timeout: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            api_version: Some(DEFAULT_API_VERSION.to_owned()),
            timeout: None,
        }
    }
}

impl TransportConfig {
    /// Resolves configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve(None, |key| std::env::var(key).ok())
    }

    /// Resolves configuration from an explicit endpoint and an environment lookup.
    ///
    /// Empty values are treated as unset.
    pub fn resolve<F>(explicit: Option<&str>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |v: String| if v.trim().is_empty() { None } else { Some(v) };

        let endpoint = match explicit
            .map(str::to_owned)
            .and_then(non_empty)
            .or_else(|| lookup("DOCKER_HOST").and_then(non_empty))
        {
            Some(text) => Endpoint::parse(&text)?,
            None => Endpoint::default(),
        };

        let api_version = lookup("DOCKER_API_VERSION")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_owned());

        Ok(Self {
            endpoint,
            api_version: Some(normalise_version(&api_version)),
            timeout: None,
        })
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Prefixes `path` with the API version, if one is configured.
    pub fn versioned_path(&self, path: &str) -> String {
        match &self.api_version {
            Some(version) => format!("/{version}{path}"),
            None => path.to_owned(),
        }
    }
}

/// Accepts `1.43` as well as `v1.43`.
fn normalise_version(version: &str) -> String {
    let version = version.trim().trim_start_matches('/');
    if version.starts_with('v') {
        version.to_owned()
    } else {
        format!("v{version}")
    }
}
