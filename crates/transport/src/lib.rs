//! Dockside transport adapter.
//!
//! Implements the [`engine::Transport`] trait against a real engine, over
//! either of the two connection kinds the engine offers:
//!
//! - **Unix domain socket** (default, `/var/run/docker.sock`): HTTP/1 spoken
//!   directly with `hyper` over a `tokio` `UnixStream`.
//! - **Remote host** (`tcp://` or `http(s)://`): HTTP via `reqwest`.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Dialling, handshakes, header selection, timeouts, and
//! API version prefixing live here. The `client` crate sees only
//! [`engine::Transport`].
//!
//! ## Failure model
//!
//! Building an [`HttpTransport`] is the only fallible startup step; a
//! [`ConfigError`] there is fatal to the caller. Afterwards, a call either
//! yields a status and body (whatever the status) or a
//! [`engine::TransportError`], and never retries.

pub mod config;
mod remote;
mod unix;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use engine::{RawResponse, Request, RequestId, StreamingResponse, Transport, TransportError};
use tracing::{debug, info_span, warn, Instrument};

pub use config::{ConfigError, Endpoint, TransportConfig, DEFAULT_API_VERSION, DEFAULT_SOCKET_PATH};

use remote::RemoteConnector;
use unix::UnixConnector;

enum Connector {
    Unix(UnixConnector),
    Remote(RemoteConnector),
}

/// [`Transport`] over a Unix socket or a remote host.
pub struct HttpTransport {
    connector: Connector,
    config: TransportConfig,
}

impl HttpTransport {
    /// Creates a transport for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Client`] if the remote HTTP client cannot be
    /// initialised.
    pub fn new(config: TransportConfig) -> Result<Self, ConfigError> {
        let connector = match &config.endpoint {
            Endpoint::Unix(path) => Connector::Unix(UnixConnector::new(path)),
            Endpoint::Remote(base) => Connector::Remote(RemoteConnector::new(base.clone())?),
        };
        Ok(Self { connector, config })
    }

    /// Creates a transport from the process environment (`DOCKER_HOST`, ...).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(TransportConfig::from_env()?)
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Runs `fut` under the configured timeout unless `request` is blocking.
    async fn with_timeout<T, F>(&self, request: &Request, fut: F) -> Result<T, TransportError>
    where
        F: Future<Output = Result<T, TransportError>>,
    {
        match self.config.timeout.filter(|_| !request.blocking) {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .unwrap_or(Err(TransportError::Timeout(limit))),
            None => fut.await,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: Request) -> Result<RawResponse, TransportError> {
        let path = self.config.versioned_path(&request.path);
        let span = info_span!(
            "engine_request",
            request_id = %RequestId::new_random(),
            method = %request.method,
            path = %path,
            blocking = request.blocking,
        );

        async {
            let started = std::time::Instant::now();
            let result = self
                .with_timeout(&request, async {
                    match &self.connector {
                        Connector::Unix(c) => c.execute(&request, &path).await,
                        Connector::Remote(c) => c.execute(&request, &path).await,
                    }
                })
                .await;
            log_outcome(result.as_ref().map(|r| (r.status, r.body.len())), started.elapsed());
            result
        }
        .instrument(span)
        .await
    }

    async fn stream(&self, request: Request) -> Result<StreamingResponse, TransportError> {
        let path = self.config.versioned_path(&request.path);
        let span = info_span!(
            "engine_stream",
            request_id = %RequestId::new_random(),
            method = %request.method,
            path = %path,
        );

        async {
            // The timeout bounds the wait for response headers only; a
            // followed log stream is expected to stay open.
            let (status, body) = self
                .with_timeout(&request, async {
                    match &self.connector {
                        Connector::Unix(c) => c.stream(&request, &path).await,
                        Connector::Remote(c) => c.stream(&request, &path).await,
                    }
                })
                .await
                .inspect_err(|e| warn!(error = %e, "engine stream could not be opened"))?;
            debug!(status, "engine stream opened");
            Ok(StreamingResponse { status, body })
        }
        .instrument(span)
        .await
    }

    fn endpoint(&self) -> String {
        match &self.connector {
            Connector::Unix(c) => format!("unix://{}", c.socket_path().display()),
            Connector::Remote(c) => c.base_url().to_owned(),
        }
    }
}

fn log_outcome(outcome: Result<(u16, usize), &TransportError>, elapsed: Duration) {
    let elapsed_ms = elapsed.as_millis() as u64;
    match outcome {
        Ok((status, bytes)) => debug!(status, bytes, elapsed_ms, "engine request completed"),
        Err(e) => warn!(error = %e, elapsed_ms, "engine request failed"),
    }
}
