//! Error types for the engine API domain.
//!
//! Per-call failures are carried as data inside
//! [`ResponseEnvelope`](crate::ResponseEnvelope), never as `Err`. The types
//! here are the few places a `Result` is still the right shape:
//!
//! - [`TransportError`] is what a [`Transport`](crate::Transport)
//!   implementation reports. The client converts it into a failure envelope
//!   with [`TRANSPORT_FAILURE_CODE`](crate::TRANSPORT_FAILURE_CODE).
//! - [`EnvelopeError`] is produced when a caller asks for a typed view of an
//!   envelope that does not hold one.
//! - [`EmptyIdentifier`] rejects an empty string where an identifier is
//!   deserialised.

use std::time::Duration;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Transport failures
// ---------------------------------------------------------------------------

/// A request could not be carried to the engine or its answer could not be read.
///
/// HTTP-level failures (4xx/5xx) are **not** transport errors; they arrive as
/// an ordinary status code and are classified by the envelope builder.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The socket or TCP connection could not be established.
    #[error("failed to connect to engine at {endpoint}: {source}")]
    Connect {
        /// Human-readable endpoint (socket path or host URI).
        endpoint: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The connection opened but the HTTP/1 handshake failed.
    #[error("HTTP handshake with engine failed: {message}")]
    Handshake {
        /// Description reported by the HTTP layer.
        message: String,
    },

    /// The request could not be built or sent.
    #[error("request {method} {path} failed: {message}")]
    Request {
        /// HTTP method of the failed request.
        method: String,
        /// Request path including query string.
        path: String,
        /// Description reported by the HTTP layer.
        message: String,
    },

    /// No response arrived within the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Headers arrived but the body could not be read to completion.
    #[error("failed to read response body: {message}")]
    Body {
        /// Description reported by the HTTP layer.
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Envelope access
// ---------------------------------------------------------------------------

/// A typed view of an envelope was requested but is not available.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The envelope is a failure.
    #[error("engine call failed with code {code}: {message}")]
    Failed {
        /// Status code carried by the failure (0 for transport failures).
        code: u16,
        /// `message` field of the error body, or a placeholder.
        message: String,
    },

    /// The envelope succeeded but holds raw bytes, not JSON.
    #[error("expected a JSON payload but the call returned raw bytes")]
    NotJson,

    /// The JSON payload does not match the requested type.
    #[error("failed to decode payload: {0}")]
    Decode(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// An identifier was given as the empty string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{kind} must not be empty")]
pub struct EmptyIdentifier {
    /// Name of the identifier type.
    pub kind: &'static str,
}
