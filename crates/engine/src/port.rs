//! The transport port: how the client reaches the engine.
//!
//! Implemented by the `transport` crate for real sockets and by in-memory
//! fakes in tests. Implementations perform exactly one exchange per call and
//! do not retry. HTTP error statuses are returned as ordinary responses;
//! only failures to carry the exchange at all are `Err`.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};

use crate::{RawResponse, Request, TransportError};

/// Body of a streaming response, delivered chunk by chunk as it arrives.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Status and incrementally-read body of one exchange.
pub struct StreamingResponse {
    pub status: u16,
    pub body: ByteStream,
}

impl std::fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Carries requests to the engine.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Performs one request and reads the complete response body.
    async fn execute(&self, request: Request) -> Result<RawResponse, TransportError>;

    /// Performs one request and returns as soon as the status is known.
    ///
    /// The default reads the whole body through [`Transport::execute`] and
    /// yields it as a single chunk, which is correct (if not live) for any
    /// transport.
    async fn stream(&self, request: Request) -> Result<StreamingResponse, TransportError> {
        let RawResponse { status, body } = self.execute(request).await?;
        Ok(StreamingResponse {
            status,
            body: stream::once(async move { Ok(body) }).boxed(),
        })
    }

    /// Human-readable endpoint, for logs.
    fn endpoint(&self) -> String;
}
