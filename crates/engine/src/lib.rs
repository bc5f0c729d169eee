//! Core domain for the Dockside engine client.
//!
//! This crate holds everything about talking to a container engine that does
//! not involve a socket: how query strings are encoded, how a status/body pair
//! becomes a [`ResponseEnvelope`], how the multiplexed log stream is framed,
//! and the [`Transport`] port that infrastructure crates implement.
//!
//! ## Architectural Layer
//!
//! **Domain + port definitions.** No I/O dependencies. The `transport` crate
//! supplies the sockets; the `client` crate sequences calls.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`ContainerId`, `ImageRef`, `RequestId`, ...) |
//! | [`query`] | Typed query parameters and their wire encoding |
//! | [`request`] | `Request`, `RawResponse`, per-endpoint `Expectation` |
//! | [`envelope`] | `ResponseEnvelope` and its classification rules |
//! | [`frame`] | Log stream framing: `demultiplex`, `FrameDecoder` |
//! | [`port`] | The `Transport` trait |
//! | [`errors`] | `TransportError`, `EnvelopeError` |

pub mod envelope;
pub mod errors;
pub mod frame;
pub mod identifiers;
pub mod port;
pub mod query;
pub mod request;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use envelope::{Failure, FailureKind, Payload, ResponseEnvelope, TRANSPORT_FAILURE_CODE};
pub use errors::{EmptyIdentifier, EnvelopeError, TransportError};
pub use frame::{
    demultiplex, encode_frame, split_frame, FrameDecoder, Frames, LogFrame, OwnedFrame,
    StreamType, HEADER_LEN,
};
pub use identifiers::{ContainerId, ContainerName, ImageRef, RequestId};
pub use port::{ByteStream, StreamingResponse, Transport};
pub use query::{encode_param, QueryString, QueryValue, UNSET_INT};
pub use request::{BodyKind, Expectation, Method, RawResponse, Request};
