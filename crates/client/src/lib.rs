//! Dockside engine client.
//!
//! [`DockerClient`] wraps any [`engine::Transport`] and exposes one async
//! method per engine endpoint. Each returns a [`ResponseEnvelope`]; none
//! returns `Err`.
//!
//! ## Architectural Layer
//!
//! **Application.** Sequences calls on the `engine` port and owns the log
//! session registry. Knows nothing about sockets; the `transport` crate is
//! wired in by the binary.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`client`] | `DockerClient` endpoint methods, log attach/detach |
//! | [`session`] | `SessionRegistry`, `LogSink`, `AttachMode` |
//! | [`orchestrator`] | `run_container_async`, `run_and_collect` |
//! | [`options`] | Query parameter sets and typed request/response bodies |
//!
//! ## Example
//!
//! ```no_run
//! # async fn demo<T: engine::Transport>(docker: client::DockerClient<T>) {
//! use client::{AttachMode, LogSink};
//! use engine::ImageRef;
//!
//! let image = ImageRef::new("alpine:3").unwrap();
//! let cmd = vec!["echo".to_owned(), "hello".to_owned()];
//! if let Some(id) = docker.run_container_async(&image, &cmd, None).await {
//!     let sink = LogSink::callbacks().on_stdout(|bytes| print!("{}", String::from_utf8_lossy(bytes)));
//!     docker.attach_log_stream(id.as_str(), sink, AttachMode::Follow).await;
//!     docker.wait_container(&id).await;
//!     docker.detach_log_stream(id.as_str()).await;
//! }
//! # }
//! ```

pub mod client;
pub mod options;
pub mod orchestrator;
pub mod session;

pub use client::DockerClient;
pub use engine::ResponseEnvelope;
pub use options::{
    AttachOptions, CreateContainerBody, CreatedContainer, ListContainersOptions, LogOptions,
    WaitResponse,
};
pub use orchestrator::RunOutput;
pub use session::{AttachMode, LogCallback, LogChunk, LogSink, SessionInfo, SessionRegistry};
