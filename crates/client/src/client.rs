//! [`DockerClient`]: one method per engine endpoint, plus log sessions.
//!
//! Every endpoint method performs exactly one request and returns a
//! [`ResponseEnvelope`]. Nothing here returns `Err`: transport failures,
//! error statuses, and malformed bodies all arrive as failure envelopes.

use std::sync::Arc;

use bytes::Bytes;
use engine::{
    BodyKind, ContainerId, ContainerName, Expectation, FrameDecoder, Payload, QueryString,
    Request, ResponseEnvelope, Transport,
};
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::options::{AttachOptions, ListContainersOptions, LogOptions};
use crate::session::{AttachMode, LogSink, SessionRegistry};

// ---------------------------------------------------------------------------
// Expectations per endpoint
// ---------------------------------------------------------------------------

const JSON_OK: Expectation = Expectation::json(200);
const CREATED: Expectation = Expectation::json(201);
const NO_CONTENT: Expectation = Expectation::raw(204);
const RAW_OK: Expectation = Expectation::raw(200);
const UPGRADED: Expectation = Expectation::raw(101);

fn container_path(id: &ContainerId, suffix: &str) -> String {
    format!("/containers/{}{}", id.as_str(), suffix)
}

/// Client for one engine, generic over how requests reach it.
pub struct DockerClient<T: Transport> {
    transport: Arc<T>,
    sessions: SessionRegistry,
}

impl<T: Transport> DockerClient<T> {
    pub fn new(transport: T) -> Self {
        Self::from_arc(Arc::new(transport))
    }

    pub fn from_arc(transport: Arc<T>) -> Self {
        Self {
            transport,
            sessions: SessionRegistry::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The registry of attached log sessions.
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    async fn call(&self, request: Request, expect: Expectation) -> ResponseEnvelope {
        let request = request.accept_json(expect.body == BodyKind::Json);
        ResponseEnvelope::from_result(self.transport.execute(request).await, expect)
    }

    // -----------------------------------------------------------------------
    // System
    // -----------------------------------------------------------------------

    /// `GET /info`
    pub async fn system_info(&self) -> ResponseEnvelope {
        self.call(Request::get("/info"), JSON_OK).await
    }

    /// `GET /version`
    pub async fn version(&self) -> ResponseEnvelope {
        self.call(Request::get("/version"), JSON_OK).await
    }

    // -----------------------------------------------------------------------
    // Images
    // -----------------------------------------------------------------------

    /// `GET /images/json`
    pub async fn list_images(&self) -> ResponseEnvelope {
        self.call(Request::get("/images/json"), JSON_OK).await
    }

    // -----------------------------------------------------------------------
    // Containers
    // -----------------------------------------------------------------------

    /// `GET /containers/json`
    pub async fn list_containers(&self, options: &ListContainersOptions) -> ResponseEnvelope {
        let path = options.query().append_to("/containers/json");
        self.call(Request::get(path), JSON_OK).await
    }

    /// `GET /containers/{id}/json`
    pub async fn inspect_container(&self, id: &ContainerId) -> ResponseEnvelope {
        self.call(Request::get(container_path(id, "/json")), JSON_OK).await
    }

    /// `GET /containers/{id}/top`
    pub async fn top_container(&self, id: &ContainerId) -> ResponseEnvelope {
        self.call(Request::get(container_path(id, "/top")), JSON_OK).await
    }

    /// `GET /containers/{id}/logs`
    ///
    /// The payload is the raw multiplexed byte stream; split it with
    /// [`engine::demultiplex`]. With `follow` set this call does not return
    /// until the container stops; use [`DockerClient::attach_log_stream`]
    /// with [`AttachMode::Follow`] for a live tail.
    pub async fn container_logs(&self, id: &ContainerId, options: &LogOptions) -> ResponseEnvelope {
        let path = options.query().append_to(&container_path(id, "/logs"));
        let request = Request::get(path);
        let request = if options.follow { request.blocking() } else { request };
        self.call(request, RAW_OK).await
    }

    /// `POST /containers/create`
    ///
    /// `params` is the creation body as the engine documents it
    /// (`{"Image": ..., "Cmd": [...], ...}`).
    pub async fn create_container(
        &self,
        params: Value,
        name: Option<&ContainerName>,
    ) -> ResponseEnvelope {
        let path = QueryString::new()
            .param_opt("name", name.map(ContainerName::as_str))
            .append_to("/containers/create");
        self.call(Request::post(path).with_body(params), CREATED).await
    }

    /// `POST /containers/{id}/start`
    pub async fn start_container(&self, id: &ContainerId) -> ResponseEnvelope {
        self.call(Request::post(container_path(id, "/start")), NO_CONTENT).await
    }

    /// `GET /containers/{id}/changes`
    pub async fn container_changes(&self, id: &ContainerId) -> ResponseEnvelope {
        self.call(Request::get(container_path(id, "/changes")), JSON_OK).await
    }

    /// `POST /containers/{id}/stop`, waiting `timeout_secs` before killing.
    pub async fn stop_container(&self, id: &ContainerId, timeout_secs: Option<i64>) -> ResponseEnvelope {
        let path = QueryString::new()
            .param_opt("t", timeout_secs)
            .append_to(&container_path(id, "/stop"));
        self.call(Request::post(path).blocking(), NO_CONTENT).await
    }

    /// `POST /containers/{id}/kill`. `signal` is a name (`SIGINT`) or number.
    pub async fn kill_container(&self, id: &ContainerId, signal: Option<&str>) -> ResponseEnvelope {
        let path = QueryString::new()
            .param_opt("signal", signal)
            .append_to(&container_path(id, "/kill"));
        self.call(Request::post(path), NO_CONTENT).await
    }

    /// `POST /containers/{id}/pause`
    pub async fn pause_container(&self, id: &ContainerId) -> ResponseEnvelope {
        self.call(Request::post(container_path(id, "/pause")), NO_CONTENT).await
    }

    /// `POST /containers/{id}/unpause`
    pub async fn unpause_container(&self, id: &ContainerId) -> ResponseEnvelope {
        self.call(Request::post(container_path(id, "/unpause")), NO_CONTENT).await
    }

    /// `POST /containers/{id}/wait`. Blocks until the container stops; no
    /// transport timeout applies.
    pub async fn wait_container(&self, id: &ContainerId) -> ResponseEnvelope {
        self.call(Request::post(container_path(id, "/wait")).blocking(), JSON_OK).await
    }

    /// `DELETE /containers/{id}`
    pub async fn delete_container(
        &self,
        id: &ContainerId,
        remove_volumes: bool,
        force: bool,
    ) -> ResponseEnvelope {
        let path = QueryString::new()
            .param("v", remove_volumes)
            .param("force", force)
            .append_to(&container_path(id, ""));
        self.call(Request::delete(path), NO_CONTENT).await
    }

    /// `POST /containers/{id}/restart`
    pub async fn restart_container(&self, id: &ContainerId, timeout_secs: Option<i64>) -> ResponseEnvelope {
        let path = QueryString::new()
            .param_opt("t", timeout_secs)
            .append_to(&container_path(id, "/restart"));
        self.call(Request::post(path).blocking(), NO_CONTENT).await
    }

    /// `POST /containers/{id}/attach`
    pub async fn attach_to_container(&self, id: &ContainerId, options: &AttachOptions) -> ResponseEnvelope {
        let path = options.query().append_to(&container_path(id, "/attach"));
        self.call(Request::post(path).blocking(), UPGRADED).await
    }

    // -----------------------------------------------------------------------
    // Log sessions
    // -----------------------------------------------------------------------

    /// Attaches `sink` to the log output of `container`.
    ///
    /// Returns `false` without side effects if `container` is empty, the sink
    /// has nowhere to deliver output, or the container already has a session.
    /// Returns `false` after releasing the reservation if the log cannot be
    /// read. Dropping the returned future before it completes releases the
    /// reservation too.
    ///
    /// In [`AttachMode::CatchUp`] the existing log is fetched before this
    /// returns. Callback sinks have received all of it by then; a channel
    /// sink is fed by a session task as the receiver drains it, and detach
    /// stops that task. In [`AttachMode::Follow`] this returns once the live stream
    /// is open; output then arrives from a background task until
    /// [`DockerClient::detach_log_stream`] or the end of the stream.
    pub async fn attach_log_stream(&self, container: &str, sink: LogSink, mode: AttachMode) -> bool {
        let Some(id) = ContainerId::new(container) else {
            debug!("attach rejected: empty container id");
            return false;
        };
        if sink.is_empty() {
            debug!(container = %id, "attach rejected: sink has no outputs");
            return false;
        }

        match mode {
            AttachMode::CatchUp => self.attach_catch_up(id, sink).await,
            AttachMode::Follow => self.attach_follow(id, sink).await,
        }
    }

    async fn attach_catch_up(&self, id: ContainerId, sink: LogSink) -> bool {
        let Some(pending) = self.sessions.pending(&id, AttachMode::CatchUp, |_| None) else {
            debug!(container = %id, "attach rejected: already attached");
            return false;
        };

        let envelope = self.container_logs(&id, &LogOptions::both_streams(false)).await;
        let history = match &envelope {
            ResponseEnvelope::Success(Payload::Raw(bytes)) => bytes.clone(),
            other => {
                warn!(container = %id, code = ?other.code(), "log history could not be read");
                return false;
            }
        };

        let cancel = pending.cancel_token();
        let task = if sink.is_channel() {
            Some(tokio::spawn(deliver_history(id.clone(), sink, history, cancel)))
        } else {
            let mut sink = sink;
            sink.deliver_buffer(&history, &cancel).await;
            None
        };

        let attached = pending.commit(task);
        if attached {
            info!(container = %id, mode = "catch-up", "log session attached");
        }
        attached
    }

    async fn attach_follow(&self, id: ContainerId, sink: LogSink) -> bool {
        let (opened_tx, opened_rx) = oneshot::channel();
        let transport = Arc::clone(&self.transport);
        let task_id = id.clone();

        let Some(pending) = self.sessions.pending(&id, AttachMode::Follow, move |cancel| {
            Some(tokio::spawn(follow_logs(transport, task_id, sink, cancel, opened_tx)))
        }) else {
            debug!(container = %id, "attach rejected: already attached");
            return false;
        };

        if !opened_rx.await.unwrap_or(false) {
            return false;
        }
        let attached = pending.commit(None);
        if attached {
            info!(container = %id, mode = "follow", "log session attached");
        }
        attached
    }

    /// Detaches the log session of `container`, stopping its task if any.
    ///
    /// Returns `false` if the container has no session.
    pub async fn detach_log_stream(&self, container: &str) -> bool {
        self.sessions.detach(container).await
    }

    /// `true` if `container` has an attached log session.
    pub fn is_attached(&self, container: &str) -> bool {
        self.sessions.is_attached(container)
    }

    /// Detaches every log session. Returns how many were detached.
    pub async fn shutdown(&self) -> usize {
        self.sessions.detach_all().await
    }
}

impl<T: Transport> std::fmt::Debug for DockerClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerClient")
            .field("endpoint", &self.transport.endpoint())
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Session tasks
// ---------------------------------------------------------------------------

/// Feeds a fetched log history into a channel sink at the receiver's pace.
async fn deliver_history(container: ContainerId, mut sink: LogSink, history: Bytes, cancel: CancellationToken) {
    let complete = sink.deliver_buffer(&history, &cancel).await;
    debug!(container = %container, complete, "log history delivered");
}

/// Tails the live log of `container` into `sink` until the stream ends, the
/// sink closes, or `cancel` fires. Reports through `opened` whether the
/// stream could be opened.
async fn follow_logs<T: Transport>(
    transport: Arc<T>,
    container: ContainerId,
    mut sink: LogSink,
    cancel: CancellationToken,
    opened: oneshot::Sender<bool>,
) {
    let path = LogOptions::both_streams(true)
        .query()
        .append_to(&container_path(&container, "/logs"));

    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            let _ = opened.send(false);
            return;
        }
        response = transport.stream(Request::get(path)) => response,
    };

    let mut body = match response {
        Ok(response) if RAW_OK.is_success(response.status) => response.body,
        Ok(response) => {
            warn!(container = %container, status = response.status, "log stream refused");
            let _ = opened.send(false);
            return;
        }
        Err(e) => {
            warn!(container = %container, error = %e, "log stream could not be opened");
            let _ = opened.send(false);
            return;
        }
    };
    let _ = opened.send(true);

    let mut decoder = FrameDecoder::new();
    let mut frames: u64 = 0;

    'read: loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => break 'read,
            chunk = body.next() => chunk,
        };

        match chunk {
            Some(Ok(bytes)) => decoder.push(&bytes),
            Some(Err(e)) => {
                warn!(container = %container, error = %e, "log stream broke");
                break 'read;
            }
            None => break 'read,
        }

        while let Some(frame) = decoder.next_frame() {
            if cancel.is_cancelled() {
                break 'read;
            }
            let Some(stream) = frame.stream() else {
                continue;
            };
            if !sink.deliver(stream, frame.payload, &cancel).await {
                break 'read;
            }
            frames += 1;
        }
    }

    debug!(
        container = %container,
        frames,
        discarded = decoder.pending(),
        cancelled = cancel.is_cancelled(),
        "log follow ended"
    );
}
