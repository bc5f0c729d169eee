//! Log sessions: at most one attached log consumer per container.
//!
//! A session is created by [`DockerClient::attach_log_stream`] and destroyed by
//! [`DockerClient::detach_log_stream`]. The [`SessionRegistry`] owns every
//! session; the check "is this container already attached?" and the insert
//! that follows it happen under one lock acquisition, so two concurrent
//! attaches for the same container cannot both succeed.
//!
//! Two modes are supported:
//!
//! - [`AttachMode::CatchUp`] reads the container's log history once. Callback
//!   sinks receive it before `attach` returns; a channel sink is fed by a
//!   short-lived task so that a full channel never holds up `attach`.
//! - [`AttachMode::Follow`] spawns a task that tails the live log stream
//!   (`follow=true`). Detaching cancels the task and waits for it to finish.
//!   Cancellation is checked between frames, so a detach never waits on more
//!   than the frame currently being delivered.
//!
//! A slot is reserved before any I/O and released again if the attach fails
//! or its future is dropped before completing.
//!
//! [`DockerClient::attach_log_stream`]: crate::DockerClient::attach_log_stream
//! [`DockerClient::detach_log_stream`]: crate::DockerClient::detach_log_stream

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use engine::{demultiplex, ContainerId, Frames, StreamType};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How an attached session obtains log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachMode {
    /// One read of the existing log, delivered before `attach` returns.
    CatchUp,
    /// A background task delivering output as the container produces it.
    Follow,
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Callback receiving one frame's payload.
pub type LogCallback = Box<dyn FnMut(&[u8]) + Send + 'static>;

/// One demultiplexed frame, as delivered to a channel sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogChunk {
    pub stream: StreamType,
    pub bytes: Bytes,
}

/// Where a session delivers output.
///
/// Callbacks run on whichever task is reading the log. A channel sink is
/// bounded, so a slow receiver slows the reader down instead of buffering
/// without limit.
pub enum LogSink {
    Callbacks {
        on_stdout: Option<LogCallback>,
        on_stderr: Option<LogCallback>,
    },
    Channel(mpsc::Sender<LogChunk>),
}

impl LogSink {
    /// A sink with no callbacks; add them with [`LogSink::on_stdout`] and
    /// [`LogSink::on_stderr`].
    pub fn callbacks() -> Self {
        LogSink::Callbacks {
            on_stdout: None,
            on_stderr: None,
        }
    }

    #[must_use]
    pub fn on_stdout(self, f: impl FnMut(&[u8]) + Send + 'static) -> Self {
        match self {
            LogSink::Callbacks { on_stderr, .. } => LogSink::Callbacks {
                on_stdout: Some(Box::new(f)),
                on_stderr,
            },
            channel => channel,
        }
    }

    #[must_use]
    pub fn on_stderr(self, f: impl FnMut(&[u8]) + Send + 'static) -> Self {
        match self {
            LogSink::Callbacks { on_stdout, .. } => LogSink::Callbacks {
                on_stdout,
                on_stderr: Some(Box::new(f)),
            },
            channel => channel,
        }
    }

    /// A bounded channel sink and its receiver.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<LogChunk>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (LogSink::Channel(tx), rx)
    }

    pub fn is_channel(&self) -> bool {
        matches!(self, LogSink::Channel(_))
    }

    /// `true` if the sink has nowhere to deliver output.
    pub fn is_empty(&self) -> bool {
        match self {
            LogSink::Callbacks {
                on_stdout,
                on_stderr,
            } => on_stdout.is_none() && on_stderr.is_none(),
            LogSink::Channel(tx) => tx.is_closed(),
        }
    }

    /// Delivers every complete frame in `buffer`. Returns `false` once the
    /// sink can no longer accept output.
    pub(crate) async fn deliver_buffer(&mut self, buffer: &[u8], cancel: &CancellationToken) -> bool {
        if let LogSink::Callbacks {
            on_stdout,
            on_stderr,
        } = self
        {
            let consumed = demultiplex(
                buffer,
                |p| {
                    if let Some(f) = on_stdout.as_mut() {
                        f(p);
                    }
                },
                |p| {
                    if let Some(f) = on_stderr.as_mut() {
                        f(p);
                    }
                },
            );
            if consumed < buffer.len() {
                debug!(discarded = buffer.len() - consumed, "trailing partial log frame dropped");
            }
            return true;
        }

        for frame in Frames::new(buffer) {
            if let Some(stream) = frame.stream() {
                let payload = Bytes::copy_from_slice(frame.payload);
                if !self.deliver(stream, payload, cancel).await {
                    return false;
                }
            }
        }
        true
    }

    /// Delivers one frame. Returns `false` once the sink can no longer accept
    /// output or `cancel` fires while waiting on a full channel.
    pub(crate) async fn deliver(
        &mut self,
        stream: StreamType,
        bytes: Bytes,
        cancel: &CancellationToken,
    ) -> bool {
        match self {
            LogSink::Callbacks {
                on_stdout,
                on_stderr,
            } => {
                let callback = match stream {
                    StreamType::Stdout => on_stdout.as_mut(),
                    StreamType::Stderr => on_stderr.as_mut(),
                };
                if let Some(f) = callback {
                    f(&bytes);
                }
                true
            }
            LogSink::Channel(tx) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => false,
                    sent = tx.send(LogChunk { stream, bytes }) => sent.is_ok(),
                }
            }
        }
    }
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogSink::Callbacks {
                on_stdout,
                on_stderr,
            } => f
                .debug_struct("Callbacks")
                .field("on_stdout", &on_stdout.is_some())
                .field("on_stderr", &on_stderr.is_some())
                .finish(),
            LogSink::Channel(tx) => f.debug_tuple("Channel").field(&tx.capacity()).finish(),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Snapshot of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub container: ContainerId,
    pub mode: AttachMode,
    /// `false` while the initial read is still in progress.
    pub attached: bool,
    /// For [`AttachMode::Follow`], whether the tailing task is still reading.
    pub streaming: bool,
    pub attached_at: DateTime<Utc>,
}

/// Proof that a session slot was reserved, handed back to mark or release it.
#[derive(Debug, Clone)]
pub(crate) struct Reservation {
    pub(crate) generation: u64,
    pub(crate) cancel: CancellationToken,
}

struct SessionEntry {
    generation: u64,
    mode: AttachMode,
    attached: bool,
    attached_at: DateTime<Utc>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct RegistryState {
    sessions: HashMap<ContainerId, SessionEntry>,
    next_generation: u64,
}

/// Tracks which containers have an attached log session.
#[derive(Default)]
pub struct SessionRegistry {
    state: Mutex<RegistryState>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserves the slot for `container`, or returns `None` if it is taken.
    ///
    /// `start` runs under the registry lock with the session's cancellation
    /// token and may spawn the session's task; the returned handle is stored
    /// with the entry so that detach can join it.
    pub(crate) fn reserve<F>(&self, container: &ContainerId, mode: AttachMode, start: F) -> Option<Reservation>
    where
        F: FnOnce(CancellationToken) -> Option<JoinHandle<()>>,
    {
        let mut state = self.lock();
        if state.sessions.contains_key(container) {
            return None;
        }

        state.next_generation += 1;
        let generation = state.next_generation;
        let cancel = CancellationToken::new();
        let task = start(cancel.clone());

        state.sessions.insert(
            container.clone(),
            SessionEntry {
                generation,
                mode,
                attached: false,
                attached_at: Utc::now(),
                cancel: cancel.clone(),
                task,
            },
        );
        Some(Reservation { generation, cancel })
    }

    /// Like [`SessionRegistry::reserve`], but the slot is released when the
    /// returned guard is dropped without being committed.
    pub(crate) fn pending<F>(&self, container: &ContainerId, mode: AttachMode, start: F) -> Option<PendingSession<'_>>
    where
        F: FnOnce(CancellationToken) -> Option<JoinHandle<()>>,
    {
        let reservation = self.reserve(container, mode, start)?;
        Some(PendingSession {
            registry: self,
            container: container.clone(),
            reservation: Some(reservation),
        })
    }

    /// Marks a reserved session attached, storing `task` with it so that
    /// detach joins it. Returns `false` if the session was detached in the
    /// meantime.
    fn mark_attached(
        &self,
        container: &ContainerId,
        reservation: &Reservation,
        task: Option<JoinHandle<()>>,
    ) -> bool {
        let mut state = self.lock();
        match state.sessions.get_mut(container) {
            Some(entry) if entry.generation == reservation.generation => {
                entry.attached = true;
                entry.attached_at = Utc::now();
                if task.is_some() {
                    entry.task = task;
                }
                true
            }
            _ => false,
        }
    }

    /// Drops a reservation whose attach failed.
    pub(crate) fn release(&self, container: &ContainerId, reservation: &Reservation) {
        reservation.cancel.cancel();
        let mut state = self.lock();
        if state
            .sessions
            .get(container)
            .is_some_and(|entry| entry.generation == reservation.generation)
        {
            state.sessions.remove(container);
        }
    }

    /// Removes the session for `container`, cancelling and joining its task.
    ///
    /// Returns `false` if no session exists.
    pub async fn detach(&self, container: &str) -> bool {
        let Some(id) = ContainerId::new(container) else {
            return false;
        };
        let Some(entry) = self.lock().sessions.remove(&id) else {
            return false;
        };
        finish(&id, entry).await;
        info!(container = %id, "log session detached");
        true
    }

    /// Detaches every session. Returns how many were removed.
    pub async fn detach_all(&self) -> usize {
        let entries: Vec<_> = self.lock().sessions.drain().collect();
        let count = entries.len();
        for (id, entry) in entries {
            finish(&id, entry).await;
        }
        count
    }

    /// `true` if `container` has a fully attached session.
    pub fn is_attached(&self, container: &str) -> bool {
        let Some(id) = ContainerId::new(container) else {
            return false;
        };
        self.lock()
            .sessions
            .get(&id)
            .is_some_and(|entry| entry.attached)
    }

    /// Lists current sessions, ordered by container ID.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let state = self.lock();
        let mut sessions: Vec<_> = state
            .sessions
            .iter()
            .map(|(id, entry)| SessionInfo {
                container: id.clone(),
                mode: entry.mode,
                attached: entry.attached,
                streaming: entry.task.as_ref().is_some_and(|t| !t.is_finished()),
                attached_at: entry.attached_at,
            })
            .collect();
        sessions.sort_by(|a, b| a.container.cmp(&b.container));
        sessions
    }

    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        for entry in state.sessions.values() {
            entry.cancel.cancel();
        }
    }
}

/// A reserved slot whose attach is still in progress.
///
/// Dropping it without [`PendingSession::commit`] releases the slot and
/// cancels any task started for it.
pub(crate) struct PendingSession<'a> {
    registry: &'a SessionRegistry,
    container: ContainerId,
    reservation: Option<Reservation>,
}

impl PendingSession<'_> {
    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.reservation
            .as_ref()
            .map(|r| r.cancel.clone())
            .unwrap_or_default()
    }

    /// Marks the session attached, adding `task` to it. Returns `false` and
    /// releases the slot if the session was detached in the meantime.
    pub(crate) fn commit(mut self, task: Option<JoinHandle<()>>) -> bool {
        let Some(reservation) = self.reservation.take() else {
            return false;
        };
        if self.registry.mark_attached(&self.container, &reservation, task) {
            true
        } else {
            self.registry.release(&self.container, &reservation);
            false
        }
    }
}

impl Drop for PendingSession<'_> {
    fn drop(&mut self) {
        if let Some(reservation) = self.reservation.take() {
            debug!(container = %self.container, "attach did not complete; releasing slot");
            self.registry.release(&self.container, &reservation);
        }
    }
}

async fn finish(id: &ContainerId, entry: SessionEntry) {
    entry.cancel.cancel();
    if let Some(task) = entry.task {
        if let Err(e) = task.await {
            warn!(container = %id, error = %e, "log session task did not finish cleanly");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn id(s: &str) -> ContainerId {
        ContainerId::new(s).unwrap()
    }

    #[test]
    fn test_reserve_is_exclusive() {
        let registry = SessionRegistry::new();
        let first = registry.reserve(&id("abc"), AttachMode::CatchUp, |_| None);
        assert!(first.is_some());
        assert!(registry.reserve(&id("abc"), AttachMode::Follow, |_| None).is_none());
        assert!(registry.reserve(&id("def"), AttachMode::CatchUp, |_| None).is_some());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_rejected_reserve_does_not_run_start() {
        let registry = SessionRegistry::new();
        registry.reserve(&id("abc"), AttachMode::CatchUp, |_| None);

        let mut ran = false;
        registry.reserve(&id("abc"), AttachMode::CatchUp, |_| {
            ran = true;
            None
        });
        assert!(!ran);
    }

    #[test]
    fn test_attached_only_after_mark() {
        let registry = SessionRegistry::new();
        let reservation = registry.reserve(&id("abc"), AttachMode::CatchUp, |_| None).unwrap();
        assert!(!registry.is_attached("abc"));
        assert!(registry.mark_attached(&id("abc"), &reservation, None));
        assert!(registry.is_attached("abc"));
    }

    #[test]
    fn test_release_removes_only_own_generation() {
        let registry = SessionRegistry::new();
        let old = registry.reserve(&id("abc"), AttachMode::CatchUp, |_| None).unwrap();
        registry.release(&id("abc"), &old);
        assert!(registry.is_empty());
        assert!(old.cancel.is_cancelled());

        let new = registry.reserve(&id("abc"), AttachMode::CatchUp, |_| None).unwrap();
        registry.release(&id("abc"), &old);
        assert_eq!(registry.len(), 1);
        assert!(!registry.mark_attached(&id("abc"), &old, None));
        assert!(registry.mark_attached(&id("abc"), &new, None));
    }

    #[tokio::test]
    async fn test_detach_unknown_is_noop() {
        let registry = SessionRegistry::new();
        assert!(!registry.detach("abc").await);
        assert!(!registry.detach("").await);
    }

    #[tokio::test]
    async fn test_detach_cancels_and_joins_task() {
        let registry = SessionRegistry::new();
        let stopped = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = stopped.clone();

        registry.reserve(&id("abc"), AttachMode::Follow, move |cancel| {
            Some(tokio::spawn(async move {
                cancel.cancelled().await;
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
            }))
        });

        assert!(registry.detach("abc").await);
        assert!(stopped.load(std::sync::atomic::Ordering::SeqCst));
        assert!(!registry.detach("abc").await);
    }

    #[tokio::test]
    async fn test_detach_all() {
        let registry = SessionRegistry::new();
        registry.reserve(&id("a"), AttachMode::CatchUp, |_| None);
        registry.reserve(&id("b"), AttachMode::CatchUp, |_| None);
        assert_eq!(registry.detach_all().await, 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_dropped_pending_session_frees_slot() {
        let registry = SessionRegistry::new();
        let pending = registry.pending(&id("abc"), AttachMode::CatchUp, |_| None).unwrap();
        let cancel = pending.cancel_token();
        assert!(registry.pending(&id("abc"), AttachMode::CatchUp, |_| None).is_none());

        drop(pending);
        assert!(registry.is_empty());
        assert!(cancel.is_cancelled());

        let pending = registry.pending(&id("abc"), AttachMode::CatchUp, |_| None).unwrap();
        assert!(pending.commit(None));
        assert!(registry.is_attached("abc"));
    }

    #[test]
    fn test_commit_after_detach_fails() {
        let registry = SessionRegistry::new();
        let pending = registry.pending(&id("abc"), AttachMode::CatchUp, |_| None).unwrap();
        registry.lock().sessions.clear();
        assert!(!pending.commit(None));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_callback_sink_receives_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (out, err) = (seen.clone(), seen.clone());
        let mut sink = LogSink::callbacks()
            .on_stdout(move |p| out.lock().unwrap().push(format!("out:{}", String::from_utf8_lossy(p))))
            .on_stderr(move |p| err.lock().unwrap().push(format!("err:{}", String::from_utf8_lossy(p))));

        let mut buf = engine::encode_frame(2, b"a");
        buf.extend(engine::encode_frame(1, b"b"));
        buf.extend(engine::encode_frame(2, b"c"));
        buf.extend_from_slice(&[1, 0, 0]);

        assert!(sink.deliver_buffer(&buf, &CancellationToken::new()).await);
        assert_eq!(*seen.lock().unwrap(), vec!["err:a", "out:b", "err:c"]);
    }

    #[tokio::test]
    async fn test_channel_sink_stops_when_receiver_dropped() {
        let (mut sink, rx) = LogSink::channel(4);
        drop(rx);
        assert!(sink.is_empty());
        let ok = sink
            .deliver(StreamType::Stdout, Bytes::from_static(b"x"), &CancellationToken::new())
            .await;
        assert!(!ok);
    }

    #[tokio::test]
    async fn test_full_channel_observes_cancellation() {
        let (mut sink, _rx) = LogSink::channel(1);
        let cancel = CancellationToken::new();
        assert!(sink.deliver(StreamType::Stdout, Bytes::from_static(b"1"), &cancel).await);

        cancel.cancel();
        assert!(!sink.deliver(StreamType::Stdout, Bytes::from_static(b"2"), &cancel).await);
    }

    #[test]
    fn test_empty_callback_sink() {
        assert!(LogSink::callbacks().is_empty());
        assert!(!LogSink::callbacks().on_stderr(|_| {}).is_empty());
    }
}
