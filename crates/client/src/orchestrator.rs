//! Multi-call flows built on [`DockerClient`].
//!
//! These collapse every failure into `None`: the individual envelopes are
//! logged at `warn` but not returned. Callers needing the engine's error
//! message should drive the endpoint methods directly.

use std::sync::{Arc, Mutex, PoisonError};

use engine::{ContainerId, ContainerName, ImageRef, Transport};
use tracing::{info, instrument, warn};

use crate::client::DockerClient;
use crate::options::{CreateContainerBody, CreatedContainer, WaitResponse};
use crate::session::{AttachMode, LogSink};

/// What [`DockerClient::run_and_collect`] observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub container: ContainerId,
    pub exit_code: i64,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl RunOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

impl<T: Transport> DockerClient<T> {
    /// Creates and starts a container from `image`.
    ///
    /// Returns the new container's ID once both calls succeed. If the start
    /// fails the container is force-deleted before returning `None`, whatever
    /// the outcome of that delete. If the create fails nothing else is sent.
    #[instrument(skip(self, image, command), fields(image = %image))]
    pub async fn run_container_async(
        &self,
        image: &ImageRef,
        command: &[String],
        name: Option<&ContainerName>,
    ) -> Option<ContainerId> {
        let body = match serde_json::to_value(CreateContainerBody::new(image, command)) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "create body could not be encoded");
                return None;
            }
        };

        let created = self.create_container(body, name).await;
        let id = match created.decode::<CreatedContainer>() {
            Ok(created) => {
                for warning in created.warnings.iter().flatten() {
                    warn!(container = %created.id.short(), warning = %warning, "engine warning on create");
                }
                created.id
            }
            Err(e) => {
                warn!(error = %e, "container create failed");
                return None;
            }
        };

        let started = self.start_container(&id).await;
        if let Some(failure) = started.failure() {
            warn!(container = %id.short(), failure = %failure, "container start failed; removing it");
            let deleted = self.delete_container(&id, false, true).await;
            if let Some(failure) = deleted.failure() {
                warn!(container = %id.short(), failure = %failure, "cleanup delete failed");
            }
            return None;
        }

        info!(container = %id.short(), "container running");
        Some(id)
    }

    /// Runs a container to completion and returns its exit code and output.
    ///
    /// The container is always force-deleted once it has been started,
    /// including when waiting on it or reading its log fails.
    #[instrument(skip(self, image, command), fields(image = %image))]
    pub async fn run_and_collect(
        &self,
        image: &ImageRef,
        command: &[String],
        name: Option<&ContainerName>,
    ) -> Option<RunOutput> {
        let id = self.run_container_async(image, command, name).await?;
        let output = self.collect(&id).await;

        let deleted = self.delete_container(&id, false, true).await;
        if let Some(failure) = deleted.failure() {
            warn!(container = %id.short(), failure = %failure, "container could not be removed");
        }
        output
    }

    async fn collect(&self, id: &ContainerId) -> Option<RunOutput> {
        let exit_code = match self.wait_container(id).await.decode::<WaitResponse>() {
            Ok(wait) => wait.status_code,
            Err(e) => {
                warn!(container = %id.short(), error = %e, "wait failed");
                return None;
            }
        };

        let stdout = Arc::new(Mutex::new(Vec::new()));
        let stderr = Arc::new(Mutex::new(Vec::new()));
        let (out, err) = (Arc::clone(&stdout), Arc::clone(&stderr));
        let sink = LogSink::callbacks()
            .on_stdout(move |p| out.lock().unwrap_or_else(PoisonError::into_inner).extend_from_slice(p))
            .on_stderr(move |p| err.lock().unwrap_or_else(PoisonError::into_inner).extend_from_slice(p));

        if !self.attach_log_stream(id.as_str(), sink, AttachMode::CatchUp).await {
            warn!(container = %id.short(), "log could not be collected");
            return None;
        }
        self.detach_log_stream(id.as_str()).await;

        Some(RunOutput {
            container: id.clone(),
            exit_code,
            stdout: take_buffer(&stdout),
            stderr: take_buffer(&stderr),
        })
    }
}

fn take_buffer(buf: &Mutex<Vec<u8>>) -> Vec<u8> {
    let mut guard = buf.lock().unwrap_or_else(PoisonError::into_inner);
    std::mem::take(&mut *guard)
}
