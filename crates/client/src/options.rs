//! Parameter sets and typed bodies for the container endpoints.
//!
//! Defaults mirror what the engine CLI sends: list only running containers,
//! read stdout but not stderr, return the whole log.

use engine::{ContainerId, ImageRef, QueryString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parameters of `GET /containers/json`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListContainersOptions {
    /// Include stopped containers.
    pub all: bool,
    /// Return at most this many of the most recently created containers.
    pub limit: Option<i64>,
    /// Only containers created after this ID or name.
    pub since: Option<String>,
    /// Only containers created before this ID or name.
    pub before: Option<String>,
    /// Report `SizeRw` and `SizeRootFs`.
    pub size: Option<bool>,
    /// Filter map, e.g. `{"status": ["exited"]}`.
    pub filters: Option<Value>,
}

impl ListContainersOptions {
    pub(crate) fn query(&self) -> QueryString {
        QueryString::new()
            .param("all", self.all)
            .param_opt("limit", self.limit)
            .param_opt("since", self.since.as_deref())
            .param_opt("before", self.before.as_deref())
            .param_opt("size", self.size)
            .param_opt("filters", self.filters.clone())
    }
}

// ---------------------------------------------------------------------------

/// Parameters of `GET /containers/{id}/logs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions {
    /// Keep the connection open and stream new output.
    pub follow: bool,
    pub stdout: bool,
    pub stderr: bool,
    /// Prefix every line with an RFC 3339 timestamp.
    pub timestamps: bool,
    /// Number of lines from the end, or `"all"`.
    pub tail: String,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            follow: false,
            stdout: true,
            stderr: false,
            timestamps: false,
            tail: "all".to_owned(),
        }
    }
}

impl LogOptions {
    /// Both streams, whole history; `follow` as given.
    pub fn both_streams(follow: bool) -> Self {
        Self {
            follow,
            stdout: true,
            stderr: true,
            ..Self::default()
        }
    }

    pub(crate) fn query(&self) -> QueryString {
        QueryString::new()
            .param("follow", self.follow)
            .param("stdout", self.stdout)
            .param("stderr", self.stderr)
            .param("timestamps", self.timestamps)
            .param("tail", self.tail.as_str())
    }
}

// ---------------------------------------------------------------------------

/// Parameters of `POST /containers/{id}/attach`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttachOptions {
    /// Replay output produced before the attach.
    pub logs: bool,
    /// Keep streaming after the replay.
    pub stream: bool,
    pub stdin: bool,
    pub stdout: bool,
    pub stderr: bool,
}

impl AttachOptions {
    pub(crate) fn query(&self) -> QueryString {
        QueryString::new()
            .param("logs", self.logs)
            .param("stream", self.stream)
            .param("stdin", self.stdin)
            .param("stdout", self.stdout)
            .param("stderr", self.stderr)
    }
}

// ---------------------------------------------------------------------------
// Typed bodies
// ---------------------------------------------------------------------------

/// Minimal body for `POST /containers/create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateContainerBody {
    pub image: ImageRef,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cmd: Vec<String>,
}

impl CreateContainerBody {
    pub fn new(image: &ImageRef, command: &[String]) -> Self {
        Self {
            image: image.clone(),
            cmd: command.to_vec(),
        }
    }
}

/// Success body of `POST /containers/create`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreatedContainer {
    pub id: ContainerId,
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
}

/// Success body of `POST /containers/{id}/wait`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WaitResponse {
    pub status_code: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_defaults() {
        let q = ListContainersOptions::default().query();
        assert_eq!(q.append_to("/containers/json"), "/containers/json?all=false");
    }

    #[test]
    fn test_list_all_fields() {
        let options = ListContainersOptions {
            all: true,
            limit: Some(3),
            since: Some("abc".to_owned()),
            before: Some(String::new()),
            size: Some(true),
            filters: Some(json!({"status": ["exited"]})),
        };
        assert_eq!(
            options.query().append_to("/containers/json"),
            "/containers/json?all=true&limit=3&since=abc&size=true\
             &filters=%7B%22status%22%3A%5B%22exited%22%5D%7D"
        );
    }

    #[test]
    fn test_log_defaults() {
        assert_eq!(
            LogOptions::default().query().append_to("/containers/x/logs"),
            "/containers/x/logs?follow=false&stdout=true&stderr=false&timestamps=false&tail=all"
        );
    }

    #[test]
    fn test_create_body_omits_empty_cmd() {
        let image = ImageRef::new("ubuntu:latest").unwrap();
        let body = serde_json::to_value(CreateContainerBody::new(&image, &[])).unwrap();
        assert_eq!(body, json!({"Image": "ubuntu:latest"}));

        let cmd = vec!["echo".to_owned(), "hi".to_owned()];
        let body = serde_json::to_value(CreateContainerBody::new(&image, &cmd)).unwrap();
        assert_eq!(body, json!({"Image": "ubuntu:latest", "Cmd": ["echo", "hi"]}));
    }
}
