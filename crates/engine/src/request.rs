//! Request and raw-response values exchanged with a [`Transport`](crate::Transport).

use bytes::Bytes;
use serde_json::Value;

/// HTTP method used by the engine API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    /// Returns the method as an upper-case token.
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------

/// One engine API call.
///
/// `path` is relative to the API version prefix and already includes any query
/// string. The body, when present, is sent as `application/json`.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    /// Send `Accept: application/json`.
    pub accept_json: bool,
    /// The engine holds the response until a container changes state
    /// (`wait`, `stop`, a followed log). Transports apply no per-call
    /// timeout to such requests.
    pub blocking: bool,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            accept_json: false,
            blocking: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn accept_json(mut self, accept: bool) -> Self {
        self.accept_json = accept;
        self
    }

    /// Sets the `blocking` field.
    #[must_use]
    pub fn blocking(mut self) -> Self {
        self.blocking = true;
        self
    }
}

// ---------------------------------------------------------------------------

/// Status code and complete body of one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

// ---------------------------------------------------------------------------

/// How a call site wants its success body delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// Parse the body as JSON.
    Json,
    /// Keep the body as untouched bytes (log output, attach streams, empty 204s).
    Raw,
}

/// The success criterion and body kind of one endpoint.
///
/// The engine API is inconsistent about success codes (200, 201, 204, 101), so
/// each endpoint states the one it documents. 200 is always accepted too.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expectation {
    pub success_code: u16,
    pub body: BodyKind,
}

impl Expectation {
    /// JSON body, success on `code` or 200.
    pub const fn json(code: u16) -> Self {
        Self {
            success_code: code,
            body: BodyKind::Json,
        }
    }

    /// Raw body, success on `code` or 200.
    pub const fn raw(code: u16) -> Self {
        Self {
            success_code: code,
            body: BodyKind::Raw,
        }
    }

    /// Returns `true` if `status` counts as success for this expectation.
    pub fn is_success(self, status: u16) -> bool {
        status == self.success_code || status == 200
    }
}
