//! The uniform result wrapper around every engine API call.
//!
//! A [`ResponseEnvelope`] is either a success carrying a [`Payload`] or a
//! [`Failure`] carrying a status code and the engine's error body. Because the
//! two cases are enum variants, "a code is present iff the call failed" holds
//! by construction.
//!
//! Serialised, an envelope has the external shape
//!
//! ```json
//! { "success": false, "code": 404, "data": { "message": "No such container: 5d27..." } }
//! { "success": true,  "data": { "Architecture": "x86_64", "...": "..." } }
//! ```
//!
//! ## Classification
//!
//! [`ResponseEnvelope::classify`] turns a status/body pair into an envelope:
//!
//! 1. The status is a success if it equals the endpoint's expected code **or**
//!    200.
//! 2. On success the body is kept as bytes, length and all (log payloads carry
//!    NUL and non-UTF-8 bytes). JSON-typed endpoints then parse it; a parse
//!    failure becomes [`FailureKind::MalformedBody`] instead of an empty
//!    document.
//! 3. On failure the body is parsed as the engine's JSON error object. Bodies
//!    that are not JSON are wrapped as `{"message": "<text>"}`; empty bodies
//!    become `{}`.
//!
//! Transport errors become [`FailureKind::Transport`] with code
//! [`TRANSPORT_FAILURE_CODE`]. Nothing here panics.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::{BodyKind, EnvelopeError, Expectation, RawResponse, TransportError};

/// Code carried by failures that never reached an HTTP status.
pub const TRANSPORT_FAILURE_CODE: u16 = 0;

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// The `data` of a successful call.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Parsed JSON body of a JSON-typed endpoint.
    Json(Value),
    /// Untouched body bytes of a raw endpoint.
    Raw(Bytes),
}

impl Payload {
    /// Returns the JSON value, if this payload is JSON.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(v) => Some(v),
            Payload::Raw(_) => None,
        }
    }

    /// Returns the raw bytes, if this payload is raw.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Payload::Json(_) => None,
            Payload::Raw(b) => Some(b),
        }
    }

    /// Converts the payload into a JSON value for external serialisation.
    ///
    /// Raw bytes become a JSON string; invalid UTF-8 sequences are replaced
    /// with U+FFFD.
    pub fn to_value(&self) -> Value {
        match self {
            Payload::Json(v) => v.clone(),
            Payload::Raw(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure
// ---------------------------------------------------------------------------

/// Why a call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The request never produced an HTTP status.
    Transport,
    /// The engine answered with a status that is not a success for this call.
    Status,
    /// The status was a success but the JSON body could not be parsed.
    MalformedBody,
}

/// The `code` and `data` of a failed call.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub kind: FailureKind,
    /// Observed HTTP status, or [`TRANSPORT_FAILURE_CODE`].
    pub code: u16,
    /// The engine's error body (normally `{"message": ...}`).
    pub data: Value,
}

impl Failure {
    /// Returns the `message` field of the error body, if present.
    pub fn message(&self) -> Option<&str> {
        self.data.get("message").and_then(Value::as_str)
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.message() {
            Some(message) => write!(f, "{} ({})", message, self.code),
            None => write!(f, "engine call failed ({})", self.code),
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Discriminated result of one engine API call.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEnvelope {
    Success(Payload),
    Failure(Failure),
}

impl ResponseEnvelope {
    /// Classifies a status/body pair according to an endpoint's expectation.
    pub fn classify(response: RawResponse, expect: Expectation) -> Self {
        let RawResponse { status, body } = response;

        if !expect.is_success(status) {
            debug!(status, expected = expect.success_code, "engine returned failure status");
            return ResponseEnvelope::Failure(Failure {
                kind: FailureKind::Status,
                code: status,
                data: parse_error_body(&body),
            });
        }

        match expect.body {
            BodyKind::Raw => ResponseEnvelope::Success(Payload::Raw(body)),
            BodyKind::Json => match parse_success_body(&body) {
                Ok(value) => ResponseEnvelope::Success(Payload::Json(value)),
                Err(e) => {
                    debug!(status, error = %e, "success body is not valid JSON");
                    ResponseEnvelope::Failure(Failure {
                        kind: FailureKind::MalformedBody,
                        code: status,
                        data: json!({ "message": format!("invalid JSON in response body: {e}") }),
                    })
                }
            },
        }
    }

    /// Builds the failure envelope for a request that never got a status.
    pub fn transport_failure(error: &TransportError) -> Self {
        ResponseEnvelope::Failure(Failure {
            kind: FailureKind::Transport,
            code: TRANSPORT_FAILURE_CODE,
            data: json!({ "message": error.to_string() }),
        })
    }

    /// Classifies the outcome of a [`Transport::execute`](crate::Transport::execute) call.
    pub fn from_result(result: Result<RawResponse, TransportError>, expect: Expectation) -> Self {
        match result {
            Ok(response) => Self::classify(response, expect),
            Err(e) => Self::transport_failure(&e),
        }
    }

    /// Returns `true` for a success envelope.
    pub fn success(&self) -> bool {
        matches!(self, ResponseEnvelope::Success(_))
    }

    /// Returns the failure code; `None` exactly when the call succeeded.
    pub fn code(&self) -> Option<u16> {
        match self {
            ResponseEnvelope::Success(_) => None,
            ResponseEnvelope::Failure(f) => Some(f.code),
        }
    }

    /// Returns the `data` member as it appears in the serialised envelope.
    pub fn data(&self) -> Value {
        match self {
            ResponseEnvelope::Success(p) => p.to_value(),
            ResponseEnvelope::Failure(f) => f.data.clone(),
        }
    }

    pub fn payload(&self) -> Option<&Payload> {
        match self {
            ResponseEnvelope::Success(p) => Some(p),
            ResponseEnvelope::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            ResponseEnvelope::Success(_) => None,
            ResponseEnvelope::Failure(f) => Some(f),
        }
    }

    /// Returns the JSON payload of a successful JSON-typed call.
    pub fn json(&self) -> Option<&Value> {
        self.payload().and_then(Payload::as_json)
    }

    /// Returns the body bytes of a successful raw call.
    pub fn bytes(&self) -> Option<&Bytes> {
        self.payload().and_then(Payload::as_bytes)
    }

    /// Converts into a `Result`, for callers that prefer `?`.
    pub fn into_result(self) -> Result<Payload, Failure> {
        match self {
            ResponseEnvelope::Success(p) => Ok(p),
            ResponseEnvelope::Failure(f) => Err(f),
        }
    }

    /// Deserialises the JSON payload into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, EnvelopeError> {
        match self {
            ResponseEnvelope::Success(Payload::Json(v)) => Ok(T::deserialize(v)?),
            ResponseEnvelope::Success(Payload::Raw(_)) => Err(EnvelopeError::NotJson),
            ResponseEnvelope::Failure(f) => Err(EnvelopeError::Failed {
                code: f.code,
                message: f.message().unwrap_or("no error message").to_owned(),
            }),
        }
    }
}

impl Serialize for ResponseEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ResponseEnvelope::Success(payload) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("success", &true)?;
                map.serialize_entry("data", &payload.to_value())?;
                map.end()
            }
            ResponseEnvelope::Failure(failure) => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("success", &false)?;
                map.serialize_entry("code", &failure.code)?;
                map.serialize_entry("data", &failure.data)?;
                map.end()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Body parsing
// ---------------------------------------------------------------------------

fn is_blank(body: &[u8]) -> bool {
    body.iter().all(u8::is_ascii_whitespace)
}

/// Parses a JSON success body. An empty body is `null`, not an error.
fn parse_success_body(body: &[u8]) -> Result<Value, serde_json::Error> {
    if is_blank(body) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body)
}

/// Parses an engine error body, falling back to a `message` wrapper.
fn parse_error_body(body: &[u8]) -> Value {
    if is_blank(body) {
        return Value::Object(Map::new());
    }
    match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(_) => {
            let text = String::from_utf8_lossy(body);
            json!({ "message": text.trim() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn envelope(status: u16, body: &'static [u8], expect: Expectation) -> ResponseEnvelope {
        ResponseEnvelope::classify(RawResponse::new(status, Bytes::from_static(body)), expect)
    }

    #[test]
    fn test_expected_code_is_success() {
        let env = envelope(201, br#"{"Id":"abc123","Warnings":[]}"#, Expectation::json(201));
        assert!(env.success());
        assert_eq!(env.code(), None);
        assert_eq!(env.json().unwrap()["Id"], "abc123");
    }

    #[test]
    fn test_200_is_always_success() {
        let env = envelope(200, b"", Expectation::raw(204));
        assert!(env.success());

        let env = envelope(200, br#"{"Running":true}"#, Expectation::json(201));
        assert!(env.success());
    }

    #[test]
    fn test_other_2xx_is_failure_when_not_expected() {
        let env = envelope(204, b"", Expectation::json(201));
        assert!(!env.success());
        assert_eq!(env.code(), Some(204));
    }

    #[test]
    fn test_code_present_iff_failure() {
        let cases: &[(u16, &[u8], Expectation)] = &[
            (200, &b"{}"[..], Expectation::json(200)),
            (204, &b""[..], Expectation::raw(204)),
            (101, &b"\x01\0\0\0\0\0\0\0"[..], Expectation::raw(101)),
            (404, &br#"{"message":"No such container: x"}"#[..], Expectation::json(200)),
            (500, &b"not json"[..], Expectation::raw(204)),
            (201, &b"{oops"[..], Expectation::json(201)),
            (0, &b""[..], Expectation::json(200)),
        ];
        for (status, body, expect) in cases {
            let env = ResponseEnvelope::classify(
                RawResponse::new(*status, Bytes::copy_from_slice(body)),
                *expect,
            );
            assert_eq!(env.success(), env.code().is_none(), "status {status}");
        }
    }

    #[test]
    fn test_raw_body_keeps_nul_and_non_utf8_bytes() {
        let body: &'static [u8] = b"\x01\x00\x00\x00\x00\x00\x00\x03a\x00\xff";
        let env = envelope(200, body, Expectation::raw(200));
        assert_eq!(env.bytes().unwrap().as_ref(), body);
    }

    #[test]
    fn test_error_body_is_parsed() {
        let env = envelope(404, br#"{"message":"No such container: abc"}"#, Expectation::json(200));
        let failure = env.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Status);
        assert_eq!(failure.code, 404);
        assert_eq!(failure.message(), Some("No such container: abc"));
    }

    #[test]
    fn test_malformed_error_bodies_are_tolerated() {
        let env = envelope(502, b"Bad Gateway\n", Expectation::json(200));
        assert_eq!(env.failure().unwrap().message(), Some("Bad Gateway"));

        let env = envelope(500, b"", Expectation::raw(204));
        assert_eq!(env.data(), json!({}));
    }

    #[test]
    fn test_malformed_success_json_is_distinct_failure() {
        let env = envelope(200, b"{\"Id\": ", Expectation::json(200));
        let failure = env.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::MalformedBody);
        assert_eq!(failure.code, 200);
        assert!(failure.message().unwrap().starts_with("invalid JSON"));
    }

    #[test]
    fn test_empty_json_success_is_null() {
        let env = envelope(200, b"", Expectation::json(200));
        assert_eq!(env.json(), Some(&Value::Null));
    }

    #[test]
    fn test_transport_failure_uses_sentinel_code() {
        let err = TransportError::Timeout(std::time::Duration::from_secs(3));
        let env = ResponseEnvelope::from_result(Err(err), Expectation::json(200));
        assert_eq!(env.code(), Some(TRANSPORT_FAILURE_CODE));
        assert_eq!(env.failure().unwrap().kind, FailureKind::Transport);
    }

    #[test]
    fn test_serialised_shape() {
        let ok = envelope(200, br#"{"ID":"x"}"#, Expectation::json(200));
        assert_eq!(serde_json::to_value(&ok).unwrap(), json!({"success": true, "data": {"ID": "x"}}));

        let err = envelope(409, br#"{"message":"conflict"}"#, Expectation::json(201));
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({"success": false, "code": 409, "data": {"message": "conflict"}})
        );

        let raw = envelope(200, b"hi", Expectation::raw(200));
        assert_eq!(serde_json::to_value(&raw).unwrap(), json!({"success": true, "data": "hi"}));
    }

    #[test]
    fn test_decode() {
        #[derive(Deserialize)]
        #[serde(rename_all = "PascalCase")]
        struct Created {
            id: String,
        }

        let env = envelope(201, br#"{"Id":"abc123"}"#, Expectation::json(201));
        assert_eq!(env.decode::<Created>().unwrap().id, "abc123");

        let env = envelope(204, b"", Expectation::raw(204));
        assert!(matches!(env.decode::<Created>(), Err(EnvelopeError::NotJson)));

        let env = envelope(404, br#"{"message":"gone"}"#, Expectation::json(201));
        assert!(matches!(
            env.decode::<Created>(),
            Err(EnvelopeError::Failed { code: 404, .. })
        ));
    }
}
