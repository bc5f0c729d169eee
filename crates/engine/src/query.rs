//! Query-string encoding for engine API paths.
//!
//! Every optional endpoint parameter is one of four kinds: string, boolean,
//! integer, or a structured JSON object (used by `filters`). Each kind has its
//! own notion of "unset", and unset parameters are left off the wire entirely
//! so the engine applies its own default.
//!
//! | Kind | Unset when | Rendered as |
//! |------|------------|-------------|
//! | [`QueryValue::Str`] | empty | the string |
//! | [`QueryValue::Bool`] | never | `true` / `false` |
//! | [`QueryValue::Int`] | equal to [`UNSET_INT`] | decimal |
//! | [`QueryValue::Json`] | not an object | minified JSON text |
//!
//! Rendered values are percent-encoded. ASCII alphanumerics and `-_.~` pass
//! through unchanged, so simple values look exactly as the engine expects.

use serde_json::Value;

/// Integer sentinel meaning "parameter not supplied".
pub const UNSET_INT: i64 = -1;

/// A typed query parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    /// Free-form string; omitted when empty.
    Str(String),
    /// Boolean flag; always emitted.
    Bool(bool),
    /// Integer; omitted when equal to [`UNSET_INT`].
    Int(i64),
    /// Structured value; emitted only for JSON objects.
    Json(Value),
}

impl QueryValue {
    /// Renders the raw (unescaped) text of this value, or `None` when unset.
    fn render(&self) -> Option<String> {
        match self {
            QueryValue::Str(s) if s.is_empty() => None,
            QueryValue::Str(s) => Some(s.clone()),
            QueryValue::Bool(b) => Some(b.to_string()),
            QueryValue::Int(UNSET_INT) => None,
            QueryValue::Int(n) => Some(n.to_string()),
            QueryValue::Json(v @ Value::Object(_)) => Some(v.to_string()),
            QueryValue::Json(_) => None,
        }
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Str(value.to_owned())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Str(value)
    }
}

impl From<&String> for QueryValue {
    fn from(value: &String) -> Self {
        QueryValue::Str(value.clone())
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        QueryValue::Bool(value)
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        QueryValue::Int(value)
    }
}

impl From<i32> for QueryValue {
    fn from(value: i32) -> Self {
        QueryValue::Int(i64::from(value))
    }
}

impl From<u32> for QueryValue {
    fn from(value: u32) -> Self {
        QueryValue::Int(i64::from(value))
    }
}

impl From<Value> for QueryValue {
    fn from(value: Value) -> Self {
        QueryValue::Json(value)
    }
}

/// Encodes one parameter as `&name=value`, or the empty string when unset.
///
/// Never fails.
pub fn encode_param(name: &str, value: &QueryValue) -> String {
    match value.render() {
        Some(text) => format!("&{name}={}", urlencoding::encode(&text)),
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------

/// Accumulates encoded parameters for one request path.
///
/// ```
/// use engine::QueryString;
///
/// let path = QueryString::new()
///     .param("all", true)
///     .param("limit", 10_i64)
///     .param("since", "")
///     .append_to("/containers/json");
/// assert_eq!(path, "/containers/json?all=true&limit=10");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryString(String);

impl QueryString {
    /// Creates an empty query string.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `name` with the given value (dropped if the value is unset).
    #[must_use]
    pub fn param(mut self, name: &str, value: impl Into<QueryValue>) -> Self {
        self.0.push_str(&encode_param(name, &value.into()));
        self
    }

    /// Appends `name` only when `value` is `Some`.
    #[must_use]
    pub fn param_opt<V: Into<QueryValue>>(self, name: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.param(name, v),
            None => self,
        }
    }

    /// Returns `true` if no parameter has been emitted.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `path` with this query string attached.
    pub fn append_to(&self, path: &str) -> String {
        match self.0.strip_prefix('&') {
            Some(params) => format!("{path}?{params}"),
            None => path.to_owned(),
        }
    }
}

impl std::fmt::Display for QueryString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
