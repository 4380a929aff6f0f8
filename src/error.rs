//! Unified error types.
//!
//! Two families live here:
//!
//! - [`Error`] surfaces startup and infrastructure failures: a malformed
//!   entity schema or handler signature, a driver error, a bad config file.
//! - [`ApiError`] is raised on purpose by handler code. The adapter turns it
//!   into a structured `{"error", "data", "message"}` result instead of a
//!   server fault.
//!
//! Client errors (missing content type, missing argument, ...) are neither:
//! they are expressed as `400` [`Response`](crate::Response) values.

use serde::Serialize;
use serde_json::{Map, Value};

/// The error type returned by awe's fallible operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An entity type declares zero or several primary keys, or was queried
    /// before registration.
    #[error("schema error for `{entity}`: {reason}")]
    Schema {
        entity: String,
        reason: String,
    },

    /// A handler signature breaks the parameter ordering rules.
    #[error("invalid signature for handler `{handler}`: {reason}")]
    Signature {
        handler: String,
        reason: String,
    },

    /// A route could not be registered.
    #[error("invalid route `{path}`: {reason}")]
    Route {
        path: String,
        reason: String,
    },

    /// A `LIMIT` specification that is neither a count nor an `(offset, count)` pair.
    #[error("invalid limit value: {0}")]
    InvalidLimit(String),

    /// Driver or connection failure, passed through untouched.
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    /// A row could not be mapped onto an entity, or an entity onto values.
    #[error("decode: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("template `{name}`: {reason}")]
    Template {
        name: String,
        reason: String,
    },

    /// Binding to a port or accepting a connection.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn schema(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Schema { entity: entity.into(), reason: reason.into() }
    }

    pub(crate) fn signature(handler: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Signature { handler: handler.into(), reason: reason.into() }
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}

/// A domain-level error raised by handler code.
///
/// `error` is a short machine-readable code such as `value:invalid`, `data`
/// names the offending field (or carries any payload) and `message` is meant
/// for humans.
///
/// ```rust
/// use awe::ApiError;
///
/// let err = ApiError::value_error("email", "invalid email");
/// assert_eq!(err.error, "value:invalid");
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, thiserror::Error)]
#[error("{error}: {message}")]
pub struct ApiError {
    pub error: String,
    pub data: Value,
    pub message: String,
}

impl ApiError {
    pub fn new(error: impl Into<String>, data: impl Into<Value>, message: impl Into<String>) -> Self {
        Self { error: error.into(), data: data.into(), message: message.into() }
    }

    /// The input value is missing or malformed.
    pub fn value_error(field: &str, message: impl Into<String>) -> Self {
        Self::new("value:invalid", field, message)
    }

    /// The requested resource does not exist.
    pub fn not_found(field: &str, message: impl Into<String>) -> Self {
        Self::new("value:notfound", field, message)
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::new("permission:forbidden", "permission", message)
    }

    /// The structured mapping handed to response normalization.
    pub fn into_map(self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("error".to_owned(), Value::String(self.error));
        map.insert("data".to_owned(), self.data);
        map.insert("message".to_owned(), Value::String(self.message));
        map
    }
}
