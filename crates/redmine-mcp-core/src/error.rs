//! Error types for redmine-mcp.

use serde_json::Value;
use thiserror::Error;

/// Category of a failed backend call, derived from the HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
    /// 401: missing or invalid credentials
    Authentication,
    /// 403: credentials lack permission
    Authorization,
    /// 404
    NotFound,
    /// 422: the backend rejected the payload
    Validation,
    /// 5xx, timeouts and network failures
    Server,
    /// Any other unexpected status
    Generic,
}

impl ApiErrorKind {
    /// Stable type name used in tool envelopes and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiErrorKind::Authentication => "AuthenticationError",
            ApiErrorKind::Authorization => "AuthorizationError",
            ApiErrorKind::NotFound => "NotFoundError",
            ApiErrorKind::Validation => "ValidationError",
            ApiErrorKind::Server => "ServerError",
            ApiErrorKind::Generic => "RedmineError",
        }
    }
}

impl std::fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by the Redmine REST API.
///
/// Always carries the originating HTTP status (when one was received) and
/// the best-effort parsed response body. Malformed bodies degrade to `{}`.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
    pub status: Option<u16>,
    pub response_body: Value,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>, status: Option<u16>) -> Self {
        Self {
            kind,
            message: message.into(),
            status,
            response_body: empty_object(),
        }
    }

    /// Attach the parsed response body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.response_body = body;
        self
    }

    /// Request exceeded the read timeout.
    pub fn timeout(elapsed: std::time::Duration) -> Self {
        Self::new(
            ApiErrorKind::Server,
            format!(
                "Request timeout after {} seconds",
                elapsed.as_secs_f64()
            ),
            Some(408),
        )
    }

    /// Transport-level failure with no HTTP status.
    pub fn network(message: impl std::fmt::Display) -> Self {
        Self::new(
            ApiErrorKind::Server,
            format!("Network error: {}", message),
            None,
        )
    }

    /// Map a non-success HTTP status and raw body to a domain error.
    ///
    /// Returns `None` for the statuses the gateway treats as success
    /// (200, 201, 204, 207).
    pub fn from_response(status: u16, body_text: &str) -> Option<Self> {
        let body = parse_body(body_text);
        let error = match status {
            200 | 201 | 204 | 207 => return None,
            401 => Self::new(
                ApiErrorKind::Authentication,
                "Invalid or missing API key",
                Some(status),
            ),
            403 => Self::new(
                ApiErrorKind::Authorization,
                "Insufficient permissions",
                Some(status),
            ),
            404 => Self::new(ApiErrorKind::NotFound, "Resource not found", Some(status)),
            422 => Self::new(
                ApiErrorKind::Validation,
                format!("Validation failed: {}", extract_errors(&body).join(", ")),
                Some(status),
            ),
            500..=599 => Self::new(
                ApiErrorKind::Server,
                format!("Server error ({})", status),
                Some(status),
            ),
            _ => Self::new(
                ApiErrorKind::Generic,
                format!("Unexpected response ({})", status),
                Some(status),
            ),
        };
        Some(error.with_body(body))
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Parse a response body, degrading to `{}` when empty or malformed.
pub fn parse_body(body_text: &str) -> Value {
    if body_text.trim().is_empty() {
        return empty_object();
    }
    serde_json::from_str(body_text).unwrap_or_else(|_| empty_object())
}

/// Collect validation messages from a 422 body.
fn extract_errors(body: &Value) -> Vec<String> {
    let Some(obj) = body.as_object() else {
        return Vec::new();
    };

    if let Some(errors) = obj.get("errors") {
        match errors {
            Value::Array(items) => items.iter().map(value_to_message).collect(),
            other => vec![value_to_message(other)],
        }
    } else if let Some(error) = obj.get("error") {
        vec![value_to_message(error)]
    } else {
        vec!["Unknown error".to_string()]
    }
}

fn value_to_message(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Main error type for redmine-mcp operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The backend returned an error or could not be reached
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Tool parameters did not match the declared schema
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// Auto-pagination hit the page ceiling
    #[error(
        "Maximum pagination limit reached ({max_pages} pages). \
         Use incremental page processing or filter your query."
    )]
    PaginationLimit { max_pages: u32 },

    /// Rejected base URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Stable type name used in tool envelopes, batch results, and metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            Error::Api(e) => e.kind.as_str(),
            Error::InvalidParams(_) => "InvalidParams",
            Error::PaginationLimit { .. } => "PaginationLimitExceeded",
            _ => "Error",
        }
    }

    /// HTTP status behind the error, if it came from the backend.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api(e) => e.status,
            _ => None,
        }
    }

    /// Message without the variant prefix, as shown to peers.
    pub fn user_message(&self) -> String {
        match self {
            Error::InvalidParams(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type alias for redmine-mcp operations.
pub type Result<T> = std::result::Result<T, Error>;
