use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured validation error raised when untrusted model output does not
/// fit the expected shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(field) = &self.field {
            write!(f, "{}: {}", field, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<String> for ValidationError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ValidationError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Classification of a non-2xx upstream response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// 401: the credential was rejected.
    Unauthorized,
    /// 402: the upstream account lacks usage credit.
    InsufficientBalance,
    /// 429: rate limited. Never retried.
    RateLimited,
    /// Any other non-success status.
    Upstream,
}

impl ApiErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ApiErrorKind::Unauthorized,
            402 => ApiErrorKind::InsufficientBalance,
            429 => ApiErrorKind::RateLimited,
            _ => ApiErrorKind::Upstream,
        }
    }
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ApiErrorKind::Unauthorized => "unauthorized",
            ApiErrorKind::InsufficientBalance => "insufficient balance",
            ApiErrorKind::RateLimited => "rate limited",
            ApiErrorKind::Upstream => "upstream error",
        };
        write!(f, "{label}")
    }
}

/// Error envelope returned by the chat-completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct APIError {
    pub status: u16,
    pub code: Option<String>,
    pub message: String,
    pub request_id: Option<String>,
    /// Raw response body for debugging (when available).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_body: Option<String>,
}

impl APIError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            code: None,
            message: message.into(),
            request_id: None,
            raw_body: None,
        }
    }

    pub fn kind(&self) -> ApiErrorKind {
        ApiErrorKind::from_status(self.status)
    }
}

impl fmt::Display for APIError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.kind(), self.status, self.message)
    }
}

impl std::error::Error for APIError {}

/// Convenience alias for fallible results.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Transport-level error (timeouts, connectivity, empty completions).
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
    #[source]
    pub source: Option<reqwest::Error>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }
}

/// Broad transport error kinds for classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Request,
    /// The endpoint answered 2xx but carried no completion text.
    EmptyResponse,
    /// The scheduler worker is gone and can no longer settle calls.
    QueueClosed,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Request => "request",
            TransportErrorKind::EmptyResponse => "empty response",
            TransportErrorKind::QueueClosed => "queue closed",
            TransportErrorKind::Other => "transport",
        };
        write!(f, "{label}")
    }
}

/// Unified error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("no credential set")]
    NoCredential,

    #[error("{0}")]
    Api(#[from] APIError),

    #[error("{0}")]
    Transport(#[from] TransportError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("malformed response: {0}")]
    Malformed(#[from] ValidationError),

    #[error("unsafe content detected (matched {pattern:?})")]
    UnsafeContent { pattern: String },

    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Credential errors need user action and are never papered over.
    pub fn is_credential_error(&self) -> bool {
        matches!(self, Error::InvalidCredential(_) | Error::NoCredential)
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::Api(e) if e.kind() == ApiErrorKind::RateLimited)
    }

    pub fn is_insufficient_balance(&self) -> bool {
        matches!(self, Error::Api(e) if e.kind() == ApiErrorKind::InsufficientBalance)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Transport(t) if t.kind == TransportErrorKind::Timeout)
    }

    /// Short label used by logs and fallback metrics.
    pub(crate) fn reason(&self) -> &'static str {
        match self {
            Error::InvalidCredential(_) => "invalid_credential",
            Error::NoCredential => "no_credential",
            Error::Api(e) => match e.kind() {
                ApiErrorKind::Unauthorized => "unauthorized",
                ApiErrorKind::InsufficientBalance => "insufficient_balance",
                ApiErrorKind::RateLimited => "rate_limited",
                ApiErrorKind::Upstream => "upstream",
            },
            Error::Transport(t) => match t.kind {
                TransportErrorKind::Timeout => "timeout",
                TransportErrorKind::EmptyResponse => "empty_response",
                TransportErrorKind::QueueClosed => "queue_closed",
                _ => "transport",
            },
            Error::Serialization(_) => "serialization",
            Error::Malformed(_) => "malformed",
            Error::UnsafeContent { .. } => "unsafe_content",
            Error::Config(_) => "config",
        }
    }
}
