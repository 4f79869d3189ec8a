//! Rate-limited model orchestration for the architecture wizard.
//!
//! Turns a product idea plus wizard answers into an architecture graph, a
//! technology stack and free-text explanations by calling an OpenAI-compatible
//! chat-completion endpoint. Every call goes through a single FIFO queue,
//! every answer is sanitized, and every failure degrades to a deterministic
//! fallback.
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(clippy::result_large_err)]

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Path of the chat-completion endpoint, relative to the base URL.
pub const COMPLETIONS_PATH: &str = "chat/completions";

/// Default caller-identifying header value.
pub(crate) const DEFAULT_CLIENT_HEADER: &str =
    concat!("archwizard-rust/", env!("CARGO_PKG_VERSION"));

/// HTTP header carrying the caller identity.
pub const CLIENT_TITLE_HEADER: &str = "X-Title";

/// HTTP header carrying the caller's referring site.
pub const REFERER_HEADER: &str = "HTTP-Referer";

/// HTTP header name for request ID tracing.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Default connection timeout (5 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Default per-call timeout (60 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

/// Default minimum spacing between two dispatched calls.
pub const DEFAULT_MIN_INTERVAL: std::time::Duration = std::time::Duration::from_millis(350);

/// Environment variable for development-only credential injection.
pub const ENV_API_KEY: &str = "ARCHWIZARD_API_KEY";

/// Environment variable overriding the minimum request interval (milliseconds).
pub const ENV_MIN_INTERVAL_MS: &str = "ARCHWIZARD_MIN_INTERVAL_MS";

mod client;
mod credentials;
mod errors;
pub mod fallback;
mod gateway;
mod generate;
mod http;
pub mod policy;
mod scheduler;
pub mod tasks;
mod telemetry;
pub mod testing;
mod types;
pub mod validate;

pub use client::{Client, Config, ConnectivityReport, ConnectivityStatus};
pub use credentials::{Credential, CredentialStore};
pub use errors::{
    APIError, ApiErrorKind, Error, Result, TransportError, TransportErrorKind, ValidationError,
};
pub use gateway::{BoxFuture, ChatGateway, HttpGateway};
pub use generate::{
    GenerationClient, MAX_DESCRIPTION_CHARS, MAX_EXPLANATION_CHARS, MAX_QUESTIONS_CHARS,
};
pub use http::{HeaderEntry, HeaderList};
pub use policy::{ContentPolicy, SubstringScreen};
pub use scheduler::{QueuedResponse, RequestScheduler};
pub use telemetry::{DispatchMetrics, FallbackMetrics, MetricsCallbacks};
pub use types::{
    ChatMessage, ComponentRef, MessageRole, Model, NodeType, Priority, RequirementValue,
    Requirements, TaskKind, TaskRequest, TechStackEntry, WorkflowNode, KNOWN_MODELS,
};
