//! Error types for the agent API client.

use thiserror::Error;

/// Client error type.
///
/// Every variant is surfaced to the immediate caller. Nothing in this crate
/// retries or suppresses an error.
#[derive(Error, Debug)]
pub enum Error {
    /// The request failed before any HTTP response arrived.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The API returned a non-success status.
    #[error("API Error: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Machine-readable error code from the body (`HTTP_ERROR` when synthesized).
        code: String,
        /// Human-readable message from the body.
        message: String,
    },

    /// The API returned 404 for the requested agent or run.
    #[error("API Error: {message}")]
    NotFound {
        /// Human-readable message from the body.
        message: String,
    },

    /// The local deadline passed before the run reached a terminal state.
    ///
    /// The remote run may still complete afterwards.
    #[error("Timed out waiting for run {run_id} after {timeout_ms}ms")]
    Timeout {
        /// Run that was being waited on.
        run_id: String,
        /// Configured timeout.
        timeout_ms: u64,
    },

    /// A tool authorization was still pending when the local deadline passed.
    #[error("Timed out waiting for authorization {authorization_id} after {timeout_ms}ms")]
    AuthorizationTimeout {
        /// Authorization that was being waited on.
        authorization_id: String,
        /// Configured timeout.
        timeout_ms: u64,
    },

    /// The caller stopped waiting. The remote run is not cancelled.
    #[error("Stopped waiting for run {run_id}")]
    Cancelled {
        /// Run that was being waited on.
        run_id: String,
    },

    /// A member of a batch failed, failing the whole batch.
    #[error("Batch failed at input {index}: {source}")]
    Batch {
        /// Position of the failing input.
        index: usize,
        /// The member's error.
        #[source]
        source: Box<Error>,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A tool execution reported failure.
    #[error("Tool {tool} failed: {message}")]
    Tool {
        /// Fully qualified tool name.
        tool: String,
        /// Failure message reported by the tool.
        message: String,
    },

    /// Tool authorization ended without being granted.
    #[error("Authorization for {tool} ended with status {status}")]
    Authorization {
        /// Fully qualified tool name.
        tool: String,
        /// Final authorization status.
        status: String,
    },
}

impl Error {
    /// HTTP status of an API error, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::NotFound { .. } => Some(404),
            Self::Batch { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Whether the remote reported the resource missing.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
