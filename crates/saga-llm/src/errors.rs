//! Agent and summarizer error types.

use thiserror::Error;

/// Failures reported by an agent call.
///
/// Carried inside [`TerminalStatus::Error`](crate::client::TerminalStatus),
/// so it owns only plain data and can be cloned into events.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AgentError {
    /// Connection, timeout, or body read failure.
    #[error("network error: {message}")]
    Network {
        /// Error description.
        message: String,
        /// Whether the request can be retried.
        retryable: bool,
    },

    /// Non-success HTTP status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error description.
        message: String,
        /// Service-specific error code.
        code: Option<String>,
        /// Whether the request can be retried.
        retryable: bool,
    },

    /// Error event emitted mid-stream by the service.
    #[error("agent error ({code}): {message}")]
    Remote {
        /// Service-specific error code.
        code: String,
        /// Error description.
        message: String,
        /// Whether the request can be retried.
        retryable: bool,
    },

    /// Stream payload could not be decoded.
    #[error("parse error: {message}")]
    Parse {
        /// Error description.
        message: String,
    },

    /// The body ended without an `end` or `error` event.
    #[error("stream ended without a terminal event")]
    StreamIncomplete,
}

impl AgentError {
    /// Whether resubmitting the same input may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { retryable, .. }
            | Self::Api { retryable, .. }
            | Self::Remote { retryable, .. } => *retryable,
            Self::StreamIncomplete => true,
            Self::Parse { .. } => false,
        }
    }

    /// Error category string for logs and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Network { .. } | Self::StreamIncomplete => "network",
            Self::Api { status: 429, .. } => "rate_limit",
            Self::Api { .. } => "api",
            Self::Remote { .. } => "remote",
            Self::Parse { .. } => "parse",
        }
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(e: reqwest::Error) -> Self {
        let retryable = e.is_timeout()
            || e.is_connect()
            || e.is_body()
            || e.status().is_some_and(|s| {
                s == reqwest::StatusCode::TOO_MANY_REQUESTS || s.is_server_error()
            });
        Self::Network {
            message: e.to_string(),
            retryable,
        }
    }
}

/// Failures from a summarization call.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SummarizeError {
    /// The underlying agent call failed.
    #[error("summarizer agent failed: {0}")]
    Agent(#[from] AgentError),

    /// The agent returned no usable text.
    #[error("summarizer returned an empty digest")]
    EmptyDigest,

    /// The call ended without producing a digest (aborted or handle rejected).
    #[error("summarizer call interrupted: {0}")]
    Interrupted(String),

    /// Nothing to summarize.
    #[error("no entries to summarize")]
    NoEntries,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
