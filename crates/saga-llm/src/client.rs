//! # Agent Client
//!
//! Core abstraction over the upstream narrative agent. One call to
//! [`AgentClient::generate`] is one streamed generation: zero or more
//! [`GenerationEvent::Delta`] values followed by exactly one
//! [`GenerationEvent::Finished`]. Clients are stateless and never retry.

use std::pin::Pin;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::errors::AgentError;

/// One generation request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRequest {
    /// Resumable upstream conversation, when one exists.
    pub handle: Option<String>,
    /// Context sent when starting a fresh conversation.
    pub context: Option<String>,
    /// The player's input.
    pub input: String,
}

impl AgentRequest {
    /// Continue an existing conversation.
    pub fn resume(handle: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            handle: Some(handle.into()),
            context: None,
            input: input.into(),
        }
    }

    /// Start a fresh conversation seeded with `context`.
    pub fn fresh(context: Option<String>, input: impl Into<String>) -> Self {
        Self {
            handle: None,
            context,
            input: input.into(),
        }
    }
}

/// How a generation ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TerminalStatus {
    /// Completed. `handle` resumes the conversation next turn.
    End {
        /// Resumable handle, if the service issued one.
        handle: Option<String>,
    },
    /// Stopped because the caller cancelled.
    TruncatedByAbort,
    /// The supplied handle is no longer valid upstream.
    HandleInvalid,
    /// Failed for any other reason.
    Error(AgentError),
}

impl TerminalStatus {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::End { .. } => "end",
            Self::TruncatedByAbort => "aborted",
            Self::HandleInvalid => "handle_invalid",
            Self::Error(_) => "error",
        }
    }
}

/// Item yielded by a [`GenerationStream`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GenerationEvent {
    /// Incremental text.
    Delta(String),
    /// Terminal status; always the last item.
    Finished(TerminalStatus),
}

/// Boxed stream returned by [`AgentClient::generate`].
pub type GenerationStream = Pin<Box<dyn Stream<Item = GenerationEvent> + Send>>;

/// Streaming narrative agent.
///
/// The returned stream is lazy: no request is made until it is polled.
/// Cancelling `cancel` makes the stream finish promptly with
/// [`TerminalStatus::TruncatedByAbort`].
pub trait AgentClient: Send + Sync {
    /// Model identity used for requests.
    fn model(&self) -> &str;

    /// Start a generation.
    fn generate(&self, request: AgentRequest, cancel: CancellationToken) -> GenerationStream;
}

/// Consume a stream to completion, concatenating deltas.
///
/// A stream that ends without a terminal item reports
/// [`AgentError::StreamIncomplete`].
pub async fn collect(mut stream: GenerationStream) -> (String, TerminalStatus) {
    let mut text = String::new();
    while let Some(event) = stream.next().await {
        match event {
            GenerationEvent::Delta(delta) => text.push_str(&delta),
            GenerationEvent::Finished(status) => return (text, status),
        }
    }
    (text, TerminalStatus::Error(AgentError::StreamIncomplete))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
