//! Wire-stable error codes.
//!
//! Every failure the orchestrator surfaces to a transport carries one of
//! these codes so the transport can always render a user-facing message
//! without matching on error strings.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Error taxonomy surfaced in `error` status events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Input refused by the local policy filter. Never retried.
    InputRejected,
    /// Input refused because the pending queue is at capacity.
    QueueFull,
    /// Mid-stream agent or network failure. Retryable by resubmitting.
    GenerationError,
    /// Upstream rejected the resumable handle and recovery did not help.
    HandleInvalid,
    /// A compaction attempt failed; history is unchanged.
    CompactionError,
    /// A durable write failed; the last committed record is authoritative.
    PersistenceError,
    /// `abort` called while no generation is running.
    NotRunning,
    /// Operation is idle-gated and the session is busy.
    Busy,
    /// The session actor has shut down.
    SessionClosed,
}

impl ErrorCode {
    /// Stable snake-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InputRejected => "input_rejected",
            Self::QueueFull => "queue_full",
            Self::GenerationError => "generation_error",
            Self::HandleInvalid => "handle_invalid",
            Self::CompactionError => "compaction_error",
            Self::PersistenceError => "persistence_error",
            Self::NotRunning => "not_running",
            Self::Busy => "busy",
            Self::SessionClosed => "session_closed",
        }
    }

    /// Whether the player (or the next threshold check) can usefully retry.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::QueueFull | Self::GenerationError | Self::CompactionError | Self::Busy
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
