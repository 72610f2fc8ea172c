//! Runtime error types.

use saga_core::ErrorCode;
use saga_store::StoreError;

use crate::input_policy::PolicyViolation;

/// Errors returned by session operations.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Input refused by the policy filter.
    #[error("input rejected: {0}")]
    InputRejected(#[from] PolicyViolation),

    /// The pending-input queue is at capacity.
    #[error("input queue full ({capacity} pending)")]
    QueueFull {
        /// Configured capacity.
        capacity: usize,
    },

    /// The agent failed mid-generation.
    #[error("generation failed: {0}")]
    Generation(String),

    /// The upstream handle stayed invalid after recovery.
    #[error("conversation handle invalid after recovery")]
    HandleInvalid,

    /// A compaction attempt failed; history is unchanged.
    #[error("compaction failed: {0}")]
    Compaction(String),

    /// A durable write failed.
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// `abort` with no generation running.
    #[error("no generation is running")]
    NotRunning,

    /// The session is processing, recovering, or compacting.
    #[error("session busy")]
    Busy,

    /// The session actor has stopped.
    #[error("session closed: {0}")]
    SessionClosed(String),
}

impl RuntimeError {
    /// Wire-stable code for status events.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InputRejected(_) => ErrorCode::InputRejected,
            Self::QueueFull { .. } => ErrorCode::QueueFull,
            Self::Generation(_) => ErrorCode::GenerationError,
            Self::HandleInvalid => ErrorCode::HandleInvalid,
            Self::Compaction(_) => ErrorCode::CompactionError,
            Self::Persistence(_) => ErrorCode::PersistenceError,
            Self::NotRunning => ErrorCode::NotRunning,
            Self::Busy => ErrorCode::Busy,
            Self::SessionClosed(_) => ErrorCode::SessionClosed,
        }
    }

    /// Whether the caller can usefully retry.
    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }
}
