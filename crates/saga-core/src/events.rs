//! Orchestrator status events.
//!
//! [`SagaEvent`] is what a transport receives: output deltas, the end of a
//! turn, and lifecycle notices for queueing, recovery, and compaction. All
//! variants carry a [`BaseEvent`] with the session ID and an RFC 3339
//! timestamp, flattened into the serialized object.

use serde::{Deserialize, Serialize};

use crate::errors::ErrorCode;

/// Common fields for all events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseEvent {
    /// Session this event belongs to.
    pub session_id: String,
    /// ISO 8601 timestamp.
    pub timestamp: String,
}

impl BaseEvent {
    /// Create a new base event with the current UTC timestamp.
    #[must_use]
    pub fn now(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Why a compaction ran.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactionReason {
    /// History crossed the size threshold.
    ThresholdExceeded,
    /// A previous attempt failed and left the pending flag set.
    Pending,
    /// Requested through `compact_now`.
    Manual,
}

/// Events broadcast by the orchestrator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SagaEvent {
    /// A queued or fresh input began processing.
    #[serde(rename = "turn_started")]
    TurnStarted {
        /// Base fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// The input being processed.
        input: String,
    },

    /// An input was accepted while busy and placed in the queue.
    #[serde(rename = "input_queued")]
    InputQueued {
        /// Base fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// 1-based position in the queue.
        position: usize,
    },

    /// Streamed text from the agent.
    #[serde(rename = "output_delta")]
    OutputDelta {
        /// Base fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// Text fragment.
        delta: String,
    },

    /// A turn was committed to history.
    #[serde(rename = "turn_complete")]
    TurnComplete {
        /// Base fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// ID of the stored input entry.
        #[serde(rename = "inputEntryId")]
        input_entry_id: u64,
        /// ID of the stored response entry.
        #[serde(rename = "responseEntryId")]
        response_entry_id: u64,
        /// Whether the response was cut short by an abort.
        truncated: bool,
    },

    /// Queued inputs were dropped because the player aborted.
    #[serde(rename = "inputs_discarded")]
    InputsDiscarded {
        /// Base fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// The dropped inputs, oldest first.
        inputs: Vec<String>,
    },

    /// Upstream rejected the handle; rebuilding context.
    #[serde(rename = "recovery_started")]
    RecoveryStarted {
        /// Base fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// Persisted recovery counter after incrementing.
        attempt: u32,
    },

    /// The fresh conversation produced a complete response.
    #[serde(rename = "recovery_complete")]
    RecoveryComplete {
        /// Base fields.
        #[serde(flatten)]
        base: BaseEvent,
    },

    /// Compaction started.
    #[serde(rename = "compaction_started")]
    CompactionStarted {
        /// Base fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// Trigger reason.
        reason: CompactionReason,
        /// History size in characters before compaction.
        #[serde(rename = "sizeBefore")]
        size_before: usize,
        /// Number of entries selected for archival.
        #[serde(rename = "entriesToArchive")]
        entries_to_archive: usize,
    },

    /// Compaction finished (successfully or not).
    #[serde(rename = "compaction_complete")]
    CompactionComplete {
        /// Base fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// Whether the archive was committed.
        success: bool,
        /// History size before.
        #[serde(rename = "sizeBefore")]
        size_before: usize,
        /// History size after (equal to before on failure).
        #[serde(rename = "sizeAfter")]
        size_after: usize,
        /// Key of the committed archive record.
        #[serde(rename = "archiveKey", skip_serializing_if = "Option::is_none")]
        archive_key: Option<String>,
    },

    /// The session has no work in flight and nothing queued.
    #[serde(rename = "session_idle")]
    SessionIdle {
        /// Base fields.
        #[serde(flatten)]
        base: BaseEvent,
    },

    /// A structured failure.
    #[serde(rename = "error")]
    Error {
        /// Base fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// Error code.
        code: ErrorCode,
        /// Human-readable message.
        message: String,
        /// Whether the player can retry.
        retryable: bool,
        /// Input to resubmit, when the turn was lost.
        #[serde(skip_serializing_if = "Option::is_none")]
        input: Option<String>,
    },
}

impl SagaEvent {
    /// Base fields of any event.
    pub fn base(&self) -> &BaseEvent {
        match self {
            Self::TurnStarted { base, .. }
            | Self::InputQueued { base, .. }
            | Self::OutputDelta { base, .. }
            | Self::TurnComplete { base, .. }
            | Self::InputsDiscarded { base, .. }
            | Self::RecoveryStarted { base, .. }
            | Self::RecoveryComplete { base }
            | Self::CompactionStarted { base, .. }
            | Self::CompactionComplete { base, .. }
            | Self::SessionIdle { base }
            | Self::Error { base, .. } => base,
        }
    }

    /// Session the event belongs to.
    pub fn session_id(&self) -> &str {
        &self.base().session_id
    }

    /// Serialized `type` tag.
    pub fn event_type(&self) -> &str {
        match self {
            Self::TurnStarted { .. } => "turn_started",
            Self::InputQueued { .. } => "input_queued",
            Self::OutputDelta { .. } => "output_delta",
            Self::TurnComplete { .. } => "turn_complete",
            Self::InputsDiscarded { .. } => "inputs_discarded",
            Self::RecoveryStarted { .. } => "recovery_started",
            Self::RecoveryComplete { .. } => "recovery_complete",
            Self::CompactionStarted { .. } => "compaction_started",
            Self::CompactionComplete { .. } => "compaction_complete",
            Self::SessionIdle { .. } => "session_idle",
            Self::Error { .. } => "error",
        }
    }

    /// Build an `error` event, deriving `retryable` from the code.
    pub fn error(
        session_id: impl Into<String>,
        code: ErrorCode,
        message: impl Into<String>,
        input: Option<String>,
    ) -> Self {
        Self::Error {
            base: BaseEvent::now(session_id),
            code,
            message: message.into(),
            retryable: code.is_retryable(),
            input,
        }
    }
}
