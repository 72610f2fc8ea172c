use serde::Serialize;
use tokio::sync::oneshot;

use saga_core::SessionId;

use crate::errors::RuntimeError;

/// Reply channel for a command.
pub(crate) type Reply<T> = oneshot::Sender<T>;

/// Messages accepted by the session actor.
pub(crate) enum SessionCommand {
    Submit {
        text: String,
        reply: Reply<Result<SubmitOutcome, RuntimeError>>,
    },
    Abort {
        reply: Reply<Result<(), RuntimeError>>,
    },
    CompactNow {
        reply: Reply<Result<CompactionReport, RuntimeError>>,
    },
    Status {
        reply: Reply<SessionStatus>,
    },
    WaitIdle {
        reply: Reply<()>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

/// What the session is doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Waiting for input.
    Idle,
    /// Streaming a generation.
    Processing,
    /// Re-establishing an upstream conversation after an invalid handle.
    Recovering,
    /// Archiving old history.
    Compacting,
}

/// Result of an accepted submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// Processing began immediately.
    Started,
    /// Waiting behind the current turn; `position` is 1-based.
    Queued {
        /// Place in the queue.
        position: usize,
    },
}

/// Point-in-time view of a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    /// Session identifier.
    pub session_id: SessionId,
    /// Current phase.
    pub phase: SessionPhase,
    /// Inputs waiting behind the current turn.
    pub queued: usize,
    /// Visible entries.
    pub entry_count: usize,
    /// Visible history size in characters.
    pub history_size: usize,
    /// Whether an upstream handle is held.
    pub has_handle: bool,
    /// Whether a summary of archived history exists.
    pub has_summary: bool,
    /// Whether a compaction is owed.
    pub pending_compaction: bool,
    /// Consecutive recoveries since the last successful turn.
    pub recovery_attempts: u32,
    /// Archive segments written so far.
    pub archive_count: usize,
}

/// Outcome of a compaction run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionReport {
    /// Key of the new archive, or `None` when nothing was old enough to move.
    pub archive_key: Option<String>,
    /// Entries moved to the archive.
    pub archived_entries: usize,
    /// Visible size before.
    pub size_before: usize,
    /// Visible size after.
    pub size_after: usize,
}
