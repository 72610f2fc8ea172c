//! Persisted session and archive records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use saga_core::{DateRange, HistorySummary, NarrativeEntry, SessionId};

use crate::errors::{Result, StoreError};
use crate::ledger::HistoryLedger;

/// Highest record schema this build reads and the one it writes.
pub const SCHEMA_VERSION: u32 = 1;

/// Everything the orchestrator persists for one session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Record schema version.
    pub schema_version: u32,
    /// Session identity.
    pub id: SessionId,
    /// Resumable upstream conversation handle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    /// Recoveries since the last successful turn.
    #[serde(default)]
    pub recovery_attempts: u32,
    /// Digest of archived history.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<HistorySummary>,
    /// Set while a compaction is owed (threshold crossed or an attempt failed).
    #[serde(default)]
    pub pending_compaction: bool,
    /// Visible history window.
    #[serde(default)]
    pub history: HistoryLedger,
    /// Keys of committed archive records, oldest first. Authoritative.
    #[serde(default)]
    pub archives: Vec<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last persisted mutation.
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Fresh record with no history and no handle.
    pub fn new(id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            schema_version: SCHEMA_VERSION,
            id,
            handle: None,
            recovery_attempts: 0,
            summary: None,
            pending_compaction: false,
            history: HistoryLedger::new(),
            archives: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Bump `updated_at` to now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Reject records written by a newer build.
    pub fn check_schema(&self) -> Result<()> {
        if self.schema_version > SCHEMA_VERSION {
            return Err(StoreError::UnsupportedSchema {
                found: self.schema_version,
                supported: SCHEMA_VERSION,
            });
        }
        Ok(())
    }
}

/// Entries about to be archived; the store assigns the key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveDraft {
    /// Owning session.
    pub session_id: SessionId,
    /// Archival time, used to derive the key.
    pub archived_at: DateTime<Utc>,
    /// The archived prefix, oldest first.
    pub entries: Vec<NarrativeEntry>,
}

impl ArchiveDraft {
    /// Draft stamped with the current time.
    pub fn new(session_id: SessionId, entries: Vec<NarrativeEntry>) -> Self {
        Self {
            session_id,
            archived_at: Utc::now(),
            entries,
        }
    }

    /// Seal the draft under `key`.
    pub fn into_record(self, key: String) -> ArchiveRecord {
        ArchiveRecord {
            key,
            session_id: self.session_id,
            archived_at: self.archived_at,
            entry_count: self.entries.len(),
            date_range: DateRange::of(&self.entries),
            entries: self.entries,
        }
    }
}

/// Immutable archive of entries moved out of the visible history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveRecord {
    /// Timestamp-derived key, unique within the session.
    pub key: String,
    /// Owning session.
    pub session_id: SessionId,
    /// When the archive was committed.
    pub archived_at: DateTime<Utc>,
    /// Number of archived entries.
    pub entry_count: usize,
    /// Span of the archived entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    /// Archived entries, oldest first.
    pub entries: Vec<NarrativeEntry>,
}

/// Result of a committed archival.
#[derive(Clone, Debug)]
pub struct CommittedArchive {
    /// Key of the new archive record.
    pub key: String,
    /// The session record as persisted, with `key` appended to `archives`.
    pub record: SessionRecord,
}

/// Derive an archive key from `at`, unique among `existing`.
///
/// Keys have second resolution (`%Y%m%dT%H%M%SZ`). A collision gets the
/// smallest `-N` suffix (starting at 2) not already taken.
pub fn archive_key(at: DateTime<Utc>, existing: &[String]) -> String {
    let base = at.format("%Y%m%dT%H%M%SZ").to_string();
    if !existing.iter().any(|k| *k == base) {
        return base;
    }
    (2u32..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !existing.iter().any(|k| k == candidate))
        .unwrap_or(base)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
