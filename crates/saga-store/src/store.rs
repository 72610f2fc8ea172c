//! The [`StateStore`] trait implemented by every backend.

use async_trait::async_trait;

use saga_core::SessionId;

use crate::errors::Result;
use crate::record::{ArchiveDraft, ArchiveRecord, CommittedArchive, SessionRecord};

/// Durable, atomic persistence for session records and their archives.
///
/// Every write is all-or-nothing: a reader sees either the previous record
/// or the new one. Writes for the same session are serialized.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load a session record, or `None` if it was never written.
    async fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>>;

    /// Replace the session record.
    async fn put(&self, record: &SessionRecord) -> Result<()>;

    /// Commit an archive and the truncated session record as one unit.
    ///
    /// The store assigns the archive key (see
    /// [`archive_key`](crate::record::archive_key)) and appends it to the
    /// record's `archives` list before writing. The returned record is what
    /// was persisted.
    async fn commit_archive(
        &self,
        draft: ArchiveDraft,
        record: &SessionRecord,
    ) -> Result<CommittedArchive>;

    /// Load a committed archive.
    async fn get_archive(&self, id: &SessionId, key: &str) -> Result<Option<ArchiveRecord>>;

    /// Keys of a session's committed archives, oldest first.
    async fn list_archives(&self, id: &SessionId) -> Result<Vec<String>>;

    /// IDs of all persisted sessions, sorted.
    async fn list_sessions(&self) -> Result<Vec<SessionId>>;
}
