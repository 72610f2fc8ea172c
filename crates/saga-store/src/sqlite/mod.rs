//! `SQLite`-backed state store.
//!
//! Records are stored as JSON documents in the `sessions` and `archives`
//! tables. An archival inserts the archive row and replaces the session row
//! in one transaction, so neither half is ever visible alone. Blocking
//! `rusqlite` calls run on the blocking thread pool.

pub mod connection;
pub mod migrations;

use std::path::Path;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use saga_core::SessionId;

use crate::errors::{Result, StoreError};
use crate::record::{ArchiveDraft, ArchiveRecord, CommittedArchive, SessionRecord, archive_key};
use crate::store::StateStore;

use self::connection::{ConnectionConfig, ConnectionPool};

/// State store over an `r2d2` pool of `SQLite` connections.
#[derive(Clone)]
pub struct SqliteStateStore {
    pool: ConnectionPool,
}

impl SqliteStateStore {
    /// Open (creating if needed) a database file and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let pool = connection::new_file(path, &ConnectionConfig::default())?;
        Self::with_pool(pool)
    }

    /// Private in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::with_pool(connection::new_in_memory(&ConnectionConfig::default())?)
    }

    /// Wrap an existing pool and run migrations.
    pub fn with_pool(pool: ConnectionPool) -> Result<Self> {
        let conn = pool.get()?;
        let applied = migrations::run_migrations(&conn)?;
        debug!(applied, "sqlite state store ready");
        drop(conn);
        Ok(Self { pool })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Internal(format!("blocking task failed: {e}")))?
    }
}

fn read_record(conn: &Connection, id: &str) -> Result<Option<SessionRecord>> {
    let json: Option<String> = conn
        .query_row(
            "SELECT record FROM sessions WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    json.map(|json| {
        let record: SessionRecord = serde_json::from_str(&json)?;
        record.check_schema()?;
        Ok(record)
    })
    .transpose()
}

fn upsert_record(conn: &Connection, record: &SessionRecord) -> Result<()> {
    let json = serde_json::to_string(record)?;
    let _ = conn.execute(
        "INSERT INTO sessions (id, record, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET record = excluded.record, updated_at = excluded.updated_at",
        params![
            record.id.as_str(),
            json,
            record.created_at.to_rfc3339(),
            record.updated_at.to_rfc3339()
        ],
    )?;
    Ok(())
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>> {
        let id = id.clone();
        self.with_conn(move |conn| read_record(conn, id.as_str()))
            .await
    }

    async fn put(&self, record: &SessionRecord) -> Result<()> {
        let record = record.clone();
        self.with_conn(move |conn| upsert_record(conn, &record))
            .await
    }

    async fn commit_archive(
        &self,
        draft: ArchiveDraft,
        record: &SessionRecord,
    ) -> Result<CommittedArchive> {
        let mut committed = record.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let key = archive_key(draft.archived_at, &committed.archives);
            let archive = draft.into_record(key.clone());
            committed.archives.push(key.clone());

            upsert_record(&tx, &committed)?;
            let _ = tx.execute(
                "INSERT INTO archives (session_id, key, archived_at, entry_count, record)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    archive.session_id.as_str(),
                    key,
                    archive.archived_at.to_rfc3339(),
                    i64::try_from(archive.entry_count).unwrap_or(i64::MAX),
                    serde_json::to_string(&archive)?
                ],
            )?;
            tx.commit()?;
            debug!(session_id = %committed.id, key = %key, "archive committed");
            Ok(CommittedArchive {
                key,
                record: committed,
            })
        })
        .await
    }

    async fn get_archive(&self, id: &SessionId, key: &str) -> Result<Option<ArchiveRecord>> {
        let id = id.clone();
        let key = key.to_owned();
        self.with_conn(move |conn| {
            let json: Option<String> = conn
                .query_row(
                    "SELECT record FROM archives WHERE session_id = ?1 AND key = ?2",
                    params![id.as_str(), key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(json.map(|j| serde_json::from_str(&j)).transpose()?)
        })
        .await
    }

    async fn list_archives(&self, id: &SessionId) -> Result<Vec<String>> {
        Ok(self
            .get(id)
            .await?
            .map(|record| record.archives)
            .unwrap_or_default())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionId>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM sessions ORDER BY id")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .map(|r| r.map(SessionId::from))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
        .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
