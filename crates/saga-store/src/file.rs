//! File-backed state store.
//!
//! Layout under the data directory:
//!
//! ```text
//! sessions/{id}/session.json
//! sessions/{id}/archives/{key}.json
//! ```
//!
//! Every file is written to a `.tmp` sibling, fsynced, then renamed over the
//! target, so readers never observe a partial file. An archival writes the
//! archive file first and the session record second; the record's `archives`
//! list decides which archive files exist. Archive files it does not list
//! are leftovers from an interrupted commit and are deleted on the next load.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use saga_core::SessionId;

use crate::errors::{Result, StoreError};
use crate::record::{ArchiveDraft, ArchiveRecord, CommittedArchive, SessionRecord, archive_key};
use crate::store::StateStore;

const SESSIONS_DIR: &str = "sessions";
const SESSION_FILE: &str = "session.json";
const ARCHIVES_DIR: &str = "archives";
const TMP_SUFFIX: &str = ".tmp";

/// State store keeping one directory per session.
pub struct FileStateStore {
    sessions_dir: PathBuf,
    locks: DashMap<SessionId, Arc<Mutex<()>>>,
}

impl FileStateStore {
    /// Open (creating if needed) a store rooted at `data_dir`.
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let sessions_dir = data_dir.as_ref().join(SESSIONS_DIR);
        fs::create_dir_all(&sessions_dir)
            .await
            .map_err(|e| StoreError::io(&sessions_dir, e))?;
        debug!(path = %sessions_dir.display(), "opened file state store");
        Ok(Self {
            sessions_dir,
            locks: DashMap::new(),
        })
    }

    /// Directory holding one subdirectory per session.
    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    fn session_dir(&self, id: &SessionId) -> Result<PathBuf> {
        if !id.is_path_safe() {
            return Err(StoreError::InvalidSessionId(id.to_string()));
        }
        Ok(self.sessions_dir.join(id.as_str()))
    }

    fn lock_for(&self, id: &SessionId) -> Arc<Mutex<()>> {
        self.locks.entry(id.clone()).or_default().clone()
    }

    /// Read the record and drop files it does not account for.
    ///
    /// Caller holds the session lock.
    async fn load(&self, dir: &Path) -> Result<Option<SessionRecord>> {
        let path = dir.join(SESSION_FILE);
        let record = match fs::read(&path).await {
            Ok(bytes) => {
                let record: SessionRecord = serde_json::from_slice(&bytes)?;
                record.check_schema()?;
                Some(record)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        let listed = record.as_ref().map_or(&[][..], |r| r.archives.as_slice());
        sweep(dir, listed).await?;
        Ok(record)
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>> {
        let dir = self.session_dir(id)?;
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;
        self.load(&dir).await
    }

    async fn put(&self, record: &SessionRecord) -> Result<()> {
        let dir = self.session_dir(&record.id)?;
        let lock = self.lock_for(&record.id);
        let _guard = lock.lock().await;

        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io(&dir, e))?;
        let bytes = serde_json::to_vec_pretty(record)?;
        write_atomic(&dir.join(SESSION_FILE), &bytes).await
    }

    async fn commit_archive(
        &self,
        draft: ArchiveDraft,
        record: &SessionRecord,
    ) -> Result<CommittedArchive> {
        let dir = self.session_dir(&record.id)?;
        let lock = self.lock_for(&record.id);
        let _guard = lock.lock().await;

        let archives_dir = dir.join(ARCHIVES_DIR);
        fs::create_dir_all(&archives_dir)
            .await
            .map_err(|e| StoreError::io(&archives_dir, e))?;

        let key = archive_key(draft.archived_at, &record.archives);
        let archive = draft.into_record(key.clone());
        let mut committed = record.clone();
        committed.archives.push(key.clone());

        // archive first: until the record lands it is an unreferenced orphan
        let archive_bytes = serde_json::to_vec_pretty(&archive)?;
        write_atomic(&archives_dir.join(format!("{key}.json")), &archive_bytes).await?;
        let record_bytes = serde_json::to_vec_pretty(&committed)?;
        write_atomic(&dir.join(SESSION_FILE), &record_bytes).await?;

        debug!(
            session_id = %record.id,
            key = %key,
            entries = archive.entry_count,
            "archive committed"
        );
        Ok(CommittedArchive {
            key,
            record: committed,
        })
    }

    async fn get_archive(&self, id: &SessionId, key: &str) -> Result<Option<ArchiveRecord>> {
        let dir = self.session_dir(id)?;
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let Some(record) = self.load(&dir).await? else {
            return Ok(None);
        };
        if !record.archives.iter().any(|k| k == key) {
            return Ok(None);
        }
        let path = dir.join(ARCHIVES_DIR).join(format!("{key}.json"));
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(session_id = %id, key, "listed archive missing on disk");
                Ok(None)
            }
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    async fn list_archives(&self, id: &SessionId) -> Result<Vec<String>> {
        Ok(self
            .get(id)
            .await?
            .map(|record| record.archives)
            .unwrap_or_default())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionId>> {
        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.sessions_dir)
            .await
            .map_err(|e| StoreError::io(&self.sessions_dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.sessions_dir, e))?
        {
            let Some(name) = entry.file_name().to_str().map(SessionId::from) else {
                continue;
            };
            if !name.is_path_safe() {
                continue;
            }
            let has_record = fs::try_exists(entry.path().join(SESSION_FILE))
                .await
                .unwrap_or(false);
            if has_record {
                ids.push(name);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Atomic file writes
// ─────────────────────────────────────────────────────────────────────────────

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(TMP_SUFFIX);
    PathBuf::from(name)
}

/// Write `bytes` to the temp sibling of `path` and fsync it.
async fn stage(path: &Path, bytes: &[u8]) -> Result<PathBuf> {
    let tmp = temp_path(path);
    let mut file = fs::File::create(&tmp)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    file.write_all(bytes)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    file.flush().await.map_err(|e| StoreError::io(&tmp, e))?;
    file.sync_all().await.map_err(|e| StoreError::io(&tmp, e))?;
    Ok(tmp)
}

/// Rename a staged file over its target.
async fn promote(tmp: &Path, path: &Path) -> Result<()> {
    fs::rename(tmp, path)
        .await
        .map_err(|e| StoreError::io(path, e))?;
    // directory fsync makes the rename durable; unsupported on some platforms
    if let Some(parent) = path.parent() {
        if let Ok(dir) = fs::File::open(parent).await {
            let _ = dir.sync_all().await;
        }
    }
    Ok(())
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = stage(path, bytes).await?;
    promote(&tmp, path).await
}

/// Remove temp files and archive files not listed in `listed`.
async fn sweep(dir: &Path, listed: &[String]) -> Result<()> {
    let _ = remove_if_exists(&temp_path(&dir.join(SESSION_FILE))).await;

    let archives_dir = dir.join(ARCHIVES_DIR);
    let mut entries = match fs::read_dir(&archives_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(StoreError::io(&archives_dir, e)),
    };
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StoreError::io(&archives_dir, e))?
    {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        let orphan = match name.strip_suffix(".json") {
            Some(key) => !listed.iter().any(|k| k == key),
            None => name.ends_with(TMP_SUFFIX),
        };
        if orphan {
            warn!(path = %entry.path().display(), "removing uncommitted archive file");
            let _ = remove_if_exists(&entry.path()).await;
        }
    }
    Ok(())
}

async fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
