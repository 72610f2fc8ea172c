//! Open the configured backend.

use std::sync::Arc;

use tracing::info;

use saga_settings::{StorageBackend, StorageSettings, resolve_path};

use crate::errors::{Result, StoreError};
use crate::file::FileStateStore;
use crate::sqlite::SqliteStateStore;
use crate::store::StateStore;

/// Open the backend named in `settings`, resolving relative paths against
/// `~/.saga`.
pub async fn open_store(settings: &StorageSettings) -> Result<Arc<dyn StateStore>> {
    match settings.backend {
        StorageBackend::File => {
            let dir = resolve_path(&settings.data_dir);
            info!(backend = "file", path = %dir.display(), "opening state store");
            Ok(Arc::new(FileStateStore::open(dir).await?))
        }
        StorageBackend::Sqlite => {
            let path = resolve_path(&settings.sqlite_path);
            info!(backend = "sqlite", path = %path.display(), "opening state store");
            let store = tokio::task::spawn_blocking(move || SqliteStateStore::open(&path))
                .await
                .map_err(|e| StoreError::Internal(e.to_string()))??;
            Ok(Arc::new(store))
        }
    }
}
