//! # saga-store
//!
//! Durable state for Saga sessions.
//!
//! - **History ledger**: append-only visible history with O(1) size and a
//!   non-mutating archive split
//! - **Records**: `SessionRecord`, `ArchiveRecord`, archive key derivation
//! - **`StateStore`**: async trait for atomic session and archive writes
//! - **Backends**: per-session JSON files (`FileStateStore`) or `SQLite`
//!   (`SqliteStateStore`)

#![deny(unsafe_code)]

pub mod errors;
pub mod factory;
pub mod file;
pub mod ledger;
pub mod record;
pub mod sqlite;
pub mod store;

pub use errors::{Result, StoreError};
pub use factory::open_store;
pub use file::FileStateStore;
pub use ledger::HistoryLedger;
pub use record::{
    ArchiveDraft, ArchiveRecord, CommittedArchive, SCHEMA_VERSION, SessionRecord, archive_key,
};
pub use sqlite::SqliteStateStore;
pub use store::StateStore;
