//! # saga-core
//!
//! Foundation types shared by every Saga crate:
//!
//! - **Branded IDs**: `SessionId` as a newtype for type safety
//! - **Narrative model**: `NarrativeEntry`, `EntryKind`, `HistorySummary`, `DateRange`
//! - **Status events**: `SagaEvent` enum broadcast by the orchestrator
//! - **Error codes**: `ErrorCode`, the wire-stable taxonomy surfaced to transports
//! - **Text helpers**: char-counting and UTF-8–safe truncation
//! - **Logging**: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod ids;
pub mod logging;
pub mod narrative;
pub mod text;

pub use errors::ErrorCode;
pub use events::{BaseEvent, CompactionReason, SagaEvent};
pub use ids::SessionId;
pub use narrative::{DateRange, EntryKind, HistorySummary, NarrativeEntry, TRUNCATION_MARKER};
