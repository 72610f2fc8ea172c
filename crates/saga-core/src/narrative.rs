//! Narrative data model.
//!
//! A session's story is an ordered list of [`NarrativeEntry`] values, each
//! either the player's input or the narrator's response. Old entries are
//! compacted into a [`HistorySummary`] whose digest stands in for them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::text::char_len;

/// Suffix appended to a response that was cut short by an abort.
pub const TRUNCATION_MARKER: &str = " [interrupted]";

/// Who produced a narrative entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Text the player submitted.
    Input,
    /// Text the narrator (agent) generated.
    Response,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Response => write!(f, "response"),
        }
    }
}

/// One turn-half of the story.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrativeEntry {
    /// Per-session monotonic identifier.
    pub id: u64,
    /// When the entry was written.
    pub timestamp: DateTime<Utc>,
    /// Input or response.
    pub kind: EntryKind,
    /// Entry text.
    pub text: String,
    /// Set on responses cut short by an abort.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

impl NarrativeEntry {
    /// Size of the entry as counted toward the compaction threshold.
    pub fn size(&self) -> usize {
        char_len(&self.text)
    }
}

/// Inclusive timestamp span covered by a set of entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Earliest entry timestamp.
    pub start: DateTime<Utc>,
    /// Latest entry timestamp.
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Span of the given entries, or `None` when the slice is empty.
    pub fn of(entries: &[NarrativeEntry]) -> Option<Self> {
        let first = entries.first()?;
        let (start, end) = entries.iter().fold(
            (first.timestamp, first.timestamp),
            |(lo, hi), e| (lo.min(e.timestamp), hi.max(e.timestamp)),
        );
        Some(Self { start, end })
    }
}

/// Digest standing in for archived entries.
///
/// Each compaction produces a fresh summary that replaces the previous one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySummary {
    /// When the digest was produced.
    pub generated_at: DateTime<Utc>,
    /// Model that produced the digest.
    pub source_model: String,
    /// Number of entries folded into this digest.
    pub archived_count: usize,
    /// Span of the archived entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    /// The digest itself.
    pub digest_text: String,
}
