//! History ledger: the visible, append-only window of a session's story.
//!
//! The ledger owns the entry-id counter and a running character total, so
//! [`HistoryLedger::size`] is O(1). Archival never mutates a ledger in place:
//! [`HistoryLedger::split_for_archive`] returns the prefix to archive and a
//! new remainder ledger, which the caller swaps in only after the store has
//! committed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use saga_core::{EntryKind, NarrativeEntry};

/// Ordered narrative entries with incremental size tracking.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "LedgerRepr", into = "LedgerRepr")]
pub struct HistoryLedger {
    entries: Vec<NarrativeEntry>,
    size: usize,
    next_id: u64,
}

/// Persisted form; `size` is derived on load.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedgerRepr {
    #[serde(default)]
    next_id: u64,
    #[serde(default)]
    entries: Vec<NarrativeEntry>,
}

impl From<LedgerRepr> for HistoryLedger {
    fn from(repr: LedgerRepr) -> Self {
        let size = repr.entries.iter().map(NarrativeEntry::size).sum();
        // never reissue an id already on disk, even if the counter lagged
        let floor = repr.entries.last().map_or(0, |e| e.id + 1);
        Self {
            next_id: repr.next_id.max(floor),
            entries: repr.entries,
            size,
        }
    }
}

impl From<HistoryLedger> for LedgerRepr {
    fn from(ledger: HistoryLedger) -> Self {
        Self {
            next_id: ledger.next_id,
            entries: ledger.entries,
        }
    }
}

impl HistoryLedger {
    /// Empty ledger whose first entry gets id 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// All visible entries, oldest first.
    pub fn entries(&self) -> &[NarrativeEntry] {
        &self.entries
    }

    /// Number of visible entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ledger holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total characters across visible entries.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Id the next appended entry will receive.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Most recent entry.
    pub fn last(&self) -> Option<&NarrativeEntry> {
        self.entries.last()
    }

    /// The newest `n` entries (fewer if the ledger is shorter).
    pub fn recent(&self, n: usize) -> &[NarrativeEntry] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    /// Append a player input. Returns the new entry's id.
    pub fn append_input(&mut self, text: impl Into<String>) -> u64 {
        self.append(EntryKind::Input, text.into(), false, Utc::now())
    }

    /// Append a narrator response. Returns the new entry's id.
    pub fn append_response(&mut self, text: impl Into<String>, truncated: bool) -> u64 {
        self.append(EntryKind::Response, text.into(), truncated, Utc::now())
    }

    /// Append an entry with an explicit timestamp.
    pub fn append(
        &mut self,
        kind: EntryKind,
        text: String,
        truncated: bool,
        timestamp: DateTime<Utc>,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        let entry = NarrativeEntry {
            id,
            timestamp,
            kind,
            text,
            truncated,
        };
        self.size += entry.size();
        self.entries.push(entry);
        id
    }

    /// Split off everything but the newest `retain` entries.
    ///
    /// Returns the archived prefix and the remainder ledger (which keeps
    /// this ledger's id counter), or `None` when there is nothing to archive.
    pub fn split_for_archive(&self, retain: usize) -> Option<(Vec<NarrativeEntry>, Self)> {
        if self.entries.len() <= retain {
            return None;
        }
        let cut = self.entries.len() - retain;
        let prefix = self.entries[..cut].to_vec();
        let prefix_size: usize = prefix.iter().map(NarrativeEntry::size).sum();
        let remainder = Self {
            entries: self.entries[cut..].to_vec(),
            size: self.size - prefix_size,
            next_id: self.next_id,
        };
        Some((prefix, remainder))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger_with(n: usize) -> HistoryLedger {
        let mut ledger = HistoryLedger::new();
        for i in 0..n {
            if i % 2 == 0 {
                let _ = ledger.append_input(format!("input {i}"));
            } else {
                let _ = ledger.append_response(format!("response {i}"), false);
            }
        }
        ledger
    }

    #[test]
    fn ids_are_monotonic() {
        let mut ledger = HistoryLedger::new();
        let a = ledger.append_input("look");
        let b = ledger.append_response("A dark room.", false);
        assert_eq!((a, b), (0, 1));
        assert_eq!(ledger.next_id(), 2);
    }

    #[test]
    fn size_tracks_appends() {
        let mut ledger = HistoryLedger::new();
        let _ = ledger.append_input("héllo");
        let _ = ledger.append_response("wörld!", false);
        assert_eq!(ledger.size(), 11);
    }

    #[test]
    fn recent_returns_tail() {
        let ledger = ledger_with(10);
        let tail = ledger.recent(3);
        assert_eq!(tail.len(), 3);
        assert_eq!(tail[0].id, 7);
        assert_eq!(ledger.recent(50).len(), 10);
        assert!(HistoryLedger::new().recent(6).is_empty());
    }

    #[test]
    fn split_leaves_original_untouched() {
        let ledger = ledger_with(100);
        let before = ledger.clone();
        let (prefix, remainder) = ledger.split_for_archive(20).unwrap();

        assert_eq!(ledger, before);
        assert_eq!(prefix.len(), 80);
        assert_eq!(remainder.len(), 20);
        assert_eq!(prefix.last().unwrap().id, 79);
        assert_eq!(remainder.entries()[0].id, 80);
        assert_eq!(remainder.next_id(), 100);
        assert_eq!(
            prefix.iter().map(NarrativeEntry::size).sum::<usize>() + remainder.size(),
            ledger.size()
        );
    }

    #[test]
    fn split_with_nothing_to_archive() {
        let ledger = ledger_with(20);
        assert!(ledger.split_for_archive(20).is_none());
        assert!(ledger.split_for_archive(25).is_none());
        assert!(HistoryLedger::new().split_for_archive(0).is_none());
    }

    #[test]
    fn remainder_continues_ids() {
        let ledger = ledger_with(6);
        let (_, mut remainder) = ledger.split_for_archive(2).unwrap();
        assert_eq!(remainder.append_input("next"), 6);
    }

    #[test]
    fn serde_recomputes_size() {
        let ledger = ledger_with(5);
        let json = serde_json::to_value(&ledger).unwrap();
        assert!(json.get("size").is_none());
        assert_eq!(json["nextId"], 5);
        let back: HistoryLedger = serde_json::from_value(json).unwrap();
        assert_eq!(back.size(), ledger.size());
        assert_eq!(back, ledger);
    }

    #[test]
    fn lagging_counter_is_raised_on_load() {
        let json = serde_json::json!({
            "nextId": 1,
            "entries": [
                {"id": 4, "timestamp": "2026-01-01T00:00:00Z", "kind": "input", "text": "x"}
            ]
        });
        let ledger: HistoryLedger = serde_json::from_value(json).unwrap();
        assert_eq!(ledger.next_id(), 5);
    }

    proptest::proptest! {
        #[test]
        fn split_preserves_every_entry(n in 0usize..60, retain in 0usize..30) {
            let ledger = ledger_with(n);
            match ledger.split_for_archive(retain) {
                Some((prefix, remainder)) => {
                    proptest::prop_assert_eq!(remainder.len(), retain);
                    proptest::prop_assert_eq!(prefix.len() + remainder.len(), n);
                    let ids: Vec<u64> = prefix.iter().chain(remainder.entries()).map(|e| e.id).collect();
                    let expected: Vec<u64> = (0..n as u64).collect();
                    proptest::prop_assert_eq!(ids, expected);
                }
                None => proptest::prop_assert!(n <= retain),
            }
        }
    }
}
