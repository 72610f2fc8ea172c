//! History summarizer.
//!
//! Condenses a contiguous run of narrative entries, plus the previous digest
//! when one exists, into a fresh digest that replaces it. Failures propagate
//! to the caller; nothing here retries.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use saga_core::text::{char_len, truncate_with_suffix};
use saga_core::{DateRange, EntryKind, HistorySummary, NarrativeEntry};
use saga_settings::SummarizerSettings;

use crate::client::{AgentClient, AgentRequest, TerminalStatus, collect};
use crate::errors::SummarizeError;

const ENTRY_ELLIPSIS: &str = " …";

const INSTRUCTIONS: &str = "You maintain the running summary of an interactive story. \
Rewrite the summary so it covers both the previous summary (if any) and the new passages. \
Keep names, places, unresolved threads, and the player's current situation. \
Reply with the summary text only.";

/// A produced digest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SummaryDigest {
    /// Digest text.
    pub text: String,
    /// Model that produced it.
    pub model: String,
    /// Number of entries summarized.
    pub entry_count: usize,
    /// Span of the summarized entries.
    pub date_range: Option<DateRange>,
}

impl SummaryDigest {
    /// Convert into the summary stored on the session record.
    pub fn into_summary(self) -> HistorySummary {
        HistorySummary {
            generated_at: chrono::Utc::now(),
            source_model: self.model,
            archived_count: self.entry_count,
            date_range: self.date_range,
            digest_text: self.text,
        }
    }
}

/// Produces digests of narrative history.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize `entries` (oldest first), continuing from `prior`.
    async fn summarize(
        &self,
        entries: &[NarrativeEntry],
        prior: Option<&HistorySummary>,
    ) -> Result<SummaryDigest, SummarizeError>;
}

/// [`Summarizer`] backed by an [`AgentClient`] running a lightweight model.
pub struct LlmSummarizer {
    client: Arc<dyn AgentClient>,
    max_entry_chars: usize,
    max_serialized_chars: usize,
}

impl LlmSummarizer {
    /// Wrap `client`; its model is reported as the digest's source.
    pub fn new(client: Arc<dyn AgentClient>, settings: &SummarizerSettings) -> Self {
        Self {
            client,
            max_entry_chars: settings.max_entry_chars,
            max_serialized_chars: settings.max_serialized_chars,
        }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    #[instrument(skip_all, fields(model = %self.client.model(), entries = entries.len()))]
    async fn summarize(
        &self,
        entries: &[NarrativeEntry],
        prior: Option<&HistorySummary>,
    ) -> Result<SummaryDigest, SummarizeError> {
        if entries.is_empty() {
            return Err(SummarizeError::NoEntries);
        }

        let context = match prior {
            Some(summary) => format!("{INSTRUCTIONS}\n\nPrevious summary:\n{}", summary.digest_text),
            None => INSTRUCTIONS.to_string(),
        };
        let input = serialize_entries(entries, self.max_entry_chars, self.max_serialized_chars);
        debug!(input_chars = char_len(&input), "requesting digest");

        let stream = self
            .client
            .generate(AgentRequest::fresh(Some(context), input), CancellationToken::new());
        let (text, status) = collect(stream).await;

        match status {
            TerminalStatus::End { .. } => {}
            TerminalStatus::Error(e) => return Err(e.into()),
            other => return Err(SummarizeError::Interrupted(other.label().to_string())),
        }

        let text = text.trim();
        if text.is_empty() {
            warn!("summarizer produced empty digest");
            return Err(SummarizeError::EmptyDigest);
        }
        Ok(SummaryDigest {
            text: text.to_string(),
            model: self.client.model().to_string(),
            entry_count: entries.len(),
            date_range: DateRange::of(entries),
        })
    }
}

/// Render entries as `[PLAYER] …` / `[NARRATOR] …` lines.
///
/// Each entry is cut to `max_entry_chars`. When the lines together exceed
/// `max_serialized_chars`, the oldest lines fill the first quarter of the
/// budget, the newest lines fill the rest, and the passages in between are
/// replaced by a single omission note.
pub fn serialize_entries(
    entries: &[NarrativeEntry],
    max_entry_chars: usize,
    max_serialized_chars: usize,
) -> String {
    let lines: Vec<String> = entries
        .iter()
        .map(|entry| {
            let tag = match entry.kind {
                EntryKind::Input => "[PLAYER]",
                EntryKind::Response => "[NARRATOR]",
            };
            let body = truncate_with_suffix(&entry.text, max_entry_chars, ENTRY_ELLIPSIS);
            format!("{tag} {body}\n")
        })
        .collect();
    let lens: Vec<usize> = lines.iter().map(|l| char_len(l)).collect();
    if lens.iter().sum::<usize>() <= max_serialized_chars {
        return lines.concat();
    }

    let head_budget = max_serialized_chars / 4;
    let mut head_end = 0;
    let mut used = 0;
    while head_end < lines.len() && used + lens[head_end] <= head_budget {
        used += lens[head_end];
        head_end += 1;
    }

    // passages nearest the live window matter most for continuity
    let tail_budget = max_serialized_chars - used;
    let mut tail_start = lines.len();
    let mut tail_used = 0;
    while tail_start > head_end && tail_used + lens[tail_start - 1] <= tail_budget {
        tail_used += lens[tail_start - 1];
        tail_start -= 1;
    }

    let omitted = tail_start - head_end;
    let mut out = lines[..head_end].concat();
    out.push_str(&format!("[{omitted} passages omitted]\n"));
    out.push_str(&lines[tail_start..].concat());
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
