//! Request composition.
//!
//! With a live handle the input is sent alone. Without one (first turn, after
//! compaction, or during recovery) a fresh conversation is seeded from the
//! summary and the most recent visible entries.

use saga_core::NarrativeEntry;
use saga_llm::AgentRequest;
use saga_llm::summarizer::serialize_entries;
use saga_store::SessionRecord;

const SUMMARY_HEADING: &str = "## Story so far";
const RECENT_HEADING: &str = "## Most recent passages";

/// Build the request for `input` against the session's current state.
pub fn build_request(record: &SessionRecord, input: &str, recent_entries: usize) -> AgentRequest {
    match &record.handle {
        Some(handle) => AgentRequest::resume(handle.clone(), input),
        None => AgentRequest::fresh(
            compose_context(
                record.summary.as_ref().map(|s| s.digest_text.as_str()),
                record.history.recent(recent_entries),
            ),
            input,
        ),
    }
}

/// Seed text for a fresh conversation, or `None` when there is nothing to carry.
pub fn compose_context(summary: Option<&str>, recent: &[NarrativeEntry]) -> Option<String> {
    let mut sections = Vec::new();
    if let Some(text) = summary.filter(|t| !t.trim().is_empty()) {
        sections.push(format!("{SUMMARY_HEADING}\n{}", text.trim()));
    }
    if !recent.is_empty() {
        let lines = serialize_entries(recent, usize::MAX, usize::MAX);
        sections.push(format!("{RECENT_HEADING}\n{}", lines.trim_end()));
    }
    if sections.is_empty() {
        None
    } else {
        Some(sections.join("\n\n"))
    }
}
