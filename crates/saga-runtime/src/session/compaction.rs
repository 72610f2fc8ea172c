//! History compaction.
//!
//! Runs only between turns. The oldest visible entries are summarized into a
//! digest that replaces the previous one, written to an archive segment, and
//! dropped from the visible history. Summary, truncated history, and archive
//! land in one store commit; any failure leaves history untouched and the
//! pending flag set so the next idle gap retries.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use saga_core::{CompactionReason, NarrativeEntry, SagaEvent};
use saga_store::{ArchiveDraft, HistoryLedger};

use crate::errors::RuntimeError;

use super::actor::SessionActor;
use super::command::{CompactionReport, SessionPhase};

impl SessionActor {
    /// Why compaction is owed, if it is.
    pub(super) fn compaction_due(&self) -> Option<CompactionReason> {
        if self.record.pending_compaction {
            Some(CompactionReason::Pending)
        } else if self.record.history.size() >= self.config.compaction_threshold {
            Some(CompactionReason::ThresholdExceeded)
        } else {
            None
        }
    }

    pub(super) async fn compact_if_due(&mut self) {
        if let Some(reason) = self.compaction_due() {
            if let Err(e) = self.compact(reason).await {
                debug!(error = %e, "compaction deferred to next idle gap");
            }
        }
    }

    #[instrument(skip(self))]
    pub(super) async fn compact(
        &mut self,
        reason: CompactionReason,
    ) -> Result<CompactionReport, RuntimeError> {
        self.phase = SessionPhase::Compacting;
        let size_before = self.record.history.size();
        let Some((prefix, remainder)) = self
            .record
            .history
            .split_for_archive(self.config.retain_count)
        else {
            debug!(
                entries = self.record.history.len(),
                retain = self.config.retain_count,
                "nothing old enough to archive"
            );
            if self.record.pending_compaction {
                let mut next = self.record.clone();
                next.pending_compaction = false;
                next.touch();
                self.persist(next).await?;
            }
            return Ok(CompactionReport {
                archive_key: None,
                archived_entries: 0,
                size_before,
                size_after: size_before,
            });
        };

        let archived_entries = prefix.len();
        info!(?reason, size_before, archived_entries, "compaction started");
        self.emit(SagaEvent::CompactionStarted {
            base: self.base(),
            reason,
            size_before,
            entries_to_archive: archived_entries,
        });

        match self.archive(prefix, remainder).await {
            Ok(key) => {
                let size_after = self.record.history.size();
                info!(key = %key, size_after, "compaction complete");
                metrics::counter!("saga_compactions_total", "status" => "success").increment(1);
                self.emit(SagaEvent::CompactionComplete {
                    base: self.base(),
                    success: true,
                    size_before,
                    size_after,
                    archive_key: Some(key.clone()),
                });
                Ok(CompactionReport {
                    archive_key: Some(key),
                    archived_entries,
                    size_before,
                    size_after,
                })
            }
            Err(e) => {
                warn!(error = %e, "compaction failed, history unchanged");
                metrics::counter!("saga_compactions_total", "status" => "failed").increment(1);
                self.emit_error(&e, None);
                self.emit(SagaEvent::CompactionComplete {
                    base: self.base(),
                    success: false,
                    size_before,
                    size_after: self.record.history.size(),
                    archive_key: None,
                });
                Err(e)
            }
        }
    }

    async fn archive(
        &mut self,
        prefix: Vec<NarrativeEntry>,
        remainder: HistoryLedger,
    ) -> Result<String, RuntimeError> {
        // a crash past this point resumes compaction on the next start
        if !self.record.pending_compaction {
            let mut next = self.record.clone();
            next.pending_compaction = true;
            next.touch();
            self.persist(next)
                .await
                .map_err(|e| RuntimeError::Compaction(format!("could not mark pending: {e}")))?;
        }

        let summarizer = Arc::clone(&self.deps.summarizer);
        let prior = self.record.summary.clone();
        let entries = prefix.clone();
        let digest = self
            .drive(async move { summarizer.summarize(&entries, prior.as_ref()).await })
            .await
            .map_err(|e| RuntimeError::Compaction(format!("summarizer: {e}")))?;

        let mut summary = digest.into_summary();
        if let Some(prior) = &self.record.summary {
            summary.archived_count += prior.archived_count;
            if let (Some(earlier), Some(range)) = (&prior.date_range, summary.date_range.as_mut()) {
                range.start = range.start.min(earlier.start);
            }
        }

        let mut next = self.record.clone();
        next.summary = Some(summary);
        next.history = remainder;
        next.handle = None;
        next.pending_compaction = false;
        next.touch();

        let draft = ArchiveDraft::new(self.id.clone(), prefix);
        let store = Arc::clone(&self.deps.store);
        let committed = self
            .drive(async move { store.commit_archive(draft, &next).await })
            .await
            .map_err(|e| RuntimeError::Compaction(format!("archive commit: {e}")))?;

        self.record = committed.record;
        Ok(committed.key)
    }
}
