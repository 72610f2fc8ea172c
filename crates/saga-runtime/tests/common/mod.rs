//! Shared fixtures: a scripted agent, a scripted summarizer, and a store
//! wrapper that can be told to fail.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::{Notify, broadcast};
use tokio_util::sync::CancellationToken;

use saga_core::{DateRange, HistorySummary, NarrativeEntry, SagaEvent, SessionId};
use saga_llm::{
    AgentClient, AgentError, AgentRequest, GenerationEvent, GenerationStream, SummarizeError,
    Summarizer, SummaryDigest, TerminalStatus,
};
use saga_runtime::{Orchestrator, SessionConfig};
use saga_store::{
    ArchiveDraft, ArchiveRecord, CommittedArchive, FileStateStore, SessionRecord, StateStore,
    StoreError,
};

// ─────────────────────────────────────────────────────────────────────────────
// Scripted agent
// ─────────────────────────────────────────────────────────────────────────────

/// One scripted generation.
pub enum Step {
    /// Stream `text` word by word, then end with `handle`.
    Reply { text: String, handle: Option<String> },
    /// Stream `partial`, then wait for cancellation.
    Hang { partial: String },
    /// Wait for `gate` (or cancellation), then reply.
    Gated {
        gate: Arc<Notify>,
        text: String,
        handle: Option<String>,
    },
    /// Report the handle as invalid.
    HandleInvalid,
    /// Fail with `error`.
    Fail(AgentError),
}

impl Step {
    pub fn reply(text: impl Into<String>, handle: &str) -> Self {
        Self::Reply {
            text: text.into(),
            handle: Some(handle.to_string()),
        }
    }

    pub fn hang(partial: &str) -> Self {
        Self::Hang {
            partial: partial.to_string(),
        }
    }

    pub fn gated(gate: &Arc<Notify>, text: &str) -> Self {
        Self::Gated {
            gate: Arc::clone(gate),
            text: text.to_string(),
            handle: Some("h-gated".to_string()),
        }
    }
}

/// Agent that plays back queued steps, then echoes once they run out.
#[derive(Default)]
pub struct ScriptedAgent {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<AgentRequest>>,
}

impl ScriptedAgent {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, step: Step) {
        self.steps.lock().unwrap().push_back(step);
    }

    pub fn requests(&self) -> Vec<AgentRequest> {
        self.requests.lock().unwrap().clone()
    }
}

/// Reply produced once the script is exhausted.
pub fn echo(input: &str) -> String {
    format!("The narrator answers {input}.")
}

impl AgentClient for ScriptedAgent {
    fn model(&self) -> &str {
        "narrator-test"
    }

    fn generate(&self, request: AgentRequest, cancel: CancellationToken) -> GenerationStream {
        let mut requests = self.requests.lock().unwrap();
        let n = requests.len() + 1;
        let step = self.steps.lock().unwrap().pop_front().unwrap_or_else(|| Step::Reply {
            text: echo(&request.input),
            handle: Some(format!("h-{n}")),
        });
        requests.push(request);

        Box::pin(async_stream::stream! {
            match step {
                Step::Reply { text, handle } => {
                    for word in text.split_inclusive(' ') {
                        yield GenerationEvent::Delta(word.to_string());
                    }
                    yield GenerationEvent::Finished(TerminalStatus::End { handle });
                }
                Step::Hang { partial } => {
                    yield GenerationEvent::Delta(partial);
                    cancel.cancelled().await;
                    yield GenerationEvent::Finished(TerminalStatus::TruncatedByAbort);
                }
                Step::Gated { gate, text, handle } => {
                    let released = tokio::select! {
                        () = gate.notified() => true,
                        () = cancel.cancelled() => false,
                    };
                    if released {
                        yield GenerationEvent::Delta(text);
                        yield GenerationEvent::Finished(TerminalStatus::End { handle });
                    } else {
                        yield GenerationEvent::Finished(TerminalStatus::TruncatedByAbort);
                    }
                }
                Step::HandleInvalid => {
                    yield GenerationEvent::Finished(TerminalStatus::HandleInvalid);
                }
                Step::Fail(error) => {
                    yield GenerationEvent::Finished(TerminalStatus::Error(error));
                }
            }
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scripted summarizer
// ─────────────────────────────────────────────────────────────────────────────

/// Summarizer returning a deterministic digest, or failing on demand.
#[derive(Default)]
pub struct ScriptedSummarizer {
    pub fail: AtomicBool,
    calls: Mutex<Vec<(usize, Option<String>)>>,
}

impl ScriptedSummarizer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `(entry count, prior digest)` for every call.
    pub fn calls(&self) -> Vec<(usize, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Summarizer for ScriptedSummarizer {
    async fn summarize(
        &self,
        entries: &[NarrativeEntry],
        prior: Option<&HistorySummary>,
    ) -> Result<SummaryDigest, SummarizeError> {
        self.calls
            .lock()
            .unwrap()
            .push((entries.len(), prior.map(|p| p.digest_text.clone())));
        if self.fail.load(Ordering::SeqCst) {
            return Err(SummarizeError::EmptyDigest);
        }
        Ok(SummaryDigest {
            text: format!("Digest of {} passages.", entries.len()),
            model: "narrator-small".into(),
            entry_count: entries.len(),
            date_range: DateRange::of(entries),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store wrapper
// ─────────────────────────────────────────────────────────────────────────────

/// Delegating store with switchable write failures.
pub struct FlakyStore {
    inner: Arc<dyn StateStore>,
    pub fail_puts: AtomicBool,
    pub fail_archives: AtomicBool,
    puts: AtomicUsize,
    held_put: Mutex<Option<PutGate>>,
}

/// Holds the next `put` until released.
#[derive(Clone, Default)]
pub struct PutGate {
    /// Signalled once the held write has begun.
    pub entered: Arc<Notify>,
    /// Lets the held write proceed.
    pub proceed: Arc<Notify>,
}

impl PutGate {
    /// Wait (bounded) until the held write has begun.
    pub async fn wait_entered(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.entered.notified())
            .await
            .expect("timed out waiting for a held write");
    }

    pub fn release(&self) {
        self.proceed.notify_one();
    }
}

impl FlakyStore {
    pub fn new(inner: Arc<dyn StateStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_puts: AtomicBool::new(false),
            fail_archives: AtomicBool::new(false),
            puts: AtomicUsize::new(0),
            held_put: Mutex::new(None),
        })
    }

    /// Park the next `put` until the returned gate is released.
    pub fn hold_next_put(&self) -> PutGate {
        let gate = PutGate::default();
        *self.held_put.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Successful `put` calls.
    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub async fn record(&self, id: &str) -> SessionRecord {
        self.inner
            .get(&SessionId::from(id))
            .await
            .unwrap()
            .expect("record exists")
    }
}

#[async_trait]
impl StateStore for FlakyStore {
    async fn get(&self, id: &SessionId) -> saga_store::Result<Option<SessionRecord>> {
        self.inner.get(id).await
    }

    async fn put(&self, record: &SessionRecord) -> saga_store::Result<()> {
        let held = self.held_put.lock().unwrap().take();
        if let Some(gate) = held {
            gate.entered.notify_one();
            gate.proceed.notified().await;
        }
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StoreError::Internal("injected put failure".into()));
        }
        self.inner.put(record).await?;
        let _ = self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn commit_archive(
        &self,
        draft: ArchiveDraft,
        record: &SessionRecord,
    ) -> saga_store::Result<CommittedArchive> {
        if self.fail_archives.load(Ordering::SeqCst) {
            return Err(StoreError::Internal("injected archive failure".into()));
        }
        self.inner.commit_archive(draft, record).await
    }

    async fn get_archive(
        &self,
        id: &SessionId,
        key: &str,
    ) -> saga_store::Result<Option<ArchiveRecord>> {
        self.inner.get_archive(id, key).await
    }

    async fn list_archives(&self, id: &SessionId) -> saga_store::Result<Vec<String>> {
        self.inner.list_archives(id).await
    }

    async fn list_sessions(&self) -> saga_store::Result<Vec<SessionId>> {
        self.inner.list_sessions().await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Harness
// ─────────────────────────────────────────────────────────────────────────────

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub agent: Arc<ScriptedAgent>,
    pub summarizer: Arc<ScriptedSummarizer>,
    pub store: Arc<FlakyStore>,
    pub events: broadcast::Receiver<SagaEvent>,
    pub dir: TempDir,
}

impl Harness {
    /// Fresh file-backed harness.
    pub async fn new(config: SessionConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self::in_dir(dir, config).await
    }

    /// Harness over an existing data directory.
    pub async fn in_dir(dir: TempDir, config: SessionConfig) -> Self {
        let inner: Arc<dyn StateStore> = Arc::new(FileStateStore::open(dir.path()).await.unwrap());
        let store = FlakyStore::new(inner);
        let agent = ScriptedAgent::new();
        let summarizer = ScriptedSummarizer::new();
        let orchestrator = Orchestrator::new(
            store.clone(),
            agent.clone(),
            summarizer.clone(),
            config,
        );
        let events = orchestrator.subscribe();
        Self {
            orchestrator,
            agent,
            summarizer,
            store,
            events,
            dir,
        }
    }

    /// Every event received so far.
    pub fn drain_events(&mut self) -> Vec<SagaEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    /// Wait (bounded) for the first event matching `pred`.
    pub async fn wait_for(&mut self, pred: impl Fn(&SagaEvent) -> bool) -> SagaEvent {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = self.events.recv().await.expect("event channel open");
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }
}

/// Persist a record holding `turns` input/response pairs of `chars` characters each.
pub async fn seed(store: &dyn StateStore, id: &str, turns: usize, chars: usize) -> SessionRecord {
    let mut record = SessionRecord::new(SessionId::from(id));
    for i in 0..turns {
        let _ = record.history.append_input(fill(&format!("move {i} "), chars));
        let _ = record.history.append_response(fill(&format!("scene {i} "), chars), false);
    }
    record.handle = Some("h-seeded".into());
    store.put(&record).await.unwrap();
    record
}

fn fill(prefix: &str, chars: usize) -> String {
    let mut text: String = prefix.chars().take(chars).collect();
    while text.chars().count() < chars {
        text.push('.');
    }
    text
}

/// Small limits so tests stay fast.
pub fn test_config() -> SessionConfig {
    SessionConfig {
        max_input_chars: 200,
        max_queue_len: 16,
        recovery_recent_entries: 4,
        max_recovery_attempts: 1,
        compaction_threshold: 1_000_000,
        retain_count: 20,
    }
}

pub fn types(events: &[SagaEvent]) -> Vec<&str> {
    events.iter().map(SagaEvent::event_type).collect()
}
