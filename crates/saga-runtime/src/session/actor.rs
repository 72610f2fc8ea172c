//! Session actor loop.
//!
//! The actor alternates between two modes. Idle, it awaits the next command.
//! Busy (generating, persisting, compacting), it runs the work through
//! [`SessionActor::drive`], which keeps answering commands so inputs queue,
//! aborts land, and status stays readable mid-turn.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use saga_core::{BaseEvent, CompactionReason, SagaEvent, SessionId};
use saga_store::{SessionRecord, StoreError};

use crate::config::SessionConfig;
use crate::errors::RuntimeError;

use super::SessionDeps;
use super::command::{Reply, SessionCommand, SessionPhase, SessionStatus, SubmitOutcome};

/// Input waiting its turn. Lost if the process exits.
struct QueuedInput {
    text: String,
    submitted_at: Instant,
}

impl QueuedInput {
    fn new(text: String) -> Self {
        Self {
            text,
            submitted_at: Instant::now(),
        }
    }
}

pub(crate) struct SessionActor {
    pub(super) id: SessionId,
    /// Last durably committed state.
    pub(super) record: SessionRecord,
    pub(super) config: Arc<SessionConfig>,
    pub(super) deps: SessionDeps,
    rx: mpsc::Receiver<SessionCommand>,
    rx_open: bool,
    queue: VecDeque<QueuedInput>,
    pub(super) phase: SessionPhase,
    /// Cancellation for the generation in flight.
    pub(super) generation: Option<CancellationToken>,
    pub(super) abort_requested: bool,
    abort_waiters: Vec<Reply<Result<(), RuntimeError>>>,
    idle_waiters: Vec<Reply<()>>,
    shutdown_waiters: Vec<Reply<()>>,
    closing: bool,
}

impl SessionActor {
    pub(crate) fn new(
        record: SessionRecord,
        config: Arc<SessionConfig>,
        deps: SessionDeps,
        rx: mpsc::Receiver<SessionCommand>,
    ) -> Self {
        Self {
            id: record.id.clone(),
            record,
            config,
            deps,
            rx,
            rx_open: true,
            queue: VecDeque::new(),
            phase: SessionPhase::Idle,
            generation: None,
            abort_requested: false,
            abort_waiters: Vec::new(),
            idle_waiters: Vec::new(),
            shutdown_waiters: Vec::new(),
            closing: false,
        }
    }

    pub(crate) async fn run(mut self) {
        info!(
            entries = self.record.history.len(),
            size = self.record.history.size(),
            pending_compaction = self.record.pending_compaction,
            "session started"
        );

        // compaction owed from a previous run is settled before any input
        self.compact_if_due().await;
        self.drain_queue().await;

        while !self.closing {
            let Some(command) = self.rx.recv().await else {
                debug!("all handles dropped");
                break;
            };
            self.handle_idle(command).await;
        }

        for waiter in self.shutdown_waiters.drain(..) {
            let _ = waiter.send(());
        }
        info!("session stopped");
    }

    async fn handle_idle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Submit { text, reply } => {
                let _ = reply.send(Ok(SubmitOutcome::Started));
                self.queue.push_back(QueuedInput::new(text));
                self.drain_queue().await;
            }
            SessionCommand::Abort { reply } => {
                let _ = reply.send(Err(RuntimeError::NotRunning));
            }
            SessionCommand::CompactNow { reply } => {
                let result = self.compact(CompactionReason::Manual).await;
                let _ = reply.send(result);
                self.drain_queue().await;
            }
            SessionCommand::Status { reply } => {
                let _ = reply.send(self.status());
            }
            SessionCommand::WaitIdle { reply } => {
                let _ = reply.send(());
            }
            SessionCommand::Shutdown { reply } => {
                self.shutdown_waiters.push(reply);
                self.closing = true;
            }
        }
    }

    /// Process queued inputs in order, compacting in the gap after each turn.
    async fn drain_queue(&mut self) {
        while !self.closing {
            let Some(input) = self.queue.pop_front() else {
                break;
            };
            debug!(
                waited_ms = input.submitted_at.elapsed().as_millis(),
                "dequeued input"
            );
            let turn = self.process_input(input.text).await;
            self.settle_abort(turn);
            if !self.closing {
                self.compact_if_due().await;
            }
        }
        if self.closing {
            self.discard_queue();
        }
        self.become_idle();
    }

    /// Run `work` to completion while servicing commands.
    ///
    /// `work` must not borrow the actor; callers move owned clones in.
    pub(super) async fn drive<F: Future>(&mut self, work: F) -> F::Output {
        tokio::pin!(work);
        loop {
            tokio::select! {
                biased;
                out = &mut work => return out,
                command = self.rx.recv(), if self.rx_open => match command {
                    Some(command) => self.handle_busy(command),
                    None => {
                        self.rx_open = false;
                        self.begin_close();
                    }
                },
            }
        }
    }

    fn handle_busy(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Submit { text, reply } => {
                let _ = reply.send(self.enqueue(text));
            }
            SessionCommand::Abort { reply } => {
                if self.generation_active() {
                    self.request_abort();
                    self.abort_waiters.push(reply);
                } else {
                    let _ = reply.send(Err(RuntimeError::NotRunning));
                }
            }
            SessionCommand::CompactNow { reply } => {
                let _ = reply.send(Err(RuntimeError::Busy));
            }
            SessionCommand::Status { reply } => {
                let _ = reply.send(self.status());
            }
            SessionCommand::WaitIdle { reply } => self.idle_waiters.push(reply),
            SessionCommand::Shutdown { reply } => {
                self.shutdown_waiters.push(reply);
                self.begin_close();
            }
        }
    }

    fn enqueue(&mut self, text: String) -> Result<SubmitOutcome, RuntimeError> {
        if self.closing {
            return Err(RuntimeError::SessionClosed(self.id.to_string()));
        }
        let capacity = self.config.max_queue_len;
        if self.queue.len() >= capacity {
            let err = RuntimeError::QueueFull { capacity };
            metrics::counter!("saga_inputs_rejected_total", "reason" => "queue_full").increment(1);
            self.emit_error(&err, Some(&text));
            return Err(err);
        }
        self.queue.push_back(QueuedInput::new(text));
        let position = self.queue.len();
        debug!(position, "input queued");
        self.emit(SagaEvent::InputQueued {
            base: self.base(),
            position,
        });
        Ok(SubmitOutcome::Queued { position })
    }

    /// A generation is streaming, or a recovery is about to reissue one.
    fn generation_active(&self) -> bool {
        self.generation.is_some() || self.phase == SessionPhase::Recovering
    }

    fn request_abort(&mut self) {
        self.abort_requested = true;
        if let Some(token) = &self.generation {
            token.cancel();
        }
    }

    fn begin_close(&mut self) {
        self.closing = true;
        if self.generation_active() {
            self.request_abort();
        }
    }

    /// Answer a pending abort with the outcome of writing its turn.
    fn settle_abort(&mut self, turn: Result<(), RuntimeError>) {
        if !self.abort_requested && self.abort_waiters.is_empty() {
            return;
        }
        self.abort_requested = false;
        self.discard_queue();
        // the store error is not cloneable; later waiters get its message
        let mut first = Some(turn);
        let mut failure: Option<String> = None;
        for waiter in self.abort_waiters.drain(..) {
            let reply = match first.take() {
                Some(result) => result,
                None => failure.as_ref().map_or(Ok(()), |message| {
                    Err(RuntimeError::Persistence(StoreError::Internal(message.clone())))
                }),
            };
            if let Err(e) = &reply {
                failure = Some(e.to_string());
            }
            let _ = waiter.send(reply);
        }
    }

    fn discard_queue(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        let inputs: Vec<String> = self.queue.drain(..).map(|q| q.text).collect();
        info!(count = inputs.len(), "discarding queued inputs");
        self.emit(SagaEvent::InputsDiscarded {
            base: self.base(),
            inputs,
        });
    }

    fn become_idle(&mut self) {
        self.phase = SessionPhase::Idle;
        self.emit(SagaEvent::SessionIdle { base: self.base() });
        for waiter in self.idle_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    fn status(&self) -> SessionStatus {
        SessionStatus {
            session_id: self.id.clone(),
            phase: self.phase,
            queued: self.queue.len(),
            entry_count: self.record.history.len(),
            history_size: self.record.history.size(),
            has_handle: self.record.handle.is_some(),
            has_summary: self.record.summary.is_some(),
            pending_compaction: self.record.pending_compaction,
            recovery_attempts: self.record.recovery_attempts,
            archive_count: self.record.archives.len(),
        }
    }

    /// Durably replace the record; on failure the in-memory record is untouched.
    pub(super) async fn persist(&mut self, next: SessionRecord) -> Result<(), RuntimeError> {
        let store = Arc::clone(&self.deps.store);
        let saved = self
            .drive(async move { store.put(&next).await.map(|()| next) })
            .await?;
        self.record = saved;
        Ok(())
    }

    pub(super) fn base(&self) -> BaseEvent {
        BaseEvent::now(self.id.as_str())
    }

    pub(super) fn emit(&self, event: SagaEvent) {
        let _ = self.deps.emitter.emit(event);
    }

    pub(super) fn emit_error(&self, err: &RuntimeError, input: Option<&str>) {
        self.emit(SagaEvent::error(
            self.id.as_str(),
            err.code(),
            err.to_string(),
            input.map(str::to_string),
        ));
    }
}
