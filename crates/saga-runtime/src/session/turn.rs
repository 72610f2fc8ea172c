//! One player turn: stream a generation, then commit or fail it.

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use saga_core::{SagaEvent, TRUNCATION_MARKER};
use saga_llm::{AgentError, GenerationEvent, TerminalStatus};

use crate::context::build_request;
use crate::errors::RuntimeError;

use super::actor::SessionActor;
use super::command::SessionPhase;

impl SessionActor {
    /// Run `input` through the agent, recovering from an invalid handle at
    /// most `max_recovery_attempts` times. `Err` means the turn was not
    /// written to history.
    #[instrument(skip_all, fields(input_chars = input.chars().count()))]
    pub(super) async fn process_input(&mut self, input: String) -> Result<(), RuntimeError> {
        self.phase = SessionPhase::Processing;
        self.emit(SagaEvent::TurnStarted {
            base: self.base(),
            input: input.clone(),
        });

        let mut recoveries = 0u32;
        loop {
            let (text, status) = if self.abort_requested {
                (String::new(), TerminalStatus::TruncatedByAbort)
            } else {
                self.generate(&input).await
            };
            // an abort wins over whatever the stream reported after it
            let status = if self.abort_requested {
                if !matches!(status, TerminalStatus::TruncatedByAbort) {
                    debug!(status = status.label(), "generation ended after abort request");
                }
                TerminalStatus::TruncatedByAbort
            } else {
                status
            };

            match status {
                TerminalStatus::End { handle } => {
                    self.commit_turn(&input, text, handle).await?;
                    if recoveries > 0 {
                        info!("recovery complete");
                        self.emit(SagaEvent::RecoveryComplete { base: self.base() });
                    }
                    return Ok(());
                }
                TerminalStatus::TruncatedByAbort => {
                    return self.commit_truncated(&input, &text).await;
                }
                TerminalStatus::HandleInvalid => {
                    if recoveries >= self.config.max_recovery_attempts {
                        return Err(self.fail_invalid_handle(&input).await);
                    }
                    recoveries += 1;
                    self.begin_recovery(&input).await?;
                }
                TerminalStatus::Error(e) => {
                    let err = generation_error(&e);
                    self.fail_turn(&input, &err);
                    return Err(err);
                }
            }
        }
    }

    /// Stream one generation, forwarding deltas as they arrive.
    async fn generate(&mut self, input: &str) -> (String, TerminalStatus) {
        let request = build_request(&self.record, input, self.config.recovery_recent_entries);
        debug!(
            resumed = request.handle.is_some(),
            seeded = request.context.is_some(),
            "starting generation"
        );

        let token = CancellationToken::new();
        self.generation = Some(token.clone());
        self.phase = SessionPhase::Processing;
        let mut stream = self.deps.agent.generate(request, token);

        let mut text = String::new();
        let status = loop {
            match self.drive(stream.next()).await {
                Some(GenerationEvent::Delta(delta)) => {
                    text.push_str(&delta);
                    self.emit(SagaEvent::OutputDelta {
                        base: self.base(),
                        delta,
                    });
                }
                Some(GenerationEvent::Finished(status)) => break status,
                None => break TerminalStatus::Error(AgentError::StreamIncomplete),
            }
        };
        self.generation = None;
        (text, status)
    }

    /// Append input and response in one write.
    async fn commit_turn(
        &mut self,
        input: &str,
        text: String,
        handle: Option<String>,
    ) -> Result<(), RuntimeError> {
        let mut next = self.record.clone();
        let input_entry_id = next.history.append_input(input);
        let response_entry_id = next.history.append_response(text, false);
        next.handle = handle;
        next.recovery_attempts = 0;
        next.touch();

        match self.persist(next).await {
            Ok(()) => {
                metrics::counter!("saga_turns_total", "outcome" => "completed").increment(1);
                self.emit(SagaEvent::TurnComplete {
                    base: self.base(),
                    input_entry_id,
                    response_entry_id,
                    truncated: false,
                });
                Ok(())
            }
            Err(e) => {
                self.fail_turn(input, &e);
                Err(e)
            }
        }
    }

    /// Keep what was streamed before an abort, marked as interrupted.
    async fn commit_truncated(&mut self, input: &str, partial: &str) -> Result<(), RuntimeError> {
        let text = if partial.is_empty() {
            TRUNCATION_MARKER.trim_start().to_string()
        } else {
            format!("{partial}{TRUNCATION_MARKER}")
        };
        let mut next = self.record.clone();
        let input_entry_id = next.history.append_input(input);
        let response_entry_id = next.history.append_response(text, true);
        next.touch();

        match self.persist(next).await {
            Ok(()) => {
                info!(partial_chars = partial.chars().count(), "turn aborted");
                metrics::counter!("saga_turns_total", "outcome" => "aborted").increment(1);
                self.emit(SagaEvent::TurnComplete {
                    base: self.base(),
                    input_entry_id,
                    response_entry_id,
                    truncated: true,
                });
                Ok(())
            }
            Err(e) => {
                self.fail_turn(input, &e);
                Err(e)
            }
        }
    }

    /// Drop the stale handle and persist the bumped attempt counter before
    /// reissuing.
    async fn begin_recovery(&mut self, input: &str) -> Result<(), RuntimeError> {
        self.phase = SessionPhase::Recovering;
        let mut next = self.record.clone();
        next.handle = None;
        next.recovery_attempts = next.recovery_attempts.saturating_add(1);
        next.touch();
        let attempt = next.recovery_attempts;

        if let Err(e) = self.persist(next).await {
            self.fail_turn(input, &e);
            return Err(e);
        }
        warn!(attempt, "upstream handle invalid, starting a fresh conversation");
        metrics::counter!("saga_recoveries_total").increment(1);
        self.emit(SagaEvent::RecoveryStarted {
            base: self.base(),
            attempt,
        });
        Ok(())
    }

    async fn fail_invalid_handle(&mut self, input: &str) -> RuntimeError {
        // the next input must not resume the handle that just failed
        if self.record.handle.is_some() {
            let mut next = self.record.clone();
            next.handle = None;
            next.touch();
            if let Err(e) = self.persist(next).await {
                warn!(error = %e, "could not clear invalid handle");
            }
        }
        let err = RuntimeError::HandleInvalid;
        self.fail_turn(input, &err);
        err
    }

    /// Surface a failed turn; history is left as it was.
    pub(super) fn fail_turn(&self, input: &str, err: &RuntimeError) {
        warn!(code = %err.code(), error = %err, "turn failed");
        metrics::counter!("saga_turns_total", "outcome" => "failed", "code" => err.code().as_str())
            .increment(1);
        self.emit_error(err, Some(input));
    }
}

fn generation_error(e: &AgentError) -> RuntimeError {
    RuntimeError::Generation(e.to_string())
}
