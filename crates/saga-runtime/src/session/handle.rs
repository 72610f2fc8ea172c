//! Caller-facing session handle.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use saga_core::{ErrorCode, SagaEvent, SessionId};

use crate::errors::RuntimeError;
use crate::event_emitter::EventEmitter;
use crate::input_policy::InputPolicy;

use super::command::{CompactionReport, SessionCommand, SessionStatus, SubmitOutcome};

/// Cloneable handle to a running session.
///
/// Every method is a request/reply round trip to the session actor. Once the
/// actor stops, all methods return [`RuntimeError::SessionClosed`].
#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    tx: mpsc::Sender<SessionCommand>,
    policy: Arc<InputPolicy>,
    emitter: Arc<EventEmitter>,
}

impl SessionHandle {
    pub(crate) fn new(
        id: SessionId,
        tx: mpsc::Sender<SessionCommand>,
        policy: Arc<InputPolicy>,
        emitter: Arc<EventEmitter>,
    ) -> Self {
        Self {
            id,
            tx,
            policy,
            emitter,
        }
    }

    /// Session identifier.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Submit player input.
    ///
    /// Input failing the policy filter is rejected before it reaches the
    /// queue. Accepted input either starts a turn or waits behind the current
    /// one.
    pub async fn submit_input(&self, text: impl Into<String>) -> Result<SubmitOutcome, RuntimeError> {
        let text = text.into();
        if let Err(violation) = self.policy.check(&text) {
            debug!(session_id = %self.id, reason = violation.label(), "input rejected");
            metrics::counter!("saga_inputs_rejected_total", "reason" => violation.label())
                .increment(1);
            let _ = self.emitter.emit(SagaEvent::error(
                self.id.as_str(),
                ErrorCode::InputRejected,
                violation.to_string(),
                None,
            ));
            return Err(violation.into());
        }
        self.request(|reply| SessionCommand::Submit { text, reply })
            .await?
    }

    /// Stop the running generation, keep its partial output, and drop the queue.
    /// Returns `NotRunning` once the generation has already finished.
    pub async fn abort(&self) -> Result<(), RuntimeError> {
        self.request(|reply| SessionCommand::Abort { reply }).await?
    }

    /// Compact now, ignoring the size threshold. Only valid while idle.
    pub async fn compact_now(&self) -> Result<CompactionReport, RuntimeError> {
        self.request(|reply| SessionCommand::CompactNow { reply })
            .await?
    }

    /// Snapshot of the session state.
    pub async fn status(&self) -> Result<SessionStatus, RuntimeError> {
        self.request(|reply| SessionCommand::Status { reply }).await
    }

    /// Resolve once the session is idle with an empty queue.
    pub async fn wait_idle(&self) -> Result<(), RuntimeError> {
        self.request(|reply| SessionCommand::WaitIdle { reply }).await
    }

    /// Whether the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub(crate) async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.request(|reply| SessionCommand::Shutdown { reply }).await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| RuntimeError::SessionClosed(self.id.to_string()))?;
        rx.await
            .map_err(|_| RuntimeError::SessionClosed(self.id.to_string()))
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("closed", &self.tx.is_closed())
            .finish_non_exhaustive()
    }
}
