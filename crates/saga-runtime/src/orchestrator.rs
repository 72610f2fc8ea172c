//! Session registry.
//!
//! Opens sessions on demand (loading or creating their records), hands out
//! [`SessionHandle`]s, and broadcasts every session's events on one channel.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{Instrument, info, info_span, warn};

use saga_core::{SagaEvent, SessionId};
use saga_llm::{AgentClient, Summarizer};
use saga_store::{SessionRecord, StateStore};

use crate::config::SessionConfig;
use crate::errors::RuntimeError;
use crate::event_emitter::EventEmitter;
use crate::input_policy::InputPolicy;
use crate::session::{SessionActor, SessionDeps, SessionHandle};

/// Commands buffered per session before senders wait.
const COMMAND_BUFFER: usize = 64;

struct LiveSession {
    handle: SessionHandle,
    task: JoinHandle<()>,
}

/// Owns all running sessions.
pub struct Orchestrator {
    deps: SessionDeps,
    config: Arc<SessionConfig>,
    policy: Arc<InputPolicy>,
    sessions: DashMap<SessionId, LiveSession>,
    open_lock: Mutex<()>,
}

impl Orchestrator {
    /// Create an orchestrator with the built-in input policy.
    pub fn new(
        store: Arc<dyn StateStore>,
        agent: Arc<dyn AgentClient>,
        summarizer: Arc<dyn Summarizer>,
        config: SessionConfig,
    ) -> Self {
        Self {
            deps: SessionDeps {
                store,
                agent,
                summarizer,
                emitter: Arc::new(EventEmitter::new()),
            },
            policy: Arc::new(InputPolicy::new(config.max_input_chars)),
            config: Arc::new(config),
            sessions: DashMap::new(),
            open_lock: Mutex::new(()),
        }
    }

    /// Replace the input policy for sessions opened afterwards.
    #[must_use]
    pub fn with_policy(mut self, policy: InputPolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Receive events from every session.
    pub fn subscribe(&self) -> broadcast::Receiver<SagaEvent> {
        self.deps.emitter.subscribe()
    }

    /// The shared event emitter.
    pub fn emitter(&self) -> &Arc<EventEmitter> {
        &self.deps.emitter
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.deps.store
    }

    /// Limits applied to every session.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Return the running session, loading or creating it first if needed.
    pub async fn open_session(&self, id: SessionId) -> Result<SessionHandle, RuntimeError> {
        if let Some(handle) = self.session(&id) {
            return Ok(handle);
        }
        let _guard = self.open_lock.lock().await;
        if let Some(handle) = self.session(&id) {
            return Ok(handle);
        }

        let record = if let Some(record) = self.deps.store.get(&id).await? {
            info!(session_id = %id, entries = record.history.len(), "resuming session");
            record
        } else {
            let record = SessionRecord::new(id.clone());
            self.deps.store.put(&record).await?;
            info!(session_id = %id, "created session");
            record
        };

        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = SessionHandle::new(
            id.clone(),
            tx,
            Arc::clone(&self.policy),
            Arc::clone(&self.deps.emitter),
        );
        let actor = SessionActor::new(record, Arc::clone(&self.config), self.deps.clone(), rx);
        let span = info_span!("session", session_id = %id);
        let task = tokio::spawn(actor.run().instrument(span));

        let _ = self.sessions.insert(
            id,
            LiveSession {
                handle: handle.clone(),
                task,
            },
        );
        self.record_active();
        Ok(handle)
    }

    /// Handle to a running session.
    pub fn session(&self, id: &SessionId) -> Option<SessionHandle> {
        self.sessions
            .get(id)
            .filter(|live| !live.handle.is_closed())
            .map(|live| live.handle.clone())
    }

    /// IDs of running sessions.
    pub fn open_sessions(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// IDs of every persisted session.
    pub async fn list_sessions(&self) -> Result<Vec<SessionId>, RuntimeError> {
        Ok(self.deps.store.list_sessions().await?)
    }

    /// Stop a session. A generation in flight is aborted and queued inputs
    /// are discarded. Returns `false` if it was not running.
    pub async fn close_session(&self, id: &SessionId) -> bool {
        let Some((_, live)) = self.sessions.remove(id) else {
            return false;
        };
        if let Err(e) = live.handle.shutdown().await {
            warn!(session_id = %id, error = %e, "session already stopped");
        }
        if let Err(e) = live.task.await {
            warn!(session_id = %id, error = %e, "session task failed");
        }
        self.record_active();
        info!(session_id = %id, "session closed");
        true
    }

    /// Stop every session.
    pub async fn shutdown(&self) {
        let ids = self.open_sessions();
        info!(count = ids.len(), "shutting down sessions");
        for id in ids {
            let _ = self.close_session(&id).await;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn record_active(&self) {
        metrics::gauge!("saga_sessions_active").set(self.sessions.len() as f64);
    }
}
