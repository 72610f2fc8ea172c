//! Per-session actor.
//!
//! Each session is a single task owning its [`SessionRecord`]. Callers talk to
//! it through a cloneable [`SessionHandle`]; the actor serializes every
//! mutation, so turns, recovery, and compaction never overlap.
//!
//! [`SessionRecord`]: saga_store::SessionRecord

mod actor;
mod command;
mod compaction;
mod handle;
mod turn;

use std::sync::Arc;

use saga_llm::{AgentClient, Summarizer};
use saga_store::StateStore;

use crate::event_emitter::EventEmitter;

pub(crate) use actor::SessionActor;
pub use command::{CompactionReport, SessionPhase, SessionStatus, SubmitOutcome};
pub use handle::SessionHandle;

/// Collaborators shared by every session of an orchestrator.
#[derive(Clone)]
pub struct SessionDeps {
    /// Durable state.
    pub store: Arc<dyn StateStore>,
    /// Upstream narrative agent.
    pub agent: Arc<dyn AgentClient>,
    /// Digest producer used by compaction.
    pub summarizer: Arc<dyn Summarizer>,
    /// Status-event fan-out.
    pub emitter: Arc<EventEmitter>,
}
