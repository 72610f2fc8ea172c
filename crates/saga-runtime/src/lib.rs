//! # saga-runtime
//!
//! Session orchestration for turn-based narrative play.
//!
//! - **Orchestrator**: registry that opens, resumes, and closes sessions
//! - **Session actor**: one task per session serializing turns, aborts,
//!   handle recovery, and compaction; driven through [`SessionHandle`]
//! - **Input policy**: length and role-override screening before queueing
//! - **Context**: request composition for resumed and fresh conversations
//! - **Events**: broadcast [`EventEmitter`] of `SagaEvent` status updates

#![deny(unsafe_code)]

pub mod config;
pub mod context;
pub mod errors;
pub mod event_emitter;
pub mod input_policy;
pub mod orchestrator;
pub mod session;

pub use config::SessionConfig;
pub use errors::RuntimeError;
pub use event_emitter::EventEmitter;
pub use input_policy::{InputPolicy, PolicyViolation};
pub use orchestrator::Orchestrator;
pub use session::{
    CompactionReport, SessionDeps, SessionHandle, SessionPhase, SessionStatus, SubmitOutcome,
};
