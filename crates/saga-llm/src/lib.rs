//! # saga-llm
//!
//! Upstream model access for Saga.
//!
//! - **Agent client**: [`AgentClient`] trait yielding a stream of deltas and
//!   exactly one terminal status, plus the HTTP/SSE [`HttpAgentClient`]
//! - **SSE parsing**: line buffering over chunked response bodies
//! - **Summarizer**: [`Summarizer`] trait and the agent-backed
//!   [`LlmSummarizer`] used by compaction

#![deny(unsafe_code)]

pub mod client;
pub mod errors;
pub mod http;
pub mod sse;
pub mod summarizer;

pub use client::{
    AgentClient, AgentRequest, GenerationEvent, GenerationStream, TerminalStatus, collect,
};
pub use errors::{AgentError, SummarizeError};
pub use http::HttpAgentClient;
pub use summarizer::{LlmSummarizer, Summarizer, SummaryDigest};
