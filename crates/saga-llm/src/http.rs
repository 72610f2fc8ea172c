//! HTTP/SSE implementation of [`AgentClient`].
//!
//! Wire protocol:
//!
//! - `POST {base_url}/v1/generate` with body
//!   `{"model", "handle", "context", "input", "stream": true}` and an
//!   optional bearer token
//! - Response body is SSE; each `data:` payload is one of
//!   `{"type":"delta","text"}`, `{"type":"end","handle"}`, or
//!   `{"type":"error","code","message","retryable"}`
//!
//! HTTP 404/410 on a request that carried a handle, or an `error` event with
//! code `handle_invalid`, means the handle expired upstream.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use saga_settings::AgentSettings;

use crate::client::{AgentClient, AgentRequest, GenerationEvent, GenerationStream, TerminalStatus};
use crate::errors::AgentError;
use crate::sse::parse_sse_lines;

/// Error code the service uses for an expired handle.
pub const HANDLE_INVALID_CODE: &str = "handle_invalid";

/// Connection settings shared by clones of a client.
#[derive(Debug)]
struct Endpoint {
    base_url: String,
    api_key: Option<String>,
}

/// Agent client speaking the SSE generation protocol.
#[derive(Clone, Debug)]
pub struct HttpAgentClient {
    client: reqwest::Client,
    endpoint: Arc<Endpoint>,
    model: String,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    handle: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a str>,
    input: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    Delta {
        text: String,
    },
    End {
        #[serde(default)]
        handle: Option<String>,
    },
    Error {
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        message: String,
        #[serde(default)]
        retryable: bool,
    },
}

impl HttpAgentClient {
    /// Client for `base_url` using `model`.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, model, None)
    }

    /// Client sharing an existing `reqwest` client.
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let model = model.into();
        info!(base_url = %base_url, model = %model, "agent client initialized");
        Self {
            client,
            endpoint: Arc::new(Endpoint { base_url, api_key }),
            model,
        }
    }

    /// Build from settings, applying the configured connect timeout.
    pub fn from_settings(settings: &AgentSettings) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(settings.request_timeout_ms))
            .build()?;
        Ok(Self::with_client(
            client,
            settings.base_url.clone(),
            settings.model.clone(),
            settings.api_key.clone(),
        ))
    }

    /// Same endpoint and connection pool, different model.
    #[must_use]
    pub fn with_model(&self, model: impl Into<String>) -> Self {
        Self {
            client: self.client.clone(),
            endpoint: Arc::clone(&self.endpoint),
            model: model.into(),
        }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let _ = headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        if let Some(key) = &self.endpoint.api_key {
            match HeaderValue::from_str(&format!("Bearer {key}")) {
                Ok(value) => {
                    let _ = headers.insert(AUTHORIZATION, value);
                }
                Err(_) => warn!("api key contains invalid header characters, sending unauthenticated"),
            }
        }
        headers
    }

    async fn send(&self, request: &AgentRequest) -> Result<reqwest::Response, TerminalStatus> {
        let url = format!("{}/v1/generate", self.endpoint.base_url);
        let body = WireRequest {
            model: &self.model,
            handle: request.handle.as_deref(),
            context: request.context.as_deref(),
            input: &request.input,
            stream: true,
        };
        debug!(
            model = %self.model,
            resumed = request.handle.is_some(),
            context_chars = request.context.as_deref().map_or(0, saga_core::text::char_len),
            "starting generation"
        );

        let response = self
            .client
            .post(&url)
            .headers(self.headers())
            .json(&body)
            .send()
            .await
            .map_err(|e| TerminalStatus::Error(e.into()))?;

        let status = response.status().as_u16();
        if response.status().is_success() {
            return Ok(response);
        }

        let body_text = response.text().await.unwrap_or_default();
        let (message, code) = parse_error_body(&body_text, status);
        let handle_rejected = code.as_deref() == Some(HANDLE_INVALID_CODE)
            || (request.handle.is_some() && matches!(status, 404 | 410));
        if handle_rejected {
            warn!(status, "upstream rejected conversation handle");
            return Err(TerminalStatus::HandleInvalid);
        }
        error!(
            status,
            code = code.as_deref().unwrap_or("unknown"),
            "agent API error"
        );
        Err(TerminalStatus::Error(AgentError::Api {
            status,
            message,
            code,
            retryable: status == 429 || status >= 500,
        }))
    }
}

impl AgentClient for HttpAgentClient {
    fn model(&self) -> &str {
        &self.model
    }

    fn generate(&self, request: AgentRequest, cancel: CancellationToken) -> GenerationStream {
        let this = self.clone();
        Box::pin(async_stream::stream! {
            let sent = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                result = this.send(&request) => Some(result),
            };
            let response = match sent {
                Some(Ok(response)) => response,
                Some(Err(status)) => {
                    record_outcome(&status);
                    yield GenerationEvent::Finished(status);
                    return;
                }
                None => {
                    record_outcome(&TerminalStatus::TruncatedByAbort);
                    yield GenerationEvent::Finished(TerminalStatus::TruncatedByAbort);
                    return;
                }
            };

            let mut lines = Box::pin(parse_sse_lines(response.bytes_stream()));
            loop {
                let next = tokio::select! {
                    biased;
                    () = cancel.cancelled() => None,
                    line = lines.next() => Some(line),
                };
                let status = match next {
                    // dropping `lines` closes the connection
                    None => {
                        debug!("generation cancelled mid-stream");
                        TerminalStatus::TruncatedByAbort
                    }
                    Some(None) => TerminalStatus::Error(AgentError::StreamIncomplete),
                    Some(Some(Err(e))) => TerminalStatus::Error(e),
                    Some(Some(Ok(data))) => match decode_event(&data) {
                        Ok(Some(GenerationEvent::Delta(text))) => {
                            yield GenerationEvent::Delta(text);
                            continue;
                        }
                        Ok(Some(GenerationEvent::Finished(status))) => status,
                        Ok(None) => continue,
                        Err(e) => TerminalStatus::Error(e),
                    },
                };
                record_outcome(&status);
                yield GenerationEvent::Finished(status);
                return;
            }
        })
    }
}

/// Map one SSE payload to a generation event. Unknown types are skipped.
fn decode_event(data: &str) -> Result<Option<GenerationEvent>, AgentError> {
    let value: serde_json::Value = serde_json::from_str(data).map_err(|e| AgentError::Parse {
        message: format!("invalid event JSON: {e}"),
    })?;
    let known = matches!(
        value.get("type").and_then(serde_json::Value::as_str),
        Some("delta" | "end" | "error")
    );
    if !known {
        debug!(data = %saga_core::text::truncate_chars(data, 100), "skipping unknown event type");
        return Ok(None);
    }
    let event: WireEvent = serde_json::from_value(value).map_err(|e| AgentError::Parse {
        message: format!("malformed event: {e}"),
    })?;
    Ok(Some(match event {
        WireEvent::Delta { text } => GenerationEvent::Delta(text),
        WireEvent::End { handle } => GenerationEvent::Finished(TerminalStatus::End { handle }),
        WireEvent::Error { code, .. } if code.as_deref() == Some(HANDLE_INVALID_CODE) => {
            GenerationEvent::Finished(TerminalStatus::HandleInvalid)
        }
        WireEvent::Error {
            code,
            message,
            retryable,
        } => GenerationEvent::Finished(TerminalStatus::Error(AgentError::Remote {
            code: code.unwrap_or_else(|| "unknown".into()),
            message,
            retryable,
        })),
    }))
}

/// Extract message and code from an error response body.
fn parse_error_body(body: &str, status: u16) -> (String, Option<String>) {
    let Ok(json) = serde_json::from_str::<serde_json::Value>(body) else {
        return (format!("HTTP {status}: {body}"), None);
    };
    let error = if json["error"].is_object() {
        &json["error"]
    } else {
        &json
    };
    let message = error["message"]
        .as_str()
        .map_or_else(|| format!("HTTP {status}: {body}"), String::from);
    let code = error["code"].as_str().map(String::from);
    (message, code)
}

fn record_outcome(status: &TerminalStatus) {
    let category = match status {
        TerminalStatus::Error(e) => e.category(),
        other => other.label(),
    };
    metrics::counter!("saga_agent_generations_total", "outcome" => category).increment(1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
