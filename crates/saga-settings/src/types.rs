//! Settings type definitions.
//!
//! Every struct uses `#[serde(rename_all = "camelCase", default)]` so a
//! partial JSON file deserializes with compiled defaults filling the gaps.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SagaSettings {
    /// Settings schema version.
    pub version: String,
    /// Display name.
    pub name: String,
    /// Durable storage.
    pub storage: StorageSettings,
    /// Upstream narrative agent.
    pub agent: AgentSettings,
    /// Compaction summarizer.
    pub summarizer: SummarizerSettings,
    /// Per-session behavior.
    pub session: SessionSettings,
    /// History compaction.
    pub compaction: CompactionSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl Default for SagaSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: "saga".to_string(),
            storage: StorageSettings::default(),
            agent: AgentSettings::default(),
            summarizer: SummarizerSettings::default(),
            session: SessionSettings::default(),
            compaction: CompactionSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl SagaSettings {
    /// Reject combinations the orchestrator cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::InvalidValue`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.compaction.threshold_chars == 0 {
            return Err(SettingsError::InvalidValue(
                "compaction.thresholdChars must be > 0".into(),
            ));
        }
        if self.session.max_input_chars == 0 {
            return Err(SettingsError::InvalidValue(
                "session.maxInputChars must be > 0".into(),
            ));
        }
        if self.session.max_queue_len == 0 {
            return Err(SettingsError::InvalidValue(
                "session.maxQueueLen must be > 0".into(),
            ));
        }
        if self.summarizer.max_entry_chars == 0 || self.summarizer.max_serialized_chars == 0 {
            return Err(SettingsError::InvalidValue(
                "summarizer character caps must be > 0".into(),
            ));
        }
        if self.agent.base_url.trim().is_empty() {
            return Err(SettingsError::InvalidValue("agent.baseUrl is empty".into()));
        }
        Ok(())
    }
}

/// Which state store backend to open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One directory per session with atomically replaced JSON files.
    #[default]
    File,
    /// A single `SQLite` database.
    Sqlite,
}

/// Durable storage settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// Backend selection.
    pub backend: StorageBackend,
    /// Root directory for the file backend (relative to `~/.saga`).
    pub data_dir: String,
    /// Database path for the `SQLite` backend (relative to `~/.saga`).
    pub sqlite_path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            data_dir: "data".to_string(),
            sqlite_path: "saga.db".to_string(),
        }
    }
}

/// Upstream agent connection settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentSettings {
    /// Base URL of the generation service.
    pub base_url: String,
    /// Model used for narrative turns.
    pub model: String,
    /// Bearer token. Usually supplied via `SAGA_AGENT_API_KEY`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Connect timeout for agent requests.
    pub request_timeout_ms: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8787".to_string(),
            model: "narrator-large".to_string(),
            api_key: None,
            request_timeout_ms: 60_000,
        }
    }
}

/// Summarizer settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SummarizerSettings {
    /// Lightweight model used for digests.
    pub model: String,
    /// Per-entry character cap when serializing entries for the prompt.
    pub max_entry_chars: usize,
    /// Total character cap of the serialized prompt body.
    pub max_serialized_chars: usize,
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self {
            model: "narrator-small".to_string(),
            max_entry_chars: 2_000,
            max_serialized_chars: 60_000,
        }
    }
}

/// Per-session behavior.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Longest accepted input in characters.
    pub max_input_chars: usize,
    /// Pending-input queue capacity.
    pub max_queue_len: usize,
    /// Recent entries included in a recovery context.
    pub recovery_recent_entries: usize,
    /// Recoveries allowed per input before the error becomes fatal.
    pub max_recovery_attempts: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_input_chars: 4_000,
            max_queue_len: 32,
            recovery_recent_entries: 6,
            max_recovery_attempts: 1,
        }
    }
}

/// Compaction settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompactionSettings {
    /// History size (characters) at or above which compaction runs.
    pub threshold_chars: usize,
    /// Most recent entries kept in the ledger after compaction.
    pub retain_count: usize,
}

impl Default for CompactionSettings {
    fn default() -> Self {
        Self {
            threshold_chars: 100_000,
            retain_count: 20,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults() {
        let s = SagaSettings::default();
        assert_eq!(s.compaction.threshold_chars, 100_000);
        assert_eq!(s.compaction.retain_count, 20);
        assert_eq!(s.session.max_input_chars, 4_000);
        assert_eq!(s.session.recovery_recent_entries, 6);
        assert_eq!(s.session.max_recovery_attempts, 1);
        assert_eq!(s.storage.backend, StorageBackend::File);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(SagaSettings::default()).unwrap();
        assert_eq!(json["compaction"]["thresholdChars"], 100_000);
        assert_eq!(json["session"]["maxQueueLen"], 32);
        assert_eq!(json["storage"]["backend"], "file");
        assert!(json["agent"].get("apiKey").is_none());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: SagaSettings =
            serde_json::from_str(r#"{"compaction": {"retainCount": 4}}"#).unwrap();
        assert_eq!(s.compaction.retain_count, 4);
        assert_eq!(s.compaction.threshold_chars, 100_000);
        assert_eq!(s.logging.level, "info");
    }

    #[test]
    fn backend_parses_lowercase() {
        let s: SagaSettings =
            serde_json::from_str(r#"{"storage": {"backend": "sqlite"}}"#).unwrap();
        assert_eq!(s.storage.backend, StorageBackend::Sqlite);
    }

    #[test]
    fn validate_rejects_zero_threshold() {
        let mut s = SagaSettings::default();
        s.compaction.threshold_chars = 0;
        assert_matches!(s.validate(), Err(SettingsError::InvalidValue(msg)) if msg.contains("thresholdChars"));
    }

    #[test]
    fn validate_rejects_zero_queue() {
        let mut s = SagaSettings::default();
        s.session.max_queue_len = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn validate_rejects_blank_base_url() {
        let mut s = SagaSettings::default();
        s.agent.base_url = "  ".into();
        assert!(s.validate().is_err());
    }
}
