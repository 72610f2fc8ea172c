//! Per-session limits resolved from settings.

use saga_settings::SagaSettings;

/// Limits shared by every session an orchestrator runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Maximum input length in characters.
    pub max_input_chars: usize,
    /// Pending-input queue capacity (excludes the input being processed).
    pub max_queue_len: usize,
    /// Entries replayed into the context of a fresh upstream conversation.
    pub recovery_recent_entries: usize,
    /// Recoveries attempted per input before the failure is fatal.
    pub max_recovery_attempts: u32,
    /// Visible-history size (characters) that triggers compaction.
    pub compaction_threshold: usize,
    /// Newest entries kept visible after compaction.
    pub retain_count: usize,
}

impl SessionConfig {
    /// Resolve from loaded settings.
    pub fn from_settings(settings: &SagaSettings) -> Self {
        Self {
            max_input_chars: settings.session.max_input_chars,
            max_queue_len: settings.session.max_queue_len,
            recovery_recent_entries: settings.session.recovery_recent_entries,
            max_recovery_attempts: settings.session.max_recovery_attempts,
            compaction_threshold: settings.compaction.threshold_chars,
            retain_count: settings.compaction.retain_count,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_settings(&SagaSettings::default())
    }
}
