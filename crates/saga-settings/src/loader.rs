//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`SagaSettings::default()`]
//! 2. If `~/.saga/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `SAGA_*` environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{SagaSettings, StorageBackend};

/// Directory holding user configuration and default data (`~/.saga`).
pub fn saga_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".saga")
}

/// Resolve the path to the settings file (`~/.saga/settings.json`).
pub fn settings_path() -> PathBuf {
    saga_home().join("settings.json")
}

/// Resolve a configured path relative to [`saga_home`] unless absolute.
pub fn resolve_path(configured: &str) -> PathBuf {
    let path = PathBuf::from(configured);
    if path.is_absolute() {
        path
    } else {
        saga_home().join(path)
    }
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<SagaSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON or the merged values fail validation, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<SagaSettings> {
    let defaults = serde_json::to_value(SagaSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: SagaSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are logged and ignored (fall back to file/default).
pub fn apply_env_overrides(settings: &mut SagaSettings) {
    // ── Storage ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("SAGA_STORAGE_BACKEND") {
        match parse_backend(&v) {
            Some(backend) => settings.storage.backend = backend,
            None => tracing::warn!(key = "SAGA_STORAGE_BACKEND", value = %v, "unknown backend, ignoring"),
        }
    }
    if let Some(v) = read_env_string("SAGA_DATA_DIR") {
        settings.storage.data_dir = v;
    }
    if let Some(v) = read_env_string("SAGA_SQLITE_PATH") {
        settings.storage.sqlite_path = v;
    }

    // ── Agent ───────────────────────────────────────────────────────
    if let Some(v) = read_env_string("SAGA_AGENT_URL") {
        settings.agent.base_url = v;
    }
    if let Some(v) = read_env_string("SAGA_AGENT_MODEL") {
        settings.agent.model = v;
    }
    if let Some(v) = read_env_string("SAGA_AGENT_API_KEY") {
        settings.agent.api_key = Some(v);
    }
    if let Some(v) = read_env_u64("SAGA_AGENT_TIMEOUT_MS", 1_000, 3_600_000) {
        settings.agent.request_timeout_ms = v;
    }
    if let Some(v) = read_env_string("SAGA_SUMMARIZER_MODEL") {
        settings.summarizer.model = v;
    }

    // ── Session and compaction ──────────────────────────────────────
    if let Some(v) = read_env_usize("SAGA_MAX_INPUT_CHARS", 1, 1_000_000) {
        settings.session.max_input_chars = v;
    }
    if let Some(v) = read_env_usize("SAGA_MAX_QUEUE_LEN", 1, 10_000) {
        settings.session.max_queue_len = v;
    }
    if let Some(v) = read_env_usize("SAGA_COMPACTION_THRESHOLD", 1, 100_000_000) {
        settings.compaction.threshold_chars = v;
    }
    if let Some(v) = read_env_usize("SAGA_COMPACTION_RETAIN", 0, 100_000) {
        settings.compaction.retain_count = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("SAGA_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_bool("SAGA_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a storage backend name.
pub fn parse_backend(val: &str) -> Option<StorageBackend> {
    match val.to_lowercase().as_str() {
        "file" => Some(StorageBackend::File),
        "sqlite" => Some(StorageBackend::Sqlite),
        _ => None,
    }
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}
