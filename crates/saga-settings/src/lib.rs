//! # saga-settings
//!
//! Configuration for the Saga session orchestrator, loaded from three layers
//! (in priority order):
//! 1. **Compiled defaults**: [`SagaSettings::default()`]
//! 2. **User file**: `~/.saga/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `SAGA_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    deep_merge, load_settings, load_settings_from_path, resolve_path, saga_home, settings_path,
};
pub use types::*;

use std::sync::OnceLock;

/// Global settings singleton.
static SETTINGS: OnceLock<SagaSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// On first call, loads settings from `~/.saga/settings.json` with env var
/// overrides. If loading fails, returns compiled defaults.
pub fn get_settings() -> &'static SagaSettings {
    SETTINGS.get_or_init(|| load_settings().unwrap_or_default())
}

/// Initialize the global settings with a specific value.
///
/// # Errors
///
/// Returns the provided settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: SagaSettings) -> std::result::Result<(), SagaSettings> {
    SETTINGS.set(settings)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
