//! Session configuration.

use std::time::Duration;

use serde::Deserialize;

use bw_engine::ListSource;

/// Lower bound on the badge coalescing window.
pub const MIN_BADGE_COALESCE_MS: u64 = 300;
/// Upper bound on the badge coalescing window.
pub const MAX_BADGE_COALESCE_MS: u64 = 1000;

/// Tunables for one session instance.
///
/// Deserializable so the extension can ship overrides next to the bundled
/// assets; every field has a default, so `{}` is a valid document.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Badge refresh coalescing window in milliseconds. Values outside
    /// 300..=1000 are clamped.
    pub badge_coalesce_ms: u64,
    /// Delay before the background engine upgrade is attempted, in
    /// milliseconds. Kept a few seconds out so the upgrade never competes
    /// with startup-critical work.
    pub upgrade_delay_ms: u64,
    /// Durable-store key for the serialized engine.
    pub cache_key: String,
    /// Filter lists the background upgrade builds from. Empty disables the
    /// upgrade entirely.
    pub list_sources: Vec<ListSource>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            badge_coalesce_ms: 500,
            upgrade_delay_ms: 5_000,
            cache_key: "engine/cached-blob".to_string(),
            list_sources: Vec::new(),
        }
    }
}

impl SessionConfig {
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// The coalescing window, clamped to its allowed range.
    pub fn badge_window(&self) -> Duration {
        Duration::from_millis(
            self.badge_coalesce_ms
                .clamp(MIN_BADGE_COALESCE_MS, MAX_BADGE_COALESCE_MS),
        )
    }

    pub fn upgrade_delay(&self) -> Duration {
        Duration::from_millis(self.upgrade_delay_ms)
    }
}
