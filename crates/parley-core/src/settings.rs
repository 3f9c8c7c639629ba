//! Client configuration with environment variable overrides.
//!
//! Loading flow:
//! 1. Start with [`ClientConfig::default()`] (everything unset)
//! 2. Apply environment variable overrides (highest priority)
//!
//! Recognized variables:
//! - `PARLEY_API_URL` — REST base, either `https://host` or `https://host/api`
//! - `PARLEY_WS_URL` — WebSocket base (`/client/` is appended automatically)
//! - `PARLEY_ORIGIN` — origin used to derive same-origin defaults
//!
//! Empty or whitespace-only values are ignored with a warning.

use serde::{Deserialize, Serialize};

/// Connection endpoints for the Parley service.
///
/// All fields are optional; unset fields fall back to same-origin-style
/// defaults derived in [`crate::urls`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// REST API base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    /// WebSocket base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,
    /// Origin (`scheme://host[:port]`) the client is notionally served
    /// from; used to derive defaults when the explicit URLs are unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl ClientConfig {
    /// Build a config from the environment alone.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        apply_env_overrides(&mut config);
        config
    }

    /// Explicit API base URL constructor, mostly for tests.
    pub fn with_api_url(api_url: impl Into<String>) -> Self {
        Self {
            api_url: Some(api_url.into()),
            ..Self::default()
        }
    }
}

/// Apply environment variable overrides to a loaded config.
///
/// Invalid (empty) values are silently ignored, falling back to whatever
/// the config already holds.
pub fn apply_env_overrides(config: &mut ClientConfig) {
    if let Some(v) = read_env_string("PARLEY_API_URL") {
        config.api_url = Some(v);
    }
    if let Some(v) = read_env_string("PARLEY_WS_URL") {
        config.ws_url = Some(v);
    }
    if let Some(v) = read_env_string("PARLEY_ORIGIN") {
        config.origin = Some(v);
    }
}

fn read_env_string(name: &str) -> Option<String> {
    let val = std::env::var(name).ok()?;
    let trimmed = val.trim();
    if trimmed.is_empty() {
        tracing::warn!(key = name, "empty env var, ignoring");
        return None;
    }
    Some(trimmed.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
