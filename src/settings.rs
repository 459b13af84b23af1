//! Connection settings (base URL + API key).
//!
//! Settings are an injected dependency of the transport. They are read on every request so a
//! change made mid-session applies to the very next call without rebuilding anything.

use std::sync::{Arc, RwLock};

use crate::config::{DEFAULT_API_KEY, DEFAULT_API_URL, ENV_API_KEY, ENV_API_URL};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_url: String,
    pub api_key: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: DEFAULT_API_KEY.to_string(),
        }
    }
}

impl Settings {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_url: normalize_url(&api_url.into()).unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            api_key: non_blank(&api_key.into()).unwrap_or_else(|| DEFAULT_API_KEY.to_string()),
        }
    }

    /// Defaults overridden by `NET_CURFEW_API_URL` / `NET_CURFEW_API_KEY` when set.
    pub fn from_env() -> Self {
        Self::new(
            env_var(ENV_API_URL).unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            env_var(ENV_API_KEY).unwrap_or_else(|| DEFAULT_API_KEY.to_string()),
        )
    }

    /// Joins an endpoint path (starting with `/`) onto the base URL.
    pub fn endpoint_url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }
}

/// Source of the settings in effect right now.
pub trait SettingsProvider: Send + Sync {
    fn current(&self) -> Settings;
}

/// Process-wide mutable settings handle.
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<Settings>>,
}

impl SharedSettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    pub fn from_env() -> Self {
        Self::new(Settings::from_env())
    }

    pub fn set_api_url(&self, url: &str) {
        let url = normalize_url(url).unwrap_or_else(|| DEFAULT_API_URL.to_string());
        tracing::info!("API URL set to {}", url);
        self.write().api_url = url;
    }

    pub fn set_api_key(&self, key: &str) {
        self.write().api_key = non_blank(key).unwrap_or_else(|| DEFAULT_API_KEY.to_string());
        tracing::info!("API key updated");
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Settings> {
        // A writer that panicked mid-assignment still leaves a whole Settings value behind.
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SettingsProvider for SharedSettings {
    fn current(&self) -> Settings {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl SettingsProvider for Settings {
    fn current(&self) -> Settings {
        self.clone()
    }
}

fn normalize_url(raw: &str) -> Option<String> {
    non_blank(raw).map(|url| url.trim_end_matches('/').to_string())
}

fn non_blank(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|v| non_blank(&v))
}
