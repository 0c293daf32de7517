//! Client sync configuration.
//!
//! Resolved from the persisted [`Settings`] with environment overrides, so
//! scripted and CI runs can point a client at a server without touching the
//! local store.

use std::time::Duration;

use crate::models::Settings;
use crate::util::{is_http_url, normalize_text_option};

pub const ENV_API_URL: &str = "SNIPVAULT_API_URL";
pub const ENV_TOKEN: &str = "SNIPVAULT_TOKEN";

/// Every sync network call is bounded by this
pub const SYNC_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Resolved client sync settings.
#[derive(Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub api_base_url: Option<String>,
    pub auth_token: Option<String>,
    pub request_timeout: Duration,
    pub auto_sync_interval: Duration,
    pub enabled: bool,
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SyncConfig")
            .field("api_base_url", &self.api_base_url)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("request_timeout", &self.request_timeout)
            .field("auto_sync_interval", &self.auto_sync_interval)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl SyncConfig {
    /// Build from the process environment and stored settings.
    pub fn from_env(settings: &Settings) -> Self {
        Self::from_lookup(settings, |key| std::env::var(key).ok())
    }

    /// Build from stored settings, letting `lookup` override URL and token.
    pub fn from_lookup(settings: &Settings, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let api_base_url = normalize_text_option(lookup(ENV_API_URL))
            .or_else(|| normalize_text_option(settings.api_base_url.clone()))
            .map(|url| url.trim_end_matches('/').to_string());
        let auth_token = normalize_text_option(lookup(ENV_TOKEN))
            .or_else(|| normalize_text_option(settings.auth_token.clone()));

        Self {
            api_base_url,
            auth_token,
            request_timeout: Duration::from_secs(SYNC_REQUEST_TIMEOUT_SECS),
            auto_sync_interval: Duration::from_secs(settings.auto_sync_interval_secs.max(1)),
            enabled: settings.sync_enabled,
        }
    }

    /// Whether there is enough to talk to a server
    pub fn is_configured(&self) -> bool {
        self.auth_token.is_some()
            && self
                .api_base_url
                .as_deref()
                .is_some_and(is_http_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_stored_values() {
        let settings = Settings {
            api_base_url: Some("https://stored.example.com".to_string()),
            auth_token: Some("stored".to_string()),
            ..Settings::default()
        };

        let config = SyncConfig::from_lookup(&settings, |key| match key {
            ENV_API_URL => Some("https://env.example.com/".to_string()),
            _ => None,
        });
        assert_eq!(config.api_base_url.as_deref(), Some("https://env.example.com"));
        assert_eq!(config.auth_token.as_deref(), Some("stored"));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.auto_sync_interval, Duration::from_secs(300));
        assert!(config.is_configured());
    }

    #[test]
    fn blank_values_are_unset() {
        let settings = Settings {
            api_base_url: Some("  ".to_string()),
            ..Settings::default()
        };
        let config = SyncConfig::from_lookup(&settings, |_| Some(String::new()));
        assert_eq!(config.api_base_url, None);
        assert!(!config.is_configured());
    }

    #[test]
    fn debug_redacts_token() {
        let config = SyncConfig::from_lookup(&Settings::default(), |key| {
            (key == ENV_TOKEN).then(|| "secret-token".to_string())
        });
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }
}
