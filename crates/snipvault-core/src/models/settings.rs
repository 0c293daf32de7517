//! Local client settings model
//!
//! Settings persist as string key/value pairs; this struct is the typed view.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const KEY_DEVICE_ID: &str = "device_id";
pub const KEY_API_BASE_URL: &str = "api_base_url";
pub const KEY_AUTH_TOKEN: &str = "auth_token";
pub const KEY_SYNC_ENABLED: &str = "sync_enabled";
pub const KEY_LAST_PULL_SYNC_VERSION: &str = "last_pull_sync_version";
pub const KEY_AUTO_SYNC_INTERVAL_SECS: &str = "auto_sync_interval_secs";
pub const KEY_DEFAULT_PROJECT_ID: &str = "default_project_id";

/// Default auto-sync period (5 minutes)
pub const DEFAULT_AUTO_SYNC_INTERVAL_SECS: u64 = 300;

/// Client settings
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Stable id of this installation, sent with every push
    pub device_id: Option<String>,
    /// Sync server base URL
    pub api_base_url: Option<String>,
    /// Bearer credential for the sync server
    pub auth_token: Option<String>,
    /// Cleared when the server rejects the credential
    pub sync_enabled: bool,
    /// Most recent server version merged locally
    pub last_pull_sync_version: i64,
    pub auto_sync_interval_secs: u64,
    pub default_project_id: Option<String>,
}

impl fmt::Debug for Settings {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Settings")
            .field("device_id", &self.device_id)
            .field("api_base_url", &self.api_base_url)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("sync_enabled", &self.sync_enabled)
            .field("last_pull_sync_version", &self.last_pull_sync_version)
            .field("auto_sync_interval_secs", &self.auto_sync_interval_secs)
            .field("default_project_id", &self.default_project_id)
            .finish()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device_id: None,
            api_base_url: None,
            auth_token: None,
            sync_enabled: true,
            last_pull_sync_version: 0,
            auto_sync_interval_secs: DEFAULT_AUTO_SYNC_INTERVAL_SECS,
            default_project_id: None,
        }
    }
}

impl Settings {
    /// Build settings from a key lookup, ignoring unparsable values
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();

        settings.device_id = lookup(KEY_DEVICE_ID);
        settings.api_base_url = lookup(KEY_API_BASE_URL);
        settings.auth_token = lookup(KEY_AUTH_TOKEN);
        settings.default_project_id = lookup(KEY_DEFAULT_PROJECT_ID);

        if let Some(value) = lookup(KEY_SYNC_ENABLED) {
            settings.sync_enabled = parse_bool(&value);
        }
        if let Some(version) = lookup(KEY_LAST_PULL_SYNC_VERSION).and_then(|v| v.parse().ok()) {
            settings.last_pull_sync_version = version;
        }
        if let Some(secs) = lookup(KEY_AUTO_SYNC_INTERVAL_SECS).and_then(|v| v.parse().ok()) {
            settings.auto_sync_interval_secs = secs;
        }

        settings
    }

    /// Key/value pairs to persist; `None` values are removed from the store
    pub fn to_pairs(&self) -> Vec<(&'static str, Option<String>)> {
        vec![
            (KEY_DEVICE_ID, self.device_id.clone()),
            (KEY_API_BASE_URL, self.api_base_url.clone()),
            (KEY_AUTH_TOKEN, self.auth_token.clone()),
            (KEY_SYNC_ENABLED, Some(self.sync_enabled.to_string())),
            (
                KEY_LAST_PULL_SYNC_VERSION,
                Some(self.last_pull_sync_version.to_string()),
            ),
            (
                KEY_AUTO_SYNC_INTERVAL_SECS,
                Some(self.auto_sync_interval_secs.to_string()),
            ),
            (KEY_DEFAULT_PROJECT_ID, self.default_project_id.clone()),
        ]
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_settings_default() {
        let settings = Settings::default();
        assert!(settings.sync_enabled);
        assert_eq!(settings.last_pull_sync_version, 0);
        assert_eq!(settings.auto_sync_interval_secs, 300);
    }

    #[test]
    fn test_settings_pairs_roundtrip() {
        let settings = Settings {
            device_id: Some("device-1".to_string()),
            auth_token: Some("secret".to_string()),
            sync_enabled: false,
            last_pull_sync_version: 42,
            ..Settings::default()
        };
        let map: HashMap<&str, String> = settings
            .to_pairs()
            .into_iter()
            .filter_map(|(key, value)| value.map(|value| (key, value)))
            .collect();

        let loaded = Settings::from_lookup(|key| map.get(key).cloned());
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_settings_debug_redacts_token() {
        let settings = Settings {
            auth_token: Some("secret-token".to_string()),
            ..Settings::default()
        };
        let debug = format!("{settings:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }
}
