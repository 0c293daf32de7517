use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

const MIN_JWT_SECRET_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub jwt_issuer: Option<String>,
    pub auth_clock_skew: Duration,
    pub rate_limit_window: Duration,
    pub push_rate_limit_per_window: u32,
    pub pull_rate_limit_per_window: u32,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("db_path", &self.db_path)
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_issuer", &self.jwt_issuer)
            .field("auth_clock_skew", &self.auth_clock_skew)
            .field("rate_limit_window", &self.rate_limit_window)
            .field("push_rate_limit_per_window", &self.push_rate_limit_per_window)
            .field("pull_rate_limit_per_window", &self.pull_rate_limit_per_window)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "SNIPVAULT_API_BIND_ADDR", "127.0.0.1:8080");
        let db_path = PathBuf::from(value_or_default(
            &lookup,
            "SNIPVAULT_API_DB_PATH",
            "snipvault-server.db",
        ));

        let jwt_secret = required_trimmed(&lookup, "SNIPVAULT_JWT_SECRET")?;
        if jwt_secret.len() < MIN_JWT_SECRET_BYTES {
            return Err(ConfigError::Invalid(format!(
                "SNIPVAULT_JWT_SECRET must be at least {MIN_JWT_SECRET_BYTES} bytes"
            )));
        }
        let jwt_issuer = optional_trimmed(&lookup, "SNIPVAULT_JWT_ISSUER");

        let auth_clock_skew_secs =
            bounded_integer(&lookup, "AUTH_CLOCK_SKEW_SECS", 60, 0..=300)?;
        let rate_limit_window_secs =
            bounded_integer(&lookup, "RATE_LIMIT_WINDOW_SECS", 60, 10..=3_600)?;
        let push_rate_limit_per_window =
            bounded_integer(&lookup, "PUSH_RATE_LIMIT_PER_WINDOW", 30, 1..=1_000)?;
        let pull_rate_limit_per_window =
            bounded_integer(&lookup, "PULL_RATE_LIMIT_PER_WINDOW", 60, 1..=5_000)?;

        Ok(Self {
            bind_addr,
            db_path,
            jwt_secret,
            jwt_issuer,
            auth_clock_skew: Duration::from_secs(auth_clock_skew_secs),
            rate_limit_window: Duration::from_secs(rate_limit_window_secs),
            push_rate_limit_per_window: u32::try_from(push_rate_limit_per_window)
                .map_err(|_| ConfigError::Invalid("PUSH_RATE_LIMIT_PER_WINDOW".to_string()))?,
            pull_rate_limit_per_window: u32::try_from(pull_rate_limit_per_window)
                .map_err(|_| ConfigError::Invalid("PULL_RATE_LIMIT_PER_WINDOW".to_string()))?,
        })
    }
}

fn bounded_integer(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
    range: std::ops::RangeInclusive<u64>,
) -> Result<u64, ConfigError> {
    let Some(raw) = optional_trimmed(lookup, name) else {
        return Ok(default);
    };
    let value = raw.parse::<u64>().map_err(|_| {
        ConfigError::Invalid(format!(
            "{name} must be an integer in [{}, {}]",
            range.start(),
            range.end()
        ))
    })?;
    if !range.contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be in [{}, {}]",
            range.start(),
            range.end()
        )));
    }
    Ok(value)
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn config_from(map: &HashMap<&str, &str>) -> Result<AppConfig, ConfigError> {
        AppConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn config_requires_jwt_secret() {
        let err = config_from(&HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("SNIPVAULT_JWT_SECRET"));

        let short = HashMap::from([("SNIPVAULT_JWT_SECRET", "too-short")]);
        assert!(config_from(&short).unwrap_err().to_string().contains("32 bytes"));
    }

    #[test]
    fn config_applies_defaults() {
        let config = config_from(&HashMap::from([("SNIPVAULT_JWT_SECRET", SECRET)])).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.db_path, PathBuf::from("snipvault-server.db"));
        assert_eq!(config.auth_clock_skew, Duration::from_secs(60));
        assert_eq!(config.push_rate_limit_per_window, 30);
        assert_eq!(config.pull_rate_limit_per_window, 60);
        assert_eq!(config.jwt_issuer, None);
    }

    #[test]
    fn config_rejects_out_of_range_values() {
        let map = HashMap::from([
            ("SNIPVAULT_JWT_SECRET", SECRET),
            ("RATE_LIMIT_WINDOW_SECS", "5"),
        ]);
        assert!(config_from(&map)
            .unwrap_err()
            .to_string()
            .contains("RATE_LIMIT_WINDOW_SECS"));

        let map = HashMap::from([
            ("SNIPVAULT_JWT_SECRET", SECRET),
            ("AUTH_CLOCK_SKEW_SECS", "soon"),
        ]);
        assert!(config_from(&map).is_err());
    }

    #[test]
    fn config_redacts_sensitive_debug_fields() {
        let config = config_from(&HashMap::from([("SNIPVAULT_JWT_SECRET", SECRET)])).unwrap();
        let debug_output = format!("{config:?}");
        assert!(!debug_output.contains(SECRET));
        assert!(debug_output.contains("[REDACTED]"));
    }
}
