//! Sync transport: how the engine reaches the remote store.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

use super::protocol::{ErrorBody, PullQuery, PullResponse, PushRequest, PushResponse};
use crate::config::SyncConfig;
use crate::util::{compact_text, is_http_url, normalize_text_option};

/// Failures talking to the sync server
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Sync request timed out: {0}")]
    Timeout(String),
    #[error("Sync network error: {0}")]
    Network(String),
    /// The credential was rejected; sync must stop until re-authentication
    #[error("Sync credential rejected: {0}")]
    Unauthorized(String),
    #[error("Sync rate limited, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },
    /// Some items referenced unknown projects; the rest were committed
    #[error("Push rejected {} item(s) with invalid project references", ids.len())]
    InvalidReferences { ids: Vec<String>, sync_version: i64 },
    /// The server refused the request as malformed or out of scope
    #[error("Sync request rejected: {0}")]
    Rejected(String),
    #[error("Sync server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("Invalid sync configuration: {0}")]
    InvalidConfiguration(String),
}

impl TransportError {
    /// Whether the same request may succeed later
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Network(_) | Self::RateLimited { .. } | Self::Server { .. }
        )
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error.to_string())
        } else {
            Self::Network(error.to_string())
        }
    }
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Remote store endpoints used by the sync engine
#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn push(&self, request: &PushRequest) -> TransportResult<PushResponse>;

    async fn pull(&self, query: &PullQuery) -> TransportResult<PullResponse>;
}

/// JSON-over-HTTPS transport with a bearer credential
#[derive(Clone)]
pub struct HttpSyncTransport {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpSyncTransport {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpSyncTransport")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl HttpSyncTransport {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> TransportResult<Self> {
        let base_url = normalize_endpoint(base_url.into())?;
        let token = normalize_text_option(Some(token.into())).ok_or_else(|| {
            TransportError::InvalidConfiguration("auth token must not be empty".to_string())
        })?;
        Ok(Self {
            base_url,
            token,
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    pub fn from_config(config: &SyncConfig) -> TransportResult<Self> {
        let base_url = config.api_base_url.clone().ok_or_else(|| {
            TransportError::InvalidConfiguration("sync server URL is not set".to_string())
        })?;
        let token = config.auth_token.clone().ok_or_else(|| {
            TransportError::InvalidConfiguration("sync auth token is not set".to_string())
        })?;
        Self::new(base_url, token, config.request_timeout)
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> TransportResult<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let header_retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        Err(error_from_response(status, header_retry_after, &body))
    }
}

#[async_trait]
impl SyncTransport for HttpSyncTransport {
    async fn push(&self, request: &PushRequest) -> TransportResult<PushResponse> {
        let response = self
            .client
            .post(format!("{}/sync/push", self.base_url))
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .json(request)
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn pull(&self, query: &PullQuery) -> TransportResult<PullResponse> {
        let mut params = vec![("since", query.since.to_string())];
        if let Some(project_id) = &query.project_id {
            params.push(("projectId", project_id.clone()));
        }
        if let Some(device_id) = &query.device_id {
            params.push(("deviceId", device_id.clone()));
        }

        let response = self
            .client
            .get(format!("{}/sync/pull", self.base_url))
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .query(&params)
            .send()
            .await?;
        Self::read_json(response).await
    }
}

/// Map a non-2xx response to a typed error
pub fn error_from_response(
    status: StatusCode,
    header_retry_after: Option<u64>,
    body: &str,
) -> TransportError {
    let payload = serde_json::from_str::<ErrorBody>(body).ok();
    let message = parse_api_error(status, payload.as_ref(), body);

    match status {
        StatusCode::UNAUTHORIZED => TransportError::Unauthorized(message),
        StatusCode::TOO_MANY_REQUESTS => TransportError::RateLimited {
            retry_after: payload
                .as_ref()
                .and_then(|payload| payload.retry_after)
                .or(header_retry_after)
                .unwrap_or(60),
        },
        StatusCode::BAD_REQUEST => match payload {
            Some(ErrorBody {
                invalid_refs,
                sync_version: Some(sync_version),
                ..
            }) if !invalid_refs.is_empty() => TransportError::InvalidReferences {
                ids: invalid_refs,
                sync_version,
            },
            _ => TransportError::Rejected(message),
        },
        status if status.is_server_error() => TransportError::Server {
            status: status.as_u16(),
            message,
        },
        _ => TransportError::Rejected(message),
    }
}

fn parse_api_error(status: StatusCode, payload: Option<&ErrorBody>, body: &str) -> String {
    if let Some(payload) = payload.filter(|payload| !payload.error.trim().is_empty()) {
        return format!("{} ({})", payload.error.trim(), status.as_u16());
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_endpoint(raw: String) -> TransportResult<String> {
    let endpoint = normalize_text_option(Some(raw)).ok_or_else(|| {
        TransportError::InvalidConfiguration("endpoint must not be empty".to_string())
    })?;
    if is_http_url(&endpoint) {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(TransportError::InvalidConfiguration(
            "endpoint must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_endpoint_rejects_invalid_values() {
        assert!(normalize_endpoint(String::new()).is_err());
        assert!(normalize_endpoint("api.example.com".to_string()).is_err());
        assert_eq!(
            normalize_endpoint(" https://sync.example.com/ ".to_string()).unwrap(),
            "https://sync.example.com"
        );
    }

    #[test]
    fn transport_debug_redacts_token() {
        let transport =
            HttpSyncTransport::new("https://sync.example.com", "secret", Duration::from_secs(30))
                .unwrap();
        let debug = format!("{transport:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn maps_status_codes() {
        assert!(matches!(
            error_from_response(StatusCode::UNAUTHORIZED, None, r#"{"error":"expired"}"#),
            TransportError::Unauthorized(message) if message == "expired (401)"
        ));
        assert_eq!(
            error_from_response(StatusCode::TOO_MANY_REQUESTS, Some(12), "{}"),
            TransportError::RateLimited { retry_after: 12 }
        );
        assert_eq!(
            error_from_response(
                StatusCode::TOO_MANY_REQUESTS,
                Some(12),
                r#"{"error":"slow down","retryAfter":30}"#
            ),
            TransportError::RateLimited { retry_after: 30 }
        );
        assert!(matches!(
            error_from_response(StatusCode::NOT_FOUND, None, ""),
            TransportError::Rejected(message) if message == "HTTP 404"
        ));
        assert!(error_from_response(StatusCode::BAD_GATEWAY, None, "").is_retryable());
    }

    #[test]
    fn maps_invalid_references() {
        let body = r#"{"error":"invalid project references","invalidRefs":["s1"],"syncVersion":4}"#;
        assert_eq!(
            error_from_response(StatusCode::BAD_REQUEST, None, body),
            TransportError::InvalidReferences {
                ids: vec!["s1".to_string()],
                sync_version: 4,
            }
        );
        assert!(matches!(
            error_from_response(StatusCode::BAD_REQUEST, None, r#"{"error":"bad json"}"#),
            TransportError::Rejected(_)
        ));
    }
}
