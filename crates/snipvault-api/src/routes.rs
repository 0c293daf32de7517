use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Query, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use serde::Serialize;
use snipvault_core::sync::protocol::{PullQuery, PullResponse, PushRequest, PushResponse};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{extract_bearer_token, AuthenticatedUser, JwtVerifier};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::rate_limit::{user_fingerprint, RateLimitCounters, SyncEndpoint, SyncRateLimiter};
use crate::store::ServerStore;

/// A full push (500 items per type at the field caps) is far above axum's
/// default body limit.
const MAX_BODY_BYTES: usize = 128 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    jwt_verifier: Arc<JwtVerifier>,
    store: ServerStore,
    rate_limiter: Arc<SyncRateLimiter>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, store: ServerStore) -> Self {
        Self {
            jwt_verifier: Arc::new(JwtVerifier::from_config(&config)),
            rate_limiter: Arc::new(SyncRateLimiter::from_config(config.as_ref())),
            store,
            config,
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/sync/push", post(sync_push))
        .route("/sync/pull", get(sync_pull))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/healthz", get(healthz))
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    rate_limit: RateLimitCounters,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        rate_limit: state.rate_limiter.counters(),
    })
}

async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(request.headers())?;
    let user = state.jwt_verifier.verify_access_token(token)?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

async fn sync_push(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<PushRequest>, JsonRejection>,
) -> Result<Json<PushResponse>, AppError> {
    state.rate_limiter.admit(SyncEndpoint::Push, &user.user_id)?;

    let Json(request) = payload.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    request.validate().map_err(AppError::bad_request)?;

    let user_hash = user_fingerprint(&user.user_id);
    let received = request.changes.len();
    let outcome = state.store.push(&user.user_id, request).await?;
    tracing::info!(
        endpoint = "sync_push",
        user = user_hash,
        session = user.session_id.as_deref().unwrap_or("none"),
        sync_version = outcome.sync_version,
        received,
        written = outcome.written,
        invalid = outcome.invalid_refs.len(),
        "Committed push"
    );

    if !outcome.invalid_refs.is_empty() {
        return Err(AppError::InvalidReferences {
            ids: outcome.invalid_refs,
            sync_version: outcome.sync_version,
        });
    }
    Ok(Json(PushResponse {
        success: true,
        sync_version: outcome.sync_version,
    }))
}

async fn sync_pull(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    query: Result<Query<PullQuery>, QueryRejection>,
) -> Result<Json<PullResponse>, AppError> {
    state.rate_limiter.admit(SyncEndpoint::Pull, &user.user_id)?;

    let Query(query) = query.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    if query.since < 0 {
        return Err(AppError::bad_request("`since` must not be negative"));
    }

    let response = state.store.pull(&user.user_id, &query).await?;
    tracing::debug!(
        endpoint = "sync_pull",
        user = user_fingerprint(&user.user_id),
        since = query.since,
        sync_version = response.sync_version,
        returned = response.changes.len(),
        "Served pull"
    );
    Ok(Json(response))
}
