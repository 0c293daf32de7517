//! Route tests and client/server sync scenarios driven in-process.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use snipvault_core::models::{Project, Snippet};
use snipvault_core::store::ContentStore;
use snipvault_core::sync::protocol::{
    ChangeSet, PullQuery, PullResponse, PushRequest, PushResponse,
};
use snipvault_core::sync::{
    error_from_response, SyncEngine, SyncOutcome, SyncReport, SyncTransport, TransportError,
    TransportResult,
};
use tower::ServiceExt;

use crate::auth::JwtVerifier;
use crate::config::AppConfig;
use crate::routes::{app_router, AppState};
use crate::store::ServerStore;

const SECRET: &str = "test-secret-test-secret-test-secret";

struct TestServer {
    router: Router,
    verifier: JwtVerifier,
}

impl TestServer {
    fn new() -> Self {
        let config = AppConfig::from_lookup(|key| {
            (key == "SNIPVAULT_JWT_SECRET").then(|| SECRET.to_string())
        })
        .unwrap();
        let verifier = JwtVerifier::from_config(&config);
        let state = AppState::new(Arc::new(config), ServerStore::open_in_memory().unwrap());
        Self {
            router: app_router(state),
            verifier,
        }
    }

    fn token(&self, user_id: &str) -> String {
        self.verifier
            .issue_token(user_id, Duration::from_secs(3600))
            .unwrap()
    }

    fn transport(&self, user_id: &str) -> RouterTransport {
        RouterTransport {
            router: self.router.clone(),
            token: self.token(user_id),
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, body)
    }

    async fn push_json(
        &self,
        user_id: &str,
        body: &Value,
    ) -> (StatusCode, axum::http::HeaderMap, Value) {
        self.send(
            Request::builder()
                .method(Method::POST)
                .uri("/sync/push")
                .header(header::AUTHORIZATION, format!("Bearer {}", self.token(user_id)))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn pull_uri(&self, user_id: &str, uri: &str) -> (StatusCode, Value) {
        let (status, _, body) = self
            .send(
                Request::builder()
                    .uri(uri)
                    .header(header::AUTHORIZATION, format!("Bearer {}", self.token(user_id)))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        (status, body)
    }
}

/// Sync transport that calls the router directly instead of going over TCP
struct RouterTransport {
    router: Router,
    token: String,
}

impl RouterTransport {
    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        request: Request<Body>,
    ) -> TransportResult<T> {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .map_err(|error| TransportError::Network(error.to_string()))?;
        let status = response.status();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok());
        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|error| TransportError::Network(error.to_string()))?
            .to_bytes();
        let body = String::from_utf8_lossy(&bytes);

        if status.is_success() {
            serde_json::from_str(&body).map_err(|error| TransportError::Rejected(error.to_string()))
        } else {
            Err(error_from_response(status, retry_after, &body))
        }
    }
}

#[async_trait]
impl SyncTransport for RouterTransport {
    async fn push(&self, request: &PushRequest) -> TransportResult<PushResponse> {
        let body = serde_json::to_string(request)
            .map_err(|error| TransportError::Rejected(error.to_string()))?;
        self.call(
            Request::builder()
                .method(Method::POST)
                .uri("/sync/push")
                .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .map_err(|error| TransportError::Rejected(error.to_string()))?,
        )
        .await
    }

    async fn pull(&self, query: &PullQuery) -> TransportResult<PullResponse> {
        let mut uri = format!("/sync/pull?since={}", query.since);
        if let Some(project_id) = &query.project_id {
            uri.push_str(&format!("&projectId={project_id}"));
        }
        if let Some(device_id) = &query.device_id {
            uri.push_str(&format!("&deviceId={device_id}"));
        }
        self.call(
            Request::builder()
                .uri(uri)
                .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
                .body(Body::empty())
                .map_err(|error| TransportError::Rejected(error.to_string()))?,
        )
        .await
    }
}

async fn device(server: &TestServer, user_id: &str) -> SyncEngine {
    let store = ContentStore::open_in_memory().await.unwrap();
    let mut settings = store.load_settings().await.unwrap();
    settings.sync_enabled = true;
    store.save_settings(&settings).await.unwrap();
    SyncEngine::new(store, Arc::new(server.transport(user_id)))
}

async fn completed(engine: &SyncEngine) -> SyncReport {
    match engine.sync().await.unwrap() {
        SyncOutcome::Completed(report) => report,
        other => panic!("expected a completed sync, got {other:?}"),
    }
}

fn push_body(changes: ChangeSet) -> Value {
    serde_json::to_value(PushRequest {
        device_id: "device-1".to_string(),
        last_sync_version: 0,
        changes,
    })
    .unwrap()
}

#[tokio::test]
async fn healthz_is_public() {
    let server = TestServer::new();
    let (status, _, body) = server
        .send(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["rate_limit"]["push_allowed"], 0);
}

#[tokio::test]
async fn sync_routes_require_bearer_token() {
    let server = TestServer::new();
    let (status, _, body) = server
        .send(Request::builder().uri("/sync/pull").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains("Authorization"));

    let (status, _, _) = server
        .send(
            Request::builder()
                .uri("/sync/pull")
                .header(header::AUTHORIZATION, "Bearer forged.token.value")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_push_is_rejected() {
    let server = TestServer::new();
    let (status, _, body) = server
        .push_json("alice", &json!({ "changes": { "projects": "nope" } }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let mut changes = ChangeSet::default();
    changes.push(Snippet::new(Project::new("P").id, "x".repeat(100_001), "text").into());
    let (status, _, _) = server.push_json("alice", &push_body(changes)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn repeated_push_is_idempotent() {
    let server = TestServer::new();
    let mut changes = ChangeSet::default();
    changes.push(Project::new("Inbox").into());
    let body = push_body(changes);

    let (status, _, first) = server.push_json("alice", &body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first, json!({ "success": true, "syncVersion": 1 }));
    let (_, _, second) = server.push_json("alice", &body).await;
    assert_eq!(second["syncVersion"], 2);

    let (status, pulled) = server.pull_uri("alice", "/sync/pull?since=0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pulled["syncVersion"], 2);
    assert_eq!(pulled["changes"]["projects"].as_array().unwrap().len(), 1);
    assert_eq!(pulled["changes"]["projects"][0]["name"], "Inbox");
}

#[tokio::test]
async fn invalid_project_reference_reports_ids_and_commits_rest() {
    let server = TestServer::new();
    let project = Project::new("Mine");
    let orphan = Snippet::new(Project::new("Elsewhere").id, "orphan", "text");
    let mut changes = ChangeSet::default();
    changes.push(project.clone().into());
    changes.push(Snippet::new(project.id, "fine", "text").into());
    changes.push(orphan.clone().into());

    let (status, _, body) = server.push_json("alice", &push_body(changes)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["invalidRefs"], json!([orphan.id.as_str()]));
    assert_eq!(body["syncVersion"], 1);

    let (_, pulled) = server.pull_uri("alice", "/sync/pull?since=0").await;
    assert_eq!(pulled["changes"]["snippets"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn pull_of_foreign_project_is_not_found() {
    let server = TestServer::new();
    let project = Project::new("Bob's");
    let mut changes = ChangeSet::default();
    changes.push(project.clone().into());
    server.push_json("bob", &push_body(changes)).await;

    let (status, _) = server
        .pull_uri("alice", &format!("/sync/pull?since=0&projectId={}", project.id))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = server.pull_uri("alice", "/sync/pull?since=0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["syncVersion"], 0);
    assert!(body["changes"]["projects"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn push_rate_limit_is_per_user() {
    let server = TestServer::new();
    let body = push_body(ChangeSet::default());
    for _ in 0..30 {
        let (status, _, _) = server.push_json("alice", &body).await;
        assert_eq!(status, StatusCode::OK);
    }

    let refused_project = Project::new("refused");
    let refused_id = refused_project.id.as_str();
    let mut refused = ChangeSet::default();
    refused.push(refused_project.into());
    let (status, headers, limited) = server.push_json("alice", &push_body(refused)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = headers[header::RETRY_AFTER].to_str().unwrap().parse().unwrap();
    assert!((1..=60).contains(&retry_after));
    assert_eq!(limited["retryAfter"], retry_after);

    // The refused push never reached the store
    let (status, pulled) = server.pull_uri("alice", "/sync/pull?since=0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pulled["syncVersion"], 30);
    let ids: Vec<&str> = pulled["changes"]["projects"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|project| project["id"].as_str())
        .collect();
    assert!(!ids.contains(&refused_id.as_str()));

    let (status, _, _) = server.push_json("bob", &body).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn devices_converge_on_newest_edit() {
    let server = TestServer::new();
    let laptop = device(&server, "alice").await;
    let desktop = device(&server, "alice").await;

    let project = laptop.store().put_project(Project::new("Shared")).await.unwrap();
    let snippet = laptop
        .store()
        .put_snippet(Snippet::new(project.id, "fn original() {}", "rust"))
        .await
        .unwrap();
    let report = completed(&laptop).await;
    assert_eq!(report.pushed, 2);
    assert_eq!(report.push_version, Some(1));

    let report = completed(&desktop).await;
    assert_eq!(report.pulled_applied, 2);
    assert_eq!(desktop.store().queue_len().await.unwrap(), 0);

    // Laptop edits first, desktop edits later; desktop's edit must win
    // even though the laptop pushes last.
    let mut older = laptop.store().get_snippet(&snippet.id).await.unwrap().unwrap();
    older.code = "fn laptop() {}".to_string();
    laptop.store().put_snippet(older).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let mut newer = desktop.store().get_snippet(&snippet.id).await.unwrap().unwrap();
    newer.code = "fn desktop() {}".to_string();
    desktop.store().put_snippet(newer).await.unwrap();

    completed(&desktop).await;
    let report = completed(&laptop).await;
    assert_eq!(report.pushed, 1);
    assert_eq!(report.pulled_applied, 1);

    for engine in [&laptop, &desktop] {
        let stored = engine.store().get_snippet(&snippet.id).await.unwrap().unwrap();
        assert_eq!(stored.code, "fn desktop() {}");
    }
}

#[tokio::test]
async fn deletes_propagate_as_tombstones() {
    let server = TestServer::new();
    let first = device(&server, "alice").await;
    let second = device(&server, "alice").await;

    let project = first.store().put_project(Project::new("Temp")).await.unwrap();
    first
        .store()
        .put_snippet(Snippet::new(project.id, "fn temp() {}", "rust"))
        .await
        .unwrap();
    completed(&first).await;
    completed(&second).await;
    assert_eq!(second.store().list_snippets(None).await.unwrap().len(), 1);

    tokio::time::sleep(Duration::from_millis(5)).await;
    let deleted = first
        .store()
        .soft_delete(snipvault_core::models::EntityKind::Project, &project.id.as_str())
        .await
        .unwrap();
    assert_eq!(deleted, 2);
    completed(&first).await;
    completed(&second).await;

    assert!(second.store().list_projects().await.unwrap().is_empty());
    assert!(second.store().list_snippets(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn engine_keeps_items_with_invalid_references() {
    let server = TestServer::new();
    let bob = device(&server, "bob").await;
    let bobs_project = bob.store().put_project(Project::new("Bob's")).await.unwrap();
    completed(&bob).await;

    let alice = device(&server, "alice").await;
    alice.store().put_project(Project::new("Alice's")).await.unwrap();
    let stray = alice
        .store()
        .put_snippet(Snippet::new(bobs_project.id, "fn stray() {}", "rust"))
        .await
        .unwrap();

    let report = completed(&alice).await;
    assert_eq!(report.pushed, 1);
    assert_eq!(report.errors.len(), 1);

    let queue = alice.store().pending_changes().await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].record.id(), stray.id.as_str());
    assert_eq!(queue[0].retries, 1);

    let bob_view = completed(&bob).await;
    assert_eq!(bob_view.pulled_applied, 0);
}

#[tokio::test]
async fn revoked_credential_disables_client_sync() {
    let server = TestServer::new();
    let store = ContentStore::open_in_memory().await.unwrap();
    let mut settings = store.load_settings().await.unwrap();
    settings.sync_enabled = true;
    store.save_settings(&settings).await.unwrap();
    store.put_project(Project::new("P")).await.unwrap();

    let transport = RouterTransport {
        router: server.router.clone(),
        token: "expired.or.revoked".to_string(),
    };
    let engine = SyncEngine::new(store, Arc::new(transport));

    assert!(matches!(
        engine.sync().await,
        Err(snipvault_core::Error::Transport(TransportError::Unauthorized(_)))
    ));
    assert_eq!(engine.sync().await.unwrap(), SyncOutcome::Disabled);
    assert_eq!(engine.store().queue_len().await.unwrap(), 1);
}
