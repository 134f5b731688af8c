//! Integration test helpers: an in-process mock of the portal backend

#![allow(dead_code)]

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Form, Json, Router};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Deserialize;
use serde_json::{json, Value};
use socportal_client::{MemoryNavigator, PortalClient};
use socportal_core::{init_logging, LoggingConfig, PortalConfig, PortalKind};
use socportal_session::{KeyValueStore, MemoryStore};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::net::TcpListener;

// Install the subscriber once per test binary
static TRACING: LazyLock<()> = LazyLock::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        let _ = init_logging(&LoggingConfig::verbose());
    }
});

/// Mint a backend token expiring `seconds` from now
pub fn mint_token(seconds: i64) -> String {
    encode(
        &Header::default(),
        &json!({ "sub": "ana", "exp": Utc::now().timestamp() + seconds, "scope": "alerts:read" }),
        &EncodingKey::from_secret(b"backend-secret"),
    )
    .expect("Failed to mint token")
}

/// Knobs and counters shared with the mock backend
pub struct Backend {
    pub login_exp_seconds: AtomicI64,
    pub refresh_exp_seconds: AtomicI64,
    pub refresh_calls: AtomicUsize,
    pub refresh_fails: AtomicBool,
    pub refresh_delay_ms: AtomicU64,
}

impl Default for Backend {
    fn default() -> Self {
        Self {
            login_exp_seconds: AtomicI64::new(86_400),
            refresh_exp_seconds: AtomicI64::new(86_400),
            refresh_calls: AtomicUsize::new(0),
            refresh_fails: AtomicBool::new(false),
            refresh_delay_ms: AtomicU64::new(0),
        }
    }
}

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

fn unauthorized() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "detail": "Not authenticated" })),
    )
}

async fn token(
    State(backend): State<Arc<Backend>>,
    Form(form): Form<LoginForm>,
) -> (StatusCode, Json<Value>) {
    if form.username == "ana" && form.password == "secret" {
        let exp = backend.login_exp_seconds.load(Ordering::SeqCst);
        (
            StatusCode::OK,
            Json(json!({ "access_token": mint_token(exp), "token_type": "bearer" })),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "Incorrect username or password" })),
        )
    }
}

async fn me(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if bearer(&headers).is_none() {
        return unauthorized();
    }
    (
        StatusCode::OK,
        Json(json!({ "id": 42, "username": "ana", "role": "analyst", "email": "ana@example.com" })),
    )
}

async fn refresh(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    backend.refresh_calls.fetch_add(1, Ordering::SeqCst);
    let delay = backend.refresh_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    if bearer(&headers).is_none() || backend.refresh_fails.load(Ordering::SeqCst) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "Token has been revoked" })),
        );
    }
    let exp = backend.refresh_exp_seconds.load(Ordering::SeqCst);
    (
        StatusCode::OK,
        Json(json!({ "access_token": mint_token(exp), "token_type": "bearer" })),
    )
}

async fn alerts(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if bearer(&headers).is_none() {
        return unauthorized();
    }
    (
        StatusCode::OK,
        Json(json!({
            "items": [
                { "id": 1, "rule": "ssh brute force", "level": 10 },
                { "id": 2, "rule": "new admin user", "level": 12 }
            ],
            "total": 2
        })),
    )
}

async fn alert(Path(id): Path<u64>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if bearer(&headers).is_none() {
        return unauthorized();
    }
    if id == 404 {
        return (StatusCode::NOT_FOUND, Json(json!({ "detail": "Alert not found" })));
    }
    (StatusCode::OK, Json(json!({ "id": id, "rule": "ssh brute force" })))
}

async fn delete_alert(headers: HeaderMap) -> StatusCode {
    if bearer(&headers).is_none() {
        return StatusCode::UNAUTHORIZED;
    }
    StatusCode::NO_CONTENT
}

async fn update_case(
    Path(id): Path<u64>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if bearer(&headers).is_none() {
        return unauthorized();
    }
    let mut case = body;
    case["id"] = json!(id);
    case["updated"] = json!(true);
    (StatusCode::OK, Json(case))
}

async fn echo_auth(headers: HeaderMap) -> Json<Value> {
    Json(json!({ "token": bearer(&headers) }))
}

async fn create_case(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if bearer(&headers).is_none() {
        return unauthorized();
    }
    let mut case = body;
    case["id"] = json!(7);
    (StatusCode::CREATED, Json(case))
}

async fn expired() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "detail": "Signature has expired" })),
    )
}

async fn forbidden() -> (StatusCode, Json<Value>) {
    (
        StatusCode::FORBIDDEN,
        Json(json!({ "detail": "Insufficient role: analyst" })),
    )
}

async fn forbidden_empty() -> StatusCode {
    StatusCode::FORBIDDEN
}

async fn broken() -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "detail": "boom" })),
    )
}

/// Running mock backend plus a client pointed at it
pub struct TestApp {
    pub address: String,
    pub backend: Arc<Backend>,
    pub storage: Arc<MemoryStore>,
    pub navigator: Arc<MemoryNavigator>,
    pub client: PortalClient,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(Backend::default()).await
    }

    pub async fn spawn_with(backend: Backend) -> Self {
        LazyLock::force(&TRACING);

        let backend = Arc::new(backend);
        let address = spawn_backend(Arc::clone(&backend)).await;
        let (client, storage, navigator) = client_for(&format!("{}/api", address));

        Self {
            address,
            backend,
            storage,
            navigator,
            client,
        }
    }

    pub async fn login(&self) {
        self.client
            .login("ana", "secret")
            .await
            .expect("Login against the mock backend failed");
    }

    /// The persisted session record
    pub fn persisted(&self) -> Value {
        let raw = self
            .storage
            .get(self.client.session().storage_key())
            .unwrap()
            .expect("No session record");
        serde_json::from_str(&raw).unwrap()
    }

    /// Wait until no background refresh is running
    pub async fn settle_refresh(&self) {
        tokio::time::timeout(
            Duration::from_secs(2),
            self.client.pipeline().wait_for_refresh(),
        )
        .await
        .expect("Background refresh did not finish");
    }

    pub fn refresh_calls(&self) -> usize {
        self.backend.refresh_calls.load(Ordering::SeqCst)
    }
}

/// Serve the mock backend on an ephemeral port of the current runtime
pub async fn spawn_backend(backend: Arc<Backend>) -> String {
    let router = Router::new()
        .route("/api/auth/token", post(token))
        .route("/api/auth/me", get(me))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/alerts", get(alerts))
        .route("/api/alerts/{id}", get(alert).delete(delete_alert))
        .route("/api/cases", post(create_case))
        .route("/api/cases/{id}", put(update_case))
        .route("/api/echo-auth", get(echo_auth))
        .route("/api/expired", get(expired))
        .route("/api/forbidden", get(forbidden))
        .route("/api/forbidden-empty", get(forbidden_empty))
        .route("/api/broken", get(broken))
        .with_state(backend);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Mock backend failed");
    });

    format!("http://127.0.0.1:{}", port)
}

/// A client with in-memory storage, starting on `/alerts`
pub fn client_for(base_url: &str) -> (PortalClient, Arc<MemoryStore>, Arc<MemoryNavigator>) {
    let storage = Arc::new(MemoryStore::new());
    let (client, navigator) = client_with_storage(base_url, Arc::clone(&storage));
    (client, storage, navigator)
}

/// A client over existing storage, as a fresh process would build it
pub fn client_with_storage(
    base_url: &str,
    storage: Arc<MemoryStore>,
) -> (PortalClient, Arc<MemoryNavigator>) {
    let mut config = PortalConfig::for_portal(PortalKind::Admin);
    config.api.base_url = base_url.to_string();
    config.api.timeout_seconds = 5;

    let navigator = Arc::new(MemoryNavigator::at("/alerts"));
    let client =
        PortalClient::new(config, storage, navigator.clone()).expect("Failed to build client");
    (client, navigator)
}
