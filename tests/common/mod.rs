// Shared fixtures for the broker API integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use google_token_broker::api::{create_broker_router, BrokerAppState};
use google_token_broker::config::BrokerConfig;
use google_token_broker::credentials::{
    encrypt, CredentialRecord, CredentialStore, SqliteCredentialStore,
};
use google_token_broker::error::BrokerError;
use google_token_broker::identity::{IdentityVerifier, UserId};
use google_token_broker::metrics::BrokerMetrics;
use google_token_broker::oauth::FlowContext;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

pub const SECRET: &str = "test-encryption-secret";
pub const USER_JWT: &str = "valid-user-jwt";
pub const USER_ID: &str = "user-123";
pub const OTHER_JWT: &str = "other-user-jwt";
pub const OTHER_USER_ID: &str = "user-456";
pub const PROVIDER: &str = "google";

/// Identity verifier with a fixed token → user table.
pub struct FakeVerifier {
    users: HashMap<String, String>,
    calls: AtomicUsize,
}

impl FakeVerifier {
    pub fn new() -> Self {
        Self {
            users: HashMap::from([
                (USER_JWT.to_string(), USER_ID.to_string()),
                (OTHER_JWT.to_string(), OTHER_USER_ID.to_string()),
            ]),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityVerifier for FakeVerifier {
    async fn verify(&self, bearer_token: &str) -> Result<UserId, BrokerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.users
            .get(bearer_token)
            .map(|id| UserId::new(id.as_str()))
            .ok_or(BrokerError::Unauthorized)
    }
}

/// In-memory SQLite store that counts reads/writes and can be told to fail writes.
pub struct RecordingStore {
    pub inner: SqliteCredentialStore,
    reads: AtomicUsize,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteCredentialStore::new(":memory:").expect("Failed to create test store"),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Seeds a credential encrypted under `secret`, bypassing the counters.
    pub fn seed(&self, user_id: &str, refresh_token: &str, secret: &str) {
        let cipher = encrypt(refresh_token, secret).unwrap();
        self.inner
            .store(&CredentialRecord::new(user_id, PROVIDER, cipher))
            .unwrap();
    }

    /// Stored ciphertext for a user, if any.
    pub fn stored_cipher(&self, user_id: &str) -> Option<String> {
        self.inner
            .get(user_id, PROVIDER)
            .unwrap()
            .map(|r| r.refresh_token_cipher)
    }

    pub fn row_count(&self, user_id: &str) -> usize {
        self.inner.count(user_id, PROVIDER).unwrap()
    }
}

#[async_trait]
impl CredentialStore for RecordingStore {
    async fn get_credential(
        &self,
        owner_user_id: &str,
        provider: &str,
    ) -> Result<Option<CredentialRecord>, BrokerError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_credential(owner_user_id, provider).await
    }

    async fn upsert_credential(&self, record: &CredentialRecord) -> Result<(), BrokerError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BrokerError::Storage("simulated write failure".to_string()));
        }
        self.inner.upsert_credential(record).await
    }
}

/// Fully configured broker pointing at `token_url`.
pub fn complete_config(token_url: String) -> BrokerConfig {
    BrokerConfig {
        platform_url: "http://platform.invalid".to_string(),
        service_role_key: "service-key".to_string(),
        encryption_secret: SECRET.to_string(),
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
        token_url,
        ..BrokerConfig::default()
    }
}

pub struct TestBroker {
    pub router: Router,
    pub store: Arc<RecordingStore>,
    pub verifier: Arc<FakeVerifier>,
    pub metrics: BrokerMetrics,
}

pub fn broker(token_url: String) -> TestBroker {
    broker_with_config(complete_config(token_url))
}

pub fn broker_with_config(config: BrokerConfig) -> TestBroker {
    let store = Arc::new(RecordingStore::new());
    let verifier = Arc::new(FakeVerifier::new());
    let metrics = BrokerMetrics::new();

    let ctx = FlowContext {
        config: Arc::new(config),
        verifier: verifier.clone(),
        store: store.clone(),
        http: reqwest::Client::new(),
        metrics: metrics.clone(),
    };

    TestBroker {
        router: create_broker_router(BrokerAppState::new(ctx)),
        store,
        verifier,
        metrics,
    }
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

/// Sends a request and returns the status and raw body.
pub async fn send_raw(
    router: &Router,
    method: &str,
    uri: &str,
    authorization: Option<&str>,
    body: Option<String>,
) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(auth) = authorization {
        builder = builder.header("Authorization", auth);
    }
    if body.is_some() {
        builder = builder.header("Content-Type", "application/json");
    }
    let request = builder
        .body(body.map(Body::from).unwrap_or_else(Body::empty))
        .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

/// POSTs a request and parses the JSON response body.
pub async fn post_json(
    router: &Router,
    uri: &str,
    authorization: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let (status, bytes) = send_raw(
        router,
        "POST",
        uri,
        authorization,
        body.map(|b| b.to_string()),
    )
    .await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

/// Standard exchange body from the end-to-end example.
pub fn exchange_body(code: &str) -> Value {
    serde_json::json!({
        "code": code,
        "code_verifier": "v",
        "redirect_uri": "https://app/cb",
    })
}
