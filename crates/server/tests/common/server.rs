//! Server test utilities.

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use bytes::Bytes;
use lorry_core::config::{AppConfig, MetadataConfig, StorageConfig};
use lorry_metadata::MetadataStore;
use lorry_metadata::models::UserRow;
use lorry_server::auth::hash_token;
use lorry_server::bootstrap::ensure_admin_user;
use lorry_server::{AppState, create_router};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use time::OffsetDateTime;
use tower::ServiceExt;
use uuid::Uuid;

/// Raw bearer token of the bootstrapped moderator.
#[allow(dead_code)]
pub const ADMIN_TOKEN: &str = "test-admin-token";

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let mut config = AppConfig::for_testing();
        config.storage = StorageConfig {
            path: temp_dir.path().join("resources"),
            staging_path: temp_dir.path().join("staging"),
        };
        config.metadata = MetadataConfig {
            path: temp_dir.path().join("metadata.db"),
            query_timeout_secs: None,
        };
        modifier(&mut config);

        let blobs = lorry_storage::from_config(&config.storage)
            .await
            .expect("Failed to create content store");
        let metadata = lorry_metadata::from_config(&config.metadata)
            .await
            .expect("Failed to create metadata store");
        if let Some(admin) = &config.admin {
            ensure_admin_user(metadata.as_ref(), admin)
                .await
                .expect("Failed to bootstrap admin");
        }

        let state = AppState::new(config, blobs, metadata)
            .await
            .expect("Failed to create state");
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying metadata.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Create a regular (or moderator) account and return its raw token.
    pub async fn create_user(&self, name: &str, is_moderator: bool) -> String {
        let token = format!("token-{name}-{}", Uuid::new_v4());
        let user = UserRow {
            user_id: Uuid::new_v4(),
            name: name.to_string(),
            is_moderator,
            token_hash: hash_token(&token),
            created_at: OffsetDateTime::now_utc(),
        };
        self.metadata()
            .create_user(&user)
            .await
            .expect("Failed to create user");
        token
    }

    /// Send a request and collect the whole response.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, body)
    }

    /// Send a request and decode a JSON response (`Null` when empty).
    pub async fn send_json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, _, body) = self.send(request).await;
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Helper to make JSON requests.
    pub async fn json(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
        auth_token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(token) = auth_token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }

        let body = match body {
            Some(v) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(serde_json::to_vec(&v).unwrap())
            }
            None => Body::empty(),
        };

        self.send_json(builder.body(body).unwrap()).await
    }
}
