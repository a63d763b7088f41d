//! Common test utilities for E2E testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with a mock measurement backend, enabling E2E testing of the whole HTTP
//! surface without external infrastructure.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use parcelhub_core::config::{
    ApiKeyConfig, AuthConfig, DatabaseConfig, ServerConfig, UploadsConfig,
};
use parcelhub_core::{
    create_audit_system, create_authenticator, testing::MockMeasurementProvider,
    AllocatorConfig, AuditFilter, AuditRecord, AuditStore, AuthMethod, Authenticator, Config,
    Dispatcher, MeasurementProvider, Role, SqliteAuditStore, SqliteDispatchStore,
};

/// Re-export fixtures for test convenience
pub use parcelhub_core::testing::fixtures;

/// API key of the warehouse administrator.
pub const ADMIN_KEY: &str = "admin-key";
/// API key of driver "bob".
pub const BOB_KEY: &str = "bob-key";
/// API key of driver "carol".
pub const CAROL_KEY: &str = "carol-key";

/// Largest accepted upload in tests.
pub const MAX_UPLOAD_BYTES: usize = 4096;

/// Test fixture for E2E testing with mock dependencies.
///
/// Uses API-key authentication with one admin and two drivers. Requests made
/// through [`get`](Self::get), [`post`](Self::post) etc. carry the admin key;
/// the `*_as` variants take an explicit key (or none).
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_confirm() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.post("/api/v1/parcels", json!({
///         "external_id": "P-1", "weight": 0.9, "volume": 0.03,
///         "delivery_address": "12 Dock Road"
///     })).await;
///
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock measurement backend - queue measurements or failures
    pub measurement: Arc<MockMeasurementProvider>,
    /// Audit store, for asserting on persisted events
    pub audit_store: Arc<dyn AuditStore>,
    /// Temporary directory for the test database and uploads
    pub temp_dir: TempDir,
    pub uploads_dir: PathBuf,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Configuration for test fixture.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Wire the mock measurement backend into the server
    pub enable_measurement: bool,
    pub allocator: AllocatorConfig,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            enable_measurement: true,
            allocator: AllocatorConfig::default(),
        }
    }
}

impl TestConfig {
    /// Create config with no measurement backend.
    pub fn without_measurement() -> Self {
        Self {
            enable_measurement: false,
            ..Default::default()
        }
    }
}

impl TestFixture {
    /// Create a new test fixture with default mocks.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        let uploads_dir = temp_dir.path().join("uploads");

        let config = Config {
            auth: AuthConfig {
                method: AuthMethod::ApiKey,
                api_keys: vec![
                    api_key(ADMIN_KEY, "admin", Role::Admin),
                    api_key(BOB_KEY, "bob", Role::Driver),
                    api_key(CAROL_KEY, "carol", Role::Driver),
                ],
            },
            server: ServerConfig {
                host: std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
                port: 0, // Not used for in-process testing
            },
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            allocator: test_config.allocator.clone(),
            uploads: UploadsConfig {
                dir: uploads_dir.clone(),
                max_bytes: MAX_UPLOAD_BYTES,
            },
            measurement: None,
        };

        let authenticator: Arc<dyn Authenticator> = Arc::from(
            create_authenticator(&config.auth).expect("Failed to create authenticator"),
        );

        let audit_store: Arc<dyn AuditStore> = Arc::new(
            SqliteAuditStore::new(&db_path).expect("Failed to create audit store"),
        );
        let dispatch_store = Arc::new(
            SqliteDispatchStore::new(&db_path).expect("Failed to create dispatch store"),
        );

        let (audit_handle, audit_writer) = create_audit_system(Arc::clone(&audit_store), 100);
        tokio::spawn(audit_writer.run());

        let dispatcher = Dispatcher::new(dispatch_store, config.allocator.clone())
            .with_audit(audit_handle.clone());

        let measurement = Arc::new(MockMeasurementProvider::new());
        let provider = test_config
            .enable_measurement
            .then(|| Arc::clone(&measurement) as Arc<dyn MeasurementProvider>);

        let state = Arc::new(parcelhub_server::state::AppState::new(
            config,
            authenticator,
            audit_handle,
            Arc::clone(&audit_store),
            Arc::new(dispatcher),
            provider,
        ));

        let router = parcelhub_server::api::create_router(state);

        Self {
            router,
            measurement,
            audit_store,
            temp_dir,
            uploads_dir,
        }
    }

    /// Send a GET request as the administrator.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None, Some(ADMIN_KEY)).await
    }

    /// Send a POST request with JSON body as the administrator.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body), Some(ADMIN_KEY)).await
    }

    /// Send a PUT request with JSON body as the administrator.
    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body), Some(ADMIN_KEY)).await
    }

    /// Send a PATCH request with JSON body as the administrator.
    pub async fn patch(&self, path: &str, body: Value) -> TestResponse {
        self.request("PATCH", path, Some(body), Some(ADMIN_KEY)).await
    }

    /// Send a DELETE request as the administrator.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None, Some(ADMIN_KEY)).await
    }

    /// Send a GET request with the given key (`None` sends no credentials).
    pub async fn get_as(&self, key: Option<&str>, path: &str) -> TestResponse {
        self.request("GET", path, None, key).await
    }

    /// Send a POST request with the given key.
    pub async fn post_as(&self, key: Option<&str>, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body), key).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", ADMIN_KEY))
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Upload a file as a single multipart field.
    pub async fn post_multipart(
        &self,
        path: &str,
        field: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> TestResponse {
        let boundary = "parcelhub-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={}", boundary),
            )
            .header("Authorization", format!("Bearer {}", ADMIN_KEY))
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    /// Fetch a path and return the raw status and body bytes.
    pub async fn get_bytes(&self, path: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, bytes.to_vec())
    }

    /// Wait until at least `min` audit events of `event_type` are persisted.
    pub async fn wait_for_audit(&self, event_type: &str, min: usize) -> Vec<AuditRecord> {
        let filter = AuditFilter::new().with_event_type(event_type);
        for _ in 0..50 {
            let events = self.audit_store.query(&filter).expect("Audit query failed");
            if events.len() >= min {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("Timed out waiting for {} x {}", min, event_type);
    }

    /// Confirm a parcel and return the allocation body.
    pub async fn confirm(&self, external_id: &str, volume: f64) -> Value {
        let response = self
            .post(
                "/api/v1/parcels",
                serde_json::to_value(fixtures::confirm_request(external_id, volume)).unwrap(),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body
    }

    /// Register a vehicle and return its id.
    pub async fn create_vehicle(&self, uid: &str, driver: &str, capacity: f64) -> i64 {
        let response = self
            .post(
                "/api/v1/vehicles",
                serde_json::to_value(fixtures::vehicle_spec(uid, driver, capacity)).unwrap(),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body["id"].as_i64().unwrap()
    }

    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        key: Option<&str>,
    ) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        if let Some(key) = key {
            request_builder = request_builder.header("Authorization", format!("Bearer {}", key));
        }

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

fn api_key(key: &str, user: &str, role: Role) -> ApiKeyConfig {
    ApiKeyConfig {
        key: key.to_string(),
        user: user.to_string(),
        role,
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}

/// Helper to assert a JSON path equals expected value.
#[macro_export]
macro_rules! assert_json_path {
    ($json:expr, $path:expr, $expected:expr) => {
        let actual = &$json[$path];
        assert_eq!(
            actual, &$expected,
            "Path '{}' expected {:?}, got {:?}",
            $path, $expected, actual
        );
    };
}
