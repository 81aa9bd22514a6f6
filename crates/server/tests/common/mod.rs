//! In-process test fixture for the HTTP API.
//!
//! Builds the router around a real scheduler whose transfer, encoder and
//! probe are the core mocks, so full job runs complete without ffmpeg or a
//! mounted remote.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use recast_core::encoder::Encoder;
use recast_core::probe::MediaProbe;
use recast_core::testing::fixtures::{fast_scheduler_config, fast_settings};
use recast_core::testing::{MockEncoder, MockProbe, MockTransfer};
use recast_core::transfer::Transfer;
use recast_core::{
    load_config_from_str, JobStore, LiveSettings, PipelineScheduler, PipelineSettings,
    SettingsProvider, SqliteJobStore,
};
use recast_server::api::create_router;
use recast_server::state::AppState;

/// Test fixture with a router and the mocks behind it.
///
/// # Example
///
/// ```rust,ignore
/// let fixture = TestFixture::started().await;
/// fixture.transfer.put_file("movies/a.mkv", b"original").await;
///
/// let response = fixture
///     .post("/api/v1/jobs", json!({ "remote_path": "movies/a.mkv" }))
///     .await;
/// assert_eq!(response.status, StatusCode::CREATED);
/// ```
pub struct TestFixture {
    pub router: Router,
    pub scheduler: Arc<PipelineScheduler>,
    pub transfer: Arc<MockTransfer>,
    pub encoder: Arc<MockEncoder>,
    pub probe: Arc<MockProbe>,
    pub settings: Arc<LiveSettings>,
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Fixture whose scheduler is not running; jobs stay where they are put.
    pub fn new() -> Self {
        Self::with_settings(fast_settings())
    }

    pub fn with_settings(settings: PipelineSettings) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = load_config_from_str(&format!(
            r#"
[storage]
remote_root = "{}"
work_dir = "{}"

[shutdown]
command = ["poweroff"]
"#,
            temp_dir.path().join("remote").display(),
            temp_dir.path().join("work").display(),
        ))
        .expect("Failed to parse test config");

        let store: Arc<dyn JobStore> =
            Arc::new(SqliteJobStore::in_memory().expect("Failed to create job store"));
        let transfer = Arc::new(MockTransfer::new());
        let encoder = Arc::new(MockEncoder::new());
        let probe = Arc::new(MockProbe::new());
        let settings = Arc::new(LiveSettings::new(settings));

        let scheduler = Arc::new(PipelineScheduler::new(
            store,
            Arc::clone(&transfer) as Arc<dyn Transfer>,
            Arc::clone(&encoder) as Arc<dyn Encoder>,
            Arc::clone(&probe) as Arc<dyn MediaProbe>,
            Arc::clone(&settings) as Arc<dyn SettingsProvider>,
            fast_scheduler_config(),
            config.storage.work_dir.clone(),
        ));

        let state = Arc::new(AppState::new(
            config,
            Arc::clone(&scheduler),
            Arc::clone(&settings),
        ));

        Self {
            router: create_router(state),
            scheduler,
            transfer,
            encoder,
            probe,
            settings,
            temp_dir,
        }
    }

    /// Fixture with the scheduler loop running.
    pub async fn started() -> Self {
        let fixture = Self::new();
        fixture
            .scheduler
            .start()
            .await
            .expect("Failed to start scheduler");
        fixture
    }

    /// Seed the mock remote and enqueue through the API; returns the job id.
    pub async fn enqueue(&self, remote_path: &str) -> String {
        self.transfer
            .put_file(remote_path, format!("original:{}", remote_path).as_bytes())
            .await;
        let response = self
            .post(
                "/api/v1/jobs",
                serde_json::json!({ "remote_path": remote_path }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        response.body["id"]
            .as_str()
            .expect("job id in response")
            .to_string()
    }

    /// Poll the job endpoint until the job reports `status`.
    pub async fn wait_for_status(&self, id: &str, status: &str) -> Value {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let response = self.get(&format!("/api/v1/jobs/{}", id)).await;
            if response.body["status"] == status {
                return response.body;
            }
            if tokio::time::Instant::now() > deadline {
                panic!(
                    "job {} never reached {} (last response: {})",
                    id, status, response.body
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// POST without a body, as the job commands take none.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// GET returning the raw body text (for /metrics).
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
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
        (status, String::from_utf8_lossy(&bytes).to_string())
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

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
