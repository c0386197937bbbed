//! Test infrastructure for the Tripwire run-task service.
//!
//! [`TestEnv`] wires the real router to a mock platform API (wiremock), a
//! scripted scanner and a throwaway scratch directory, so tests drive the
//! whole request flow without network access or the real scanner.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

use std::{path::Path, sync::Once};

use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use bytes::Bytes;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use tripwire_api::{
    create_router,
    crypto::{generate_hmac_hex, SIGNATURE_HEADER},
    AppState, Config,
};
use tripwire_core::Stage;
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

pub mod fixtures;
pub mod scanner;

mod env_core;

pub use env_core::{TestEnvBuilder, TEST_HMAC_KEY};
pub use fixtures::{
    config_archive, sample_configuration, sample_plan, ReportBuilder, TaskRequestBuilder,
    CALLBACK_PATH, CONFIGURATION_PATH, PLAN_PATH, TEST_ACCESS_TOKEN, TEST_RUN_ID,
};
pub use scanner::{FakeScanner, ScannerBehavior};

/// Test environment with a mock platform, fake scanner and scratch space.
pub struct TestEnv {
    /// Mock platform API serving artifacts and receiving callbacks
    pub platform: MockServer,
    scanner: FakeScanner,
    scratch: TempDir,
    config: Config,
}

/// Response captured from the router.
#[derive(Debug)]
pub struct TestResponse {
    /// Status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Raw body
    pub body: Bytes,
}

impl TestResponse {
    /// Body as UTF-8 text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body parsed as JSON.
    ///
    /// # Errors
    ///
    /// Fails if the body is not JSON.
    pub fn json(&self) -> Result<Value> {
        serde_json::from_slice(&self.body).context("response body is not JSON")
    }
}

impl TestEnv {
    /// Environment whose scanner reports no findings.
    ///
    /// # Errors
    ///
    /// See [`TestEnvBuilder::build`].
    pub async fn new() -> Result<Self> {
        TestEnvBuilder::new().build().await
    }

    /// Starts configuring an environment.
    pub fn builder() -> TestEnvBuilder {
        TestEnvBuilder::new()
    }

    /// Service configuration in use.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The fake scanner.
    pub fn scanner(&self) -> &FakeScanner {
        &self.scanner
    }

    /// Root of the scratch directory.
    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// Base URL of the mock platform.
    pub fn platform_url(&self) -> String {
        self.platform.uri()
    }

    /// Builds a router over fresh application state.
    ///
    /// # Errors
    ///
    /// Fails if the application state cannot be built.
    pub fn router(&self) -> Result<Router> {
        let state = AppState::from_config(&self.config)?;
        Ok(create_router(state))
    }

    /// `POST /` with `body` signed by the environment's secret.
    ///
    /// # Errors
    ///
    /// Fails if the signature or request cannot be built.
    pub fn signed_request(&self, body: impl Into<Vec<u8>>) -> Result<Request<Body>> {
        let body = body.into();
        let signature = generate_hmac_hex(&body, self.config.hmac_secret())?;
        Ok(Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(Body::from(body))?)
    }

    /// `POST /` with an explicit signature header value, or none.
    ///
    /// # Errors
    ///
    /// Fails if the request cannot be built.
    pub fn request_with_signature(
        &self,
        body: impl Into<Vec<u8>>,
        signature: Option<&str>,
    ) -> Result<Request<Body>> {
        let mut builder =
            Request::builder().method("POST").uri("/").header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        Ok(builder.body(Body::from(body.into()))?)
    }

    /// Sends `request` through a fresh router.
    ///
    /// # Errors
    ///
    /// Fails if the router cannot be built or the body cannot be read.
    pub async fn send(&self, request: Request<Body>) -> Result<TestResponse> {
        let response = self.router()?.oneshot(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        Ok(TestResponse { status, headers, body })
    }

    /// Signs and sends a run-task body.
    ///
    /// # Errors
    ///
    /// See [`TestEnv::signed_request`] and [`TestEnv::send`].
    pub async fn run_task(&self, body: impl Into<Vec<u8>>) -> Result<TestResponse> {
        let request = self.signed_request(body)?;
        self.send(request).await
    }

    /// Serves `archive` at [`CONFIGURATION_PATH`] for the test token.
    pub async fn mount_configuration(&self, archive: Vec<u8>) {
        Mock::given(method("GET"))
            .and(path(CONFIGURATION_PATH))
            .and(header("authorization", format!("Bearer {TEST_ACCESS_TOKEN}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(archive))
            .mount(&self.platform)
            .await;
    }

    /// Serves `plan` at [`PLAN_PATH`] for the test token.
    pub async fn mount_plan(&self, plan: &Value) {
        Mock::given(method("GET"))
            .and(path(PLAN_PATH))
            .and(header("authorization", format!("Bearer {TEST_ACCESS_TOKEN}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(plan))
            .mount(&self.platform)
            .await;
    }

    /// Answers callbacks at [`CALLBACK_PATH`] with `status`.
    pub async fn mount_callback(&self, status: u16) {
        Mock::given(method("PATCH"))
            .and(path(CALLBACK_PATH))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.platform)
            .await;
    }

    /// Bodies of every callback PATCH received so far.
    ///
    /// # Errors
    ///
    /// Fails if a callback body is not JSON.
    pub async fn callbacks(&self) -> Result<Vec<Value>> {
        let requests = self.platform.received_requests().await.unwrap_or_default();
        requests
            .iter()
            .filter(|request| request.method.as_str() == "PATCH")
            .map(|request| serde_json::from_slice(&request.body).context("callback is not JSON"))
            .collect()
    }

    /// Number of requests the mock platform received.
    pub async fn platform_request_count(&self) -> usize {
        self.platform.received_requests().await.map_or(0, |requests| requests.len())
    }

    /// Workspaces still present under the stage directory.
    pub fn remaining_workspaces(&self, stage: Stage) -> usize {
        std::fs::read_dir(self.scratch.path().join(stage.as_str()))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

static TRACING: Once = Once::new();

/// Installs a test-writer subscriber once per process; `RUST_LOG` filters.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}
