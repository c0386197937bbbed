//! TestEnv construction.

use std::time::Duration;

use anyhow::{Context, Result};
use tripwire_api::{AppEnv, Config};
use wiremock::MockServer;

use crate::{
    fixtures::ReportBuilder,
    scanner::{FakeScanner, ScannerBehavior},
    TestEnv,
};

/// Signing secret shared by the environment and its signed requests.
pub const TEST_HMAC_KEY: &str = "run-task-hmac-secret";

/// Builder for configuring a [`TestEnv`].
pub struct TestEnvBuilder {
    behavior: ScannerBehavior,
    hmac_key: String,
    scanner_timeout: Duration,
    max_payload_bytes: usize,
    callback_max_attempts: u32,
}

impl Default for TestEnvBuilder {
    fn default() -> Self {
        Self {
            behavior: ScannerBehavior::Report(
                ReportBuilder::new().build().unwrap_or_default(),
            ),
            hmac_key: TEST_HMAC_KEY.to_string(),
            scanner_timeout: Duration::from_secs(10),
            max_payload_bytes: 1024 * 1024,
            callback_max_attempts: 3,
        }
    }
}

impl TestEnvBuilder {
    /// Creates a builder whose scanner reports no findings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets what the fake scanner does.
    #[must_use]
    pub fn scanner(mut self, behavior: ScannerBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Makes the fake scanner emit `report`.
    ///
    /// # Errors
    ///
    /// Fails if the report cannot be rendered.
    pub fn report(self, report: &ReportBuilder) -> Result<Self> {
        Ok(self.scanner(ScannerBehavior::Report(report.build()?)))
    }

    /// Sets the signing secret.
    #[must_use]
    pub fn hmac_key(mut self, key: impl Into<String>) -> Self {
        self.hmac_key = key.into();
        self
    }

    /// Sets the scanner timeout (whole seconds).
    #[must_use]
    pub fn scanner_timeout(mut self, timeout: Duration) -> Self {
        self.scanner_timeout = timeout;
        self
    }

    /// Sets the request body limit.
    #[must_use]
    pub fn max_payload_bytes(mut self, limit: usize) -> Self {
        self.max_payload_bytes = limit;
        self
    }

    /// Sets the callback attempt budget.
    #[must_use]
    pub fn callback_max_attempts(mut self, attempts: u32) -> Self {
        self.callback_max_attempts = attempts;
        self
    }

    /// Starts the mock platform, writes the fake scanner and assembles the
    /// configuration.
    ///
    /// # Errors
    ///
    /// Fails if the scanner or scratch directory cannot be created, or the
    /// resulting configuration is invalid.
    pub async fn build(self) -> Result<TestEnv> {
        crate::init_test_tracing();

        let platform = MockServer::start().await;
        let scanner = FakeScanner::new(&self.behavior)?;
        let scratch = tempfile::Builder::new()
            .prefix("tripwire-scratch-")
            .tempdir()
            .context("creating scratch directory")?;

        let (scanner_program, scanner_wrapper_args) = scanner.command();
        let scanner_timeout_seconds = self.scanner_timeout.as_secs().max(1);

        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 5000,
            app_env: AppEnv::Test,
            hmac_key: Some(self.hmac_key),
            request_timeout: scanner_timeout_seconds + 60,
            max_payload_bytes: self.max_payload_bytes,
            scratch_dir: scratch.path().to_path_buf(),
            scanner_program,
            scanner_wrapper_args,
            scanner_timeout_seconds,
            fetch_timeout_seconds: 5,
            callback_timeout_seconds: 5,
            callback_max_attempts: self.callback_max_attempts,
            callback_retry_base_delay_ms: 10,
            callback_retry_max_delay_ms: 50,
            callback_retry_jitter_factor: 0.0,
            ..Config::default()
        };
        config.validate()?;

        Ok(TestEnv { platform, scanner, scratch, config })
    }
}
