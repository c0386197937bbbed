//! Tripwire HTTP API.
//!
//! Receives signed run-task requests from the platform, runs the scan
//! pipeline for the requested stage and reports the verdict back through the
//! task result callback.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::{fmt, sync::Arc, time::Duration};

use tripwire_delivery::{CallbackClient, CallbackDispatcher};

pub mod config;
pub mod crypto;
pub mod handlers;
pub mod pipeline;
pub mod server;

pub use config::{AppEnv, Config};
pub use pipeline::RunTaskPipeline;
pub use server::{create_router, start_server};

/// Request timeout used when none is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(900);

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    /// Secret used to verify request signatures.
    pub hmac_secret: Arc<str>,
    /// Largest accepted request body in bytes.
    pub max_payload_bytes: usize,
    /// Fetch, scan and transform pipeline.
    pub pipeline: Arc<RunTaskPipeline>,
    /// Task result callback sender.
    pub dispatcher: Arc<CallbackDispatcher>,
    /// Whole-request timeout enforced by the router.
    pub request_timeout: Duration,
}

impl AppState {
    /// Builds state from its components.
    pub fn new(
        hmac_secret: impl Into<Arc<str>>,
        max_payload_bytes: usize,
        pipeline: RunTaskPipeline,
        dispatcher: CallbackDispatcher,
    ) -> Self {
        Self {
            hmac_secret: hmac_secret.into(),
            max_payload_bytes,
            pipeline: Arc::new(pipeline),
            dispatcher: Arc::new(dispatcher),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Overrides the whole-request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Builds state for a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `TripwireError::Configuration` if an HTTP client cannot be
    /// built.
    pub fn from_config(config: &Config) -> tripwire_core::Result<Self> {
        let pipeline = RunTaskPipeline::from_config(config)?;
        let client = CallbackClient::new(config.to_client_config())?;
        let dispatcher = CallbackDispatcher::new(client, config.to_retry_policy());

        Ok(Self::new(config.hmac_secret(), config.max_payload_bytes, pipeline, dispatcher)
            .with_request_timeout(config.request_timeout()))
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("hmac_secret", &"***")
            .field("max_payload_bytes", &self.max_payload_bytes)
            .field("pipeline", &self.pipeline)
            .field("dispatcher", &self.dispatcher)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
