//! Liveness endpoint for load balancers and orchestrators.

use axum::{http::StatusCode, Json};
use serde::Serialize;
use tracing::{debug, instrument};

/// Health check response structure.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall service health status
    pub status: &'static str,
}

/// Reports that the process is up and serving requests.
///
/// The service holds no connections that could degrade, so the answer is
/// always `healthy`.
#[instrument(name = "health_check")]
pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    debug!("Health check requested");
    (StatusCode::OK, Json(HealthResponse { status: "healthy" }))
}
