//! HTTP request handlers.
//!
//! - `health` - liveness endpoint
//! - `run_task` - signed run-task requests from the platform
//!
//! Failures are answered with a JSON body carrying the error code from the
//! `TripwireError` taxonomy and a human-readable message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tripwire_core::TripwireError;

pub mod health;
pub mod run_task;

pub use health::health_check;
pub use run_task::run_task;

/// Error response with code and message.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error details including code and message
    pub error: ErrorDetail,
}

/// Detailed error information.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Error code from the taxonomy (E1001-E3002)
    pub code: String,
    /// Human-readable error description
    pub message: String,
}

/// Renders `err` as a JSON error response with its mapped status.
pub fn create_error_response(err: &TripwireError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let body = ErrorResponse {
        error: ErrorDetail { code: err.code().to_string(), message: err.to_string() },
    };

    (status, Json(body)).into_response()
}
