//! Run-task request handling.
//!
//! A request moves through: received, signature verified, payload validated,
//! dispatched by stage, completed. Registration probes are acknowledged
//! without doing any work. For real runs the verdict is sent to the
//! platform's callback URL before the original request is answered.

use axum::{
    extract::{rejection::BytesRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use tracing::{debug, error, field, info, instrument, warn, Span};
use tripwire_core::{
    report::SCANNER_DISPLAY_NAME, RunTaskPayload, Stage, TaskContext, TaskRequest, TaskResult,
    TripwireError,
};

use super::create_error_response;
use crate::{
    crypto::{generate_hmac_hex, validate_signature, SIGNATURE_HEADER},
    AppState,
};

/// Handles a signed run-task request.
///
/// # Responses
///
/// - 200 with an empty body for registration probes
/// - 200 with the stage completion message once the run was scanned and the
///   verdict delivered (callback failures are logged, not surfaced)
/// - 401 for a missing or invalid signature
/// - 413 for an oversized body
/// - 422 for malformed JSON, missing fields or an unsupported stage
/// - 500/502/504 when the pipeline failed; a `failed` verdict is sent to the
///   callback URL first
#[instrument(
    name = "run_task",
    skip_all,
    fields(
        content_length = headers.get("content-length").and_then(|v| v.to_str().ok()).unwrap_or("unknown"),
        stage = field::Empty,
        run_id = field::Empty,
    )
)]
pub async fn run_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    info!("Run task request received");

    let body = match body {
        Ok(body) => body,
        Err(rejection) => return reject_body(&rejection, &headers, state.max_payload_bytes),
    };

    if body.len() > state.max_payload_bytes {
        warn!(payload_size = body.len(), limit = state.max_payload_bytes, "Payload exceeds size limit");
        return create_error_response(&TripwireError::PayloadTooLarge {
            size_bytes: body.len(),
            limit_bytes: state.max_payload_bytes,
        });
    }

    if let Err(e) = verify_signature(&headers, &body, &state.hmac_secret) {
        return create_error_response(&e);
    }
    debug!("Signature verified");

    let request = match RunTaskPayload::from_slice(&body).and_then(TaskRequest::try_from) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Rejected run task payload");
            return create_error_response(&e);
        },
    };

    let (stage, context, outcome) = match &request {
        TaskRequest::Probe => {
            info!("Registration probe acknowledged");
            return StatusCode::OK.into_response();
        },
        TaskRequest::PrePlan(task) => {
            record_dispatch(Stage::PrePlan, &task.context);
            (Stage::PrePlan, &task.context, state.pipeline.run_pre_plan(task).await)
        },
        TaskRequest::PostPlan(task) => {
            record_dispatch(Stage::PostPlan, &task.context);
            (Stage::PostPlan, &task.context, state.pipeline.run_post_plan(task).await)
        },
    };

    match outcome {
        Ok(result) => {
            deliver_result(&state, context, &result).await;
            info!(status = %result.status, "Run task completed");
            (StatusCode::OK, stage.completion_message()).into_response()
        },
        Err(e) => {
            error!(code = e.code(), error = %e, "Run task pipeline failed");
            let failure = TaskResult::pipeline_failure(
                format!("{SCANNER_DISPLAY_NAME} scan failed: {e}"),
                state.pipeline.results_url(),
            );
            deliver_result(&state, context, &failure).await;
            create_error_response(&e)
        },
    }
}

/// Checks the body signature against the shared secret.
fn verify_signature(headers: &HeaderMap, body: &[u8], secret: &str) -> tripwire_core::Result<()> {
    let Some(signature) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
        warn!(header = SIGNATURE_HEADER, "Signature header missing");
        return Err(TripwireError::InvalidSignature {
            reason: format!("missing {SIGNATURE_HEADER} header"),
        });
    };

    let validation = validate_signature(body, signature, secret);
    if validation.is_valid {
        return Ok(());
    }

    let reason = validation.error_message.unwrap_or_else(|| "signature mismatch".to_string());
    warn!(
        expected = %signature,
        computed = %generate_hmac_hex(body, secret).unwrap_or_default(),
        reason = %reason,
        "Signature verification failed"
    );
    Err(TripwireError::InvalidSignature { reason })
}

fn reject_body(rejection: &BytesRejection, headers: &HeaderMap, limit: usize) -> Response {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        let size_bytes = headers
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        warn!(payload_size = size_bytes, limit, "Payload exceeds size limit");
        return create_error_response(&TripwireError::PayloadTooLarge {
            size_bytes,
            limit_bytes: limit,
        });
    }

    warn!(error = %rejection, "Failed to read request body");
    create_error_response(&TripwireError::invalid_payload(rejection.body_text()))
}

fn record_dispatch(stage: Stage, context: &TaskContext) {
    let span = Span::current();
    span.record("stage", stage.as_str());
    span.record("run_id", context.run_id.as_str());
    info!(
        organization = %context.organization_name,
        workspace = %context.workspace,
        "Dispatching {stage} run"
    );
}

/// Sends `result` to the callback URL; failures are logged only.
async fn deliver_result(state: &AppState, context: &TaskContext, result: &TaskResult) {
    match state.dispatcher.dispatch(&context.callback_url, &context.access_token, result).await {
        Ok(receipt) => {
            debug!(attempts = receipt.attempts, status = receipt.status_code, "Callback acknowledged");
        },
        Err(e) => {
            let err = TripwireError::from(e);
            error!(code = err.code(), error = %err, "Task result callback was not delivered");
        },
    }
}
