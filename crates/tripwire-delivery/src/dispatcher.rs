//! Task result delivery with bounded retry.

use std::time::Duration;

use tracing::{error, info, instrument, warn};
use tripwire_core::{AccessToken, TaskResult};

use crate::{
    client::{CallbackClient, CallbackRequest},
    error::{DeliveryError, ErrorCategory, Result},
    retry::{RetryContext, RetryDecision, RetryPolicy},
};

/// Outcome of a successful delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Attempts made, including the successful one.
    pub attempts: u32,
    /// Status returned by the platform.
    pub status_code: u16,
}

/// Sends task results to the platform, retrying transient failures.
#[derive(Debug, Clone)]
pub struct CallbackDispatcher {
    client: CallbackClient,
    policy: RetryPolicy,
}

impl CallbackDispatcher {
    /// Creates a dispatcher from a client and retry policy.
    pub fn new(client: CallbackClient, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Retry policy in use.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Delivers `result` to `url`.
    ///
    /// Retryable failures (network, timeout, 5xx, 429) are retried with
    /// backoff until the policy's attempt budget is spent. A 4xx answer ends
    /// delivery immediately.
    ///
    /// # Errors
    ///
    /// Returns the non-retryable error as is, or `RetriesExhausted` wrapping
    /// the last failure once attempts run out.
    #[instrument(
        name = "dispatch_task_result",
        skip(self, token, result),
        fields(status = %result.status, outcomes = result.outcomes.len())
    )]
    pub async fn dispatch(
        &self,
        url: &str,
        token: &AccessToken,
        result: &TaskResult,
    ) -> Result<DeliveryReceipt> {
        let mut request = CallbackRequest {
            url: url.to_string(),
            token: token.clone(),
            payload: result.to_payload(),
            attempt_number: 1,
        };

        loop {
            let attempt = request.attempt_number;
            let outcome =
                self.client.send(&request).await.and_then(|response| response.error_for_status());

            let failure = match outcome {
                Ok(response) => {
                    info!(attempts = attempt, status = response.status_code, "Task result delivered");
                    return Ok(DeliveryReceipt { attempts: attempt, status_code: response.status_code });
                },
                Err(e) => e,
            };

            match RetryContext::new(attempt, &failure, &self.policy).decide_retry() {
                RetryDecision::Retry { delay } => {
                    warn!(
                        attempt,
                        category = %ErrorCategory::from(&failure),
                        delay_ms = delay.as_millis(),
                        error = %failure,
                        "Callback attempt failed, retrying"
                    );
                    sleep(delay).await;
                    request.attempt_number += 1;
                },
                RetryDecision::GiveUp { reason } => {
                    error!(
                        attempts = attempt,
                        category = %ErrorCategory::from(&failure),
                        error = %failure,
                        reason = %reason,
                        "Callback delivery failed"
                    );
                    return Err(if failure.is_retryable() {
                        DeliveryError::retries_exhausted(attempt, &failure)
                    } else {
                        failure
                    });
                },
            }
        }
    }
}

async fn sleep(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
