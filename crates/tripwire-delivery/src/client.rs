//! HTTP client for task result callbacks.
//!
//! Handles request construction, response processing, and error
//! categorization for the dispatcher's retry logic.

use std::{collections::HashMap, time::Duration};

use reqwest::{header::HeaderMap, Response};
use serde::{Deserialize, Serialize};
use tracing::{info_span, Instrument};
use tripwire_core::{AccessToken, TaskResultsPayload};

use crate::error::{DeliveryError, Result};

/// Media type of JSON:API documents.
pub const JSON_API_CONTENT_TYPE: &str = "application/vnd.api+json";

/// Configuration for the callback client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Timeout for one callback attempt.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
    /// Maximum number of redirects to follow.
    pub max_redirects: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: "Tripwire-Run-Task/1.0".to_string(),
            max_redirects: 3,
        }
    }
}

/// HTTP client for PATCHing task results.
///
/// Uses a pooled connection set shared by all requests. 4xx and 5xx answers
/// are returned as responses; the caller decides what they mean.
#[derive(Debug, Clone)]
pub struct CallbackClient {
    client: reqwest::Client,
    config: ClientConfig,
}

/// One callback attempt.
#[derive(Debug, Clone)]
pub struct CallbackRequest {
    /// Callback URL from the run-task request.
    pub url: String,
    /// Run-scoped bearer token.
    pub token: AccessToken,
    /// Task results envelope.
    pub payload: TaskResultsPayload,
    /// Attempt number, starting at 1.
    pub attempt_number: u32,
}

/// Response from a callback attempt.
#[derive(Debug, Clone)]
pub struct CallbackResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Response body (limited size).
    pub body: String,
    /// Total duration of the request.
    pub duration: Duration,
    /// Whether the request was successful (2xx status).
    pub is_success: bool,
}

impl CallbackResponse {
    /// Converts a non-2xx response into the matching delivery error.
    ///
    /// # Errors
    ///
    /// Returns `RateLimited` for 429, `ClientError` for other 4xx and
    /// `ServerError` for everything else that is not 2xx.
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success {
            return Ok(self);
        }

        match self.status_code {
            429 => Err(DeliveryError::rate_limited(
                extract_retry_after_seconds(&self.headers).unwrap_or(0),
            )),
            400..=499 => Err(DeliveryError::client_error(self.status_code, self.body)),
            _ => Err(DeliveryError::server_error(self.status_code, self.body)),
        }
    }
}

impl CallbackClient {
    /// Creates a new callback client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` if the HTTP client cannot
    /// be configured with the provided settings.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects as usize))
            .build()
            .map_err(|e| {
                DeliveryError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }

    /// Creates a new callback client with default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// Sends one callback attempt.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the payload cannot be encoded, `Timeout`
    /// when the attempt exceeds the configured timeout and `NetworkError` for
    /// other transport failures. HTTP error statuses are not errors here.
    pub async fn send(&self, request: &CallbackRequest) -> Result<CallbackResponse> {
        let start_time = std::time::Instant::now();

        let span = info_span!(
            "task_result_callback",
            url = %request.url,
            attempt = request.attempt_number
        );

        async move {
            tracing::debug!("Sending task result");

            let body = serde_json::to_vec(&request.payload)
                .map_err(|e| DeliveryError::serialization(e.to_string()))?;

            let http_request = self
                .client
                .patch(&request.url)
                .bearer_auth(request.token.expose())
                .header(reqwest::header::CONTENT_TYPE, JSON_API_CONTENT_TYPE)
                .body(body);

            let response = match http_request.send().await {
                Ok(response) => response,
                Err(e) => {
                    let duration = start_time.elapsed();
                    tracing::warn!(duration_ms = duration.as_millis(), "Request failed: {}", e);

                    if e.is_timeout() {
                        return Err(DeliveryError::timeout(self.config.timeout.as_secs()));
                    }
                    if e.is_connect() {
                        return Err(DeliveryError::network(format!("connection failed: {e}")));
                    }
                    return Err(DeliveryError::network(e.to_string()));
                },
            };

            let duration = start_time.elapsed();
            let callback_response = parse_response(response, duration).await;

            match callback_response.status_code {
                200..=299 => {
                    tracing::info!(
                        status = callback_response.status_code,
                        duration_ms = duration.as_millis(),
                        "Task result accepted"
                    );
                },
                400..=499 => {
                    tracing::warn!(
                        status = callback_response.status_code,
                        body = %callback_response.body,
                        "Client error response"
                    );
                },
                _ => {
                    tracing::warn!(
                        status = callback_response.status_code,
                        body = %callback_response.body,
                        "Server error response"
                    );
                },
            }

            Ok(callback_response)
        }
        .instrument(span)
        .await
    }
}

/// Parses an HTTP response, keeping at most 1 KiB of the body.
async fn parse_response(response: Response, duration: Duration) -> CallbackResponse {
    const MAX_BODY_SIZE: usize = 1024;

    let status_code = response.status().as_u16();
    let is_success = response.status().is_success();
    let headers = extract_headers(response.headers());

    let body = match response.bytes().await {
        Ok(bytes) if bytes.len() > MAX_BODY_SIZE => {
            let suffix = "... (truncated)";
            let truncated = String::from_utf8_lossy(&bytes[..MAX_BODY_SIZE - suffix.len()]);
            format!("{truncated}{suffix}")
        },
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            tracing::warn!("Failed to read response body: {}", e);
            format!("[Failed to read response body: {e}]")
        },
    };

    CallbackResponse { status_code, headers, body, duration, is_success }
}

/// Extracts headers from reqwest HeaderMap into a standard HashMap.
fn extract_headers(header_map: &HeaderMap) -> HashMap<String, String> {
    header_map
        .iter()
        .filter_map(|(key, value)| value.to_str().ok().map(|v| (key.to_string(), v.to_string())))
        .collect()
}

/// Extracts retry-after delay from response headers.
///
/// Supports both seconds format and HTTP-date format. Returns the delay in
/// seconds, or a default value (60s) if parsing fails.
pub fn extract_retry_after_seconds<S: std::hash::BuildHasher>(
    headers: &HashMap<String, String, S>,
) -> Option<u64> {
    const DEFAULT_RETRY_AFTER: u64 = 60;

    let retry_after = headers.get("retry-after").or_else(|| headers.get("Retry-After"))?;

    if let Ok(seconds) = retry_after.trim().parse::<u64>() {
        return Some(seconds);
    }

    if let Ok(date_time) = chrono::DateTime::parse_from_rfc2822(retry_after) {
        let now = chrono::Utc::now();
        let retry_time = date_time.with_timezone(&chrono::Utc);

        if retry_time > now {
            if let Ok(duration) = retry_time.signed_duration_since(now).to_std() {
                return Some(duration.as_secs());
            }
        }
        return Some(0);
    }

    Some(DEFAULT_RETRY_AFTER)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status_code: u16, headers: &[(&str, &str)]) -> CallbackResponse {
        CallbackResponse {
            status_code,
            headers: headers.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect(),
            body: "body".to_string(),
            duration: Duration::from_millis(5),
            is_success: (200..300).contains(&status_code),
        }
    }

    #[test]
    fn success_passes_through() {
        assert!(response(200, &[]).error_for_status().is_ok());
        assert!(response(204, &[]).error_for_status().is_ok());
    }

    #[test]
    fn statuses_mapped_to_errors() {
        let err = response(404, &[]).error_for_status().unwrap_err();
        assert!(matches!(err, DeliveryError::ClientError { status_code: 404, .. }));

        let err = response(503, &[]).error_for_status().unwrap_err();
        assert!(matches!(err, DeliveryError::ServerError { status_code: 503, .. }));

        let err = response(429, &[("retry-after", "7")]).error_for_status().unwrap_err();
        assert_eq!(err.retry_after_seconds(), Some(7));
    }

    #[test]
    fn retry_after_parsing() {
        let mut headers = HashMap::new();

        headers.insert("retry-after".to_string(), "120".to_string());
        assert_eq!(extract_retry_after_seconds(&headers), Some(120));

        headers.clear();
        assert_eq!(extract_retry_after_seconds(&headers), None);

        headers.insert("retry-after".to_string(), "invalid".to_string());
        assert_eq!(extract_retry_after_seconds(&headers), Some(60));

        headers.insert("retry-after".to_string(), "Wed, 21 Oct 2015 07:28:00 GMT".to_string());
        assert_eq!(extract_retry_after_seconds(&headers), Some(0));
    }
}
