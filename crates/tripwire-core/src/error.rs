//! Error types and result handling for run-task operations.
//!
//! Defines structured error taxonomy with codes for client disambiguation
//! and proper HTTP status mapping. Covers request validation, scan pipeline,
//! and delivery failures across the run-task lifecycle.

use thiserror::Error;

/// Result type alias using `TripwireError`.
pub type Result<T> = std::result::Result<T, TripwireError>;

/// Tripwire error types with stable codes.
#[derive(Debug, Error)]
pub enum TripwireError {
    // Request Errors (E1001-E1004)
    /// HMAC signature validation failed (E1001).
    #[error("[E1001] Invalid signature: {reason}")]
    InvalidSignature {
        /// Why the signature was rejected
        reason: String,
    },

    /// Payload exceeds the configured limit (E1002).
    #[error("[E1002] Payload too large: size {size_bytes} bytes exceeds {limit_bytes} byte limit")]
    PayloadTooLarge {
        /// Size of the payload in bytes
        size_bytes: usize,
        /// Configured maximum payload size
        limit_bytes: usize,
    },

    /// Body is not a valid run-task payload (E1003).
    #[error("[E1003] Invalid payload: {reason}")]
    InvalidPayload {
        /// Description of the validation failure
        reason: String,
    },

    /// Stage field holds a value this service does not handle (E1004).
    #[error("[E1004] Unknown stage: {stage:?} is not a supported run-task stage")]
    UnknownStage {
        /// The stage string received
        stage: String,
    },

    // Pipeline Errors (E2001-E2005)
    /// Retrieving the configuration archive or plan document failed (E2001).
    #[error("[E2001] Fetch failed: {message}")]
    FetchFailed {
        /// Description of the fetch failure
        message: String,
    },

    /// The scanner process could not run to a successful completion (E2002).
    #[error("[E2002] Scanner failed: {message}")]
    ScannerFailed {
        /// Description of the scanner failure
        message: String,
    },

    /// The scanner process exceeded its time budget (E2003).
    #[error("[E2003] Scanner timeout: exceeded {timeout_secs}s")]
    ScannerTimeout {
        /// Timeout that was exceeded in seconds
        timeout_secs: u64,
    },

    /// The scanner report could not be parsed (E2004).
    #[error("[E2004] Report parse error: {message}")]
    ReportParse {
        /// Description of the malformed input
        message: String,
    },

    /// Scratch workspace could not be prepared or written (E2005).
    #[error("[E2005] Workspace error: {message}")]
    Workspace {
        /// Description of the filesystem failure
        message: String,
    },

    // System Errors (E3001-E3002)
    /// Callback PATCH to the platform failed (E3001).
    #[error("[E3001] Callback delivery failed: {message}")]
    CallbackDelivery {
        /// Description of the delivery failure
        message: String,
    },

    /// Service configuration is invalid (E3002).
    #[error("[E3002] Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem
        message: String,
    },
}

impl TripwireError {
    /// Creates an invalid payload error.
    pub fn invalid_payload(reason: impl Into<String>) -> Self {
        Self::InvalidPayload { reason: reason.into() }
    }

    /// Creates a report parse error.
    pub fn report_parse(message: impl Into<String>) -> Self {
        Self::ReportParse { message: message.into() }
    }

    /// Creates a workspace error.
    pub fn workspace(message: impl Into<String>) -> Self {
        Self::Workspace { message: message.into() }
    }

    /// Returns the error code (E1001-E3002).
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidSignature { .. } => "E1001",
            Self::PayloadTooLarge { .. } => "E1002",
            Self::InvalidPayload { .. } => "E1003",
            Self::UnknownStage { .. } => "E1004",
            Self::FetchFailed { .. } => "E2001",
            Self::ScannerFailed { .. } => "E2002",
            Self::ScannerTimeout { .. } => "E2003",
            Self::ReportParse { .. } => "E2004",
            Self::Workspace { .. } => "E2005",
            Self::CallbackDelivery { .. } => "E3001",
            Self::Configuration { .. } => "E3002",
        }
    }

    /// Returns the HTTP status code reported to the original caller.
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::InvalidSignature { .. } => 401,
            Self::PayloadTooLarge { .. } => 413,
            Self::InvalidPayload { .. } | Self::UnknownStage { .. } => 422,
            Self::FetchFailed { .. } => 502,
            Self::ScannerTimeout { .. } => 504,
            Self::ScannerFailed { .. }
            | Self::ReportParse { .. }
            | Self::Workspace { .. }
            | Self::CallbackDelivery { .. }
            | Self::Configuration { .. } => 500,
        }
    }

    /// Returns whether the failure happened after the request was accepted,
    /// in which case the platform should also learn about it via callback.
    pub const fn is_pipeline_failure(&self) -> bool {
        matches!(
            self,
            Self::FetchFailed { .. }
                | Self::ScannerFailed { .. }
                | Self::ScannerTimeout { .. }
                | Self::ReportParse { .. }
                | Self::Workspace { .. }
        )
    }
}

impl From<std::io::Error> for TripwireError {
    fn from(err: std::io::Error) -> Self {
        Self::Workspace { message: err.to_string() }
    }
}
