//! Error types for the scan stage.
//!
//! Covers artifact retrieval, archive extraction, scratch filesystem and
//! scanner process failures. Every variant maps onto the shared
//! [`TripwireError`] taxonomy so handlers can answer with a stable code.

use thiserror::Error;
use tripwire_core::TripwireError;

/// Result type alias for scan operations.
pub type Result<T> = std::result::Result<T, ScanError>;

/// Failures raised while preparing or running a scan.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Outbound request could not be completed.
    #[error("request to {url} failed: {message}")]
    Network {
        /// Target URL without query string
        url: String,
        /// Underlying client error
        message: String,
    },

    /// Outbound request exceeded its timeout.
    #[error("request to {url} timed out after {timeout_seconds}s")]
    FetchTimeout {
        /// Target URL without query string
        url: String,
        /// Configured timeout
        timeout_seconds: u64,
    },

    /// Platform answered with a non-success status.
    #[error("request to {url} returned HTTP {status_code}: {body}")]
    UnexpectedStatus {
        /// Target URL without query string
        url: String,
        /// HTTP status code
        status_code: u16,
        /// Truncated response body
        body: String,
    },

    /// Downloaded content could not be decoded.
    #[error("invalid artifact: {message}")]
    InvalidArtifact {
        /// What was wrong with the content
        message: String,
    },

    /// Scratch directory could not be created, written or cleaned.
    #[error("workspace I/O error: {message}")]
    Io {
        /// Operation and OS error
        message: String,
    },

    /// Scanner binary could not be started.
    #[error("failed to start scanner `{program}`: {message}")]
    Spawn {
        /// Program name
        program: String,
        /// OS error
        message: String,
    },

    /// Scanner exited unsuccessfully.
    #[error("scanner exited with {status}: {stderr}")]
    ScannerExit {
        /// Exit status description
        status: String,
        /// Trailing stderr output
        stderr: String,
    },

    /// Scanner exited cleanly but wrote no report.
    #[error("scanner produced no report at {path}")]
    MissingReport {
        /// Expected report path
        path: String,
    },

    /// Scanner exceeded its time budget and was killed.
    #[error("scanner killed after {timeout_seconds}s")]
    ScannerTimeout {
        /// Configured timeout
        timeout_seconds: u64,
    },

    /// HTTP client could not be built.
    #[error("invalid scan configuration: {message}")]
    Configuration {
        /// Configuration error message
        message: String,
    },
}

impl ScanError {
    /// Creates a workspace I/O error with context.
    pub fn io(context: impl std::fmt::Display, err: &std::io::Error) -> Self {
        Self::Io { message: format!("{context}: {err}") }
    }

    /// Creates an invalid artifact error.
    pub fn invalid_artifact(message: impl Into<String>) -> Self {
        Self::InvalidArtifact { message: message.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Returns true when the failure happened while talking to the platform.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            Self::Network { .. }
                | Self::FetchTimeout { .. }
                | Self::UnexpectedStatus { .. }
                | Self::InvalidArtifact { .. }
        )
    }
}

impl From<ScanError> for TripwireError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::ScannerTimeout { timeout_seconds } => {
                Self::ScannerTimeout { timeout_secs: timeout_seconds }
            },
            ScanError::Spawn { .. }
            | ScanError::ScannerExit { .. }
            | ScanError::MissingReport { .. } => Self::ScannerFailed { message: err.to_string() },
            ScanError::Io { .. } => Self::Workspace { message: err.to_string() },
            ScanError::Configuration { .. } => Self::Configuration { message: err.to_string() },
            ScanError::Network { .. }
            | ScanError::FetchTimeout { .. }
            | ScanError::UnexpectedStatus { .. }
            | ScanError::InvalidArtifact { .. } => Self::FetchFailed { message: err.to_string() },
        }
    }
}
