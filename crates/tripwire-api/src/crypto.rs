//! Cryptographic utilities for run-task signature validation.
//!
//! The platform signs every run-task request with HMAC-SHA512 over the raw
//! request body, keyed with the secret configured on the run task, and sends
//! the lowercase hex digest in the `x-tfc-task-signature` header.

use std::fmt;

use hmac::{Hmac, Mac};
use sha2::Sha512;

type HmacSha512 = Hmac<Sha512>;

/// Header carrying the request signature.
pub const SIGNATURE_HEADER: &str = "x-tfc-task-signature";

/// Length of a hex-encoded SHA-512 digest.
const DIGEST_HEX_LEN: usize = 128;

/// Result of signature validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// Whether the signature is valid.
    pub is_valid: bool,
    /// Error message if validation failed.
    pub error_message: Option<String>,
}

impl ValidationResult {
    /// Creates a successful validation result.
    pub fn valid() -> Self {
        Self { is_valid: true, error_message: None }
    }

    /// Creates a failed validation result with error message.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self { is_valid: false, error_message: Some(message.into()) }
    }
}

/// Signature validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// Invalid signature format.
    InvalidFormat(String),
    /// Invalid secret key.
    InvalidSecret,
}

impl fmt::Display for SignatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFormat(format) => write!(f, "invalid signature format: {format}"),
            Self::InvalidSecret => write!(f, "invalid secret key"),
        }
    }
}

impl std::error::Error for SignatureError {}

/// Validates a run-task signature using HMAC-SHA512.
///
/// Accepts the raw 128-character hex digest the platform sends, or the same
/// digest with a `sha512=` prefix. Hex digits are compared case-insensitively
/// in constant time.
///
/// # Example
///
/// ```
/// use tripwire_api::crypto::{generate_hmac_hex, validate_signature};
///
/// let payload = br#"{"stage":"pre_plan"}"#;
/// let secret = "run-task-secret";
/// let signature = generate_hmac_hex(payload, secret).unwrap();
///
/// let result = validate_signature(payload, &signature, secret);
/// assert!(result.is_valid);
/// ```
pub fn validate_signature(payload: &[u8], signature: &str, secret: &str) -> ValidationResult {
    if signature.is_empty() {
        return ValidationResult::invalid("signature header is empty");
    }

    if secret.is_empty() {
        return ValidationResult::invalid("secret key is empty");
    }

    let hex_signature = match parse_signature_format(signature) {
        Ok(hex) => hex,
        Err(err) => return ValidationResult::invalid(err.to_string()),
    };

    let expected_signature = match generate_hmac_hex(payload, secret) {
        Ok(sig) => sig,
        Err(err) => return ValidationResult::invalid(err.to_string()),
    };

    if timing_safe_eq(&hex_signature, &expected_signature) {
        ValidationResult::valid()
    } else {
        ValidationResult::invalid("signature mismatch")
    }
}

/// Generates HMAC-SHA512 signature as hex string.
///
/// # Errors
///
/// Returns `SignatureError::InvalidSecret` if the secret key is invalid.
pub fn generate_hmac_hex(payload: &[u8], secret: &str) -> Result<String, SignatureError> {
    let mut mac =
        HmacSha512::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidSecret)?;

    mac.update(payload);
    let result = mac.finalize();
    Ok(hex::encode(result.into_bytes()))
}

/// Parses a signature header value into lowercase hex.
///
/// Supported formats:
/// - "<hex>" (as sent by the platform)
/// - "sha512=<hex>"
fn parse_signature_format(signature: &str) -> Result<String, SignatureError> {
    let hex = signature.trim();
    let hex = hex.strip_prefix("sha512=").unwrap_or(hex);

    if hex.len() == DIGEST_HEX_LEN && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Ok(hex.to_ascii_lowercase());
    }

    let preview: String = signature.chars().take(16).collect();
    Err(SignatureError::InvalidFormat(format!(
        "expected {DIGEST_HEX_LEN} hex characters or 'sha512=<hex>', got: {preview}..."
    )))
}

/// Timing-safe string comparison to prevent timing attacks.
///
/// Uses constant-time comparison to avoid leaking information
/// about the expected signature through timing analysis.
fn timing_safe_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (a_byte, b_byte) in a.as_bytes().iter().zip(b.as_bytes()) {
        result |= a_byte ^ b_byte;
    }

    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_signature_success() {
        let payload = b"test payload";
        let secret = "test_secret";

        let expected = generate_hmac_hex(payload, secret).unwrap();

        let result = validate_signature(payload, &expected, secret);
        assert!(result.is_valid);
        assert!(result.error_message.is_none());

        let prefixed = format!("sha512={expected}");
        assert!(validate_signature(payload, &prefixed, secret).is_valid);
    }

    #[test]
    fn uppercase_hex_accepted() {
        let payload = b"test payload";
        let expected = generate_hmac_hex(payload, "k").unwrap().to_ascii_uppercase();
        assert!(validate_signature(payload, &expected, "k").is_valid);
    }

    #[test]
    fn validate_signature_mismatch() {
        let payload = b"test payload";
        let other = generate_hmac_hex(b"other payload", "test_secret").unwrap();

        let result = validate_signature(payload, &other, "test_secret");
        assert!(!result.is_valid);
        assert_eq!(result.error_message.unwrap(), "signature mismatch");
    }

    #[test]
    fn validate_signature_missing() {
        let result = validate_signature(b"test payload", "", "test_secret");
        assert!(!result.is_valid);
        assert_eq!(result.error_message.unwrap(), "signature header is empty");
    }

    #[test]
    fn empty_secret_rejected() {
        let signature = "a".repeat(128);
        let result = validate_signature(b"payload", &signature, "");
        assert_eq!(result.error_message.unwrap(), "secret key is empty");
    }

    #[test]
    fn sha256_length_digest_rejected() {
        let signature = "0123456789abcdef".repeat(4);
        assert!(parse_signature_format(&signature).is_err());
        assert!(parse_signature_format("sha256=abc").is_err());
    }

    #[test]
    fn parse_signature_format_prefixed() {
        let hex = "ab".repeat(64);
        assert_eq!(parse_signature_format(&format!("sha512={hex}")).unwrap(), hex);
    }

    #[test]
    fn timing_safe_eq_cases() {
        assert!(timing_safe_eq("hello", "hello"));
        assert!(!timing_safe_eq("hello", "world"));
        assert!(!timing_safe_eq("hello", "hello_world"));
    }

    #[test]
    fn generate_hmac_hex_known_vector() {
        // RFC 4231 test case 2.
        let digest = generate_hmac_hex(b"what do ya want for nothing?", "Jefe").unwrap();
        assert_eq!(
            digest,
            "164b7a7bfcf819e2e395fbe73b56e0a387bd64222e831fd610270cd7ea2505549758bf75c05a994a6d034f65f8f0e6fdcaeab1a34d4a6b4b636e070a38bce737"
        );
        assert_eq!(digest.len(), 128);
    }
}
