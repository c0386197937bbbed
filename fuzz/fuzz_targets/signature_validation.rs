#![no_main]

//! Fuzz target for run-task signature validation.
//!
//! Arbitrary header values and bodies must never panic the verifier, and a
//! freshly computed digest must always validate.

use libfuzzer_sys::fuzz_target;
use tripwire_api::crypto::{generate_hmac_hex, validate_signature};

fuzz_target!(|data: &[u8]| {
    let split = data.first().map_or(0, |&b| usize::from(b)).min(data.len());
    let (header, body) = data.split_at(split);
    let header = String::from_utf8_lossy(header);

    for secret in ["", "abc123", "run-task-hmac-secret"] {
        let _ = validate_signature(body, &header, secret);
        let _ = validate_signature(body, &format!("sha512={header}"), secret);
    }

    if let Ok(signature) = generate_hmac_hex(body, "abc123") {
        assert!(validate_signature(body, &signature, "abc123").is_valid);
    }
});
