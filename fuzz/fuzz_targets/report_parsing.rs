#![no_main]

//! Fuzz target for scanner report transformation.
//!
//! Malformed CSV must fail closed with a report error, never panic, and a
//! successful result carries one outcome per data row.

use libfuzzer_sys::fuzz_target;
use tripwire_core::{ReportTransformer, TaskStatus};

fuzz_target!(|data: &[u8]| {
    let transformer = ReportTransformer::default();

    match transformer.transform_reader(data) {
        Ok(result) => {
            if result.outcomes.is_empty() {
                assert_eq!(result.status, TaskStatus::Passed);
            }
        },
        Err(e) => assert_eq!(e.code(), "E2004"),
    }
});
