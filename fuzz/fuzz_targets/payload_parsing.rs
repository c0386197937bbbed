#![no_main]

//! Fuzz target for run-task payload validation.
//!
//! Any body must either become a `TaskRequest` or a request error; parsing
//! never panics and never yields a pipeline error.

use libfuzzer_sys::fuzz_target;
use tripwire_core::{RunTaskPayload, TaskRequest};

fuzz_target!(|data: &[u8]| {
    match RunTaskPayload::from_slice(data).and_then(TaskRequest::try_from) {
        Ok(request) => {
            if let Some(context) = request.context() {
                assert!(!context.callback_url.trim().is_empty());
            }
        },
        Err(e) => assert!(!e.is_pipeline_failure()),
    }
});
