//! Core domain models and report transformation.
//!
//! Provides the run-task request model, scanner finding and outcome types,
//! severity classification, and the error taxonomy shared by every other
//! Tripwire crate.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod findings;
pub mod models;
pub mod outcome;
pub mod report;
pub mod severity;

pub use error::{Result, TripwireError};
pub use findings::ScanFinding;
pub use models::{
    AccessToken, PostPlanTask, PrePlanTask, RunId, RunTaskPayload, Stage, TaskContext,
    TaskRequest, WorkspaceRef, PROBE_ACCESS_TOKEN,
};
pub use outcome::{Tag, TaskOutcome, TaskResult, TaskResultsPayload, TaskStatus};
pub use report::ReportTransformer;
pub use severity::{classify, AlertLevel, SeverityClassification};
