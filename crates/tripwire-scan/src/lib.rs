//! Scan stage of a run task.
//!
//! Prepares an isolated scratch workspace per request, downloads the run's
//! artifact into it and runs the external scanner over it. The resulting CSV
//! report is handed to [`tripwire_core::ReportTransformer`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod fetch;
pub mod scanner;
pub mod workspace;

pub use error::{Result, ScanError};
pub use fetch::{ArtifactFetcher, FetcherConfig};
pub use scanner::{ScanMode, ScanReport, Scanner, ScannerConfig};
pub use workspace::ScratchWorkspace;
