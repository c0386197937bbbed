//! Scanner report transformation.
//!
//! Turns the scanner's CSV report into a [`TaskResult`]: the first row is a
//! header and is skipped, every following row becomes exactly one outcome.
//!
//! The verdict reads each row's raw severity value: a run fails when any row
//! reports exactly `info`, `medium`, `high` or `critical`. Values are compared
//! as written by the scanner, so `low` and differently-cased values do not
//! fail the run.

use std::{fs::File, io::Read, path::Path};

use csv::{ReaderBuilder, StringRecord};
use tracing::debug;

use crate::{
    error::{Result, TripwireError},
    findings::ScanFinding,
    outcome::{TaskOutcome, TaskResult, TaskStatus},
};

/// Product name used in summary messages.
pub const SCANNER_DISPLAY_NAME: &str = "HashiCorp Vault Radar";

/// Default portal link attached to results and outcomes.
pub const DEFAULT_RESULTS_URL: &str = "https://vault-radar-portal.cloud.hashicorp.com";

/// Raw severity values that fail the run.
pub const FAILING_SEVERITIES: [&str; 4] = ["info", "medium", "high", "critical"];

/// Converts scanner reports into task results.
#[derive(Debug, Clone)]
pub struct ReportTransformer {
    results_url: String,
}

impl Default for ReportTransformer {
    fn default() -> Self {
        Self::new(DEFAULT_RESULTS_URL)
    }
}

impl ReportTransformer {
    /// Creates a transformer linking results to `results_url`.
    pub fn new(results_url: impl Into<String>) -> Self {
        Self { results_url: results_url.into() }
    }

    /// Portal link attached to every result.
    pub fn results_url(&self) -> &str {
        &self.results_url
    }

    /// Reads and transforms a report file.
    ///
    /// # Errors
    ///
    /// Returns `TripwireError::ReportParse` if the file cannot be opened or
    /// contains malformed rows.
    pub fn transform_file(&self, path: &Path) -> Result<TaskResult> {
        let file = File::open(path).map_err(|e| {
            TripwireError::report_parse(format!("cannot open report {}: {e}", path.display()))
        })?;
        self.transform_reader(file)
    }

    /// Transforms a report from any reader.
    ///
    /// # Errors
    ///
    /// Returns `TripwireError::ReportParse` on CSV syntax errors, invalid
    /// UTF-8, or rows with too few columns.
    pub fn transform_reader<R: Read>(&self, reader: R) -> Result<TaskResult> {
        let mut csv_reader = ReaderBuilder::new().has_headers(false).flexible(true).from_reader(reader);

        let mut outcomes = Vec::new();
        let mut status = TaskStatus::Passed;
        let mut record = StringRecord::new();
        let mut header_seen = false;

        loop {
            let more = csv_reader
                .read_record(&mut record)
                .map_err(|e| TripwireError::report_parse(e.to_string()))?;
            if !more {
                break;
            }

            if !header_seen {
                header_seen = true;
                continue;
            }

            let line = record.position().map_or(0, csv::Position::line);
            let finding = ScanFinding::from_record(&record, line)?;

            if is_failing_severity(&finding.severity) {
                status = TaskStatus::Failed;
            }

            outcomes.push(TaskOutcome::from_finding(&finding, &self.results_url));
        }

        debug!(findings = outcomes.len(), status = %status, "Report transformed");

        Ok(TaskResult {
            status,
            message: summary_message(outcomes.len()),
            url: self.results_url.clone(),
            outcomes,
        })
    }
}

/// Returns whether a raw severity value fails the run.
pub fn is_failing_severity(raw: &str) -> bool {
    FAILING_SEVERITIES.contains(&raw)
}

/// Summary message for a number of findings.
pub fn summary_message(findings: usize) -> String {
    if findings == 0 {
        format!("{SCANNER_DISPLAY_NAME} scan complete, no secrets found!")
    } else {
        format!("{SCANNER_DISPLAY_NAME} scan complete, {findings} secrets found!")
    }
}
