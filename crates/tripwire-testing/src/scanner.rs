//! Scripted stand-in for the scanner executable.
//!
//! The script is run through `/bin/sh` and follows the scanner's command
//! line: `scan <folder|file> --outfile <csv> --path <target>`. Every call is
//! appended to a log so tests can assert how (and whether) it ran.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use tempfile::TempDir;

/// Shell used to run the script.
pub const SHELL: &str = "/bin/sh";

/// What the fake scanner does when invoked.
#[derive(Debug, Clone)]
pub enum ScannerBehavior {
    /// Writes the given CSV report and exits 0.
    Report(String),
    /// Writes `stderr` and exits with `code` without a report.
    Fail {
        /// Exit status
        code: i32,
        /// Text written to standard error
        stderr: String,
    },
    /// Exits 0 without writing a report.
    NoReport,
    /// Sleeps far longer than any test timeout.
    Hang,
}

/// A scanner script living in its own temporary directory.
#[derive(Debug)]
pub struct FakeScanner {
    dir: TempDir,
}

impl FakeScanner {
    /// Writes a script implementing `behavior`.
    ///
    /// # Errors
    ///
    /// Fails if the script or its fixture report cannot be written.
    pub fn new(behavior: &ScannerBehavior) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("fake-scanner-").tempdir()?;
        let scanner = Self { dir };

        let action = match behavior {
            ScannerBehavior::Report(csv) => {
                let fixture = scanner.dir.path().join("report.csv");
                fs::write(&fixture, csv).context("writing fixture report")?;
                format!("cp '{}' \"$4\"", fixture.display())
            },
            ScannerBehavior::Fail { code, stderr } => {
                format!("echo '{}' >&2\nexit {code}", stderr.replace('\'', ""))
            },
            ScannerBehavior::NoReport => "exit 0".to_string(),
            ScannerBehavior::Hang => "sleep 30".to_string(),
        };

        let script = format!(
            "#!/bin/sh\n\
             echo \"$@\" >> '{log}'\n\
             if [ -d \"$6\" ]; then (cd \"$6\" && find . -type f | sort) >> '{seen}'; else cat \"$6\" >> '{seen}'; fi\n\
             {action}\n",
            log = scanner.invocation_log().display(),
            seen = scanner.seen_log().display(),
        );
        fs::write(scanner.script_path(), script).context("writing scanner script")?;

        Ok(scanner)
    }

    /// Path of the script, passed as the first wrapper argument.
    pub fn script_path(&self) -> PathBuf {
        self.dir.path().join("vault-radar.sh")
    }

    /// Program and wrapper arguments to configure the service with.
    pub fn command(&self) -> (String, Vec<String>) {
        (SHELL.to_string(), vec![self.script_path().display().to_string()])
    }

    /// Argument lines of every invocation so far.
    pub fn invocations(&self) -> Vec<String> {
        read_lines(&self.invocation_log())
    }

    /// What the scanner found at its `--path` target: the sorted file list
    /// of a directory, or the contents of a file.
    pub fn seen(&self) -> String {
        fs::read_to_string(self.seen_log()).unwrap_or_default()
    }

    fn invocation_log(&self) -> PathBuf {
        self.dir.path().join("invocations.log")
    }

    fn seen_log(&self) -> PathBuf {
        self.dir.path().join("seen.log")
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .map(|text| text.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn script_writes_report_and_logs_arguments() {
        let scanner = FakeScanner::new(&ScannerBehavior::Report("a,b\n".into())).unwrap();
        let work = tempfile::tempdir().unwrap();
        let target = work.path().join("plan.json");
        let outfile = work.path().join("scan.csv");
        fs::write(&target, "{}").unwrap();

        let (program, wrapper) = scanner.command();
        let status = tokio::process::Command::new(program)
            .args(wrapper)
            .args(["scan", "file", "--outfile"])
            .arg(&outfile)
            .arg("--path")
            .arg(&target)
            .status()
            .await
            .unwrap();

        assert!(status.success());
        assert_eq!(fs::read_to_string(&outfile).unwrap(), "a,b\n");
        assert_eq!(scanner.invocations().len(), 1);
        assert!(scanner.invocations()[0].starts_with("scan file --outfile"));
        assert_eq!(scanner.seen(), "{}");
    }

    #[test]
    fn no_invocations_before_first_run() {
        let scanner = FakeScanner::new(&ScannerBehavior::NoReport).unwrap();
        assert!(scanner.invocations().is_empty());
        assert!(scanner.seen().is_empty());
    }
}
