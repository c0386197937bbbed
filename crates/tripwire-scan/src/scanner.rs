//! Scanner process invocation.
//!
//! Runs the external secret scanner as a child process:
//!
//! ```text
//! <program> [wrapper args...] scan <folder|file> --outfile <report> --path <target>
//! ```
//!
//! The child inherits the service environment, which is how scanner
//! credentials reach it. It is killed if it outlives its timeout or if the
//! awaiting request is dropped.

use std::{
    fmt,
    path::{Path, PathBuf},
    process::Stdio,
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, ScanError};

/// Trailing stderr kept when the scanner fails.
const STDERR_EXCERPT_CHARS: usize = 1024;

/// Scanner process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Executable to run.
    pub program: String,
    /// Arguments placed before `scan`, for running the scanner through an
    /// interpreter or wrapper.
    pub wrapper_args: Vec<String>,
    /// Wall-clock budget for one scan.
    pub timeout: Duration,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            program: "vault-radar".to_string(),
            wrapper_args: Vec::new(),
            timeout: Duration::from_secs(600),
        }
    }
}

/// What the scanner is pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// A directory tree (extracted configuration).
    Folder,
    /// A single file (plan document).
    File,
}

impl ScanMode {
    /// Subcommand argument for this mode.
    pub const fn as_arg(self) -> &'static str {
        match self {
            Self::Folder => "folder",
            Self::File => "file",
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_arg())
    }
}

/// Completed scan.
#[derive(Debug, Clone)]
pub struct ScanReport {
    /// CSV report written by the scanner.
    pub path: PathBuf,
    /// How long the scanner ran.
    pub duration: Duration,
}

/// Invokes the external scanner.
#[derive(Debug, Clone)]
pub struct Scanner {
    config: ScannerConfig,
}

impl Scanner {
    /// Creates a scanner with the given configuration.
    pub fn new(config: ScannerConfig) -> Self {
        Self { config }
    }

    /// Scanner configuration.
    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Builds the argument list for one scan.
    pub fn arguments(&self, mode: ScanMode, target: &Path, outfile: &Path) -> Vec<String> {
        let mut args = self.config.wrapper_args.clone();
        args.extend([
            "scan".to_string(),
            mode.as_arg().to_string(),
            "--outfile".to_string(),
            outfile.display().to_string(),
            "--path".to_string(),
            target.display().to_string(),
        ]);
        args
    }

    /// Scans `target` and waits for the report at `outfile`.
    ///
    /// # Errors
    ///
    /// - `ScanError::Spawn` if the program cannot be started
    /// - `ScanError::ScannerExit` on a non-zero exit, with a stderr excerpt
    /// - `ScanError::MissingReport` if the scanner exits cleanly without
    ///   writing the report
    /// - `ScanError::ScannerTimeout` if the timeout elapses; the child is
    ///   killed
    #[instrument(
        name = "scanner",
        skip(self),
        fields(program = %self.config.program, mode = %mode, target = %target.display())
    )]
    pub async fn scan(&self, mode: ScanMode, target: &Path, outfile: &Path) -> Result<ScanReport> {
        let start_time = Instant::now();
        let args = self.arguments(mode, target, outfile);
        debug!(?args, "Starting scanner");

        let child = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ScanError::Spawn {
                program: self.config.program.clone(),
                message: e.to_string(),
            })?;

        // Dropping the output future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.config.timeout, child.wait_with_output()).await
        {
            Ok(result) => result.map_err(|e| ScanError::Spawn {
                program: self.config.program.clone(),
                message: format!("waiting for scanner: {e}"),
            })?,
            Err(_) => {
                warn!(timeout_secs = self.config.timeout.as_secs(), "Scanner timed out, killed");
                return Err(ScanError::ScannerTimeout {
                    timeout_seconds: self.config.timeout.as_secs(),
                });
            },
        };

        let duration = start_time.elapsed();

        if !output.status.success() {
            let stderr = tail(&String::from_utf8_lossy(&output.stderr), STDERR_EXCERPT_CHARS);
            warn!(status = %output.status, duration_ms = duration.as_millis(), "Scanner failed");
            return Err(ScanError::ScannerExit { status: output.status.to_string(), stderr });
        }

        if !tokio::fs::try_exists(outfile).await.unwrap_or(false) {
            warn!(outfile = %outfile.display(), "Scanner exited without writing a report");
            return Err(ScanError::MissingReport { path: outfile.display().to_string() });
        }

        info!(duration_ms = duration.as_millis(), "Scan complete");
        Ok(ScanReport { path: outfile.to_path_buf(), duration })
    }
}

/// Last `max_chars` characters of `text`, trimmed.
fn tail(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    let count = trimmed.chars().count();
    if count <= max_chars {
        trimmed.to_string()
    } else {
        trimmed.chars().skip(count - max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_follow_scanner_cli() {
        let scanner = Scanner::new(ScannerConfig::default());
        let args =
            scanner.arguments(ScanMode::Folder, Path::new("/w/pre_plan"), Path::new("/w/scan.csv"));
        assert_eq!(args, vec![
            "scan",
            "folder",
            "--outfile",
            "/w/scan.csv",
            "--path",
            "/w/pre_plan"
        ]);
    }

    #[test]
    fn wrapper_args_come_first() {
        let scanner = Scanner::new(ScannerConfig {
            program: "/bin/sh".into(),
            wrapper_args: vec!["/opt/fake-scanner.sh".into()],
            timeout: Duration::from_secs(1),
        });
        let args =
            scanner.arguments(ScanMode::File, Path::new("/w/plan.json"), Path::new("/w/scan.csv"));
        assert_eq!(args[0], "/opt/fake-scanner.sh");
        assert_eq!(args[1], "scan");
        assert_eq!(args[2], "file");
    }

    #[test]
    fn tail_keeps_end_of_output() {
        assert_eq!(tail("  short \n", 10), "short");
        assert_eq!(tail("0123456789", 4), "6789");
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let scanner = Scanner::new(ScannerConfig {
            program: "/nonexistent/tripwire-scanner".into(),
            wrapper_args: Vec::new(),
            timeout: Duration::from_secs(5),
        });
        let dir = tempfile::tempdir().unwrap();

        let err = scanner
            .scan(ScanMode::Folder, dir.path(), &dir.path().join("scan.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Spawn { .. }), "got {err}");
    }
}
