//! Per-request scratch workspaces.
//!
//! Every request scans inside its own directory
//! `<root>/<stage>/<run id>-<random>` so concurrent runs of the same stage
//! never share files. The directory is removed when the workspace is dropped,
//! whichever way the request ends.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;
use tripwire_core::{RunId, Stage};

use crate::error::{Result, ScanError};

/// File the scanner writes its CSV report to.
pub const REPORT_FILE_NAME: &str = "scan.csv";

/// Downloaded configuration archive, removed after extraction.
pub const ARCHIVE_FILE_NAME: &str = "config.tar.gz";

/// Downloaded plan document.
pub const PLAN_FILE_NAME: &str = "plan.json";

/// Directory archives are extracted into.
pub const EXTRACT_DIR_NAME: &str = "pre_plan";

/// Isolated scratch directory for one request.
#[derive(Debug)]
pub struct ScratchWorkspace {
    dir: TempDir,
    stage: Stage,
}

impl ScratchWorkspace {
    /// Allocates a fresh workspace under `root` for a run.
    ///
    /// # Errors
    ///
    /// Returns `ScanError::Io` if the stage directory or workspace cannot be
    /// created.
    pub fn create(root: &Path, stage: Stage, run_id: &RunId) -> Result<Self> {
        let stage_root = root.join(stage.as_str());
        std::fs::create_dir_all(&stage_root)
            .map_err(|e| ScanError::io(format!("creating {}", stage_root.display()), &e))?;

        let prefix = format!("{}-", run_id.file_component());
        let dir = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(&stage_root)
            .map_err(|e| ScanError::io(format!("creating workspace in {}", stage_root.display()), &e))?;

        debug!(path = %dir.path().display(), stage = %stage, "Scratch workspace created");
        Ok(Self { dir, stage })
    }

    /// Root of the workspace.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Stage this workspace was created for.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Where the scanner report is written.
    pub fn report_path(&self) -> PathBuf {
        self.dir.path().join(REPORT_FILE_NAME)
    }

    /// Where the configuration archive is downloaded.
    pub fn archive_path(&self) -> PathBuf {
        self.dir.path().join(ARCHIVE_FILE_NAME)
    }

    /// Directory the configuration archive is extracted into.
    pub fn extract_dir(&self) -> PathBuf {
        self.dir.path().join(EXTRACT_DIR_NAME)
    }

    /// Where the plan document is written.
    pub fn plan_path(&self) -> PathBuf {
        self.dir.path().join(PLAN_FILE_NAME)
    }

    /// Removes the workspace now, reporting failures instead of ignoring them.
    ///
    /// # Errors
    ///
    /// Returns `ScanError::Io` if the directory could not be removed.
    pub fn close(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(|e| ScanError::io(format!("removing {}", path.display()), &e))
    }
}
