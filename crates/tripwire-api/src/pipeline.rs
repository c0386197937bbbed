//! Stage pipelines: fetch the artifact, scan it, transform the report.
//!
//! Each run gets its own [`ScratchWorkspace`]; it is removed when the run
//! finishes, whether the run succeeded or not.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};
use tripwire_core::{
    PostPlanTask, PrePlanTask, ReportTransformer, Result, Stage, TaskContext, TaskResult,
    TripwireError,
};
use tripwire_scan::{ArtifactFetcher, ScanMode, Scanner, ScratchWorkspace};

use crate::config::Config;

/// Executes the scan pipeline for pre-plan and post-plan runs.
#[derive(Debug, Clone)]
pub struct RunTaskPipeline {
    scratch_root: PathBuf,
    fetcher: ArtifactFetcher,
    scanner: Scanner,
    transformer: ReportTransformer,
}

impl RunTaskPipeline {
    /// Creates a pipeline from its components.
    pub fn new(
        scratch_root: impl Into<PathBuf>,
        fetcher: ArtifactFetcher,
        scanner: Scanner,
        transformer: ReportTransformer,
    ) -> Self {
        Self { scratch_root: scratch_root.into(), fetcher, scanner, transformer }
    }

    /// Builds the pipeline described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `TripwireError::Configuration` if the HTTP client cannot be
    /// built.
    pub fn from_config(config: &Config) -> Result<Self> {
        let fetcher = ArtifactFetcher::new(config.to_fetcher_config())?;
        Ok(Self::new(
            config.scratch_dir.clone(),
            fetcher,
            Scanner::new(config.to_scanner_config()),
            ReportTransformer::new(config.results_url.clone()),
        ))
    }

    /// Root directory holding per-stage workspaces.
    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    /// Portal link attached to results.
    pub fn results_url(&self) -> &str {
        self.transformer.results_url()
    }

    /// Downloads the configuration archive, scans the extracted tree and
    /// returns the verdict.
    ///
    /// # Errors
    ///
    /// Returns the pipeline error of the first phase that failed.
    #[instrument(
        name = "pre_plan_pipeline",
        skip_all,
        fields(run_id = %task.context.run_id, organization = %task.context.organization_name)
    )]
    pub async fn run_pre_plan(&self, task: &PrePlanTask) -> Result<TaskResult> {
        let workspace = self.open_workspace(Stage::PrePlan, &task.context)?;

        info!("Downloading configuration version");
        let target = self
            .fetcher
            .download_configuration(
                &task.configuration_version_download_url,
                &task.context.access_token,
                &workspace,
            )
            .await?;

        let result = self.scan_and_transform(&workspace, ScanMode::Folder, &target).await?;
        finish(workspace);
        Ok(result)
    }

    /// Downloads the plan document, scans it and returns the verdict.
    ///
    /// # Errors
    ///
    /// Returns the pipeline error of the first phase that failed.
    #[instrument(
        name = "post_plan_pipeline",
        skip_all,
        fields(run_id = %task.context.run_id, organization = %task.context.organization_name)
    )]
    pub async fn run_post_plan(&self, task: &PostPlanTask) -> Result<TaskResult> {
        let workspace = self.open_workspace(Stage::PostPlan, &task.context)?;

        info!("Downloading plan document");
        let target = self
            .fetcher
            .download_plan(&task.plan_json_api_url, &task.context.access_token, &workspace)
            .await?;

        let result = self.scan_and_transform(&workspace, ScanMode::File, &target).await?;
        finish(workspace);
        Ok(result)
    }

    fn open_workspace(&self, stage: Stage, context: &TaskContext) -> Result<ScratchWorkspace> {
        let workspace = ScratchWorkspace::create(&self.scratch_root, stage, &context.run_id)?;
        debug!(
            workspace = %workspace.path().display(),
            platform_workspace = %context.workspace,
            "Workspace ready"
        );
        Ok(workspace)
    }

    async fn scan_and_transform(
        &self,
        workspace: &ScratchWorkspace,
        mode: ScanMode,
        target: &Path,
    ) -> Result<TaskResult> {
        info!(mode = %mode, "Running scanner");
        let report = self.scanner.scan(mode, target, &workspace.report_path()).await?;

        info!("Transforming scanner report");
        let transformer = self.transformer.clone();
        let result = tokio::task::spawn_blocking(move || transformer.transform_file(&report.path))
            .await
            .map_err(|e| TripwireError::report_parse(format!("transform task failed: {e}")))??;

        info!(
            status = %result.status,
            findings = result.outcomes.len(),
            "Scan result ready"
        );
        Ok(result)
    }
}

fn finish(workspace: ScratchWorkspace) {
    if let Err(e) = workspace.close() {
        warn!(error = %e, "Failed to remove scratch workspace");
    }
}
