//! Artifact retrieval from the platform API.
//!
//! Downloads the configuration version archive (pre-plan) or the JSON plan
//! document (post-plan) with the run's bearer token and materializes it in
//! the request's scratch workspace, ready for the scanner.

use std::{
    fs::File,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use bytes::Bytes;
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn, Instrument};
use tripwire_core::AccessToken;

use crate::{
    error::{Result, ScanError},
    workspace::{ScratchWorkspace, REPORT_FILE_NAME},
};

/// Media type the platform API expects on every request.
pub const JSON_API_CONTENT_TYPE: &str = "application/vnd.api+json";

/// Longest response body excerpt kept in error messages.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Configuration for the artifact fetcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Timeout for a whole download.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(60), user_agent: "Tripwire-Run-Task/1.0".to_string() }
    }
}

/// Downloads run artifacts into scratch workspaces.
///
/// Holds one pooled HTTP client shared by all requests.
#[derive(Debug, Clone)]
pub struct ArtifactFetcher {
    client: reqwest::Client,
    config: FetcherConfig,
}

impl ArtifactFetcher {
    /// Creates a fetcher with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `ScanError::Configuration` if the HTTP client cannot be built.
    pub fn new(config: FetcherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| ScanError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Creates a fetcher with default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(FetcherConfig::default())
    }

    /// Downloads and unpacks the configuration version archive.
    ///
    /// The archive is written to the workspace, extracted into its extract
    /// directory and then deleted. Returns the extract directory.
    ///
    /// # Errors
    ///
    /// Returns fetch errors for network or HTTP failures,
    /// `ScanError::InvalidArtifact` for a corrupt archive, and
    /// `ScanError::Io` for filesystem failures.
    pub async fn download_configuration(
        &self,
        url: &str,
        token: &AccessToken,
        workspace: &ScratchWorkspace,
    ) -> Result<PathBuf> {
        let span = info_span!("download_configuration", url = %display_url(url));

        async move {
            let body = self.get(url, token).await?;

            let archive = workspace.archive_path();
            tokio::fs::write(&archive, &body)
                .await
                .map_err(|e| ScanError::io(format!("writing {}", archive.display()), &e))?;

            let destination = workspace.extract_dir();
            let (archive, destination) = tokio::task::spawn_blocking(move || {
                extract_archive(&archive, &destination).map(|()| (archive, destination))
            })
            .await
            .map_err(|e| ScanError::Io { message: format!("extraction task failed: {e}") })??;

            tokio::fs::remove_file(&archive)
                .await
                .map_err(|e| ScanError::io(format!("removing {}", archive.display()), &e))?;
            remove_stale_report(&destination.join(REPORT_FILE_NAME)).await?;

            info!(bytes = body.len(), path = %destination.display(), "Configuration archive extracted");
            Ok(destination)
        }
        .instrument(span)
        .await
    }

    /// Downloads the plan document and writes it pretty-printed.
    ///
    /// Returns the path of the written `plan.json`.
    ///
    /// # Errors
    ///
    /// Returns fetch errors for network or HTTP failures,
    /// `ScanError::InvalidArtifact` if the body is not JSON, and
    /// `ScanError::Io` for filesystem failures.
    pub async fn download_plan(
        &self,
        url: &str,
        token: &AccessToken,
        workspace: &ScratchWorkspace,
    ) -> Result<PathBuf> {
        let span = info_span!("download_plan", url = %display_url(url));

        async move {
            let body = self.get(url, token).await?;

            let plan: serde_json::Value = serde_json::from_slice(&body)
                .map_err(|e| ScanError::invalid_artifact(format!("plan is not valid JSON: {e}")))?;
            let pretty = serde_json::to_string_pretty(&plan)
                .map_err(|e| ScanError::invalid_artifact(format!("cannot re-encode plan: {e}")))?;

            let path = workspace.plan_path();
            tokio::fs::write(&path, pretty)
                .await
                .map_err(|e| ScanError::io(format!("writing {}", path.display()), &e))?;

            info!(bytes = body.len(), path = %path.display(), "Plan document written");
            Ok(path)
        }
        .instrument(span)
        .await
    }

    /// Performs an authenticated GET and returns the body of a 2xx response.
    async fn get(&self, url: &str, token: &AccessToken) -> Result<Bytes> {
        let start_time = Instant::now();
        debug!("Starting artifact download");

        let response = self
            .client
            .get(url)
            .bearer_auth(token.expose())
            .header(reqwest::header::CONTENT_TYPE, JSON_API_CONTENT_TYPE)
            .send()
            .await
            .map_err(|e| self.request_error(url, &e))?;

        let status = response.status();
        debug!(status = status.as_u16(), duration_ms = start_time.elapsed().as_millis(), "Received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Artifact download rejected");
            return Err(ScanError::UnexpectedStatus {
                url: display_url(url).to_string(),
                status_code: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY_CHARS),
            });
        }

        response.bytes().await.map_err(|e| self.request_error(url, &e))
    }

    fn request_error(&self, url: &str, err: &reqwest::Error) -> ScanError {
        warn!("Artifact request failed: {}", err);
        if err.is_timeout() {
            ScanError::FetchTimeout {
                url: display_url(url).to_string(),
                timeout_seconds: self.config.timeout.as_secs(),
            }
        } else {
            ScanError::Network { url: display_url(url).to_string(), message: err.to_string() }
        }
    }
}

/// Unpacks a gzipped tarball into `destination`.
///
/// Entries whose paths would land outside `destination` are skipped.
fn extract_archive(archive: &Path, destination: &Path) -> Result<()> {
    std::fs::create_dir_all(destination)
        .map_err(|e| ScanError::io(format!("creating {}", destination.display()), &e))?;

    let file = File::open(archive)
        .map_err(|e| ScanError::io(format!("opening {}", archive.display()), &e))?;
    let mut tarball = tar::Archive::new(GzDecoder::new(file));

    let entries = tarball
        .entries()
        .map_err(|e| ScanError::invalid_artifact(format!("unreadable archive: {e}")))?;

    let mut unpacked = 0usize;
    for entry in entries {
        let mut entry =
            entry.map_err(|e| ScanError::invalid_artifact(format!("corrupt archive entry: {e}")))?;
        let entry_path = entry.path().map(|p| p.display().to_string()).unwrap_or_default();

        let inside = entry.unpack_in(destination).map_err(|e| {
            ScanError::invalid_artifact(format!("cannot unpack `{entry_path}`: {e}"))
        })?;
        if inside {
            unpacked += 1;
        } else {
            warn!(entry = %entry_path, "Skipped archive entry outside extraction directory");
        }
    }

    debug!(entries = unpacked, "Archive unpacked");
    Ok(())
}

/// Deletes a report shipped inside the configuration so it is never scanned
/// as part of the configuration or mistaken for fresh output.
async fn remove_stale_report(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Removed stale report");
            Ok(())
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ScanError::io(format!("removing {}", path.display()), &e)),
    }
}

/// URL without its query string, for logs and error messages.
///
/// Download URLs can carry signed query parameters.
pub fn display_url(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max_chars).collect();
        format!("{kept}... (truncated)")
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::{write::GzEncoder, Compression};

    use super::*;

    fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, contents.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn extracts_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("config.tar.gz");
        std::fs::write(&archive, tarball(&[("main.tf", "a = 1"), ("modules/vpc/vpc.tf", "b = 2")]))
            .unwrap();

        let destination = dir.path().join("out");
        extract_archive(&archive, &destination).unwrap();

        assert_eq!(std::fs::read_to_string(destination.join("main.tf")).unwrap(), "a = 1");
        assert_eq!(
            std::fs::read_to_string(destination.join("modules/vpc/vpc.tf")).unwrap(),
            "b = 2"
        );
    }

    #[test]
    fn corrupt_archive_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("config.tar.gz");
        let mut file = File::create(&archive).unwrap();
        file.write_all(b"definitely not gzip").unwrap();

        let err = extract_archive(&archive, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, ScanError::InvalidArtifact { .. }), "got {err}");
    }

    #[test]
    fn query_string_hidden_from_logs() {
        assert_eq!(
            display_url("https://archivist.example.com/v1/object/abc?sig=secret"),
            "https://archivist.example.com/v1/object/abc"
        );
        assert_eq!(display_url("https://example.com/plan"), "https://example.com/plan");
    }

    #[test]
    fn long_bodies_truncated() {
        let text = "x".repeat(600);
        let truncated = truncate(&text, 512);
        assert!(truncated.ends_with("... (truncated)"));
        assert_eq!(truncate("short", 512), "short");
    }
}
