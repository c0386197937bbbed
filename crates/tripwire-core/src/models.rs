//! Run-task request models and strongly-typed identifiers.
//!
//! Defines the raw webhook payload sent by the platform, the validated
//! [`TaskRequest`] union the router dispatches on, and newtype wrappers that
//! keep credentials out of logs and run identifiers safe for file names.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TripwireError};

/// Access token the platform sends when verifying a newly registered run task.
///
/// Requests carrying this token are acknowledged without side effects.
pub const PROBE_ACCESS_TOKEN: &str = "test-token";

/// Opaque bearer credential issued by the platform for a single run.
///
/// Never printed: both `Debug` and `Display` redact the value.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wraps a raw token value.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token for use in an `Authorization` header.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns true for the platform's registration probe token.
    pub fn is_probe(&self) -> bool {
        self.0 == PROBE_ACCESS_TOKEN
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Platform run identifier (e.g. `run-XXXXXXXX`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Wraps a run identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as received.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a version of the identifier usable as a single path component.
    ///
    /// Anything outside `[A-Za-z0-9_-]` becomes `_`, and the result is capped
    /// at 64 characters.
    pub fn file_component(&self) -> String {
        let sanitized: String = self
            .0
            .chars()
            .take(64)
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();

        if sanitized.is_empty() {
            "run".to_string()
        } else {
            sanitized
        }
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Point in the run lifecycle at which the platform invoked the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Before planning: the configuration version archive is scanned.
    PrePlan,
    /// After planning: the JSON plan document is scanned.
    PostPlan,
}

impl Stage {
    /// Wire name of the stage, also used as the scratch subdirectory.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PrePlan => "pre_plan",
            Self::PostPlan => "post_plan",
        }
    }

    /// Plain-text body returned to the platform after a completed run.
    pub const fn completion_message(self) -> &'static str {
        match self {
            Self::PrePlan => "pre plan run task passed",
            Self::PostPlan => "post plan run task passed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = TripwireError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pre_plan" => Ok(Self::PrePlan),
            "post_plan" => Ok(Self::PostPlan),
            other => Err(TripwireError::UnknownStage { stage: other.to_string() }),
        }
    }
}

/// Raw run-task request body as sent by the platform.
///
/// Every field is optional here; [`TaskRequest::try_from`] decides which are
/// required for the declared stage. Fields the service does not use
/// (`payload_version`, `run_message`, VCS metadata, ...) are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunTaskPayload {
    /// Run-scoped bearer token for platform API calls
    pub access_token: Option<AccessToken>,
    /// Declared stage (`pre_plan` or `post_plan`)
    pub stage: Option<String>,
    /// Organization owning the workspace
    pub organization_name: Option<String>,
    /// Workspace name (sent on all stages)
    pub workspace_name: Option<String>,
    /// Workspace identifier (sent on all stages)
    pub workspace_id: Option<String>,
    /// Run identifier
    pub run_id: Option<RunId>,
    /// URL the task result must be PATCHed to
    pub task_result_callback_url: Option<String>,
    /// Configuration version archive URL (pre_plan)
    pub configuration_version_download_url: Option<String>,
    /// Plan JSON document URL (post_plan)
    pub plan_json_api_url: Option<String>,
}

impl RunTaskPayload {
    /// Parses a request body.
    ///
    /// # Errors
    ///
    /// Returns `TripwireError::InvalidPayload` if the body is not a JSON
    /// object matching the payload shape.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body)
            .map_err(|e| TripwireError::invalid_payload(format!("malformed JSON body: {e}")))
    }
}

/// Workspace reference as reported by the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceRef {
    /// Workspace name, when sent
    pub name: Option<String>,
    /// Workspace identifier, when sent
    pub id: Option<String>,
}

impl fmt::Display for WorkspaceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, &self.id) {
            (Some(name), _) => f.write_str(name),
            (None, Some(id)) => f.write_str(id),
            (None, None) => f.write_str("<unknown>"),
        }
    }
}

/// Fields shared by every stage of a non-probe request.
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// Bearer token for artifact downloads and the callback
    pub access_token: AccessToken,
    /// Organization owning the workspace
    pub organization_name: String,
    /// Workspace the run belongs to
    pub workspace: WorkspaceRef,
    /// Run identifier
    pub run_id: RunId,
    /// Where the task result is delivered
    pub callback_url: String,
}

/// Pre-plan work item: scan the configuration version archive.
#[derive(Debug, Clone)]
pub struct PrePlanTask {
    /// Common request fields
    pub context: TaskContext,
    /// Authenticated URL of the `.tar.gz` configuration archive
    pub configuration_version_download_url: String,
}

/// Post-plan work item: scan the JSON plan document.
#[derive(Debug, Clone)]
pub struct PostPlanTask {
    /// Common request fields
    pub context: TaskContext,
    /// Authenticated URL of the JSON plan
    pub plan_json_api_url: String,
}

/// Validated run-task request.
#[derive(Debug, Clone)]
pub enum TaskRequest {
    /// Registration probe carrying [`PROBE_ACCESS_TOKEN`]; acknowledged only.
    Probe,
    /// Pre-plan scan of the configuration archive
    PrePlan(PrePlanTask),
    /// Post-plan scan of the plan document
    PostPlan(PostPlanTask),
}

impl TaskRequest {
    /// Returns the stage for non-probe requests.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Probe => None,
            Self::PrePlan(_) => Some(Stage::PrePlan),
            Self::PostPlan(_) => Some(Stage::PostPlan),
        }
    }

    /// Returns the shared context for non-probe requests.
    pub fn context(&self) -> Option<&TaskContext> {
        match self {
            Self::Probe => None,
            Self::PrePlan(task) => Some(&task.context),
            Self::PostPlan(task) => Some(&task.context),
        }
    }
}

impl TryFrom<RunTaskPayload> for TaskRequest {
    type Error = TripwireError;

    fn try_from(payload: RunTaskPayload) -> Result<Self> {
        let access_token = required(payload.access_token, "access_token")?;

        // Probes are checked before the stage so registration never fails
        // on placeholder data.
        if access_token.is_probe() {
            return Ok(Self::Probe);
        }

        let stage: Stage = required(payload.stage, "stage")?.parse()?;

        let context = TaskContext {
            access_token,
            organization_name: required_text(payload.organization_name, "organization_name")?,
            workspace: WorkspaceRef { name: payload.workspace_name, id: payload.workspace_id },
            run_id: required(payload.run_id, "run_id")?,
            callback_url: required_text(
                payload.task_result_callback_url,
                "task_result_callback_url",
            )?,
        };

        match stage {
            Stage::PrePlan => Ok(Self::PrePlan(PrePlanTask {
                context,
                configuration_version_download_url: required_text(
                    payload.configuration_version_download_url,
                    "configuration_version_download_url",
                )?,
            })),
            Stage::PostPlan => Ok(Self::PostPlan(PostPlanTask {
                context,
                plan_json_api_url: required_text(payload.plan_json_api_url, "plan_json_api_url")?,
            })),
        }
    }
}

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| TripwireError::invalid_payload(format!("missing field `{field}`")))
}

fn required_text(value: Option<String>, field: &str) -> Result<String> {
    match value {
        Some(text) if !text.trim().is_empty() => Ok(text),
        Some(_) => Err(TripwireError::invalid_payload(format!("field `{field}` is empty"))),
        None => Err(TripwireError::invalid_payload(format!("missing field `{field}`"))),
    }
}
