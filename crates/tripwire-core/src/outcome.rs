//! Task result types in the platform's JSON:API callback shape.
//!
//! A [`TaskResult`] is the verdict for one run; [`TaskResultsPayload`] is the
//! envelope PATCHed to the callback URL.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{findings::ScanFinding, severity::AlertLevel};

/// Prefix for outcome identifiers, followed by the finding's value hash.
pub const OUTCOME_ID_PREFIX: &str = "vault-radar";

/// JSON:API resource type of a single outcome.
pub const OUTCOME_RESOURCE_TYPE: &str = "task-result-outcomes";

/// JSON:API resource type of the callback envelope.
pub const RESULTS_RESOURCE_TYPE: &str = "task-results";

/// Overall verdict reported to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// No blocking findings
    Passed,
    /// At least one blocking finding, or the scan could not complete
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => f.write_str("passed"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// A single outcome tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Tag text
    pub label: String,
    /// Alert level; free-form tags carry none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<AlertLevel>,
}

impl Tag {
    /// Creates a tag with an alert level.
    pub fn leveled(label: impl Into<String>, level: AlertLevel) -> Self {
        Self { label: label.into(), level: Some(level) }
    }

    /// Creates a free-form tag.
    pub fn plain(label: impl Into<String>) -> Self {
        Self { label: label.into(), level: None }
    }
}

/// Tag groups attached to an outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeTags {
    /// Activeness of the secret, leveled by severity
    pub status: Vec<Tag>,
    /// Classified severity
    pub severity: Vec<Tag>,
    /// Scanner tags
    pub tags: Vec<Tag>,
}

/// Attributes of a single outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeAttributes {
    /// Stable identifier derived from the value hash
    #[serde(rename = "outcome-id")]
    pub outcome_id: String,
    /// One-line summary
    pub description: String,
    /// Tag groups
    pub tags: OutcomeTags,
    /// Markdown details
    pub body: String,
    /// Link to the scanner portal
    pub url: String,
}

/// One finding rendered as a platform outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutcome {
    /// Always [`OUTCOME_RESOURCE_TYPE`]
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Outcome attributes
    pub attributes: OutcomeAttributes,
}

impl TaskOutcome {
    /// Builds the outcome for a finding.
    pub fn from_finding(finding: &ScanFinding, results_url: &str) -> Self {
        let classification = crate::severity::classify(&finding.severity);

        Self {
            resource_type: OUTCOME_RESOURCE_TYPE.to_string(),
            attributes: OutcomeAttributes {
                outcome_id: format!("{OUTCOME_ID_PREFIX}-{}", finding.value_hash),
                description: format!("{} type secret found", finding.description),
                tags: OutcomeTags {
                    status: vec![Tag::leveled(&finding.activeness, classification.level)],
                    severity: vec![Tag::leveled(classification.label, classification.level)],
                    tags: finding.tag_list().map(Tag::plain).collect(),
                },
                body: finding.markdown_body(),
                url: results_url.to_string(),
            },
        }
    }
}

/// Verdict and outcomes for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Overall verdict
    pub status: TaskStatus,
    /// Summary shown in the platform UI
    pub message: String,
    /// Link to the scanner portal
    pub url: String,
    /// One outcome per finding, in report order
    pub outcomes: Vec<TaskOutcome>,
}

impl TaskResult {
    /// Result reported when the pipeline itself failed.
    pub fn pipeline_failure(message: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Failed,
            message: message.into(),
            url: url.into(),
            outcomes: Vec::new(),
        }
    }

    /// Wraps the result in the callback envelope.
    pub fn to_payload(&self) -> TaskResultsPayload {
        TaskResultsPayload {
            data: ResultsData {
                resource_type: RESULTS_RESOURCE_TYPE.to_string(),
                attributes: ResultsAttributes {
                    status: self.status,
                    message: self.message.clone(),
                    url: self.url.clone(),
                },
                relationships: ResultsRelationships {
                    outcomes: OutcomeList { data: self.outcomes.clone() },
                },
            },
        }
    }
}

/// Callback request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResultsPayload {
    /// JSON:API primary data
    pub data: ResultsData,
}

/// Primary data of the callback envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultsData {
    /// Always [`RESULTS_RESOURCE_TYPE`]
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Verdict attributes
    pub attributes: ResultsAttributes,
    /// Embedded outcomes
    pub relationships: ResultsRelationships,
}

/// Verdict attributes of the callback envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultsAttributes {
    /// Overall verdict
    pub status: TaskStatus,
    /// Summary message
    pub message: String,
    /// Link to the scanner portal
    pub url: String,
}

/// Relationships block of the callback envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultsRelationships {
    /// Outcome list
    pub outcomes: OutcomeList,
}

/// Outcome list wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeList {
    /// Outcomes in report order
    pub data: Vec<TaskOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding() -> ScanFinding {
        ScanFinding {
            category: "cloud".into(),
            description: "GitHub token".into(),
            created_at: "2024-03-04".into(),
            author: "ops@example.com".into(),
            severity: "Critical".into(),
            deep_link: "https://example.com/link".into(),
            path: "variables.tf".into(),
            value_hash: "h4sh".into(),
            fingerprint: "fp".into(),
            textual_context: "token = ****".into(),
            activeness: "inactive".into(),
            tags: "github".into(),
        }
    }

    #[test]
    fn outcome_built_from_finding() {
        let outcome = TaskOutcome::from_finding(&finding(), "https://portal.example.com");

        assert_eq!(outcome.resource_type, "task-result-outcomes");
        assert_eq!(outcome.attributes.outcome_id, "vault-radar-h4sh");
        assert_eq!(outcome.attributes.description, "GitHub token type secret found");
        assert_eq!(outcome.attributes.tags.status, vec![Tag::leveled(
            "inactive",
            AlertLevel::Error
        )]);
        assert_eq!(outcome.attributes.tags.severity, vec![Tag::leveled(
            "Critical",
            AlertLevel::Error
        )]);
        assert_eq!(outcome.attributes.tags.tags, vec![Tag::plain("github")]);
        assert_eq!(outcome.attributes.url, "https://portal.example.com");
    }

    #[test]
    fn free_form_tags_omit_level() {
        let json = serde_json::to_value(Tag::plain("api-key")).unwrap();
        assert_eq!(json, serde_json::json!({"label": "api-key"}));
    }

    #[test]
    fn callback_envelope_shape() {
        let result = TaskResult {
            status: TaskStatus::Passed,
            message: "HashiCorp Vault Radar scan complete, no secrets found!".into(),
            url: "https://portal.example.com".into(),
            outcomes: Vec::new(),
        };

        insta::assert_json_snapshot!(result.to_payload(), @r#"
        {
          "data": {
            "type": "task-results",
            "attributes": {
              "status": "passed",
              "message": "HashiCorp Vault Radar scan complete, no secrets found!",
              "url": "https://portal.example.com"
            },
            "relationships": {
              "outcomes": {
                "data": []
              }
            }
          }
        }
        "#);
    }

    #[test]
    fn pipeline_failure_has_no_outcomes() {
        let result = TaskResult::pipeline_failure("scanner crashed", "https://portal.example.com");
        assert_eq!(result.status, TaskStatus::Failed);
        assert!(result.outcomes.is_empty());
        assert_eq!(result.to_payload().data.attributes.message, "scanner crashed");
    }
}
