//! Severity classification for scanner findings.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Alert level understood by the platform's outcome tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    /// Informational
    Info,
    /// Should be reviewed
    Warning,
    /// Must be fixed
    Error,
    /// Unrecognized severity
    None,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::None => "none",
        };
        f.write_str(s)
    }
}

/// Display label and alert level derived from a severity string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityClassification {
    /// Human-readable severity label
    pub label: String,
    /// Alert level for the platform UI
    pub level: AlertLevel,
}

/// Classifies a raw severity value.
///
/// Matching is case-insensitive. Unknown values keep their (lowercased) text
/// as the label and map to [`AlertLevel::None`].
///
/// # Example
///
/// ```
/// use tripwire_core::severity::{classify, AlertLevel};
///
/// let classification = classify("HIGH");
/// assert_eq!(classification.label, "High");
/// assert_eq!(classification.level, AlertLevel::Error);
/// ```
pub fn classify(severity: &str) -> SeverityClassification {
    let severity = severity.to_lowercase();
    let (label, level) = match severity.as_str() {
        "low" => ("Low", AlertLevel::Info),
        "medium" => ("Medium", AlertLevel::Warning),
        "high" => ("High", AlertLevel::Error),
        "critical" => ("Critical", AlertLevel::Error),
        _ => return SeverityClassification { label: severity, level: AlertLevel::None },
    };

    SeverityClassification { label: label.to_string(), level }
}
