//! Named-field view of one scanner report row.

use csv::StringRecord;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TripwireError};

/// Number of columns every report row must carry.
pub const REPORT_COLUMNS: usize = 13;

/// One secret reported by the scanner.
///
/// Column order follows the scanner's CSV report; column 5 is not used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFinding {
    /// Secret category (column 0)
    pub category: String,
    /// Secret type description (column 1)
    pub description: String,
    /// When the secret was introduced (column 2)
    pub created_at: String,
    /// Author of the change introducing the secret (column 3)
    pub author: String,
    /// Raw severity value (column 4)
    pub severity: String,
    /// Link to the secret's location (column 6)
    pub deep_link: String,
    /// File path (column 7)
    pub path: String,
    /// Hash of the secret value (column 8)
    pub value_hash: String,
    /// Finding fingerprint (column 9)
    pub fingerprint: String,
    /// Redacted text surrounding the secret (column 10)
    pub textual_context: String,
    /// Whether the secret is still active (column 11)
    pub activeness: String,
    /// Space-delimited tags (column 12)
    pub tags: String,
}

impl ScanFinding {
    /// Builds a finding from a CSV record.
    ///
    /// `line` is the 1-based line number used in error messages.
    ///
    /// # Errors
    ///
    /// Returns `TripwireError::ReportParse` when the row has fewer than
    /// [`REPORT_COLUMNS`] fields.
    pub fn from_record(record: &StringRecord, line: u64) -> Result<Self> {
        if record.len() < REPORT_COLUMNS {
            return Err(TripwireError::report_parse(format!(
                "line {line}: expected {REPORT_COLUMNS} columns, found {}",
                record.len()
            )));
        }

        let field = |index: usize| record.get(index).unwrap_or_default().to_string();

        Ok(Self {
            category: field(0),
            description: field(1),
            created_at: field(2),
            author: field(3),
            severity: field(4),
            deep_link: field(6),
            path: field(7),
            value_hash: field(8),
            fingerprint: field(9),
            textual_context: field(10),
            activeness: field(11),
            tags: field(12),
        })
    }

    /// Splits the tags column on whitespace.
    pub fn tag_list(&self) -> impl Iterator<Item = &str> {
        self.tags.split_whitespace()
    }

    /// Renders the Markdown body shown in the platform UI.
    pub fn markdown_body(&self) -> String {
        format!(
            "{description} type secret found in `{path}` with severity **{severity}**\n\n\
             ## Details\n\n\
             * **Category**: {category}\n\
             * **Description**: {description}\n\
             * **Created at**: {created_at}\n\
             * **Author**: {author}\n\
             * **Severity**: {severity}\n\
             * **Deep Link**: {deep_link}\n\
             * **Path**: {path}\n\
             * **Value hash**: `{value_hash}`\n\
             * **Fingerprint**: `{fingerprint}`\n\
             * **Textual Context**: `{textual_context}`\n\
             * **Activeness**: {activeness}\n\
             * **Tags**: {tags}",
            description = self.description,
            path = self.path,
            severity = self.severity,
            category = self.category,
            created_at = self.created_at,
            author = self.author,
            deep_link = self.deep_link,
            value_hash = self.value_hash,
            fingerprint = self.fingerprint,
            textual_context = self.textual_context,
            activeness = self.activeness,
            tags = self.tags,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fields: &[&str]) -> StringRecord {
        StringRecord::from(fields.to_vec())
    }

    fn sample() -> ScanFinding {
        ScanFinding::from_record(
            &record(&[
                "cloud",
                "AWS access key",
                "2024-01-02",
                "dev@example.com",
                "high",
                "ignored",
                "https://example.com/blob/main.tf#L3",
                "main.tf",
                "abc123",
                "fp-1",
                "aws_access_key = ****",
                "active",
                "api-key credential",
            ]),
            2,
        )
        .unwrap()
    }

    #[test]
    fn fields_mapped_by_position() {
        let finding = sample();
        assert_eq!(finding.category, "cloud");
        assert_eq!(finding.severity, "high");
        assert_eq!(finding.deep_link, "https://example.com/blob/main.tf#L3");
        assert_eq!(finding.value_hash, "abc123");
        assert_eq!(finding.activeness, "active");
    }

    #[test]
    fn short_row_fails_closed() {
        let err = ScanFinding::from_record(&record(&["a", "b", "c"]), 7).unwrap_err();
        assert_eq!(err.code(), "E2004");
        assert!(err.to_string().contains("line 7: expected 13 columns, found 3"));
    }

    #[test]
    fn tags_split_on_whitespace() {
        let mut finding = sample();
        assert_eq!(finding.tag_list().collect::<Vec<_>>(), vec!["api-key", "credential"]);

        finding.tags = "  one\ttwo  ".to_string();
        assert_eq!(finding.tag_list().collect::<Vec<_>>(), vec!["one", "two"]);

        finding.tags = String::new();
        assert_eq!(finding.tag_list().count(), 0);
    }

    #[test]
    fn markdown_body_layout() {
        let body = sample().markdown_body();
        let lines: Vec<&str> = body.lines().collect();

        assert_eq!(
            lines[0],
            "AWS access key type secret found in `main.tf` with severity **high**"
        );
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "## Details");
        assert_eq!(lines[4], "* **Category**: cloud");
        assert_eq!(lines[11], "* **Value hash**: `abc123`");
        assert_eq!(lines[13], "* **Textual Context**: `aws_access_key = ****`");
        assert_eq!(lines.last(), Some(&"* **Tags**: api-key credential"));
    }
}
