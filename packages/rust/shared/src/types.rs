//! Core domain types for orgscan runs.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{OrgScanError, Result};

// ---------------------------------------------------------------------------
// Row
// ---------------------------------------------------------------------------

/// State of a row's verdict cell as read back from the sheet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum VerdictCell {
    /// Blank cell; the row still needs classifying.
    #[default]
    Empty,
    /// A `TRUE`/`FALSE` value written by an earlier run.
    Value(bool),
    /// Non-empty text that is not a boolean (hand-edited, notes, etc.).
    Unrecognized(String),
}

impl VerdictCell {
    /// Parse a raw cell value. Surrounding whitespace is ignored.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }
        match trimmed.to_ascii_uppercase().as_str() {
            "TRUE" => Self::Value(true),
            "FALSE" => Self::Value(false),
            _ => Self::Unrecognized(trimmed.to_string()),
        }
    }

    /// Whether the cell holds anything at all.
    pub fn is_filled(&self) -> bool {
        !matches!(self, Self::Empty)
    }

    /// The boolean verdict, if the cell holds one.
    pub fn verdict(&self) -> Option<bool> {
        match self {
            Self::Value(v) => Some(*v),
            _ => None,
        }
    }
}

/// One organization row of the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// 1-based row number in the sheet (row 1 is the header).
    pub number: usize,
    /// Organization name, trimmed and non-empty.
    pub name: String,
    /// Existing verdict cell.
    pub verdict: VerdictCell,
    /// Existing evidence URL, if any.
    pub evidence: Option<String>,
}

/// Cell value written for a verdict.
pub fn verdict_cell_value(verdict: bool) -> &'static str {
    if verdict { "TRUE" } else { "FALSE" }
}

// ---------------------------------------------------------------------------
// SearchItem
// ---------------------------------------------------------------------------

/// A single organic search result.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SearchItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub snippet: String,
}

// ---------------------------------------------------------------------------
// TopicProfile
// ---------------------------------------------------------------------------

/// Keyword configuration for one classification topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicProfile {
    /// Short identifier used on the command line (e.g. `vegetation`).
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Column receiving the `TRUE`/`FALSE` verdict.
    pub verdict_column: String,
    /// Column receiving the evidence URL.
    pub evidence_column: String,
    /// Every group must be satisfied by at least one of its terms.
    pub required_groups: Vec<Vec<String>>,
    /// Any of these anywhere in a result disqualifies it.
    #[serde(default)]
    pub exclusions: Vec<String>,
}

impl TopicProfile {
    /// Check that the profile can drive a run.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(OrgScanError::validation("topic name must not be empty"));
        }
        if self.verdict_column.trim().is_empty() || self.evidence_column.trim().is_empty() {
            return Err(OrgScanError::validation(format!(
                "topic '{}' needs both a verdict and an evidence column",
                self.name
            )));
        }
        if self.verdict_column == self.evidence_column {
            return Err(OrgScanError::validation(format!(
                "topic '{}' uses '{}' for both verdict and evidence",
                self.name, self.verdict_column
            )));
        }
        if self.required_groups.is_empty() {
            return Err(OrgScanError::validation(format!(
                "topic '{}' has no required keyword groups",
                self.name
            )));
        }
        for (i, group) in self.required_groups.iter().enumerate() {
            if group.iter().all(|term| term.trim().is_empty()) {
                return Err(OrgScanError::validation(format!(
                    "topic '{}' keyword group {} is empty",
                    self.name,
                    i + 1
                )));
            }
        }
        Ok(())
    }

    /// Stable SHA-256 fingerprint of the keyword configuration.
    ///
    /// Two runs with the same fingerprint applied the same matching rules.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.verdict_column.as_bytes());
        hasher.update([0]);
        hasher.update(self.evidence_column.as_bytes());
        for group in &self.required_groups {
            hasher.update([1]);
            for term in group {
                hasher.update(term.to_lowercase().as_bytes());
                hasher.update([0]);
            }
        }
        hasher.update([2]);
        for term in &self.exclusions {
            hasher.update(term.to_lowercase().as_bytes());
            hasher.update([0]);
        }
        format!("{:x}", hasher.finalize())
    }
}

// ---------------------------------------------------------------------------
// Run outcomes
// ---------------------------------------------------------------------------

/// What happened to a single row during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Row already had a verdict and `skip_existing` was on.
    Skipped,
    /// Row was classified and written back.
    Classified {
        verdict: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        evidence: Option<String>,
        /// The provider returned no results at all for the query.
        #[serde(default)]
        no_results: bool,
    },
    /// Search failed for this row; nothing was written.
    Failed { error: String },
}

/// Outcome of one row, in table order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowOutcome {
    pub row: usize,
    pub name: String,
    #[serde(flatten)]
    pub kind: OutcomeKind,
}

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// Rows exhausted or a cap was reached.
    Done,
    /// A fatal error or an interrupt stopped the run.
    Aborted { reason: String },
}

impl RunStatus {
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }

    /// Short label for logs and the journal.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Aborted { .. } => "aborted",
        }
    }
}

/// Summary of a completed (or aborted) run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub status: RunStatus,
    /// Rows looked at, including skips and failures.
    pub examined: usize,
    /// Rows newly classified and written.
    pub classified: usize,
    pub skipped: usize,
    pub errored: usize,
    /// Classified rows whose search came back empty.
    pub no_results: usize,
    /// Per-row outcomes in table order.
    pub outcomes: Vec<RowOutcome>,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Rows classified `TRUE` in this run.
    pub fn positives(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.kind, OutcomeKind::Classified { verdict: true, .. }))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> TopicProfile {
        TopicProfile {
            name: "test".into(),
            description: String::new(),
            verdict_column: "Verdict".into(),
            evidence_column: "Evidence".into(),
            required_groups: vec![vec!["drone".into()], vec!["inspection".into()]],
            exclusions: vec!["facebook.com".into()],
        }
    }

    #[test]
    fn verdict_cell_parsing() {
        assert_eq!(VerdictCell::parse(""), VerdictCell::Empty);
        assert_eq!(VerdictCell::parse("   "), VerdictCell::Empty);
        assert_eq!(VerdictCell::parse("true"), VerdictCell::Value(true));
        assert_eq!(VerdictCell::parse(" FALSE "), VerdictCell::Value(false));
        assert_eq!(
            VerdictCell::parse("checked by hand"),
            VerdictCell::Unrecognized("checked by hand".into())
        );
        assert!(VerdictCell::parse("n/a").is_filled());
        assert_eq!(VerdictCell::parse("n/a").verdict(), None);
    }

    #[test]
    fn profile_validation() {
        assert!(profile().validate().is_ok());

        let mut p = profile();
        p.required_groups.clear();
        assert!(p.validate().is_err());

        let mut p = profile();
        p.required_groups.push(vec!["  ".into()]);
        let err = p.validate().unwrap_err();
        assert!(err.to_string().contains("group 3"));

        let mut p = profile();
        p.evidence_column = "Verdict".into();
        assert!(p.validate().is_err());
    }

    #[test]
    fn fingerprint_tracks_keywords() {
        let a = profile();
        let mut b = profile();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.exclusions.push("satellite dish".into());
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn outcome_serialization() {
        let outcome = RowOutcome {
            row: 7,
            name: "Acme Cooperative".into(),
            kind: OutcomeKind::Classified {
                verdict: true,
                evidence: Some("https://acme.coop/news".into()),
                no_results: false,
            },
        };
        let json = serde_json::to_value(&outcome).expect("serialize");
        assert_eq!(json["kind"], "classified");
        assert_eq!(json["row"], 7);
        let parsed: RowOutcome = serde_json::from_value(json).expect("deserialize");
        assert_eq!(parsed, outcome);
    }
}
