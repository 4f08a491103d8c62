//! Outcome Log: non-fatal issues collected while applying a plan.
//!
//! Issues are returned with the result rather than raised, and render as a
//! FHIR `OperationOutcome`.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Fatal,
    Error,
    Warning,
    Information,
}

impl std::fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueSeverity::Fatal => write!(f, "fatal"),
            IssueSeverity::Error => write!(f, "error"),
            IssueSeverity::Warning => write!(f, "warning"),
            IssueSeverity::Information => write!(f, "information"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeIssue {
    pub severity: IssueSeverity,
    /// FHIR issue-type code.
    pub code: String,
    pub diagnostics: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeLog {
    issues: Vec<OutcomeIssue>,
}

impl OutcomeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, severity: IssueSeverity, code: &str, diagnostics: impl Into<String>) {
        self.issues.push(OutcomeIssue {
            severity,
            code: code.to_string(),
            diagnostics: diagnostics.into(),
        });
    }

    pub fn error(&mut self, diagnostics: impl Into<String>) {
        self.push(IssueSeverity::Error, "exception", diagnostics);
    }

    pub fn warning(&mut self, diagnostics: impl Into<String>) {
        self.push(IssueSeverity::Warning, "processing", diagnostics);
    }

    /// Appends every issue of `other`, keeping their order.
    pub fn merge(&mut self, other: OutcomeLog) {
        self.issues.extend(other.issues);
    }

    pub fn issues(&self) -> &[OutcomeIssue] {
        &self.issues
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.issues
            .iter()
            .any(|i| matches!(i.severity, IssueSeverity::Error | IssueSeverity::Fatal))
    }

    pub fn mentions(&self, text: &str) -> usize {
        self.issues
            .iter()
            .filter(|i| i.diagnostics.contains(text))
            .count()
    }

    pub fn to_operation_outcome(&self, id: &str) -> Value {
        json!({
            "resourceType": "OperationOutcome",
            "id": id,
            "issue": self.issues.iter().map(|issue| json!({
                "severity": issue.severity.to_string(),
                "code": issue.code,
                "diagnostics": issue.diagnostics,
            })).collect::<Vec<_>>()
        })
    }
}
