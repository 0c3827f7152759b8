//! Impact reports: the precomputed consequences of a plan.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Issue severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(label)
    }
}

/// Classification of an impact issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueKind {
    NameConflict,
    ImportCycle,
    VisibilityLoss,
    UnresolvedReference,
    SignatureBreak,
    SideEffect,
    UnparsableFile,
    PossibleReference,
    Overlap,
    /// Checker diagnostic reported against the loaded workspace
    TypeCheck,
    Cosmetic,
}

impl IssueKind {
    /// Hard invariants cannot be overridden by `force` or `allow_breaking`.
    pub fn is_hard(self) -> bool {
        matches!(
            self,
            IssueKind::ImportCycle | IssueKind::UnparsableFile | IssueKind::Overlap
        )
    }

    /// Severity this kind carries unless an operation decides otherwise.
    pub fn default_severity(self) -> Severity {
        match self {
            IssueKind::UnresolvedReference
            | IssueKind::ImportCycle
            | IssueKind::NameConflict
            | IssueKind::SignatureBreak
            | IssueKind::UnparsableFile
            | IssueKind::Overlap
            | IssueKind::TypeCheck => Severity::Error,
            IssueKind::VisibilityLoss | IssueKind::SideEffect | IssueKind::PossibleReference => {
                Severity::Warning
            }
            IssueKind::Cosmetic => Severity::Info,
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IssueKind::NameConflict => "name-conflict",
            IssueKind::ImportCycle => "import-cycle",
            IssueKind::VisibilityLoss => "visibility-loss",
            IssueKind::UnresolvedReference => "unresolved-reference",
            IssueKind::SignatureBreak => "signature-break",
            IssueKind::SideEffect => "side-effect",
            IssueKind::UnparsableFile => "unparsable-file",
            IssueKind::PossibleReference => "possible-reference",
            IssueKind::Overlap => "overlap",
            IssueKind::TypeCheck => "type-check",
            IssueKind::Cosmetic => "cosmetic",
        };
        f.write_str(label)
    }
}

/// 1-based line and column (column counted in bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A single severity-classified finding
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub severity: Severity,
    pub kind: IssueKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    pub message: String,
}

impl Issue {
    /// Create an issue with the kind's default severity
    pub fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            severity: kind.default_severity(),
            kind,
            file: None,
            position: None,
            message: message.into(),
        }
    }

    pub fn error(kind: IssueKind, message: impl Into<String>) -> Self {
        Self::new(kind, message).with_severity(Severity::Error)
    }

    pub fn warning(kind: IssueKind, message: impl Into<String>) -> Self {
        Self::new(kind, message).with_severity(Severity::Warning)
    }

    pub fn info(kind: IssueKind, message: impl Into<String>) -> Self {
        Self::new(kind, message).with_severity(Severity::Info)
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Attach a location
    pub fn at(mut self, file: impl AsRef<Path>, position: Position) -> Self {
        self.file = Some(file.as_ref().to_path_buf());
        self.position = Some(position);
        self
    }

    pub fn in_file(mut self, file: impl AsRef<Path>) -> Self {
        self.file = Some(file.as_ref().to_path_buf());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, &self.position) {
            (Some(file), Some(pos)) => write!(f, "{}:{}: ", file.display(), pos)?,
            (Some(file), None) => write!(f, "{}: ", file.display())?,
            _ => {}
        }
        write!(f, "{} [{}] {}", self.severity, self.kind, self.message)
    }
}

/// Consequences of a plan, computed before anything is written
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactReport {
    pub files_affected: usize,
    pub references: usize,
    pub breaking_callers: usize,
    pub issues: Vec<Issue>,
}

impl ImpactReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, issue: Issue) {
        if !self.issues.contains(&issue) {
            self.issues.push(issue);
        }
    }

    pub fn extend(&mut self, issues: impl IntoIterator<Item = Issue>) {
        for issue in issues {
            self.push(issue);
        }
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(Issue::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    /// Fold another report into this one (used by batches)
    pub fn merge(&mut self, other: ImpactReport) {
        self.references += other.references;
        self.breaking_callers += other.breaking_callers;
        self.extend(other.issues);
    }

    /// Issues sorted by file, position and severity for stable output
    pub fn sort(&mut self) {
        self.issues.sort_by(|a, b| {
            a.file
                .cmp(&b.file)
                .then(a.position.cmp(&b.position))
                .then(b.severity.cmp(&a.severity))
                .then(a.message.cmp(&b.message))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_severities() {
        assert_eq!(IssueKind::NameConflict.default_severity(), Severity::Error);
        assert_eq!(IssueKind::ImportCycle.default_severity(), Severity::Error);
        assert_eq!(
            IssueKind::UnresolvedReference.default_severity(),
            Severity::Error
        );
        assert_eq!(
            IssueKind::VisibilityLoss.default_severity(),
            Severity::Warning
        );
        assert_eq!(IssueKind::Cosmetic.default_severity(), Severity::Info);
    }

    #[test]
    fn test_report_deduplicates_and_counts() {
        let mut report = ImpactReport::new();
        let issue = Issue::warning(IssueKind::UnresolvedReference, "dangling")
            .at("q/q.go", Position::new(4, 9));
        report.push(issue.clone());
        report.push(issue);
        report.push(Issue::error(IssueKind::NameConflict, "taken"));

        assert_eq!(report.issues.len(), 2);
        assert_eq!(report.count(Severity::Warning), 1);
        assert!(report.has_errors());
    }

    #[test]
    fn test_issue_display_and_serialization() {
        let issue =
            Issue::error(IssueKind::ImportCycle, "p imports r").at("p/p.go", Position::new(3, 1));
        assert_eq!(
            issue.to_string(),
            "p/p.go:3:1: error [import-cycle] p imports r"
        );

        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["kind"], "import-cycle");
        assert_eq!(json["severity"], "error");
    }
}
