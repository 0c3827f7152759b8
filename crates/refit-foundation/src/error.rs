//! Error taxonomy for refit
//!
//! Every failure maps to exactly one [`ErrorKind`]. Planning errors carry the
//! issues that caused them; execution errors carry the backup set taken before
//! any file was written so callers can inspect or retry.

use crate::planning::{Backup, Issue, IssueKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse error classification shared by all front-ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Usage,
    NotFound,
    Ambiguous,
    Conflict,
    Visibility,
    Cycle,
    Unresolved,
    Unsupported,
    Overlap,
    Io,
    Compilation,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        f.write_str(&label)
    }
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RefitError {
    #[error("Invalid request: {message}")]
    Usage { message: String },

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Ambiguous: {message} (candidates: {})", candidates.join(", "))]
    Ambiguous {
        message: String,
        candidates: Vec<String>,
    },

    #[error("Name conflict: {message}")]
    Conflict { message: String, issues: Vec<Issue> },

    #[error("Visibility violation: {message}")]
    Visibility { message: String, issues: Vec<Issue> },

    #[error("Import cycle: {message}")]
    Cycle { message: String, issues: Vec<Issue> },

    #[error("Unresolved reference: {message}")]
    Unresolved { message: String, issues: Vec<Issue> },

    #[error("Unsupported: {message}")]
    Unsupported { message: String, issues: Vec<Issue> },

    #[error("Overlapping edits in {}: {first:?} and {second:?}", file.display())]
    Overlap {
        file: PathBuf,
        first: (usize, usize),
        second: (usize, usize),
    },

    #[error("I/O error: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        backups: Vec<Backup>,
    },

    #[error("Compilation failed after execution ({} diagnostics), changes rolled back", diagnostics.len())]
    Compilation {
        diagnostics: Vec<Issue>,
        backups: Vec<Backup>,
    },

    #[error("Cancelled during {phase}")]
    Cancelled { phase: String, backups: Vec<Backup> },
}

impl RefitError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn ambiguous(message: impl Into<String>, candidates: Vec<String>) -> Self {
        Self::Ambiguous {
            message: message.into(),
            candidates,
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
            issues: Vec::new(),
        }
    }

    pub fn conflict(message: impl Into<String>, issues: Vec<Issue>) -> Self {
        Self::Conflict {
            message: message.into(),
            issues,
        }
    }

    pub fn visibility(message: impl Into<String>, issues: Vec<Issue>) -> Self {
        Self::Visibility {
            message: message.into(),
            issues,
        }
    }

    pub fn cycle(message: impl Into<String>, issues: Vec<Issue>) -> Self {
        Self::Cycle {
            message: message.into(),
            issues,
        }
    }

    pub fn unresolved(message: impl Into<String>, issues: Vec<Issue>) -> Self {
        Self::Unresolved {
            message: message.into(),
            issues,
        }
    }

    pub fn io(message: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self::Io {
            message: message.into(),
            path,
            backups: Vec::new(),
        }
    }

    pub fn cancelled(phase: impl Into<String>) -> Self {
        Self::Cancelled {
            phase: phase.into(),
            backups: Vec::new(),
        }
    }

    /// Build a validation error from blocking issues.
    ///
    /// The first issue decides the error kind; all issues travel with it.
    pub fn from_issues(issues: Vec<Issue>) -> Self {
        let Some(first) = issues.first() else {
            return Self::usage("validation failed without issues");
        };
        let message = if issues.len() == 1 {
            first.message.clone()
        } else {
            format!("{} (and {} more)", first.message, issues.len() - 1)
        };
        match first.kind {
            IssueKind::NameConflict => Self::Conflict { message, issues },
            IssueKind::ImportCycle => Self::Cycle { message, issues },
            IssueKind::VisibilityLoss => Self::Visibility { message, issues },
            IssueKind::UnresolvedReference
            | IssueKind::PossibleReference
            | IssueKind::SignatureBreak => Self::Unresolved { message, issues },
            IssueKind::SideEffect
            | IssueKind::UnparsableFile
            | IssueKind::Overlap
            | IssueKind::TypeCheck
            | IssueKind::Cosmetic => Self::Unsupported { message, issues },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RefitError::Usage { .. } => ErrorKind::Usage,
            RefitError::NotFound { .. } => ErrorKind::NotFound,
            RefitError::Ambiguous { .. } => ErrorKind::Ambiguous,
            RefitError::Conflict { .. } => ErrorKind::Conflict,
            RefitError::Visibility { .. } => ErrorKind::Visibility,
            RefitError::Cycle { .. } => ErrorKind::Cycle,
            RefitError::Unresolved { .. } => ErrorKind::Unresolved,
            RefitError::Unsupported { .. } => ErrorKind::Unsupported,
            RefitError::Overlap { .. } => ErrorKind::Overlap,
            RefitError::Io { .. } => ErrorKind::Io,
            RefitError::Compilation { .. } => ErrorKind::Compilation,
            RefitError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Issues attached to a planning or compilation error
    pub fn issues(&self) -> &[Issue] {
        match self {
            RefitError::Conflict { issues, .. }
            | RefitError::Visibility { issues, .. }
            | RefitError::Cycle { issues, .. }
            | RefitError::Unresolved { issues, .. }
            | RefitError::Unsupported { issues, .. } => issues,
            RefitError::Compilation { diagnostics, .. } => diagnostics,
            _ => &[],
        }
    }

    /// Backups taken before execution started
    pub fn backups(&self) -> &[Backup] {
        match self {
            RefitError::Io { backups, .. }
            | RefitError::Compilation { backups, .. }
            | RefitError::Cancelled { backups, .. } => backups,
            _ => &[],
        }
    }

    /// Attach the backup set to an execution error
    pub fn with_backups(self, set: Vec<Backup>) -> Self {
        match self {
            RefitError::Io { message, path, .. } => RefitError::Io {
                message,
                path,
                backups: set,
            },
            RefitError::Compilation { diagnostics, .. } => RefitError::Compilation {
                diagnostics,
                backups: set,
            },
            RefitError::Cancelled { phase, .. } => RefitError::Cancelled {
                phase,
                backups: set,
            },
            other => other,
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
            issues: self.issues().to_vec(),
            backups: self.backups().to_vec(),
        }
    }
}

impl From<std::io::Error> for RefitError {
    fn from(err: std::io::Error) -> Self {
        RefitError::io(err.to_string(), None)
    }
}

impl From<serde_json::Error> for RefitError {
    fn from(err: serde_json::Error) -> Self {
        RefitError::usage(format!("malformed request: {}", err))
    }
}

/// Serializable form of an error for `--json` output and protocol replies
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<Issue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backups: Vec<Backup>,
}

/// Result type alias for convenience
pub type RefitResult<T> = Result<T, RefitError>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_issues_uses_first_kind() {
        let err = RefitError::from_issues(vec![
            Issue::error(IssueKind::ImportCycle, "r imports p"),
            Issue::error(IssueKind::NameConflict, "Add exists"),
        ]);
        assert_eq!(err.kind(), ErrorKind::Cycle);
        assert_eq!(err.issues().len(), 2);
        assert!(err.to_string().contains("and 1 more"));
    }

    #[test]
    fn test_backups_attach_to_execution_errors() {
        let backup = Backup {
            original: PathBuf::from("a.go"),
            backup: PathBuf::from("a.go.bak.1"),
        };
        let err = RefitError::io("disk full", None).with_backups(vec![backup.clone()]);
        assert_eq!(err.backups(), &[backup]);

        let usage = RefitError::usage("bad").with_backups(Vec::new());
        assert_eq!(usage.kind(), ErrorKind::Usage);
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::NotFound.to_string(), "not_found");
        assert_eq!(ErrorKind::Io.to_string(), "io");
    }
}
