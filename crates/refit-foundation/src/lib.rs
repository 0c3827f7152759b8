//! Foundation layer for refit
//!
//! Shared value types used by every other crate:
//! - the edit model (`Change`, `RefactoringPlan`) and its application rules
//! - impact reports and severity-classified issues
//! - refactoring request types (one per operation) and plan options
//! - the error taxonomy every failure maps into

pub mod error;
pub mod planning;
pub mod protocol;

pub use error::{ErrorKind, ErrorReport, RefitError, RefitResult};
pub use planning::{
    apply_changes, Backup, Change, ChangeKind, ExecutionResult, ImpactReport, Issue, IssueKind,
    Position, RefactoringPlan, Severity,
};
pub use protocol::{PlanOptions, RefactorRequest, Scope, SymbolKind};
