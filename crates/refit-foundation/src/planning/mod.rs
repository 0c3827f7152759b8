//! Edit model: changes, plans, impact reports and execution results.

pub mod change;
pub mod impact;
pub mod result;

pub use change::{apply_changes, Change, ChangeKind, RefactoringPlan};
pub use impact::{ImpactReport, Issue, IssueKind, Position, Severity};
pub use result::{Backup, ExecutionResult};
