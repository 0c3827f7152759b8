//! Several refactorings applied as one plan
//!
//! Every request is planned against the same snapshot; the resulting changes
//! are merged into a single plan. Insertions come first and deletions last,
//! with submission order kept inside each class. Two operations touching the
//! same bytes reject the whole batch.

use refit_foundation::{Change, ChangeKind, RefactorRequest, RefactoringPlan, RefitError, RefitResult};
use refit_refactoring::{plan_request, PlanContext};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// How a change affects its file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeClass {
    Insertion,
    Replacement,
    Deletion,
}

impl ChangeClass {
    pub fn of(change: &Change) -> Self {
        if change.kind == ChangeKind::CreateFile || change.is_insertion() {
            ChangeClass::Insertion
        } else if change.replacement.is_empty() {
            ChangeClass::Deletion
        } else {
            ChangeClass::Replacement
        }
    }
}

/// Batch file contents: a bare array of requests or `{ "requests": [...] }`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchFile {
    List(Vec<RefactorRequest>),
    Wrapped { requests: Vec<RefactorRequest> },
}

impl BatchFile {
    pub fn parse(text: &str) -> RefitResult<Vec<RefactorRequest>> {
        let file: BatchFile = serde_json::from_str(text)?;
        let requests = match file {
            BatchFile::List(requests) | BatchFile::Wrapped { requests } => requests,
        };
        if requests.is_empty() {
            return Err(RefitError::usage("batch contains no requests"));
        }
        Ok(requests)
    }
}

/// Reject changes from different operations that touch the same bytes
fn check_cross_overlaps(planned: &[(usize, &Change)]) -> RefitResult<()> {
    for (i, (op_a, a)) in planned.iter().enumerate() {
        for (op_b, b) in &planned[i + 1..] {
            if op_a != op_b && a.overlaps(b) {
                debug!(
                    file = %a.file.display(),
                    first_operation = op_a,
                    second_operation = op_b,
                    "Batch operations overlap"
                );
                return Err(RefitError::Overlap {
                    file: a.file.clone(),
                    first: (a.start, a.end),
                    second: (b.start, b.end),
                });
            }
        }
    }
    Ok(())
}

/// Plan every request against one snapshot and merge the results
pub fn plan_batch(ctx: &PlanContext<'_>, requests: &[RefactorRequest]) -> RefitResult<RefactoringPlan> {
    if requests.is_empty() {
        return Err(RefitError::usage("batch contains no requests"));
    }
    let plans = requests
        .iter()
        .map(|request| plan_request(ctx, request))
        .collect::<RefitResult<Vec<_>>>()?;

    let mut planned: Vec<(usize, &Change)> = plans
        .iter()
        .enumerate()
        .flat_map(|(op, plan)| plan.changes.iter().map(move |c| (op, c)))
        .collect();
    let mut by_file = planned.clone();
    by_file.sort_by(|a, b| a.1.file.cmp(&b.1.file));
    for group in by_file.chunk_by(|a, b| a.1.file == b.1.file) {
        check_cross_overlaps(group)?;
    }
    // Stable: submission order survives inside each class
    planned.sort_by_key(|(_, change)| ChangeClass::of(change));

    let arguments = serde_json::Value::Array(requests.iter().map(RefactorRequest::to_json).collect());
    let mut batch = RefactoringPlan::new("batch", arguments);
    batch.extend(planned.into_iter().map(|(_, c)| c.clone()));
    for plan in plans {
        batch.impact.merge(plan.impact);
    }
    batch.finalize();

    info!(
        operations = requests.len(),
        changes = batch.changes.len(),
        files = batch.affected_files.len(),
        "Planned batch"
    );
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use refit_foundation::protocol::requests::{RenameSymbol, SafeDelete};
    use refit_foundation::{ErrorKind, PlanOptions, Scope};
    use refit_workspace::Workspace;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    const MATH: &str = "package p\n\nfunc Add(a, b int) int { return a + b }\n\nfunc unused() {}\n";

    fn workspace() -> Workspace {
        let sources: BTreeMap<PathBuf, String> = [
            ("p/p.go", MATH),
            (
                "q/q.go",
                "package q\n\nimport \"example.com/m/p\"\n\nfunc Use() int { return p.Add(1, 2) }\n",
            ),
        ]
        .into_iter()
        .map(|(p, c)| (PathBuf::from(p), c.to_string()))
        .collect();
        Workspace::from_sources("/ws", Some("example.com/m"), sources)
    }

    fn rename(from: &str, to: &str) -> RefactorRequest {
        RefactorRequest::RenameSymbol(RenameSymbol {
            symbol: from.to_string(),
            new_name: to.to_string(),
            package: None,
            scope: Scope::Workspace,
            symbol_kind: None,
            rename_implementations: false,
        })
    }

    fn delete(name: &str) -> RefactorRequest {
        RefactorRequest::SafeDelete(SafeDelete {
            symbol: name.to_string(),
            source_file: PathBuf::from("p/p.go"),
            scope: Scope::Workspace,
            force: false,
            symbol_kind: None,
        })
    }

    #[test]
    fn test_classification() {
        assert_eq!(ChangeClass::of(&Change::insert("f.go", 3, "x", "")), ChangeClass::Insertion);
        assert_eq!(ChangeClass::of(&Change::create_file("f.go", "x", "")), ChangeClass::Insertion);
        assert_eq!(ChangeClass::of(&Change::delete("f.go", 0, 3, "")), ChangeClass::Deletion);
        assert_eq!(ChangeClass::of(&Change::replace("f.go", 0, 3, "y", "")), ChangeClass::Replacement);
    }

    #[test]
    fn test_deletions_ordered_last() {
        let ws = workspace();
        let ctx = PlanContext::new(&ws, PlanOptions::default());
        let plan = plan_batch(&ctx, &[delete("unused"), rename("Add", "Sum")]).unwrap();

        let classes: Vec<ChangeClass> = plan.changes.iter().map(ChangeClass::of).collect();
        let mut sorted = classes.clone();
        sorted.sort();
        assert_eq!(classes, sorted);
        assert_eq!(classes.last(), Some(&ChangeClass::Deletion));
        assert_eq!(plan.operation, "batch");
        assert_eq!(plan.impact.references, 1);
        assert_eq!(plan.affected_files.len(), 2);
    }

    #[test]
    fn test_overlapping_operations_reject_the_batch() {
        let ws = workspace();
        let ctx = PlanContext::new(&ws, PlanOptions::default());
        let err = plan_batch(&ctx, &[rename("Add", "Sum"), rename("Add", "Plus")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Overlap);
    }

    #[test]
    fn test_batch_file_forms() {
        let list = r#"[{"kind":"renameSymbol","symbol":"Add","newName":"Sum"}]"#;
        let wrapped = r#"{"requests":[{"kind":"safeDelete","symbol":"unused","sourceFile":"p/p.go"}]}"#;
        assert_eq!(BatchFile::parse(list).unwrap(), vec![rename("Add", "Sum")]);
        assert_eq!(BatchFile::parse(wrapped).unwrap(), vec![delete("unused")]);
        assert_eq!(BatchFile::parse("[]").unwrap_err().kind(), ErrorKind::Usage);
    }
}
