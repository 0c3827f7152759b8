//! Impact checks shared by the operations.
//!
//! Each check returns the issues it finds; operations decide severities
//! where the request flags allow it and push them into their builder.

use crate::builder::PlanBuilder;
use refit_foundation::{
    Issue, IssueKind, PlanOptions, RefactoringPlan, RefitError, RefitResult, Severity,
};
use refit_workspace::resolver::{self, Reference};
use refit_workspace::{SourceFile, Symbol, Workspace};

/// Reject a plan carrying blocking issues.
///
/// Hard kinds (import cycles, unparsable files, overlaps) always block;
/// other Error issues block unless `force` is set.
pub fn gate(plan: &RefactoringPlan, options: &PlanOptions) -> RefitResult<()> {
    let hard: Vec<Issue> = plan
        .impact
        .errors()
        .filter(|i| i.kind.is_hard())
        .cloned()
        .collect();
    if !hard.is_empty() {
        return Err(RefitError::from_issues(hard));
    }
    if options.force {
        return Ok(());
    }
    let errors: Vec<Issue> = plan.impact.errors().cloned().collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(RefitError::from_issues(errors))
    }
}

fn located(ws: &Workspace, issue: Issue, symbol: &Symbol) -> Issue {
    ws.issue_at(issue, &symbol.file, symbol.name_span.start)
}

fn same(a: &Symbol, b: Option<&Symbol>) -> bool {
    b.map(|b| a.id() == b.id() && a.file == b.file && a.span == b.span)
        .unwrap_or(false)
}

/// Package-level names and file imports `name` would collide with in `package`
pub fn package_conflicts(
    ws: &Workspace,
    package: &str,
    name: &str,
    except: Option<&Symbol>,
) -> Vec<Issue> {
    let mut issues = Vec::new();
    let Some(pkg) = ws.package(package) else {
        return issues;
    };
    if let Some(existing) = pkg.symbols.package_level(name) {
        if !same(existing, except) {
            issues.push(located(
                ws,
                Issue::error(
                    IssueKind::NameConflict,
                    format!("'{}' is already declared in package {}", name, pkg.name),
                ),
                existing,
            ));
        }
    }
    for file in pkg.files.values() {
        if let Some(import) = file.import_named(name) {
            issues.push(ws.issue_at(
                Issue::error(
                    IssueKind::NameConflict,
                    format!("'{}' conflicts with the import of \"{}\"", name, import.path),
                ),
                &file.path,
                import.span.start,
            ));
        }
    }
    issues
}

/// Same name declared at package level elsewhere: legal, but worth a warning
pub fn other_package_warnings(ws: &Workspace, package: &str, name: &str) -> Vec<Issue> {
    ws.packages
        .values()
        .filter(|p| p.key != package)
        .filter_map(|p| p.symbols.package_level(name))
        .map(|existing| {
            located(
                ws,
                Issue::warning(
                    IssueKind::NameConflict,
                    format!("'{}' is also declared in package {}", name, existing.package),
                ),
                existing,
            )
        })
        .collect()
}

/// Methods, fields and promoted members of `owner` named `name`
pub fn member_conflicts(
    ws: &Workspace,
    package: &str,
    owner: &str,
    name: &str,
    except: Option<&Symbol>,
) -> Vec<Issue> {
    let mut issues = Vec::new();
    let Some(index) = ws.index(package) else {
        return issues;
    };
    let direct = index
        .method(owner, name)
        .or_else(|| index.field(owner, name))
        .or_else(|| index.interface_method(owner, name));
    if let Some(existing) = direct {
        if !same(existing, except) {
            issues.push(located(
                ws,
                Issue::error(
                    IssueKind::NameConflict,
                    format!("{} already has a member named '{}'", owner, name),
                ),
                existing,
            ));
        }
        return issues;
    }
    for promoted in resolver::method_set(ws, package, owner) {
        if promoted.name == name && promoted.owner.as_deref() != Some(owner) {
            issues.push(located(
                ws,
                Issue::error(
                    IssueKind::NameConflict,
                    format!(
                        "'{}' would shadow the method promoted from {}",
                        name,
                        promoted.owner.as_deref().unwrap_or("an embedded type")
                    ),
                ),
                promoted,
            ));
        }
    }
    issues
}

/// Unqualified references that a local named `name` would capture
pub fn capture_conflicts(ws: &Workspace, references: &[Reference], name: &str) -> Vec<Issue> {
    references
        .iter()
        .filter(|r| r.qualifier.is_none())
        .filter_map(|r| {
            let file = ws.file(&r.file)?;
            let local = file.info.lookup_local(r.span.start, name)?;
            let declared = file.position(file.info.locals[local].span.start);
            Some(ws.issue_at(
                Issue::error(
                    IssueKind::NameConflict,
                    format!(
                        "reference would be captured by local '{}' declared at line {}",
                        name, declared.line
                    ),
                ),
                &r.file,
                r.span.start,
            ))
        })
        .collect()
}

/// A qualifier spelled at `offset` would resolve to something else there
pub fn qualifier_conflict(ws: &Workspace, file: &SourceFile, offset: usize, qualifier: &str) -> Option<Issue> {
    let shadowed_by_local = file.info.lookup_local(offset, qualifier).is_some();
    let shadowed_by_package = ws
        .index(&file.package)
        .map(|i| i.package_level(qualifier).is_some())
        .unwrap_or(false);
    (shadowed_by_local || shadowed_by_package).then(|| {
        ws.issue_at(
            Issue::error(
                IssueKind::NameConflict,
                format!("package qualifier '{}' is shadowed here", qualifier),
            ),
            &file.path,
            offset,
        )
    })
}

/// References from other packages that lose access when `symbol` becomes unexported
pub fn visibility_loss(
    ws: &Workspace,
    symbol: &Symbol,
    references: &[Reference],
    options: &PlanOptions,
) -> Vec<Issue> {
    let severity = if options.allow_breaking {
        Severity::Warning
    } else {
        Severity::Error
    };
    references
        .iter()
        .filter(|r| r.package != symbol.package)
        .map(|r| {
            ws.issue_at(
                Issue::new(
                    IssueKind::VisibilityLoss,
                    format!(
                        "'{}' becomes unexported but is used from package {}",
                        symbol.qualified_name(),
                        r.package
                    ),
                )
                .with_severity(severity),
                &r.file,
                r.span.start,
            )
        })
        .collect()
}

/// References no change of the plan rewrites
pub fn dangling(
    builder: &PlanBuilder<'_>,
    references: &[Reference],
    severity: Severity,
    what: &str,
) -> Vec<Issue> {
    let ws = builder.workspace();
    references
        .iter()
        .filter(|r| !builder.covers(&r.file, &r.full_span()))
        .map(|r| {
            ws.issue_at(
                Issue::new(
                    IssueKind::UnresolvedReference,
                    format!("reference to {} is left dangling", what),
                )
                .with_severity(severity),
                &r.file,
                r.span.start,
            )
        })
        .collect()
}

/// Warnings for selections the binder could not type but that share the name
pub fn possible_reference_warnings(ws: &Workspace, symbol: &Symbol) -> Vec<Issue> {
    resolver::possible_references(ws, symbol)
        .iter()
        .map(|r| {
            ws.issue_at(
                Issue::warning(
                    IssueKind::PossibleReference,
                    format!(
                        "selection of '{}' on a value of unknown type may refer to {}",
                        symbol.name,
                        symbol.qualified_name()
                    ),
                ),
                &r.file,
                r.span.start,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::tests::workspace;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_package_conflicts_and_warnings() {
        let ws = workspace(&[
            (
                "p/p.go",
                "package p\n\nimport \"strings\"\n\nfunc Add(a, b int) int { return a + b }\n\nfunc Sum() string { return strings.ToUpper(\"x\") }\n",
            ),
            ("q/q.go", "package q\n\nfunc Add() {}\n"),
        ]);
        let add = resolver::lookup(&ws, "Add", None, Some("p")).unwrap();
        assert_eq!(package_conflicts(&ws, "example.com/m/p", "Sum", Some(add)).len(), 1);
        assert_eq!(package_conflicts(&ws, "example.com/m/p", "strings", Some(add)).len(), 1);
        assert!(package_conflicts(&ws, "example.com/m/p", "Add", Some(add)).is_empty());
        let warnings = other_package_warnings(&ws, "example.com/m/p", "Add");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].severity, Severity::Warning);
    }

    #[test]
    fn test_capture_by_local() {
        let ws = workspace(&[(
            "p/p.go",
            "package p\n\nvar total = 1\n\nfunc f() int {\n\tsum := 2\n\treturn total + sum\n}\n",
        )]);
        let total = resolver::lookup(&ws, "total", None, None).unwrap();
        let refs = resolver::references(&ws, total);
        assert_eq!(capture_conflicts(&ws, &refs, "sum").len(), 1);
        assert!(capture_conflicts(&ws, &refs, "grand").is_empty());
    }

    #[test]
    fn test_gate_policy() {
        let mut plan = RefactoringPlan::new("test", serde_json::json!({}));
        plan.impact.push(Issue::error(IssueKind::NameConflict, "taken"));
        let err = gate(&plan, &PlanOptions::default()).unwrap_err();
        assert_eq!(err.kind(), refit_foundation::ErrorKind::Conflict);
        let forced = PlanOptions {
            force: true,
            ..Default::default()
        };
        assert!(gate(&plan, &forced).is_ok());

        plan.impact.push(Issue::error(IssueKind::ImportCycle, "a -> b -> a"));
        let err = gate(&plan, &forced).unwrap_err();
        assert_eq!(err.kind(), refit_foundation::ErrorKind::Cycle);
    }
}
