//! Renames: package-level symbols and members, interface methods together
//! with their implementations, and function locals by position.

use super::{offset_of, require_parsable};
use crate::builder::PlanBuilder;
use crate::context::{Operation, PlanContext};
use crate::impact;
use crate::naming::check_identifier;
use refit_ast::syntax::{is_exported, is_predeclared};
use refit_foundation::protocol::requests::{
    RenameInterfaceMethod, RenameLocal, RenameSymbol, SourcePosition,
};
use refit_foundation::{
    Issue, IssueKind, RefactoringPlan, RefitError, RefitResult, Scope, Severity, SymbolKind,
};
use refit_workspace::resolver::{self, Reference};
use refit_workspace::{Symbol, Target, Workspace};
use std::collections::BTreeSet;
use tracing::debug;

/// Rewrite a symbol's declaring identifier and every reference to it
fn rename_occurrences(
    builder: &mut PlanBuilder<'_>,
    symbol: &Symbol,
    references: &[Reference],
    new_name: &str,
) {
    builder.replace(
        &symbol.file,
        symbol.name_span.clone(),
        new_name,
        format!("Rename {}", symbol.qualified_name()),
    );
    for reference in references {
        builder.replace(
            &reference.file,
            reference.span.clone(),
            new_name,
            format!("Update reference to {}", symbol.qualified_name()),
        );
    }
}

/// Selections of embedded fields named after a renamed type
fn embedded_field_references(ws: &Workspace, symbol: &Symbol) -> Vec<Reference> {
    ws.packages
        .values()
        .flat_map(|p| p.symbols.fields.values().flatten())
        .filter(|f| f.embedded)
        .filter(|f| {
            f.type_ref
                .as_ref()
                .and_then(|t| t.deref().named().map(|(p, n)| (p.to_string(), n.to_string())))
                == Some((symbol.package.clone(), symbol.name.clone()))
        })
        .flat_map(|f| resolver::references(ws, f))
        .collect()
}

pub(crate) fn outside_package(ws: &Workspace, symbol: &Symbol, references: &[Reference]) -> RefitResult<()> {
    let outside: Vec<Issue> = references
        .iter()
        .filter(|r| r.package != symbol.package)
        .map(|r| {
            ws.issue_at(
                Issue::error(
                    IssueKind::UnresolvedReference,
                    format!(
                        "'{}' is used from package {}, outside the requested scope",
                        symbol.name, r.package
                    ),
                ),
                &r.file,
                r.span.start,
            )
        })
        .collect();
    if outside.is_empty() {
        return Ok(());
    }
    Err(RefitError::unresolved(
        format!(
            "package-scoped rename of '{}' would miss {} reference(s)",
            symbol.name,
            outside.len()
        ),
        outside,
    ))
}

/// A new name that shadows a predeclared identifier the package still uses
fn builtin_shadowing(ws: &Workspace, package: &str, new_name: &str) -> Vec<Issue> {
    if !is_predeclared(new_name) {
        return Vec::new();
    }
    let Some(pkg) = ws.package(package) else {
        return Vec::new();
    };
    pkg.files
        .values()
        .flat_map(|f| {
            f.info
                .uses
                .iter()
                .filter(|u| u.target == Target::Builtin && u.name == new_name)
                .map(move |u| (f, u))
        })
        .map(|(f, u)| {
            ws.issue_at(
                Issue::error(
                    IssueKind::NameConflict,
                    format!("'{}' would shadow the predeclared identifier used here", new_name),
                ),
                &f.path,
                u.span.start,
            )
        })
        .collect()
}

/// Interface method rename, optionally carried through every implementation
fn plan_interface_method(
    ctx: &PlanContext<'_>,
    builder: &mut PlanBuilder<'_>,
    method: &Symbol,
    new_name: &str,
    with_implementations: bool,
) -> RefitResult<()> {
    let ws = ctx.workspace;
    let owner = method.owner.as_deref().unwrap_or_default();
    let interface = resolver::owner_of(ws, method)
        .ok_or_else(|| RefitError::not_found(format!("interface {}", owner)))?;
    builder.issues(impact::member_conflicts(
        ws,
        &interface.package,
        owner,
        new_name,
        Some(method),
    ));

    let implementations = resolver::implementations(ws, interface);
    let mut renamed: Vec<&Symbol> = vec![method];
    let mut seen = BTreeSet::new();
    seen.insert(method.id());
    for implementation in &implementations {
        let concrete = resolver::method_set(ws, &implementation.package, &implementation.name)
            .into_iter()
            .find(|m| m.name == method.name);
        let Some(concrete) = concrete else { continue };
        if !with_implementations {
            builder.issue(ws.issue_at(
                Issue::error(
                    IssueKind::SignatureBreak,
                    format!(
                        "{} would no longer implement {}",
                        implementation.name, interface.name
                    ),
                ),
                &concrete.file,
                concrete.name_span.start,
            ));
            continue;
        }
        if seen.insert(concrete.id()) {
            renamed.push(concrete);
        }
    }

    let mut total = 0;
    for symbol in &renamed {
        if let Some(type_name) = symbol.owner.as_deref() {
            if symbol.id() != method.id() {
                builder.issues(impact::member_conflicts(
                    ws,
                    &symbol.package,
                    type_name,
                    new_name,
                    Some(symbol),
                ));
            }
        }
        let references = resolver::references(ws, symbol);
        total += references.len();
        rename_occurrences(builder, symbol, &references, new_name);
        builder.issues(impact::possible_reference_warnings(ws, symbol));
    }

    // Other interfaces that required the old name from a renamed type.
    if with_implementations {
        for implementation in &implementations {
            for other in resolver::interfaces_satisfied_by(ws, implementation) {
                if other.id() == interface.id() {
                    continue;
                }
                let requires = resolver::method_set(ws, &other.package, &other.name)
                    .iter()
                    .any(|m| m.name == method.name);
                if requires {
                    builder.issue(ws.issue_at(
                        Issue::warning(
                            IssueKind::SignatureBreak,
                            format!(
                                "{} would no longer implement {}",
                                implementation.name, other.name
                            ),
                        ),
                        &other.file,
                        other.name_span.start,
                    ));
                }
            }
        }
    }
    if method.exported && !is_exported(new_name) {
        for symbol in &renamed {
            let references = resolver::references(ws, symbol);
            builder.issues(impact::visibility_loss(ws, symbol, &references, &ctx.options));
        }
    }
    builder.count_references(total);
    debug!(
        interface = %interface.name,
        method = %method.name,
        renamed = renamed.len(),
        references = total,
        "Planned interface method rename"
    );
    Ok(())
}

trait RenameSymbolExt {
    fn target<'w>(&self, ws: &'w Workspace) -> RefitResult<&'w Symbol>;
}

impl RenameSymbolExt for RenameSymbol {
    fn target<'w>(&self, ws: &'w Workspace) -> RefitResult<&'w Symbol> {
        resolver::lookup(ws, &self.symbol, self.symbol_kind, self.package.as_deref())
    }
}

impl Operation for RenameSymbol {
    fn validate(&self, ctx: &PlanContext<'_>) -> RefitResult<()> {
        check_identifier(&self.new_name)?;
        let symbol = self.target(ctx.workspace)?;
        if symbol.name == self.new_name {
            return Err(RefitError::usage(format!(
                "'{}' is already named {}",
                self.symbol, self.new_name
            )));
        }
        if symbol.embedded {
            return Err(RefitError::unsupported(format!(
                "'{}' is an embedded field; rename its type instead",
                self.symbol
            )));
        }
        if symbol.kind == SymbolKind::Function && matches!(symbol.name.as_str(), "init" | "main") {
            return Err(RefitError::unsupported(format!(
                "func {} cannot be renamed",
                symbol.name
            )));
        }
        Ok(())
    }

    fn plan(&self, ctx: &PlanContext<'_>) -> RefitResult<RefactoringPlan> {
        let ws = ctx.workspace;
        let symbol = self.target(ws)?;
        let new_name = self.new_name.as_str();
        let mut builder = PlanBuilder::new(ws, "rename_symbol", serde_json::to_value(self)?);
        require_parsable(ws, ws.require_file(&symbol.file)?)?;

        if symbol.in_interface {
            if self.scope == Scope::Package {
                outside_package(ws, symbol, &resolver::references(ws, symbol))?;
            }
            plan_interface_method(ctx, &mut builder, symbol, new_name, self.rename_implementations)?;
            return builder.finish();
        }

        let mut references = resolver::references(ws, symbol);
        if self.scope == Scope::Package {
            outside_package(ws, symbol, &references)?;
        }
        debug!(
            symbol = %symbol.qualified_name(),
            new_name,
            references = references.len(),
            "Planning rename"
        );

        match symbol.owner.as_deref() {
            Some(owner) => {
                builder.issues(impact::member_conflicts(
                    ws,
                    &symbol.package,
                    owner,
                    new_name,
                    Some(symbol),
                ));
                if symbol.kind == SymbolKind::Method {
                    if let Some(owner_type) = resolver::owner_of(ws, symbol) {
                        for interface in resolver::interfaces_satisfied_by(ws, owner_type) {
                            let required = resolver::method_set(ws, &interface.package, &interface.name)
                                .iter()
                                .any(|m| m.name == symbol.name);
                            if required {
                                builder.issue(ws.issue_at(
                                    Issue::warning(
                                        IssueKind::SignatureBreak,
                                        format!(
                                            "{} would no longer implement {}",
                                            owner, interface.name
                                        ),
                                    ),
                                    &symbol.file,
                                    symbol.name_span.start,
                                ));
                            }
                        }
                    }
                }
                builder.issues(impact::possible_reference_warnings(ws, symbol));
            }
            None => {
                builder.issues(impact::package_conflicts(
                    ws,
                    &symbol.package,
                    new_name,
                    Some(symbol),
                ));
                builder.issues(impact::other_package_warnings(ws, &symbol.package, new_name));
                builder.issues(impact::capture_conflicts(ws, &references, new_name));
                builder.issues(builtin_shadowing(ws, &symbol.package, new_name));
            }
        }

        if symbol.exported && !is_exported(new_name) {
            builder.issues(impact::visibility_loss(ws, symbol, &references, &ctx.options));
        }

        if matches!(symbol.kind, SymbolKind::Type | SymbolKind::Interface) {
            references.extend(embedded_field_references(ws, symbol));
        }
        rename_occurrences(&mut builder, symbol, &references, new_name);
        builder.count_references(references.len());
        builder.finish()
    }
}

trait RenameInterfaceMethodExt {
    fn target<'w>(&self, ws: &'w Workspace) -> RefitResult<&'w Symbol>;
}

impl RenameInterfaceMethodExt for RenameInterfaceMethod {
    fn target<'w>(&self, ws: &'w Workspace) -> RefitResult<&'w Symbol> {
        let name = format!("{}.{}", self.interface, self.method);
        let symbol = resolver::lookup(ws, &name, None, self.package.as_deref())?;
        if !symbol.in_interface {
            return Err(RefitError::usage(format!(
                "{} is not an interface",
                self.interface
            )));
        }
        Ok(symbol)
    }
}

impl Operation for RenameInterfaceMethod {
    fn validate(&self, ctx: &PlanContext<'_>) -> RefitResult<()> {
        check_identifier(&self.new_method)?;
        let symbol = self.target(ctx.workspace)?;
        if symbol.name == self.new_method {
            return Err(RefitError::usage(format!(
                "method is already named {}",
                self.new_method
            )));
        }
        Ok(())
    }

    fn plan(&self, ctx: &PlanContext<'_>) -> RefitResult<RefactoringPlan> {
        let ws = ctx.workspace;
        let method = self.target(ws)?;
        let mut builder =
            PlanBuilder::new(ws, "rename_interface_method", serde_json::to_value(self)?);
        plan_interface_method(
            ctx,
            &mut builder,
            method,
            &self.new_method,
            self.update_implementations,
        )?;
        builder.finish()
    }
}

trait RenameLocalExt {
    fn target(&self, ws: &Workspace) -> RefitResult<(std::path::PathBuf, usize)>;
}

impl RenameLocalExt for RenameLocal {
    fn target(&self, ws: &Workspace) -> RefitResult<(std::path::PathBuf, usize)> {
        let file = ws.require_file(&self.file)?;
        let offset = offset_of(
            file,
            SourcePosition {
                line: self.line,
                column: self.column,
            },
        )?;
        match file.info.use_at(offset).map(|u| &u.target) {
            Some(Target::Local(index)) => Ok((file.path.clone(), *index)),
            Some(_) => Err(RefitError::usage(format!(
                "{}:{}:{} is not a local name; rename the symbol instead",
                self.file.display(),
                self.line,
                self.column
            ))),
            None => Err(RefitError::not_found(format!(
                "identifier at {}:{}:{}",
                self.file.display(),
                self.line,
                self.column
            ))),
        }
    }
}

impl Operation for RenameLocal {
    fn validate(&self, ctx: &PlanContext<'_>) -> RefitResult<()> {
        check_identifier(&self.new_name)?;
        self.target(ctx.workspace).map(|_| ())
    }

    fn plan(&self, ctx: &PlanContext<'_>) -> RefitResult<RefactoringPlan> {
        let ws = ctx.workspace;
        let (path, index) = self.target(ws)?;
        let file = ws.require_file(&path)?;
        require_parsable(ws, file)?;
        let local = &file.info.locals[index];
        let occurrences = resolver::local_occurrences(file, index);
        let mut builder = PlanBuilder::new(ws, "rename_local", serde_json::to_value(self)?);

        for span in &occurrences {
            if let Some(other) = file.info.lookup_local(span.start, &self.new_name) {
                if other != index {
                    builder.issue(ws.issue_at(
                        Issue::error(
                            IssueKind::NameConflict,
                            format!("'{}' is already declared in this scope", self.new_name),
                        ),
                        &path,
                        span.start,
                    ));
                }
            }
        }
        // Outer names spelled like the new name that the local would capture.
        for captured in file
            .info
            .uses_in(local.scope.clone())
            .filter(|u| u.name == self.new_name && u.qualifier.is_none())
            .filter(|u| !matches!(u.target, Target::Local(i) if i != index && file.info.locals[i].scope.start >= local.scope.start))
        {
            builder.issue(ws.issue_at(
                Issue::new(
                    IssueKind::NameConflict,
                    format!("'{}' here would resolve to the renamed local", self.new_name),
                )
                .with_severity(Severity::Error),
                &path,
                captured.span.start,
            ));
        }

        for span in &occurrences {
            builder.replace(&path, span.clone(), self.new_name.clone(), format!("Rename {}", local.name));
        }
        builder.count_references(occurrences.len().saturating_sub(1));
        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::plan_request;
    use crate::operations::tests::{after, apply_plan, file, workspace};
    use pretty_assertions::assert_eq;
    use refit_foundation::{ErrorKind, PlanOptions, RefactorRequest};

    fn rename(symbol: &str, new_name: &str) -> RenameSymbol {
        RenameSymbol {
            symbol: symbol.into(),
            new_name: new_name.into(),
            package: None,
            scope: Scope::Workspace,
            symbol_kind: None,
            rename_implementations: false,
        }
    }

    fn add_workspace(extra: &[(&'static str, &'static str)]) -> Workspace {
        let mut files = vec![
            ("p/p.go", "package p\n\nfunc Add(a, b int) int { return a + b }\n"),
            (
                "q/q.go",
                "package q\n\nimport \"example.com/m/p\"\n\nfunc Use() int { return p.Add(1, 2) }\n",
            ),
        ];
        files.extend_from_slice(extra);
        workspace(&files)
    }

    #[test]
    fn test_rename_updates_definition_and_callers() {
        let ws = add_workspace(&[]);
        let ctx = PlanContext::new(&ws, PlanOptions::default());
        let plan = plan_request(&ctx, &RefactorRequest::RenameSymbol(rename("Add", "Sum"))).unwrap();
        let files = apply_plan(&ws, &plan);
        assert_eq!(
            file(&files, "p/p.go"),
            "package p\n\nfunc Sum(a, b int) int { return a + b }\n"
        );
        assert_eq!(
            file(&files, "q/q.go"),
            "package q\n\nimport \"example.com/m/p\"\n\nfunc Use() int { return p.Sum(1, 2) }\n"
        );
        assert!(plan.impact.warnings().next().is_none());
        assert_eq!(plan.impact.references, 1);
    }

    #[test]
    fn test_rename_clash_in_other_package_warns() {
        let ws = add_workspace(&[("r/r.go", "package r\n\nfunc Sum() {}\n")]);
        let ctx = PlanContext::new(&ws, PlanOptions::default());
        let plan = plan_request(&ctx, &RefactorRequest::RenameSymbol(rename("Add", "Sum"))).unwrap();
        assert_eq!(plan.impact.warnings().count(), 1);
        assert_eq!(plan.impact.errors().count(), 0);
    }

    #[test]
    fn test_rename_clash_in_same_package_conflicts() {
        let ws = add_workspace(&[("p/sum.go", "package p\n\nfunc Sum() {}\n")]);
        let ctx = PlanContext::new(&ws, PlanOptions::default());
        let err = plan_request(&ctx, &RefactorRequest::RenameSymbol(rename("Add", "Sum"))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_rename_round_trip_restores_content() {
        let ws = add_workspace(&[]);
        let ctx = PlanContext::new(&ws, PlanOptions::default());
        let forward = plan_request(&ctx, &RefactorRequest::RenameSymbol(rename("Add", "Sum"))).unwrap();
        let renamed = after(&ws, &forward);
        let ctx = PlanContext::new(&renamed, PlanOptions::default());
        let back = plan_request(&ctx, &RefactorRequest::RenameSymbol(rename("Sum", "Add"))).unwrap();
        let restored = after(&renamed, &back);
        for original in ws.files() {
            let now = restored.file(&original.path).unwrap();
            assert_eq!(now.content, original.content);
        }
    }

    #[test]
    fn test_visibility_rules() {
        let ws = workspace(&[(
            "p/p.go",
            "package p\n\nfunc helper() int { return 1 }\n\nfunc Use() int { return helper() }\n",
        )]);
        let ctx = PlanContext::new(&ws, PlanOptions::default());
        let plan = plan_request(&ctx, &RefactorRequest::RenameSymbol(rename("helper", "assist"))).unwrap();
        assert!(plan.impact.warnings().next().is_none());
        let plan = plan_request(&ctx, &RefactorRequest::RenameSymbol(rename("helper", "Helper"))).unwrap();
        assert!(plan.impact.errors().next().is_none());

        let ws = add_workspace(&[]);
        let ctx = PlanContext::new(&ws, PlanOptions::default());
        let err = plan_request(&ctx, &RefactorRequest::RenameSymbol(rename("Add", "add"))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Visibility);
        let lenient = PlanContext::new(
            &ws,
            PlanOptions {
                allow_breaking: true,
                ..Default::default()
            },
        );
        let plan = plan_request(&lenient, &RefactorRequest::RenameSymbol(rename("Add", "add"))).unwrap();
        assert_eq!(plan.impact.warnings().count(), 1);
    }

    #[test]
    fn test_package_scope_refuses_external_references() {
        let ws = add_workspace(&[]);
        let ctx = PlanContext::new(&ws, PlanOptions::default());
        let mut request = rename("Add", "Sum");
        request.scope = Scope::Package;
        let err = plan_request(&ctx, &RefactorRequest::RenameSymbol(request)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unresolved);
    }

    #[test]
    fn test_capture_by_local_is_a_conflict() {
        let ws = workspace(&[(
            "p/p.go",
            "package p\n\nvar total = 1\n\nfunc f() int {\n\tsum := 2\n\treturn total + sum\n}\n",
        )]);
        let ctx = PlanContext::new(&ws, PlanOptions::default());
        let err = plan_request(&ctx, &RefactorRequest::RenameSymbol(rename("total", "sum"))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    const READER: &str = "package p\n\ntype Reader interface {\n\tRead() string\n}\n\ntype File struct{}\n\nfunc (f File) Read() string { return \"x\" }\n\nfunc Use(r Reader, f File) string { return r.Read() + f.Read() }\n";

    #[test]
    fn test_interface_method_rename_needs_implementations_flag() {
        let ws = workspace(&[("p/p.go", READER)]);
        let ctx = PlanContext::new(&ws, PlanOptions::default());
        let err = plan_request(&ctx, &RefactorRequest::RenameSymbol(rename("Reader.Read", "Fetch")))
            .unwrap_err();
        assert_eq!(err.issues()[0].kind, IssueKind::SignatureBreak);

        let mut request = rename("Reader.Read", "Fetch");
        request.rename_implementations = true;
        let plan = plan_request(&ctx, &RefactorRequest::RenameSymbol(request)).unwrap();
        let files = apply_plan(&ws, &plan);
        assert_eq!(
            file(&files, "p/p.go"),
            READER.replace("Read()", "Fetch()")
        );
    }

    #[test]
    fn test_rename_interface_method_request() {
        let ws = workspace(&[("p/p.go", READER)]);
        let ctx = PlanContext::new(&ws, PlanOptions::default());
        let request = RenameInterfaceMethod {
            interface: "Reader".into(),
            method: "Read".into(),
            new_method: "Fetch".into(),
            package: Some("p".into()),
            update_implementations: true,
        };
        let plan = plan_request(&ctx, &RefactorRequest::RenameInterfaceMethod(request)).unwrap();
        assert_eq!(plan.impact.references, 2);
    }

    #[test]
    fn test_concrete_method_rename_warns_about_interface() {
        let ws = workspace(&[("p/p.go", READER)]);
        let ctx = PlanContext::new(&ws, PlanOptions::default());
        let plan = plan_request(&ctx, &RefactorRequest::RenameSymbol(rename("File.Read", "Load"))).unwrap();
        assert!(plan
            .impact
            .warnings()
            .any(|w| w.kind == IssueKind::SignatureBreak));
    }

    #[test]
    fn test_rename_local_by_position() {
        let ws = workspace(&[(
            "p/p.go",
            "package p\n\nfunc f() int {\n\tn := 1\n\tn++\n\treturn n\n}\n",
        )]);
        let ctx = PlanContext::new(&ws, PlanOptions::default());
        let request = RenameLocal {
            file: "p/p.go".into(),
            line: 4,
            column: 2,
            new_name: "count".into(),
        };
        let plan = plan_request(&ctx, &RefactorRequest::RenameLocal(request)).unwrap();
        let files = apply_plan(&ws, &plan);
        assert_eq!(
            file(&files, "p/p.go"),
            "package p\n\nfunc f() int {\n\tcount := 1\n\tcount++\n\treturn count\n}\n"
        );
    }

    #[test]
    fn test_rename_local_collision() {
        let ws = workspace(&[(
            "p/p.go",
            "package p\n\nfunc f() int {\n\tn := 1\n\tm := 2\n\treturn n + m\n}\n",
        )]);
        let ctx = PlanContext::new(&ws, PlanOptions::default());
        let request = RenameLocal {
            file: "p/p.go".into(),
            line: 4,
            column: 2,
            new_name: "m".into(),
        };
        let err = plan_request(&ctx, &RefactorRequest::RenameLocal(request)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}
