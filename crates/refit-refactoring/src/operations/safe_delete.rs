//! Delete a declaration that nothing uses.

use super::{lookup_in_file, merge_removals, removal_of, require_parsable};
use crate::builder::PlanBuilder;
use crate::context::{Operation, PlanContext};
use crate::impact;
use refit_foundation::protocol::requests::SafeDelete;
use refit_foundation::{
    Issue, IssueKind, RefactoringPlan, RefitError, RefitResult, Scope, Severity, SymbolKind,
};
use refit_workspace::resolver::{self, Reference};
use refit_workspace::{Symbol, Workspace};
use std::path::PathBuf;
use tracing::debug;

trait SafeDeleteExt {
    fn target<'w>(&self, ws: &'w Workspace) -> RefitResult<&'w Symbol>;
}

impl SafeDeleteExt for SafeDelete {
    fn target<'w>(&self, ws: &'w Workspace) -> RefitResult<&'w Symbol> {
        lookup_in_file(ws, &self.symbol, self.symbol_kind, &self.source_file)
    }
}

/// The symbol plus the declarations deleted with it
fn units<'w>(ws: &'w Workspace, symbol: &'w Symbol) -> Vec<&'w Symbol> {
    let mut units = vec![symbol];
    if symbol.kind == SymbolKind::Type {
        if let Some(index) = ws.index(&symbol.package) {
            units.extend(index.methods.get(&symbol.name).into_iter().flatten());
        }
    }
    units
}

impl Operation for SafeDelete {
    fn validate(&self, ctx: &PlanContext<'_>) -> RefitResult<()> {
        let symbol = self.target(ctx.workspace)?;
        if symbol.shared {
            return Err(RefitError::unsupported(format!(
                "'{}' is declared together with other names in one spec",
                self.symbol
            )));
        }
        if symbol.embedded {
            return Err(RefitError::unsupported(format!(
                "'{}' is an embedded field",
                self.symbol
            )));
        }
        Ok(())
    }

    fn plan(&self, ctx: &PlanContext<'_>) -> RefitResult<RefactoringPlan> {
        let ws = ctx.workspace;
        let symbol = self.target(ws)?;
        let forced = self.force || ctx.options.force;
        let units = units(ws, symbol);

        let mut removals: Vec<(PathBuf, std::ops::Range<usize>)> = Vec::new();
        for unit in &units {
            let file = ws.require_file(&unit.file)?;
            require_parsable(ws, file)?;
            removals.push((file.path.clone(), removal_of(file, unit)?));
        }
        let removals = merge_removals(ws, removals);

        let deleted = |r: &Reference| {
            removals
                .iter()
                .any(|(path, span)| *path == r.file && span.start <= r.span.start && r.span.end <= span.end)
        };
        let references: Vec<Reference> = units
            .iter()
            .flat_map(|u| resolver::references(ws, u))
            .filter(|r| !deleted(r))
            .collect();
        debug!(
            symbol = %symbol.qualified_name(),
            units = units.len(),
            references = references.len(),
            forced,
            "Planning safe delete"
        );

        if self.scope == Scope::Package {
            let outside: Vec<Issue> = references
                .iter()
                .filter(|r| r.package != symbol.package)
                .map(|r| {
                    ws.issue_at(
                        Issue::error(
                            IssueKind::UnresolvedReference,
                            format!("'{}' is used outside package scope", symbol.name),
                        ),
                        &r.file,
                        r.span.start,
                    )
                })
                .collect();
            if !outside.is_empty() {
                return Err(RefitError::unresolved(
                    format!(
                        "'{}' has {} reference(s) outside its package",
                        symbol.name,
                        outside.len()
                    ),
                    outside,
                ));
            }
        }

        let mut builder = PlanBuilder::new(ws, "safe_delete", serde_json::to_value(self)?);
        for (path, span) in removals {
            builder.delete(&path, span, format!("Delete {}", symbol.qualified_name()));
        }
        let severity = if forced {
            Severity::Warning
        } else {
            Severity::Error
        };
        let dangling = impact::dangling(
            &builder,
            &references,
            severity,
            &format!("deleted {}", symbol.qualified_name()),
        );
        builder.issues(dangling);
        builder.count_references(references.len());
        builder.finish()
    }
}
