//! Move a package-level declaration into another package.
//!
//! The declaration text is relocated (qualifiers adjusted), removed from its
//! file, and every reference is requalified: uses inside the target package
//! lose their qualifier, uses left in the source package gain one.

use super::{
    declaration_node, group_keyword, group_of, merge_removals, removal_of, require_parsable,
};
use crate::builder::PlanBuilder;
use crate::context::{Operation, PlanContext};
use crate::impact;
use crate::naming::file_stem;
use crate::rewrite::{relocate, Relocation};
use refit_ast::syntax::{declaration_span, is_exported, text};
use refit_foundation::protocol::requests::MoveSymbol;
use refit_foundation::{
    ErrorKind, Issue, IssueKind, RefactoringPlan, RefitError, RefitResult, SymbolKind,
};
use refit_workspace::{resolver, Package, Symbol, Workspace};
use std::collections::BTreeSet;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where the moved declaration lands
struct Destination {
    package: String,
    package_name: String,
    file: PathBuf,
    create: bool,
}

/// Source symbol and destination package of a move
trait MoveSymbolExt {
    fn source_symbol<'w>(&self, ws: &'w Workspace) -> RefitResult<&'w Symbol>;
    fn destination(&self, ws: &Workspace, from: &Package) -> RefitResult<Destination>;
}

impl MoveSymbolExt for MoveSymbol {
    fn source_symbol<'w>(&self, ws: &'w Workspace) -> RefitResult<&'w Symbol> {
        let from = ws.resolve_package(&self.from_package)?;
        resolver::lookup(ws, &self.symbol, None, Some(&from.key))
    }

    fn destination(&self, ws: &Workspace, from: &Package) -> RefitResult<Destination> {
        match ws.resolve_package(&self.to_package) {
            Ok(pkg) => {
                if pkg.key == from.key {
                    return Err(RefitError::usage(format!(
                        "'{}' is already in package {}",
                        self.symbol, pkg.name
                    )));
                }
                if let Some(target) = &self.target_file {
                    let path = target_path(ws, pkg, target);
                    let exists = pkg.files.contains_key(&path);
                    if !exists && ws.file(&path).is_some() {
                        return Err(RefitError::usage(format!(
                            "{} does not belong to package {}",
                            target.display(),
                            pkg.name
                        )));
                    }
                    return Ok(Destination {
                        package: pkg.key.clone(),
                        package_name: pkg.name.clone(),
                        file: path,
                        create: !exists,
                    });
                }
                let file = pkg.preferred_file().ok_or_else(|| {
                    RefitError::not_found(format!("source file in package {}", pkg.name))
                })?;
                Ok(Destination {
                    package: pkg.key.clone(),
                    package_name: pkg.name.clone(),
                    file: file.path.clone(),
                    create: false,
                })
            }
            Err(err) if err.kind() == ErrorKind::NotFound && self.create_target => {
                let rel = match &ws.module_path {
                    Some(module) => self
                        .to_package
                        .strip_prefix(module.as_str())
                        .map(|r| r.trim_start_matches('/'))
                        .unwrap_or(&self.to_package),
                    None => &self.to_package,
                };
                let rel = rel.trim_start_matches("./").trim_end_matches('/');
                let dir = ws.root.join(rel);
                let package_name = rel
                    .rsplit('/')
                    .next()
                    .unwrap_or(rel)
                    .replace(['-', '.'], "_");
                let file = match &self.target_file {
                    Some(target) => ws.absolute(target),
                    None => dir.join(format!("{}.go", file_stem(&self.symbol))),
                };
                Ok(Destination {
                    package: ws.key_for_dir(&dir),
                    package_name,
                    file,
                    create: true,
                })
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Err(RefitError::not_found(format!(
                "package '{}' (pass createTarget to create it)",
                self.to_package
            ))),
            Err(err) => Err(err),
        }
    }
}

fn target_path(ws: &Workspace, pkg: &Package, target: &Path) -> PathBuf {
    if target.is_absolute() || target.components().count() > 1 {
        ws.absolute(target)
    } else {
        pkg.dir.join(target)
    }
}

/// Declaration text and removal span for one moved unit
struct Piece {
    file: PathBuf,
    region: Range<usize>,
    removal: Range<usize>,
    keyword: Option<&'static str>,
}

fn piece(ws: &Workspace, symbol: &Symbol) -> RefitResult<Piece> {
    let file = ws.require_file(&symbol.file)?;
    let node = declaration_node(file, symbol).ok_or_else(|| {
        RefitError::unsupported(format!("cannot locate declaration of '{}'", symbol.name))
    })?;
    let grouped = symbol.grouped && group_of(node).is_some();
    if grouped {
        if let Some(group) = group_of(node) {
            if group.kind() == "const_declaration" && text(group, &file.content).contains("iota") {
                return Err(RefitError::unsupported(format!(
                    "'{}' belongs to an iota group; its value depends on its position",
                    symbol.name
                )));
            }
        }
    }
    Ok(Piece {
        file: file.path.clone(),
        region: if grouped {
            symbol.span.clone()
        } else {
            declaration_span(node, &file.content)
        },
        removal: removal_of(file, symbol)?,
        keyword: grouped.then(|| group_keyword(node)),
    })
}

impl Operation for MoveSymbol {
    fn validate(&self, ctx: &PlanContext<'_>) -> RefitResult<()> {
        let symbol = self.source_symbol(ctx.workspace)?;
        if !symbol.is_package_level() {
            return Err(RefitError::unsupported(format!(
                "'{}' is a {}; members move together with their type",
                self.symbol, symbol.kind
            )));
        }
        if symbol.shared {
            return Err(RefitError::unsupported(format!(
                "'{}' is declared together with other names in one spec",
                self.symbol
            )));
        }
        if symbol.kind == SymbolKind::Function && matches!(symbol.name.as_str(), "init" | "main") {
            return Err(RefitError::unsupported(format!(
                "func {} cannot be moved",
                symbol.name
            )));
        }
        Ok(())
    }

    fn plan(&self, ctx: &PlanContext<'_>) -> RefitResult<RefactoringPlan> {
        let ws = ctx.workspace;
        let symbol = self.source_symbol(ws)?;
        let from = ws
            .package(&symbol.package)
            .ok_or_else(|| RefitError::not_found(format!("package {}", symbol.package)))?;
        let dest = self.destination(ws, from)?;
        debug!(
            symbol = %symbol.name,
            from = %from.key,
            to = %dest.package,
            file = %dest.file.display(),
            create = dest.create,
            "Planning move"
        );

        let mut builder = PlanBuilder::new(ws, "move_symbol", serde_json::to_value(self)?);
        let source = ws.require_file(&symbol.file)?;
        require_parsable(ws, source)?;

        builder.issues(impact::package_conflicts(ws, &dest.package, &symbol.name, None));

        // A type takes its methods along.
        let mut units: Vec<&Symbol> = vec![symbol];
        if matches!(symbol.kind, SymbolKind::Type | SymbolKind::Interface) {
            units.extend(from.symbols.methods.get(&symbol.name).into_iter().flatten());
        }
        let pieces: Vec<Piece> = units
            .iter()
            .map(|u| piece(ws, u))
            .collect::<RefitResult<_>>()?;

        let moving: BTreeSet<(String, String)> =
            [(from.key.clone(), symbol.name.clone())].into_iter().collect();
        if dest.create {
            builder.create_file(&dest.file, &dest.package, &dest.package_name);
        }
        let mut moved = Vec::new();
        for piece in &pieces {
            let file = ws.require_file(&piece.file)?;
            let relocation = Relocation::new(file, piece.region.clone(), &dest.file, &dest.package)
                .with_moving(moving.clone());
            let body = relocate(&mut builder, &relocation)?;
            moved.push(match piece.keyword {
                Some(keyword) => format!("{} {}\n", keyword, body.trim()),
                None => body,
            });
        }
        let removals = pieces
            .iter()
            .map(|p| (p.file.clone(), p.removal.clone()))
            .collect();
        for (path, span) in merge_removals(ws, removals) {
            builder.delete(&path, span, format!("Remove {}", symbol.name));
        }

        if dest.create {
            for body in moved {
                builder.append_to_new_file(&dest.file, body);
            }
        } else {
            let target = ws.require_file(&dest.file)?;
            require_parsable(ws, target)?;
            let separator = if target.content.ends_with('\n') { "\n" } else { "\n\n" };
            builder.insert(
                &dest.file,
                target.content.len(),
                format!("{}{}", separator, moved.join("\n")),
                format!("Add {}", symbol.name),
            );
        }

        let references = resolver::references(ws, symbol);
        let mut stranded: Vec<Issue> = Vec::new();
        let mut rewritten = 0;
        for reference in &references {
            let inside_moved = pieces.iter().any(|p| {
                p.file == reference.file
                    && p.removal.start <= reference.span.start
                    && reference.span.end <= p.removal.end
            });
            if inside_moved {
                continue;
            }
            rewritten += 1;
            if reference.package == dest.package {
                builder.replace(
                    &reference.file,
                    reference.full_span(),
                    symbol.name.clone(),
                    "Drop qualifier of moved symbol",
                );
                continue;
            }
            if reference.package == from.key && !is_exported(&symbol.name) {
                stranded.push(ws.issue_at(
                    Issue::error(
                        IssueKind::VisibilityLoss,
                        format!(
                            "'{}' is unexported and still used in package {}",
                            symbol.name, from.name
                        ),
                    ),
                    &reference.file,
                    reference.span.start,
                ));
                continue;
            }
            let qualifier = builder.ensure_import(&reference.file, &dest.package);
            if let Some(file) = ws.file(&reference.file) {
                let spelled = reference.qualifier.clone().map(|q| file.text(q));
                if spelled != Some(qualifier.as_str()) {
                    builder.issues(impact::qualifier_conflict(
                        ws,
                        file,
                        reference.span.start,
                        &qualifier,
                    ));
                }
            }
            builder.replace(
                &reference.file,
                reference.full_span(),
                format!("{}.{}", qualifier, symbol.name),
                "Requalify moved symbol",
            );
        }
        if !stranded.is_empty() {
            return Err(RefitError::visibility(
                format!(
                    "moving unexported '{}' would strand {} reference(s)",
                    symbol.name,
                    stranded.len()
                ),
                stranded,
            ));
        }
        builder.count_references(rewritten);
        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::plan_request;
    use crate::operations::tests::{after, apply_plan, file, workspace};
    use pretty_assertions::assert_eq;
    use refit_foundation::{PlanOptions, RefactorRequest};

    fn request(symbol: &str, from: &str, to: &str, create: bool) -> RefactorRequest {
        RefactorRequest::MoveSymbol(MoveSymbol {
            symbol: symbol.into(),
            from_package: from.into(),
            to_package: to.into(),
            create_target: create,
            target_file: None,
        })
    }

    #[test]
    fn test_move_into_new_package() {
        let ws = workspace(&[
            ("p/p.go", "package p\n\nfunc Add(a, b int) int { return a + b }\n"),
            (
                "q/q.go",
                "package q\n\nimport \"example.com/m/p\"\n\nfunc Use() int { return p.Add(1, 2) }\n",
            ),
        ]);
        let ctx = PlanContext::new(&ws, PlanOptions::default());
        let plan = plan_request(&ctx, &request("Add", "p", "example.com/m/r", true)).unwrap();
        assert_eq!(plan.affected_files.len(), 3);
        assert!(plan.impact.errors().next().is_none());

        let files = apply_plan(&ws, &plan);
        assert_eq!(
            file(&files, "r/add.go"),
            "package r\n\nfunc Add(a, b int) int { return a + b }\n"
        );
        assert_eq!(file(&files, "p/p.go"), "package p\n");
        assert_eq!(
            file(&files, "q/q.go"),
            "package q\n\nimport \"example.com/m/r\"\n\nfunc Use() int { return r.Add(1, 2) }\n"
        );
        assert!(after(&ws, &plan).checker_diagnostics().is_empty());
    }

    #[test]
    fn test_move_requalifies_source_and_target_uses() {
        let ws = workspace(&[
            (
                "p/p.go",
                "package p\n\nfunc Double(x int) int { return x * 2 }\n\nfunc Quad(x int) int { return Double(Double(x)) }\n",
            ),
            (
                "r/r.go",
                "package r\n\nimport \"example.com/m/p\"\n\nfunc Eight() int { return p.Double(4) }\n",
            ),
        ]);
        let ctx = PlanContext::new(&ws, PlanOptions::default());
        let plan = plan_request(&ctx, &request("Double", "p", "r", false)).unwrap();
        let files = apply_plan(&ws, &plan);
        assert_eq!(
            file(&files, "p/p.go"),
            "package p\n\nimport \"example.com/m/r\"\n\nfunc Quad(x int) int { return r.Double(r.Double(x)) }\n"
        );
        assert_eq!(
            file(&files, "r/r.go"),
            "package r\n\nfunc Eight() int { return Double(4) }\n\nfunc Double(x int) int { return x * 2 }\n"
        );
        assert_eq!(plan.impact.references, 3);
    }

    #[test]
    fn test_move_unexported_with_source_callers_is_refused() {
        let ws = workspace(&[
            (
                "p/p.go",
                "package p\n\nfunc helper() int { return 1 }\n\nfunc Use() int { return helper() }\n",
            ),
            ("r/r.go", "package r\n"),
        ]);
        let ctx = PlanContext::new(&ws, PlanOptions::default());
        let err = plan_request(&ctx, &request("helper", "p", "r", false)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Visibility);
    }

    #[test]
    fn test_move_into_existing_package_drops_qualifier() {
        let ws = workspace(&[
            ("p/p.go", "package p\n\nconst Limit = 10\n"),
            (
                "r/r.go",
                "package r\n\nimport \"example.com/m/p\"\n\nfunc Cap(n int) bool { return n < p.Limit }\n",
            ),
        ]);
        let ctx = PlanContext::new(&ws, PlanOptions::default());
        let plan = plan_request(&ctx, &request("Limit", "p", "r", false)).unwrap();
        let files = apply_plan(&ws, &plan);
        assert_eq!(
            file(&files, "r/r.go"),
            "package r\n\nfunc Cap(n int) bool { return n < Limit }\n\nconst Limit = 10\n"
        );
    }

    #[test]
    fn test_move_name_clash_and_missing_target() {
        let ws = workspace(&[
            ("p/p.go", "package p\n\nfunc Add() {}\n"),
            ("r/r.go", "package r\n\nfunc Add() {}\n"),
        ]);
        let ctx = PlanContext::new(&ws, PlanOptions::default());
        let err = plan_request(&ctx, &request("Add", "p", "r", false)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let err = plan_request(&ctx, &request("Add", "p", "nowhere", false)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_type_moves_with_methods() {
        let ws = workspace(&[
            (
                "p/p.go",
                "package p\n\ntype Box struct{ N int }\n\nfunc (b Box) Size() int { return b.N }\n",
            ),
            ("r/r.go", "package r\n"),
        ]);
        let ctx = PlanContext::new(&ws, PlanOptions::default());
        let plan = plan_request(&ctx, &request("Box", "p", "r", false)).unwrap();
        let files = apply_plan(&ws, &plan);
        assert_eq!(
            file(&files, "r/r.go"),
            "package r\n\ntype Box struct{ N int }\n\nfunc (b Box) Size() int { return b.N }\n"
        );
        assert_eq!(file(&files, "p/p.go"), "package p\n");
    }
}
