//! Inline a variable or constant: every use becomes the initialiser.

use super::flow::is_mutated_in_place;
use super::{declaration_node, group_of, lookup_in_file, removal_of, require_parsable, spec_count};
use crate::builder::PlanBuilder;
use crate::context::{Operation, PlanContext};
use crate::rewrite::{fit_expression, relocate, text_precedence, Relocation};
use refit_ast::purity::is_pure_default;
use refit_ast::syntax::{declaration_span, line_end, line_start, span, text};
use refit_ast::{visitor, Node};
use refit_foundation::protocol::requests::{InlineConstant, InlineVariable};
use refit_foundation::{
    Issue, IssueKind, RefactoringPlan, RefitError, RefitResult, Severity, SymbolKind,
};
use refit_workspace::resolver;
use refit_workspace::{LocalKind, SourceFile, Symbol, Target, TypeRef, UseRole, Workspace};
use std::collections::BTreeSet;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One identifier to replace
struct Use {
    file: PathBuf,
    /// Qualifier included
    span: Range<usize>,
}

/// A single-name declaration with an initialiser, and its uses
struct Binding<'w> {
    name: String,
    file: &'w SourceFile,
    value: Node<'w>,
    type_node: Option<Node<'w>>,
    removal: Range<usize>,
    uses: Vec<Use>,
    constant: bool,
    package_level: bool,
}

fn refuse(name: &str, why: &str) -> RefitError {
    RefitError::unsupported(format!("cannot inline '{}': {}", name, why))
}

/// Declared type and single initialiser of a one-name declaration
fn declaration_parts<'f>(name: &str, spec: Node<'f>) -> RefitResult<(Option<Node<'f>>, Node<'f>)> {
    let (names, values) = match spec.kind() {
        "short_var_declaration" => (
            spec.child_by_field_name("left").map(|l| l.named_child_count()).unwrap_or(0),
            spec.child_by_field_name("right"),
        ),
        "var_spec" | "const_spec" => {
            let mut cursor = spec.walk();
            let names = spec.children_by_field_name("name", &mut cursor).count();
            (names, spec.child_by_field_name("value"))
        }
        _ => return Err(refuse(name, "it is not declared by a var, const or := statement")),
    };
    if names != 1 {
        return Err(refuse(name, "it is declared alongside other names"));
    }
    let values = values.ok_or_else(|| refuse(name, "it has no initialiser"))?;
    let value = match values.named_child_count() {
        1 => values.named_child(0),
        _ => None,
    }
    .ok_or_else(|| refuse(name, "its initialiser is not a single expression"))?;
    Ok((spec.child_by_field_name("type"), value))
}

/// Lines of a local declaration statement, or of its spec inside a group
fn local_removal(name: &str, file: &SourceFile, spec: Node<'_>) -> RefitResult<Range<usize>> {
    let content = &file.content;
    let statement = match spec.kind() {
        "short_var_declaration" => spec,
        _ => match group_of(spec) {
            Some(group) if spec_count(group) > 1 => return Ok(declaration_span(spec, content)),
            Some(group) => group,
            None => spec,
        },
    };
    let start = line_start(content, statement.start_byte());
    let end = line_end(content, statement.end_byte());
    let alone = content[start..statement.start_byte()].trim().is_empty()
        && content[statement.end_byte()..end].trim().is_empty();
    if !alone {
        return Err(refuse(name, "its declaration shares a line with other code"));
    }
    Ok(start..end)
}

/// Refuse uses that write the variable or observe its identity
fn check_use(
    name: &str,
    file: &SourceFile,
    span: Range<usize>,
    role: UseRole,
    type_ref: Option<&TypeRef>,
) -> RefitResult<()> {
    if role == UseRole::Write {
        return Err(refuse(name, "it is reassigned"));
    }
    let address_taken = file
        .node_at(span.clone())
        .and_then(|n| n.parent())
        .filter(|p| p.kind() == "unary_expression")
        .and_then(|p| p.child_by_field_name("operator"))
        .map(|op| text(op, &file.content) == "&")
        .unwrap_or(false);
    if address_taken {
        return Err(refuse(name, "its address is taken"));
    }
    if is_mutated_in_place(file, span, type_ref) {
        return Err(refuse(name, "it is mutated in place"));
    }
    Ok(())
}

fn uses_iota(file: &SourceFile, value: Node<'_>) -> bool {
    file.info
        .uses_in(span(value))
        .any(|u| u.name == "iota" && matches!(u.target, Target::Builtin | Target::Unresolved))
}

/// Binding for a variable or constant declared inside a function
fn local_binding<'w>(
    file: &'w SourceFile,
    index: usize,
    constant: bool,
    selected: &dyn Fn(&Path) -> bool,
) -> RefitResult<Binding<'w>> {
    let local = &file.info.locals[index];
    let name = &local.name;
    let spec = file
        .node_at(local.span.clone())
        .and_then(|n| {
            refit_ast::syntax::ancestors(n).find(|a| {
                matches!(a.kind(), "short_var_declaration" | "var_spec" | "const_spec")
            })
        })
        .ok_or_else(|| refuse(name, "its declaration was not found"))?;
    let (type_node, value) = declaration_parts(name, spec)?;
    let mut uses = Vec::new();
    for ident in file.info.uses_of_local(index) {
        if ident.role == UseRole::Declaration {
            continue;
        }
        check_use(name, file, ident.span.clone(), ident.role, local.type_ref.as_ref())?;
        uses.push(Use {
            file: file.path.clone(),
            span: ident.span.clone(),
        });
    }
    if !selected(&file.path) {
        uses.clear();
    }
    Ok(Binding {
        name: name.clone(),
        file,
        value,
        type_node,
        removal: local_removal(name, file, spec)?,
        uses,
        constant,
        package_level: false,
    })
}

/// Binding for a package-level variable or constant
fn package_binding<'w>(
    ws: &'w Workspace,
    symbol: &'w Symbol,
    selected: &dyn Fn(&Path) -> bool,
) -> RefitResult<(Binding<'w>, usize)> {
    let name = &symbol.name;
    if symbol.shared {
        return Err(refuse(name, "it is declared alongside other names"));
    }
    let file = ws.require_file(&symbol.file)?;
    let declaration = declaration_node(file, symbol)
        .ok_or_else(|| refuse(name, "its declaration was not found"))?;
    let spec = visitor::find_first(declaration, |n| matches!(n.kind(), "var_spec" | "const_spec"))
        .ok_or_else(|| refuse(name, "its declaration was not found"))?;
    let (type_node, value) = declaration_parts(name, spec)?;

    let references = resolver::references(ws, symbol);
    let mut uses = Vec::new();
    for reference in &references {
        let site = ws.require_file(&reference.file)?;
        let role = match reference.kind {
            resolver::ReferenceKind::Write => UseRole::Write,
            _ => UseRole::Read,
        };
        check_use(name, site, reference.full_span(), role, symbol.type_ref.as_ref())?;
        if selected(&reference.file) {
            uses.push(Use {
                file: reference.file.clone(),
                span: reference.full_span(),
            });
        }
    }
    let binding = Binding {
        name: name.clone(),
        file,
        value,
        type_node,
        removal: removal_of(file, symbol)?,
        uses,
        constant: symbol.kind == SymbolKind::Constant,
        package_level: true,
    };
    Ok((binding, references.len()))
}

/// `T(value)` when the declaration names a type, so the use keeps it
fn converted(ty: &str, value: &str) -> String {
    if ty.starts_with('*') || ty.starts_with("<-") || ty.starts_with("func") {
        format!("({})({})", ty, value)
    } else {
        format!("{}({})", ty, value)
    }
}

fn plan_binding(
    ctx: &PlanContext<'_>,
    mut builder: PlanBuilder<'_>,
    binding: Binding<'_>,
    total_uses: usize,
) -> RefitResult<RefactoringPlan> {
    let ws = ctx.workspace;
    let source = binding.file;
    require_parsable(ws, source)?;
    let value_span = span(binding.value);
    if binding.constant && uses_iota(source, binding.value) {
        return Err(refuse(&binding.name, "its value depends on iota"));
    }
    if binding.uses.is_empty() && total_uses > 0 {
        return Err(RefitError::usage(format!(
            "'{}' has no uses in the selected files",
            binding.name
        )));
    }
    debug!(
        name = %binding.name,
        uses = binding.uses.len(),
        total = total_uses,
        "Planning inline of a value"
    );

    let pure = binding.constant || is_pure_default(binding.value, &source.content);
    if !pure && (binding.package_level || total_uses != 1) {
        let message = if binding.package_level {
            format!(
                "the initialiser of '{}' has side effects and would run at every use instead of once at package initialisation",
                binding.name
            )
        } else {
            format!(
                "the initialiser of '{}' has side effects and would be evaluated {} time(s) instead of once",
                binding.name, total_uses
            )
        };
        let severity = if ctx.options.allow_breaking {
            Severity::Warning
        } else {
            Severity::Error
        };
        builder.issue(
            ws.issue_at(Issue::error(IssueKind::SideEffect, message), &source.path, value_span.start)
                .with_severity(severity),
        );
    }

    let captured_locals: Vec<(usize, &str)> = source
        .info
        .uses_in(value_span.clone())
        .filter_map(|u| match u.target {
            Target::Local(index) => Some((index, u.name.as_str())),
            _ => None,
        })
        .collect();
    let package_names: BTreeSet<&str> = source
        .info
        .uses_in(value_span.clone())
        .filter(|u| u.qualifier.is_none() && matches!(u.target, Target::Package { .. }))
        .map(|u| u.name.as_str())
        .collect();

    for site in &binding.uses {
        let file = ws.require_file(&site.file)?;
        for (index, name) in &captured_locals {
            if file.info.lookup_local(site.span.start, name) != Some(*index) {
                builder.issue(ws.issue_at(
                    Issue::error(
                        IssueKind::NameConflict,
                        format!("'{}' from the initialiser is shadowed at this use", name),
                    ),
                    &file.path,
                    site.span.start,
                ));
            }
            let reassigned = source.info.uses_of_local(*index).any(|u| {
                u.role == UseRole::Write && u.span.start > value_span.end && u.span.start < site.span.start
            });
            if reassigned {
                return Err(refuse(
                    &binding.name,
                    &format!("'{}' is reassigned between the declaration and a use", name),
                ));
            }
        }
        for name in &package_names {
            if file.info.lookup_local(site.span.start, name).is_some() {
                builder.issue(ws.issue_at(
                    Issue::error(
                        IssueKind::NameConflict,
                        format!("'{}' from the initialiser is shadowed by a local at this use", name),
                    ),
                    &file.path,
                    site.span.start,
                ));
            }
        }

        let value = relocate(
            &mut builder,
            &Relocation::new(source, value_span.clone(), &file.path, &file.package),
        )?;
        let value = match binding.type_node {
            Some(ty) => {
                let ty = relocate(
                    &mut builder,
                    &Relocation::new(source, span(ty), &file.path, &file.package),
                )?;
                converted(&ty, &value)
            }
            None => value,
        };
        let replacement = fit_expression(file, site.span.clone(), &value, text_precedence(&value));
        builder.replace(
            &file.path,
            site.span.clone(),
            replacement,
            format!("Inline {}", binding.name),
        );
    }
    builder.count_references(binding.uses.len());

    if binding.uses.len() == total_uses {
        builder.delete(
            &source.path,
            binding.removal.clone(),
            format!("Delete inlined {}", binding.name),
        );
    } else {
        builder.issue(ws.issue_at(
            Issue::info(
                IssueKind::Cosmetic,
                format!(
                    "'{}' is kept: {} use(s) remain outside the selected files",
                    binding.name,
                    total_uses - binding.uses.len()
                ),
            ),
            &source.path,
            value_span.start,
        ));
    }
    builder.finish()
}

/// Locals of `kind` named `name` in `file`, narrowed to `line` when given
fn local_candidates(file: &SourceFile, name: &str, kind: LocalKind, line: Option<u32>) -> Vec<usize> {
    file.info
        .locals
        .iter()
        .enumerate()
        .filter(|(_, l)| l.kind == kind && l.name == name)
        .filter(|(_, l)| line.map(|n| file.position(l.span.start).line == n).unwrap_or(true))
        .map(|(i, _)| i)
        .collect()
}

fn single_local(file: &SourceFile, name: &str, candidates: Vec<usize>) -> RefitResult<Option<usize>> {
    match candidates.as_slice() {
        [] => Ok(None),
        [only] => Ok(Some(*only)),
        _ => Err(RefitError::ambiguous(
            format!("'{}' is declared {} times in {}", name, candidates.len(), file.path.display()),
            candidates
                .iter()
                .map(|i| format!("line {}", file.position(file.info.locals[*i].span.start).line))
                .collect(),
        )),
    }
}

/// Shared driver for both requests
fn plan_value(
    ctx: &PlanContext<'_>,
    builder: PlanBuilder<'_>,
    name: &str,
    source_file: &Path,
    target_files: &[PathBuf],
    local: Option<usize>,
    kind: SymbolKind,
) -> RefitResult<RefactoringPlan> {
    let ws = ctx.workspace;
    let targets: BTreeSet<PathBuf> = target_files.iter().map(|f| ws.absolute(f)).collect();
    let selected = |path: &Path| targets.is_empty() || targets.contains(path);
    let constant = kind == SymbolKind::Constant;
    let (binding, total) = match local {
        Some(index) => {
            let file = ws.require_file(source_file)?;
            let binding = local_binding(file, index, constant, &selected)?;
            let total = file
                .info
                .uses_of_local(index)
                .filter(|u| u.role != UseRole::Declaration)
                .count();
            (binding, total)
        }
        None => {
            let symbol = lookup_in_file(ws, name, Some(kind), source_file)?;
            package_binding(ws, symbol, &selected)?
        }
    };
    plan_binding(ctx, builder, binding, total)
}

trait InlineVariableExt {
    fn local(&self, ws: &Workspace) -> RefitResult<Option<usize>>;
}

impl InlineVariableExt for InlineVariable {
    fn local(&self, ws: &Workspace) -> RefitResult<Option<usize>> {
        let file = ws.require_file(&self.source_file)?;
        let candidates = local_candidates(file, &self.name, LocalKind::Var, self.line);
        single_local(file, &self.name, candidates)
    }
}

impl Operation for InlineVariable {
    fn validate(&self, ctx: &PlanContext<'_>) -> RefitResult<()> {
        let ws = ctx.workspace;
        if self.local(ws)?.is_none() {
            lookup_in_file(ws, &self.name, Some(SymbolKind::Variable), &self.source_file)?;
        }
        Ok(())
    }

    fn plan(&self, ctx: &PlanContext<'_>) -> RefitResult<RefactoringPlan> {
        let ws = ctx.workspace;
        let builder = PlanBuilder::new(ws, "inline_variable", serde_json::to_value(self)?);
        plan_value(
            ctx,
            builder,
            &self.name,
            &self.source_file,
            &self.target_files,
            self.local(ws)?,
            SymbolKind::Variable,
        )
    }
}

trait InlineConstantExt {
    fn local(&self, ws: &Workspace) -> RefitResult<Option<usize>>;
}

impl InlineConstantExt for InlineConstant {
    fn local(&self, ws: &Workspace) -> RefitResult<Option<usize>> {
        let file = ws.require_file(&self.source_file)?;
        let candidates = local_candidates(file, &self.name, LocalKind::Const, None);
        single_local(file, &self.name, candidates)
    }
}

impl Operation for InlineConstant {
    fn validate(&self, ctx: &PlanContext<'_>) -> RefitResult<()> {
        let ws = ctx.workspace;
        if self.local(ws)?.is_none() {
            lookup_in_file(ws, &self.name, Some(SymbolKind::Constant), &self.source_file)?;
        }
        Ok(())
    }

    fn plan(&self, ctx: &PlanContext<'_>) -> RefitResult<RefactoringPlan> {
        let ws = ctx.workspace;
        let builder = PlanBuilder::new(ws, "inline_constant", serde_json::to_value(self)?);
        plan_value(
            ctx,
            builder,
            &self.name,
            &self.source_file,
            &self.target_files,
            self.local(ws)?,
            SymbolKind::Constant,
        )
    }
}
