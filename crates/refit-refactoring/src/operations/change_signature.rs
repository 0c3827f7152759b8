//! Change a function's parameter and result lists and update every call.

use super::rename::outside_package;
use super::{declaration_node, lookup_in_file, require_parsable};
use crate::builder::PlanBuilder;
use crate::context::{Operation, PlanContext};
use crate::naming::check_identifier;
use refit_ast::purity::is_trivial;
use refit_ast::syntax::{span, text};
use refit_ast::Node;
use refit_foundation::protocol::requests::{ChangeSignature, ParamSpec};
use refit_foundation::{
    Issue, IssueKind, RefactoringPlan, RefitError, RefitResult, Scope, Severity, SymbolKind,
};
use refit_workspace::resolver::{self, Reference, ReferenceKind};
use refit_workspace::{LocalKind, SourceFile, Symbol, UseRole, Workspace};
use std::collections::BTreeSet;
use tracing::debug;

/// Where a parameter of the new list comes from
#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    Existing(usize),
    Default(String),
}

fn sources(symbol: &Symbol, params: &[ParamSpec]) -> RefitResult<Vec<Source>> {
    let mut seen = BTreeSet::new();
    let mut used = BTreeSet::new();
    let mut out = Vec::with_capacity(params.len());
    for spec in params {
        if spec.name != "_" {
            check_identifier(&spec.name)?;
        }
        if spec.name != "_" && !seen.insert(spec.name.as_str()) {
            return Err(RefitError::usage(format!(
                "parameter '{}' appears twice in the new signature",
                spec.name
            )));
        }
        let existing = match spec.from_index {
            Some(index) if index >= symbol.params.len() => {
                return Err(RefitError::usage(format!(
                    "fromIndex {} is out of range: {} has {} parameter(s)",
                    index,
                    symbol.name,
                    symbol.params.len()
                )))
            }
            Some(index) => Some(index),
            None => symbol
                .params
                .iter()
                .position(|p| p.name.as_deref() == Some(spec.name.as_str())),
        };
        let source = match (existing, &spec.default_value) {
            (Some(index), _) => {
                if !used.insert(index) {
                    return Err(RefitError::usage(format!(
                        "parameter {} of {} is used twice in the new signature",
                        index, symbol.name
                    )));
                }
                Source::Existing(index)
            }
            (None, Some(default)) if !default.trim().is_empty() => Source::Default(default.clone()),
            (None, _) => {
                return Err(RefitError::usage(format!(
                    "new parameter '{}' needs a default value for existing calls",
                    spec.name
                )))
            }
        };
        out.push(source);
    }
    let variadic = symbol.params.iter().position(|p| p.variadic);
    if let Some(variadic) = variadic {
        let kept_last = out.last() == Some(&Source::Existing(variadic));
        if !kept_last {
            return Err(RefitError::unsupported(format!(
                "the variadic parameter of {} must stay last",
                symbol.name
            )));
        }
    }
    Ok(out)
}

/// `a, b int, c string`, consecutive equal types grouped
fn render_params(symbol: &Symbol, params: &[ParamSpec], sources: &[Source]) -> String {
    let mut groups: Vec<(Vec<&str>, String)> = Vec::new();
    for (spec, source) in params.iter().zip(sources) {
        let variadic = matches!(source, Source::Existing(i) if symbol.params[*i].variadic);
        let ty = if variadic && !spec.type_name.starts_with("...") {
            format!("...{}", spec.type_name)
        } else {
            spec.type_name.clone()
        };
        match groups.last_mut() {
            Some((names, last)) if *last == ty && !ty.starts_with("...") => names.push(spec.name.as_str()),
            _ => groups.push((vec![spec.name.as_str()], ty)),
        }
    }
    groups
        .into_iter()
        .map(|(names, ty)| format!("{} {}", names.join(", "), ty))
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_results(types: &[String]) -> String {
    match types {
        [] => String::new(),
        [one] => one.clone(),
        many => format!("({})", many.join(", ")),
    }
}

/// A call of the function, its argument nodes and whether `f(xs...)` spreads
struct Call<'w> {
    file: &'w SourceFile,
    call: Node<'w>,
    arguments: Node<'w>,
    args: Vec<Node<'w>>,
    spread: bool,
}

fn call_of<'w>(ws: &'w Workspace, reference: &Reference) -> Option<Call<'w>> {
    if reference.kind != ReferenceKind::Call {
        return None;
    }
    let file = ws.file(&reference.file)?;
    let ident = file.node_at(reference.span.clone())?;
    let callee = match ident.parent() {
        Some(p)
            if p.kind() == "selector_expression"
                && p.child_by_field_name("field").map(|f| f.id()) == Some(ident.id()) =>
        {
            p
        }
        _ => ident,
    };
    let call = callee.parent().filter(|c| {
        c.kind() == "call_expression"
            && c.child_by_field_name("function").map(|f| f.id()) == Some(callee.id())
    })?;
    let arguments = call.child_by_field_name("arguments")?;
    let mut cursor = arguments.walk();
    let spread = arguments.children(&mut cursor).any(|c| c.kind() == "...");
    let mut cursor = arguments.walk();
    let args = arguments
        .named_children(&mut cursor)
        .filter(|a| a.kind() != "comment")
        .collect();
    Some(Call {
        file,
        call,
        arguments,
        args,
        spread,
    })
}

/// Whether the call's results are used by the surrounding code
fn results_consumed(call: Node<'_>) -> bool {
    !matches!(
        call.parent().map(|p| p.kind()),
        Some("expression_statement" | "go_statement" | "defer_statement")
    )
}

/// Resolution of the function whose signature changes
trait ChangeSignatureExt {
    fn target<'w>(&self, ws: &'w Workspace) -> RefitResult<&'w Symbol>;
}

impl ChangeSignatureExt for ChangeSignature {
    fn target<'w>(&self, ws: &'w Workspace) -> RefitResult<&'w Symbol> {
        let symbol = match &self.receiver_type {
            Some(receiver) => {
                let name = format!("{}.{}", receiver, self.function);
                lookup_in_file(ws, &name, Some(SymbolKind::Method), &self.source_file)?
            }
            None => lookup_in_file(ws, &self.function, None, &self.source_file)?,
        };
        if !matches!(symbol.kind, SymbolKind::Function | SymbolKind::Method) {
            return Err(RefitError::usage(format!(
                "'{}' is a {}, not a function",
                self.function, symbol.kind
            )));
        }
        if symbol.in_interface {
            return Err(RefitError::unsupported(format!(
                "{} is an interface method; change the interface and its implementations separately",
                symbol.qualified_name()
            )));
        }
        Ok(symbol)
    }
}

impl Operation for ChangeSignature {
    fn validate(&self, ctx: &PlanContext<'_>) -> RefitResult<()> {
        let symbol = self.target(ctx.workspace)?;
        sources(symbol, &self.params)?;
        Ok(())
    }

    fn plan(&self, ctx: &PlanContext<'_>) -> RefitResult<RefactoringPlan> {
        let ws = ctx.workspace;
        let symbol = self.target(ws)?;
        let sources = sources(symbol, &self.params)?;
        let file = ws.require_file(&symbol.file)?;
        require_parsable(ws, file)?;
        let decl = declaration_node(file, symbol).ok_or_else(|| {
            RefitError::unsupported(format!("cannot locate declaration of {}", symbol.name))
        })?;
        let parameters = decl
            .child_by_field_name("parameters")
            .ok_or_else(|| RefitError::unsupported("declaration has no parameter list"))?;
        let references = resolver::references(ws, symbol);
        if self.scope == Scope::Package {
            outside_package(ws, symbol, &references)?;
        }
        let severity = if ctx.options.allow_breaking {
            Severity::Warning
        } else {
            Severity::Error
        };

        let old_results: Vec<String> = symbol.results.iter().map(|r| r.type_text.clone()).collect();
        let new_results = self.returns.clone().unwrap_or_else(|| old_results.clone());
        let params_unchanged = sources.len() == symbol.params.len()
            && sources.iter().enumerate().all(|(i, s)| *s == Source::Existing(i))
            && self
                .params
                .iter()
                .zip(&symbol.params)
                .all(|(spec, old)| {
                    old.name.as_deref() == Some(spec.name.as_str()) && old.type_text == spec.type_name
                });
        if params_unchanged && new_results == old_results {
            return Err(RefitError::usage(format!(
                "the signature of {} is unchanged",
                symbol.qualified_name()
            )));
        }
        let arity_changed = new_results.len() != old_results.len();
        debug!(
            function = %symbol.qualified_name(),
            params = self.params.len(),
            references = references.len(),
            arity_changed,
            "Planning signature change"
        );

        let mut builder = PlanBuilder::new(ws, "change_signature", serde_json::to_value(self)?);
        let function = span(decl);
        let param_local = |name: &str| {
            file.info
                .locals
                .iter()
                .position(|l| l.kind == LocalKind::Param && l.function == function && l.name == name)
        };

        // Body: removed parameters must be unused, renamed ones follow their new name.
        let kept: BTreeSet<usize> = sources
            .iter()
            .filter_map(|s| match s {
                Source::Existing(i) => Some(*i),
                Source::Default(_) => None,
            })
            .collect();
        for (index, param) in symbol.params.iter().enumerate() {
            let Some(local) = param.name.as_deref().and_then(param_local) else {
                continue;
            };
            let uses: Vec<_> = file
                .info
                .uses_of_local(local)
                .filter(|u| u.role != UseRole::Declaration)
                .collect();
            if !kept.contains(&index) {
                for u in &uses {
                    builder.issue(ws.issue_at(
                        Issue::error(
                            IssueKind::UnresolvedReference,
                            format!("removed parameter '{}' is still used", u.name),
                        ),
                        &file.path,
                        u.span.start,
                    ));
                }
            }
        }
        for (spec, source) in self.params.iter().zip(&sources) {
            let Source::Existing(index) = source else {
                if param_local(&spec.name).is_none()
                    && file.info.locals.iter().any(|l| l.function == function && l.name == spec.name)
                {
                    builder.issue(ws.issue_at(
                        Issue::error(
                            IssueKind::NameConflict,
                            format!("new parameter '{}' collides with a local of the body", spec.name),
                        ),
                        &file.path,
                        decl.start_byte(),
                    ));
                }
                continue;
            };
            let old = &symbol.params[*index];
            let Some(local) = old.name.as_deref().and_then(param_local) else {
                continue;
            };
            if old.name.as_deref() == Some(spec.name.as_str()) {
                continue;
            }
            let clash = file.info.locals.iter().enumerate().any(|(i, l)| {
                i != local && l.function == function && l.name == spec.name
            });
            if clash {
                builder.issue(ws.issue_at(
                    Issue::error(
                        IssueKind::NameConflict,
                        format!("renamed parameter '{}' collides with another name of the body", spec.name),
                    ),
                    &file.path,
                    decl.start_byte(),
                ));
            }
            for u in file.info.uses_of_local(local) {
                if u.role != UseRole::Declaration {
                    builder.replace(
                        &file.path,
                        u.span.clone(),
                        spec.name.clone(),
                        format!("Rename parameter {} to {}", u.name, spec.name),
                    );
                }
            }
        }

        builder.replace(
            &file.path,
            span(parameters),
            format!("({})", render_params(symbol, &self.params, &sources)),
            format!("Rewrite parameters of {}", symbol.qualified_name()),
        );
        if new_results != old_results {
            if symbol.results.iter().any(|r| r.name.is_some()) {
                return Err(RefitError::unsupported(format!(
                    "{} has named results; rename them away before changing the result list",
                    symbol.name
                )));
            }
            let rendered = render_results(&new_results);
            match decl.child_by_field_name("result") {
                Some(result) if rendered.is_empty() => builder.delete(
                    &file.path,
                    parameters.end_byte()..result.end_byte(),
                    format!("Drop results of {}", symbol.qualified_name()),
                ),
                Some(result) => builder.replace(
                    &file.path,
                    span(result),
                    rendered,
                    format!("Rewrite results of {}", symbol.qualified_name()),
                ),
                None => builder.insert(
                    &file.path,
                    parameters.end_byte(),
                    format!(" {}", rendered),
                    format!("Add results to {}", symbol.qualified_name()),
                ),
            }
            if arity_changed {
                if let Some(body) = decl.child_by_field_name("body") {
                    let returns = refit_ast::visitor::collect(body, |n| n.kind() == "return_statement");
                    for ret in returns {
                        let inside_literal = refit_ast::syntax::enclosing_function(ret)
                            .map(|f| f.id() != decl.id())
                            .unwrap_or(false);
                        if !inside_literal {
                            builder.issue(ws.issue_at(
                                Issue::error(
                                    IssueKind::SignatureBreak,
                                    format!(
                                        "return statement does not match the new result count {}",
                                        new_results.len()
                                    ),
                                ),
                                &file.path,
                                ret.start_byte(),
                            ));
                        }
                    }
                }
            } else {
                builder.issue(ws.issue_at(
                    Issue::warning(
                        IssueKind::TypeCheck,
                        format!("result types of {} change; callers are not retyped", symbol.name),
                    ),
                    &file.path,
                    decl.start_byte(),
                ));
            }
        }

        if symbol.kind == SymbolKind::Method {
            if let Some(owner) = resolver::owner_of(ws, symbol) {
                for interface in resolver::interfaces_satisfied_by(ws, owner) {
                    let required = resolver::method_set(ws, &interface.package, &interface.name)
                        .iter()
                        .any(|m| m.name == symbol.name);
                    if required {
                        builder.issue(ws.issue_at(
                            Issue::error(
                                IssueKind::SignatureBreak,
                                format!(
                                    "{} would no longer satisfy interface {}",
                                    owner.name, interface.name
                                ),
                            ),
                            &interface.file,
                            interface.name_span.start,
                        ));
                    }
                }
            }
        }

        let mut calls = 0usize;
        let mut breaking = 0usize;
        let fixed = symbol.params.iter().filter(|p| !p.variadic).count();
        for reference in &references {
            let Some(call) = call_of(ws, reference) else {
                if reference.kind != ReferenceKind::Call {
                    builder.issue(
                        ws.issue_at(
                            Issue::error(
                                IssueKind::SignatureBreak,
                                format!("{} is used as a value and its type changes", symbol.name),
                            ),
                            &reference.file,
                            reference.span.start,
                        )
                        .with_severity(severity),
                    );
                    breaking += 1;
                }
                continue;
            };
            let content = &call.file.content;
            let spreads_variadic = call.spread && fixed < symbol.params.len();
            if call.args.len() < fixed || (call.spread && !spreads_variadic) {
                builder.issue(ws.issue_at(
                    Issue::warning(
                        IssueKind::SignatureBreak,
                        "call arguments do not line up with the parameters; left unchanged",
                    ),
                    &call.file.path,
                    call.call.start_byte(),
                ));
                breaking += 1;
                continue;
            }
            let arg_text = |index: usize| -> String {
                if symbol.params[index].variadic {
                    let rest: Vec<&str> = call.args[index..].iter().map(|a| text(*a, content)).collect();
                    let joined = rest.join(", ");
                    if call.spread {
                        format!("{}...", joined)
                    } else {
                        joined
                    }
                } else {
                    text(call.args[index], content).to_string()
                }
            };
            let mut site_breaks = false;
            for (index, param) in symbol.params.iter().enumerate() {
                if kept.contains(&index) || param.variadic {
                    continue;
                }
                let Some(arg) = call.args.get(index) else {
                    continue;
                };
                if !is_trivial(*arg, content) {
                    builder.issue(
                        ws.issue_at(
                            Issue::error(
                                IssueKind::SignatureBreak,
                                format!(
                                    "argument '{}' for removed parameter is dropped",
                                    text(*arg, content)
                                ),
                            ),
                            &call.file.path,
                            arg.start_byte(),
                        )
                        .with_severity(severity),
                    );
                    site_breaks = true;
                }
            }
            if arity_changed && results_consumed(call.call) {
                builder.issue(
                    ws.issue_at(
                        Issue::error(
                            IssueKind::SignatureBreak,
                            format!(
                                "caller uses {} result(s) of {}; it now returns {}",
                                old_results.len(),
                                symbol.name,
                                new_results.len()
                            ),
                        ),
                        &call.file.path,
                        call.call.start_byte(),
                    )
                    .with_severity(severity),
                );
                site_breaks = true;
            }
            let args: Vec<String> = sources
                .iter()
                .map(|source| match source {
                    Source::Existing(index) => arg_text(*index),
                    Source::Default(default) => default.clone(),
                })
                .filter(|a| !a.is_empty())
                .collect();
            builder.replace(
                &call.file.path,
                span(call.arguments),
                format!("({})", args.join(", ")),
                format!("Update call of {}", symbol.qualified_name()),
            );
            calls += 1;
            if site_breaks {
                breaking += 1;
            }
        }
        builder.count_references(calls);
        builder.count_breaking_callers(breaking);
        builder.finish()
    }
}
