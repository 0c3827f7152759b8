//! Inline a function or method at its call sites.

use super::{declaration_node, lookup_in_file, removal_of, require_parsable};
use crate::builder::PlanBuilder;
use crate::context::{Operation, PlanContext};
use crate::naming::{fresh_name, names_in};
use crate::rewrite::{fit_expression, relocate, text_precedence, Relocation, Replacement};
use refit_ast::purity::is_pure_default;
use refit_ast::syntax::{
    ancestors, enclosing_declaration, indentation, is_statement_container, line_end, line_start,
    reindent, span, statements, text,
};
use refit_ast::{visitor, Node};
use refit_foundation::protocol::requests::{InlineFunction, InlineMethod};
use refit_foundation::{
    Issue, IssueKind, RefactoringPlan, RefitError, RefitResult, Severity, SymbolKind,
};
use refit_workspace::resolver::{self, Reference, ReferenceKind};
use refit_workspace::{LocalKind, SourceFile, Symbol, Target, UseRole, Workspace};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::debug;

/// What a call is replaced with
enum Form {
    /// `return E`: the call becomes `E`
    Expression { region: Range<usize>, values: usize },
    /// No results: the call statement becomes the body's statements
    Statements { region: Option<Range<usize>>, indent: String },
}

struct Callee<'w> {
    symbol: &'w Symbol,
    file: &'w SourceFile,
    form: Form,
    /// Local index per parameter; `None` for blank or unnamed ones
    params: Vec<Option<usize>>,
    receiver: Option<usize>,
    /// Locals declared by the body itself
    own_locals: Vec<usize>,
}

impl Callee<'_> {
    fn region(&self) -> Option<Range<usize>> {
        match &self.form {
            Form::Expression { region, .. } => Some(region.clone()),
            Form::Statements { region, .. } => region.clone(),
        }
    }

    fn use_count(&self, local: usize) -> usize {
        self.file
            .info
            .uses_of_local(local)
            .filter(|u| u.role != UseRole::Declaration)
            .count()
    }

    fn is_written(&self, local: usize) -> bool {
        self.file
            .info
            .uses_of_local(local)
            .any(|u| u.role == UseRole::Write)
    }
}

fn refuse(symbol: &Symbol, why: &str) -> RefitError {
    RefitError::unsupported(format!("cannot inline {}: {}", symbol.qualified_name(), why))
}

/// Check the callee's shape and work out how its body substitutes
fn analyze_callee<'w>(ws: &'w Workspace, symbol: &'w Symbol) -> RefitResult<Callee<'w>> {
    let file = ws.require_file(&symbol.file)?;
    require_parsable(ws, file)?;
    let source = &file.content;
    let decl = declaration_node(file, symbol).ok_or_else(|| refuse(symbol, "declaration not found"))?;
    if decl.child_by_field_name("type_parameters").is_some() {
        return Err(refuse(symbol, "generic functions are not supported"));
    }
    let body = decl
        .child_by_field_name("body")
        .ok_or_else(|| refuse(symbol, "it has no body"))?;
    if symbol.results.iter().any(|r| r.name.is_some()) {
        return Err(refuse(symbol, "named results are not supported"));
    }
    if symbol.params.iter().any(|p| p.variadic) {
        return Err(refuse(symbol, "variadic parameters are not supported"));
    }

    let in_closure = |n: Node<'_>| {
        ancestors(n)
            .take_while(|a| a.id() != body.id())
            .any(|a| a.kind() == "func_literal")
    };
    let blocked = visitor::collect(body, |n| {
        matches!(
            n.kind(),
            "defer_statement" | "goto_statement" | "labeled_statement"
        ) || (n.kind() == "call_expression"
            && n.child_by_field_name("function")
                .map(|f| text(f, source) == "recover")
                .unwrap_or(false))
    });
    if let Some(node) = blocked.iter().find(|n| !in_closure(**n)) {
        return Err(refuse(
            symbol,
            &format!("its body uses {}", node.kind().replace('_', " ")),
        ));
    }
    let itself = resolver::target_of(symbol);
    if file.info.uses_in(span(body)).any(|u| u.target == itself) {
        return Err(refuse(symbol, "it is recursive"));
    }

    let mut stmts = statements(body);
    let returns: Vec<Node<'_>> = visitor::collect(body, |n| n.kind() == "return_statement")
        .into_iter()
        .filter(|n| !in_closure(*n))
        .collect();
    let form = if symbol.results.is_empty() {
        if let Some(last) = stmts.last().copied() {
            if last.kind() == "return_statement" && last.named_child_count() == 0 {
                stmts.pop();
            }
        }
        if returns.len() > usize::from(stmts.len() < statements(body).len()) {
            return Err(refuse(symbol, "it returns early"));
        }
        match (stmts.first(), stmts.last()) {
            (Some(first), Some(last)) => {
                let start = line_start(source, first.start_byte());
                if source[start..first.start_byte()].trim().is_empty() {
                    Form::Statements {
                        region: Some(start..line_end(source, last.end_byte())),
                        indent: indentation(source, first.start_byte()).to_string(),
                    }
                } else {
                    // one-line body
                    Form::Statements {
                        region: Some(first.start_byte()..last.end_byte()),
                        indent: String::new(),
                    }
                }
            }
            _ => Form::Statements {
                region: None,
                indent: String::new(),
            },
        }
    } else {
        let value = match stmts.as_slice() {
            [only] if only.kind() == "return_statement" => only.named_child(0),
            _ => None,
        }
        .ok_or_else(|| refuse(symbol, "its body must be a single return statement"))?;
        let values = value.named_child_count();
        let node = if values == 1 { value.named_child(0).unwrap_or(value) } else { value };
        Form::Expression {
            region: span(node),
            values,
        }
    };

    let function = span(decl);
    let local_of = |kind: LocalKind, name: &str| {
        file.info
            .locals
            .iter()
            .position(|l| l.kind == kind && l.function == function && l.name == name)
    };
    let params = symbol
        .params
        .iter()
        .map(|p| {
            p.name
                .as_deref()
                .filter(|n| *n != "_")
                .and_then(|n| local_of(LocalKind::Param, n))
        })
        .collect();
    let receiver = file
        .info
        .locals
        .iter()
        .position(|l| l.kind == LocalKind::Receiver && l.function == function);
    if let Some(receiver) = receiver {
        let only_selected = file
            .info
            .uses_of_local(receiver)
            .filter(|u| u.role != UseRole::Declaration)
            .all(|u| {
                file.node_at(u.span.clone())
                    .and_then(|n| n.parent().map(|p| (n, p)))
                    .map(|(n, p)| {
                        p.kind() == "selector_expression"
                            && p.child_by_field_name("operand").map(|o| o.id()) == Some(n.id())
                    })
                    .unwrap_or(false)
            });
        if !only_selected {
            return Err(refuse(symbol, "the receiver is used as a value"));
        }
    }
    let own_locals = file
        .info
        .locals_in(span(body))
        .map(|(i, _)| i)
        .collect();

    Ok(Callee {
        symbol,
        file,
        form,
        params,
        receiver,
        own_locals,
    })
}

/// One call of the callee
struct Site<'w> {
    file: &'w SourceFile,
    call: Node<'w>,
    args: Vec<Node<'w>>,
    /// Operand of a method call
    receiver: Option<Node<'w>>,
}

fn site_of<'w>(ws: &'w Workspace, reference: &Reference, method: bool) -> Option<Site<'w>> {
    if reference.kind != ReferenceKind::Call {
        return None;
    }
    let file = ws.file(&reference.file)?;
    let ident = file.node_at(reference.span.clone())?;
    let parent = ident.parent()?;
    let is_field = parent.kind() == "selector_expression"
        && parent.child_by_field_name("field").map(|f| f.id()) == Some(ident.id());
    let (callee, receiver) = match (method, is_field) {
        (true, true) => (parent, parent.child_by_field_name("operand")),
        (false, true) => (parent, None),
        (false, false) => (ident, None),
        (true, false) => return None,
    };
    let call = callee.parent().filter(|c| {
        c.kind() == "call_expression"
            && c.child_by_field_name("function").map(|f| f.id()) == Some(callee.id())
    })?;
    let arguments = call.child_by_field_name("arguments")?;
    let mut cursor = arguments.walk();
    if arguments.children(&mut cursor).any(|c| c.kind() == "...") {
        return None;
    }
    let mut cursor = arguments.walk();
    let args = arguments
        .named_children(&mut cursor)
        .filter(|a| a.kind() != "comment")
        .collect();
    Some(Site {
        file,
        call,
        args,
        receiver,
    })
}

/// The statement a statement-form call must be, alone on its lines
fn call_statement<'w>(site: &Site<'w>) -> Option<Node<'w>> {
    let statement = site
        .call
        .parent()
        .filter(|p| p.kind() == "expression_statement")?;
    let container = statement.parent()?;
    if !is_statement_container(container.kind()) {
        return None;
    }
    let content = &site.file.content;
    let before = &content[line_start(content, statement.start_byte())..statement.start_byte()];
    let after = &content[statement.end_byte()..line_end(content, statement.end_byte())];
    (before.trim().is_empty() && after.trim().is_empty()).then_some(statement)
}

/// Plan the inlining of `symbol` at the call sites `selected` accepts
fn plan_inline(
    ctx: &PlanContext<'_>,
    mut builder: PlanBuilder<'_>,
    symbol: &Symbol,
    selected: impl Fn(&Path) -> bool,
) -> RefitResult<RefactoringPlan> {
    let ws = ctx.workspace;
    let callee = analyze_callee(ws, symbol)?;
    let method = symbol.kind == SymbolKind::Method;
    let references = resolver::references(ws, symbol);
    let severity = if ctx.options.allow_breaking {
        Severity::Warning
    } else {
        Severity::Error
    };
    debug!(
        symbol = %symbol.qualified_name(),
        references = references.len(),
        "Planning inline"
    );

    let mut inlined = 0usize;
    for reference in &references {
        if !selected(&reference.file) {
            continue;
        }
        let Some(site) = site_of(ws, reference, method) else {
            continue;
        };
        if plan_site(ctx, &mut builder, &callee, &site, severity)? {
            inlined += 1;
        }
    }
    if inlined == 0 {
        return Err(RefitError::usage(format!(
            "no call site of {} can be inlined",
            symbol.qualified_name()
        )));
    }
    builder.count_references(inlined);

    let remaining = references.len() - inlined;
    let required_by_interface = method
        && resolver::owner_of(ws, symbol)
            .map(|owner| {
                resolver::interfaces_satisfied_by(ws, owner).iter().any(|iface| {
                    resolver::method_set(ws, &iface.package, &iface.name)
                        .iter()
                        .any(|m| m.name == symbol.name)
                })
            })
            .unwrap_or(false);
    if remaining == 0 && !required_by_interface {
        let file = callee.file;
        builder.delete(
            &file.path,
            removal_of(file, symbol)?,
            format!("Delete inlined {}", symbol.qualified_name()),
        );
    } else {
        builder.issue(ws.issue_at(
            Issue::info(
                IssueKind::Cosmetic,
                format!(
                    "{} is kept: {} reference(s) remain{}",
                    symbol.qualified_name(),
                    remaining,
                    if required_by_interface { " and an interface requires it" } else { "" }
                ),
            ),
            &symbol.file,
            symbol.name_span.start,
        ));
    }
    builder.finish()
}

/// Inline one call; false when the site was skipped with a warning
fn plan_site(
    ctx: &PlanContext<'_>,
    builder: &mut PlanBuilder<'_>,
    callee: &Callee<'_>,
    site: &Site<'_>,
    severity: Severity,
) -> RefitResult<bool> {
    let ws = ctx.workspace;
    let file = site.file;
    let content = &file.content;
    let skip = |builder: &mut PlanBuilder<'_>, why: &str| {
        builder.issue(ws.issue_at(
            Issue::warning(IssueKind::SignatureBreak, format!("call not inlined: {}", why)),
            &file.path,
            site.call.start_byte(),
        ));
    };
    if site.args.len() != callee.params.len() {
        skip(builder, "argument count differs from the parameter count");
        return Ok(false);
    }
    let statement = match callee.form {
        Form::Statements { .. } => match call_statement(site) {
            Some(statement) => Some(statement),
            None => {
                skip(builder, "the call is not a statement of its own");
                return Ok(false);
            }
        },
        Form::Expression { values, .. } if values > 1 => {
            let whole = site
                .call
                .parent()
                .filter(|l| l.kind() == "expression_list" && l.named_child_count() == 1)
                .and_then(|l| l.parent())
                .map(|p| {
                    matches!(
                        p.kind(),
                        "assignment_statement" | "short_var_declaration" | "return_statement"
                    )
                })
                .unwrap_or(false);
            if !whole {
                skip(builder, "multiple results are used as one value");
                return Ok(false);
            }
            None
        }
        Form::Expression { .. } => None,
    };

    let mut taken: BTreeSet<String> = enclosing_declaration(site.call)
        .map(|d| names_in(file, span(d)))
        .unwrap_or_default();
    if let Some(index) = ws.index(&file.package) {
        taken.extend(index.all().map(|s| s.name.clone()));
    }

    let bind_all = statement.is_some();
    let mut locals: BTreeMap<usize, Replacement> = BTreeMap::new();
    let mut bindings: Vec<String> = Vec::new();
    let receiver = callee.receiver.zip(site.receiver).map(|(l, o)| (Some(l), o));
    let pairs = receiver
        .into_iter()
        .chain(callee.params.iter().copied().zip(site.args.iter().copied()));
    for (param, arg) in pairs {
        let arg_text = text(arg, content).to_string();
        let count = param.map(|p| callee.use_count(p)).unwrap_or(0);
        let written = param.map(|p| callee.is_written(p)).unwrap_or(false);
        let pure = is_pure_default(arg, content);
        if bind_all && (written || (!pure && count != 1)) {
            match param {
                Some(p) if count > 0 || written => {
                    let name = fresh_name(&callee.file.info.locals[p].name, |n| taken.contains(n));
                    taken.insert(name.clone());
                    bindings.push(format!("{} := {}", name, arg_text));
                    locals.insert(p, Replacement::name(name));
                }
                _ => bindings.push(format!("_ = {}", arg_text)),
            }
            continue;
        }
        if !pure && count != 1 {
            builder.issue(
                ws.issue_at(
                    Issue::error(
                        IssueKind::SideEffect,
                        format!(
                            "'{}' has side effects and would be evaluated {} time(s) instead of once",
                            arg_text, count
                        ),
                    ),
                    &file.path,
                    arg.start_byte(),
                )
                .with_severity(severity),
            );
        }
        if let Some(p) = param {
            locals.insert(p, Replacement::new(arg_text));
        }
    }

    let mut renames: BTreeMap<usize, String> = BTreeMap::new();
    if bind_all {
        for local in &callee.own_locals {
            let name = &callee.file.info.locals[*local].name;
            if taken.contains(name) {
                let fresh = fresh_name(name, |n| taken.contains(n));
                taken.insert(fresh.clone());
                renames.insert(*local, fresh);
            }
        }
    }

    // Unqualified package names of the callee must not be captured by caller locals.
    if let Some(region) = callee.region() {
        if callee.file.package == file.package {
            for ident in callee.file.info.uses_in(region.clone()) {
                let Target::Package { name, .. } = &ident.target else {
                    continue;
                };
                if ident.qualifier.is_none()
                    && file.info.lookup_local(site.call.start_byte(), name).is_some()
                {
                    builder.issue(ws.issue_at(
                        Issue::error(
                            IssueKind::NameConflict,
                            format!("'{}' is shadowed by a local at the call site", name),
                        ),
                        &file.path,
                        site.call.start_byte(),
                    ));
                }
            }
        }
    }

    let relocated = match callee.region() {
        Some(region) => {
            let relocation = Relocation::new(callee.file, region, &file.path, &file.package)
                .with_locals(locals)
                .with_renames(renames);
            relocate(builder, &relocation)?
        }
        None => String::new(),
    };

    match (&callee.form, statement) {
        (Form::Statements { indent: from, .. }, Some(statement)) => {
            let indent = indentation(content, statement.start_byte());
            let mut text = String::new();
            for binding in &bindings {
                text.push_str(&format!("{}{}\n", indent, binding));
            }
            text.push_str(&reindent(&relocated, from, indent));
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            builder.replace(
                &file.path,
                line_start(content, statement.start_byte())..line_end(content, statement.end_byte()),
                text,
                format!("Inline {}", callee.symbol.qualified_name()),
            );
        }
        _ => {
            let expression = fit_expression(
                file,
                span(site.call),
                &relocated,
                text_precedence(&relocated),
            );
            builder.replace(
                &file.path,
                span(site.call),
                expression,
                format!("Inline {}", callee.symbol.qualified_name()),
            );
        }
    }
    Ok(true)
}

trait InlineFunctionExt {
    fn target<'w>(&self, ws: &'w Workspace) -> RefitResult<&'w Symbol>;
}

impl InlineFunctionExt for InlineFunction {
    fn target<'w>(&self, ws: &'w Workspace) -> RefitResult<&'w Symbol> {
        lookup_in_file(ws, &self.name, Some(SymbolKind::Function), &self.source_file)
    }
}

impl Operation for InlineFunction {
    fn validate(&self, ctx: &PlanContext<'_>) -> RefitResult<()> {
        self.target(ctx.workspace)?;
        for file in &self.target_files {
            ctx.workspace.require_file(file)?;
        }
        Ok(())
    }

    fn plan(&self, ctx: &PlanContext<'_>) -> RefitResult<RefactoringPlan> {
        let ws = ctx.workspace;
        let symbol = self.target(ws)?;
        let targets: BTreeSet<PathBuf> = self.target_files.iter().map(|f| ws.absolute(f)).collect();
        let builder = PlanBuilder::new(ws, "inline_function", serde_json::to_value(self)?);
        plan_inline(ctx, builder, symbol, |path| {
            targets.is_empty() || targets.contains(path)
        })
    }
}

trait InlineMethodExt {
    fn target<'w>(&self, ws: &'w Workspace) -> RefitResult<&'w Symbol>;
}

impl InlineMethodExt for InlineMethod {
    fn target<'w>(&self, ws: &'w Workspace) -> RefitResult<&'w Symbol> {
        let name = format!("{}.{}", self.receiver_type, self.method);
        let symbol = resolver::lookup(ws, &name, Some(SymbolKind::Method), None)?;
        if symbol.in_interface {
            return Err(RefitError::unsupported(format!(
                "{} is an interface method and has no body",
                name
            )));
        }
        Ok(symbol)
    }
}

impl Operation for InlineMethod {
    fn validate(&self, ctx: &PlanContext<'_>) -> RefitResult<()> {
        self.target(ctx.workspace)?;
        if let Some(file) = &self.target_file {
            ctx.workspace.require_file(file)?;
        }
        Ok(())
    }

    fn plan(&self, ctx: &PlanContext<'_>) -> RefitResult<RefactoringPlan> {
        let ws = ctx.workspace;
        let symbol = self.target(ws)?;
        let target = self.target_file.as_ref().map(|f| ws.absolute(f));
        let builder = PlanBuilder::new(ws, "inline_method", serde_json::to_value(self)?);
        plan_inline(ctx, builder, symbol, |path| {
            target.as_deref().map(|t| t == path).unwrap_or(true)
        })
    }
}
