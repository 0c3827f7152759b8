//! Source-region relocation and expression substitution.
//!
//! Moving text between files or packages changes what its identifiers
//! resolve to. [`relocate`] rewrites a region so that every identifier the
//! binder resolved keeps resolving to the same definition at the
//! destination: qualifiers are added, re-aliased or dropped, and locals can
//! be substituted with arbitrary expressions (parenthesised where the
//! surrounding operator demands it).

use crate::builder::PlanBuilder;
use refit_ast::syntax::{is_exported, text};
use refit_ast::{parse_go, Node};
use refit_foundation::{Issue, IssueKind, RefitError, RefitResult};
use refit_workspace::{SourceFile, Target, UseRole};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use std::path::Path;

/// Binding strength of primary expressions (operands, calls, selectors)
pub const PRIMARY: u8 = 7;
const UNARY: u8 = 6;

/// Go binary operator precedence, 1 (`||`) to 5 (multiplicative)
pub fn binary_precedence(op: &str) -> u8 {
    match op {
        "||" => 1,
        "&&" => 2,
        "==" | "!=" | "<" | "<=" | ">" | ">=" => 3,
        "+" | "-" | "|" | "^" => 4,
        _ => 5,
    }
}

/// Precedence of an expression node
pub fn precedence(node: Node<'_>, source: &str) -> u8 {
    match node.kind() {
        "binary_expression" => node
            .child_by_field_name("operator")
            .map(|op| binary_precedence(text(op, source)))
            .unwrap_or(1),
        "unary_expression" => UNARY,
        _ => PRIMARY,
    }
}

/// Precedence of free expression text; 0 when it does not parse
pub fn text_precedence(expr: &str) -> u8 {
    let wrapped = format!("package p\nvar _ = {}\n", expr);
    let Ok(tree) = parse_go(&wrapped) else {
        return 0;
    };
    if tree.root_node().has_error() {
        return 0;
    }
    refit_ast::visitor::find_first(tree.root_node(), |n| {
        n.kind() == "expression_list" && n.parent().map(|p| p.kind() == "var_spec").unwrap_or(false)
    })
    .and_then(|list| list.named_child(0))
    .map(|e| precedence(e, &wrapped))
    .unwrap_or(0)
}

/// Whether an expression of precedence `inner` needs parentheses when it
/// replaces `site`.
pub fn needs_parens(site: Node<'_>, inner: u8, source: &str) -> bool {
    if inner >= PRIMARY {
        return false;
    }
    let Some(parent) = site.parent() else {
        return false;
    };
    match parent.kind() {
        "binary_expression" => {
            let outer = precedence(parent, source);
            let is_right = parent
                .child_by_field_name("right")
                .map(|r| r.id() == site.id())
                .unwrap_or(false);
            if is_right {
                inner <= outer
            } else {
                inner < outer
            }
        }
        "unary_expression" => inner <= UNARY,
        "selector_expression" | "index_expression" | "slice_expression"
        | "type_assertion_expression" => parent
            .child_by_field_name("operand")
            .map(|o| o.id() == site.id())
            .unwrap_or(false),
        "call_expression" => parent
            .child_by_field_name("function")
            .map(|f| f.id() == site.id())
            .unwrap_or(false),
        _ => false,
    }
}

/// `expr` parenthesised when the site requires it
pub fn fit_expression(file: &SourceFile, site: Range<usize>, expr: &str, inner: u8) -> String {
    let wrap = file
        .node_at(site)
        .map(|node| needs_parens(node, inner, &file.content))
        .unwrap_or(inner < PRIMARY);
    if wrap {
        format!("({})", expr)
    } else {
        expr.to_string()
    }
}

/// Text substituted for a local's uses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub text: String,
    pub precedence: u8,
}

impl Replacement {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let precedence = text_precedence(&text);
        Self { text, precedence }
    }

    /// A plain identifier
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            text: name.into(),
            precedence: PRIMARY,
        }
    }
}

/// A region of one file relocated into a file of `dest_package`
pub struct Relocation<'a> {
    pub source: &'a SourceFile,
    pub region: Range<usize>,
    pub dest_file: &'a Path,
    pub dest_package: &'a str,
    /// Locals substituted at their uses (declarations are left alone)
    pub locals: BTreeMap<usize, Replacement>,
    /// Locals renamed at their declaration and every use
    pub renames: BTreeMap<usize, String>,
    /// Package-level symbols that end up in `dest_package` with this plan
    pub moving: BTreeSet<(String, String)>,
}

impl<'a> Relocation<'a> {
    pub fn new(source: &'a SourceFile, region: Range<usize>, dest_file: &'a Path, dest_package: &'a str) -> Self {
        Self {
            source,
            region,
            dest_file,
            dest_package,
            locals: BTreeMap::new(),
            renames: BTreeMap::new(),
            moving: BTreeSet::new(),
        }
    }

    pub fn with_locals(mut self, locals: BTreeMap<usize, Replacement>) -> Self {
        self.locals = locals;
        self
    }

    pub fn with_renames(mut self, renames: BTreeMap<usize, String>) -> Self {
        self.renames = renames;
        self
    }

    pub fn with_moving(mut self, moving: BTreeSet<(String, String)>) -> Self {
        self.moving = moving;
        self
    }
}

/// Rewrite `relocation.region` so it means the same inside the destination.
///
/// Fails with a visibility error when the region names an unexported
/// symbol of a package it is being moved out of.
pub fn relocate(builder: &mut PlanBuilder<'_>, relocation: &Relocation<'_>) -> RefitResult<String> {
    let source = relocation.source;
    let region = relocation.region.clone();
    let content = &source.content;
    let mut edits: Vec<(Range<usize>, String)> = Vec::new();
    let mut handled_qualifiers: BTreeSet<usize> = BTreeSet::new();
    let mut invisible: Vec<Issue> = Vec::new();

    let uses: Vec<_> = source.info.uses_in(region.clone()).collect();
    for ident in &uses {
        match &ident.target {
            Target::Local(index) => {
                if let Some(name) = relocation.renames.get(index) {
                    edits.push((ident.span.clone(), name.clone()));
                    continue;
                }
                if ident.role == UseRole::Declaration {
                    continue;
                }
                if let Some(replacement) = relocation.locals.get(index) {
                    let text = fit_expression(
                        source,
                        ident.span.clone(),
                        &replacement.text,
                        replacement.precedence,
                    );
                    edits.push((ident.span.clone(), text));
                }
            }
            Target::Package { package, name } => {
                if ident.role == UseRole::Declaration {
                    continue;
                }
                let moving = relocation
                    .moving
                    .contains(&(package.clone(), name.clone()));
                let effective = if moving {
                    relocation.dest_package
                } else {
                    package.as_str()
                };
                if let Some(qualifier) = &ident.qualifier {
                    handled_qualifiers.insert(qualifier.start);
                    if effective == relocation.dest_package {
                        edits.push((qualifier.start..ident.span.start, String::new()));
                    } else {
                        let name = builder.ensure_import(relocation.dest_file, effective);
                        edits.push((qualifier.clone(), name));
                    }
                } else if effective != relocation.dest_package {
                    if !is_exported(name) {
                        invisible.push(
                            Issue::error(
                                IssueKind::VisibilityLoss,
                                format!(
                                    "'{}' is unexported in {} and cannot be referenced from {}",
                                    name, effective, relocation.dest_package
                                ),
                            )
                            .at(
                                builder.workspace().relative(&source.path),
                                source.position(ident.span.start),
                            ),
                        );
                        continue;
                    }
                    let qualifier = builder.ensure_import(relocation.dest_file, effective);
                    edits.push((
                        ident.span.start..ident.span.start,
                        format!("{}.", qualifier),
                    ));
                }
            }
            _ => {}
        }
    }

    for ident in &uses {
        let Target::Import(index) = ident.target else {
            continue;
        };
        if handled_qualifiers.contains(&ident.span.start) {
            continue;
        }
        let Some(import) = source.imports.get(index) else {
            continue;
        };
        if import.path == relocation.dest_package {
            let dot = content[ident.span.end..]
                .find('.')
                .map(|i| ident.span.end + i + 1)
                .unwrap_or(ident.span.end);
            edits.push((ident.span.start..dot, String::new()));
            continue;
        }
        let name = builder.ensure_import(relocation.dest_file, &import.path);
        if name != import.name {
            edits.push((ident.span.clone(), name));
        }
    }

    if !invisible.is_empty() {
        return Err(RefitError::visibility(
            format!(
                "relocated code uses {} unexported name(s) of its package",
                invisible.len()
            ),
            invisible,
        ));
    }

    Ok(apply_local_edits(content, region, edits))
}

/// Apply non-overlapping edits to `content[region]`, spans absolute
pub fn apply_local_edits(content: &str, region: Range<usize>, mut edits: Vec<(Range<usize>, String)>) -> String {
    edits.sort_by(|a, b| a.0.start.cmp(&b.0.start).then(a.0.end.cmp(&b.0.end)));
    let mut out = String::with_capacity(region.len());
    let mut cursor = region.start;
    for (span, text) in edits {
        if span.start < cursor || span.end > region.end {
            continue;
        }
        out.push_str(&content[cursor..span.start]);
        out.push_str(&text);
        cursor = span.end;
    }
    out.push_str(&content[cursor..region.end]);
    out
}
