//! One module per refactoring kind, plus the lookups they share.

pub mod change_signature;
pub mod extract_function;
pub mod extract_interface;
pub mod extract_variable;
mod flow;
pub mod inline_function;
pub mod inline_variable;
pub mod move_symbol;
pub mod rename;
pub mod safe_delete;

use refit_ast::syntax::{declaration_span, removal_span, span};
use refit_ast::Node;
use refit_foundation::protocol::requests::SourcePosition;
use refit_foundation::{RefitError, RefitResult, SymbolKind};
use refit_workspace::{resolver, SourceFile, Symbol, Workspace};
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Resolve `name` inside the package owning `file`
pub(crate) fn lookup_in_file<'w>(
    ws: &'w Workspace,
    name: &str,
    kind: Option<SymbolKind>,
    file: &Path,
) -> RefitResult<&'w Symbol> {
    let package = ws
        .package_of(file)
        .ok_or_else(|| RefitError::not_found(format!("file {}", file.display())))?;
    resolver::lookup(ws, name, kind, Some(&package.key))
}

/// Syntax node whose span is exactly the symbol's removable unit
pub(crate) fn declaration_node<'f>(file: &'f SourceFile, symbol: &Symbol) -> Option<Node<'f>> {
    let mut node = file.node_at(symbol.span.clone())?;
    while span(node) != symbol.span {
        node = node.parent()?;
    }
    Some(node)
}

/// Whole declaration containing a grouped spec
pub(crate) fn group_of(node: Node<'_>) -> Option<Node<'_>> {
    refit_ast::syntax::enclosing(
        node,
        &["var_declaration", "const_declaration", "type_declaration"],
    )
    .filter(|d| d.id() != node.id())
}

pub(crate) fn spec_count(decl: Node<'_>) -> usize {
    let mut count = 0;
    let mut stack = vec![decl];
    while let Some(n) = stack.pop() {
        let mut cursor = n.walk();
        for child in n.named_children(&mut cursor) {
            match child.kind() {
                "var_spec" | "const_spec" | "type_spec" | "type_alias" => count += 1,
                "var_spec_list" => stack.push(child),
                _ => {}
            }
        }
    }
    count
}

/// Bytes to delete when removing a symbol's declaration, doc comment included.
///
/// A spec inside a group loses only its own lines unless it is the last
/// spec, in which case the whole group goes.
pub(crate) fn removal_of(file: &SourceFile, symbol: &Symbol) -> RefitResult<Range<usize>> {
    let node = declaration_node(file, symbol).ok_or_else(|| {
        RefitError::unsupported(format!("cannot locate declaration of '{}'", symbol.name))
    })?;
    if symbol.grouped {
        if let Some(group) = group_of(node) {
            if spec_count(group) <= 1 {
                return Ok(removal_span(group, &file.content));
            }
        }
        return Ok(declaration_span(node, &file.content));
    }
    Ok(removal_span(node, &file.content))
}

/// Removal spans per file, adjacent or overlapping ones joined.
///
/// A join that runs to the end of the file also takes the blank line the
/// first removal left above it.
pub(crate) fn merge_removals(
    ws: &Workspace,
    mut spans: Vec<(PathBuf, Range<usize>)>,
) -> Vec<(PathBuf, Range<usize>)> {
    spans.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.start.cmp(&b.1.start)));
    let mut merged: Vec<(PathBuf, Range<usize>, bool)> = Vec::new();
    for (path, span) in spans {
        match merged.last_mut() {
            Some((last_path, last, joined)) if *last_path == path && span.start <= last.end => {
                last.end = last.end.max(span.end);
                *joined = true;
            }
            _ => merged.push((path, span, false)),
        }
    }
    merged
        .into_iter()
        .map(|(path, mut span, joined)| {
            if let Some(file) = ws.file(&path) {
                if joined
                    && span.end == file.content.len()
                    && file.content[..span.start].ends_with("\n\n")
                {
                    span.start -= 1;
                }
            }
            (path, span)
        })
        .collect()
}

/// Keyword introducing a grouped spec's declaration
pub(crate) fn group_keyword(node: Node<'_>) -> &'static str {
    match group_of(node).map(|g| g.kind()) {
        Some("const_declaration") => "const",
        Some("type_declaration") => "type",
        _ => "var",
    }
}

/// Byte range of whole lines `start..=end` (1-based)
pub(crate) fn line_span(file: &SourceFile, start: u32, end: u32) -> RefitResult<Range<usize>> {
    let from = file.lines.line_start(start).ok_or_else(|| {
        RefitError::usage(format!("line {} is past the end of {}", start, file.path.display()))
    })?;
    let to = file.lines.line_end(end).ok_or_else(|| {
        RefitError::usage(format!("line {} is past the end of {}", end, file.path.display()))
    })?;
    Ok(from..to)
}

pub(crate) fn offset_of(file: &SourceFile, position: SourcePosition) -> RefitResult<usize> {
    file.lines
        .offset(position.line, position.column)
        .ok_or_else(|| {
            RefitError::usage(format!(
                "position {}:{} is outside {}",
                position.line,
                position.column,
                file.path.display()
            ))
        })
}

/// Refuse plans that would edit a file the parser could not read
pub(crate) fn require_parsable(ws: &Workspace, file: &SourceFile) -> RefitResult<()> {
    if file.is_parsable() {
        return Ok(());
    }
    Err(RefitError::from_issues(vec![ws.issue_at(
        refit_foundation::Issue::error(
            refit_foundation::IssueKind::UnparsableFile,
            "file has syntax errors and cannot be refactored",
        ),
        &file.path,
        file.syntax_errors.first().map(|e| e.start).unwrap_or(0),
    )]))
}

#[cfg(test)]
pub(crate) mod tests {
    use refit_foundation::{apply_changes, Change, ChangeKind, PlanOptions, RefactoringPlan};
    use refit_workspace::Workspace;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    pub(crate) fn workspace(files: &[(&str, &str)]) -> Workspace {
        let sources: BTreeMap<PathBuf, String> = files
            .iter()
            .map(|(p, c)| (PathBuf::from(p), c.to_string()))
            .collect();
        Workspace::from_sources("/ws", Some("example.com/m"), sources)
    }

    pub(crate) fn options() -> PlanOptions {
        PlanOptions::default()
    }

    /// New content of every file the plan touches
    pub(crate) fn apply_plan(ws: &Workspace, plan: &RefactoringPlan) -> BTreeMap<PathBuf, String> {
        let mut out = BTreeMap::new();
        for (path, changes) in plan.changes_by_file() {
            let original = if changes.iter().any(|c| c.kind == ChangeKind::CreateFile) {
                String::new()
            } else {
                ws.file(path).map(|f| f.content.clone()).unwrap_or_default()
            };
            let refs: Vec<&Change> = changes.to_vec();
            out.insert(path.to_path_buf(), apply_changes(&original, &refs).unwrap());
        }
        out
    }

    /// Workspace after the plan, for checker assertions
    pub(crate) fn after(ws: &Workspace, plan: &RefactoringPlan) -> Workspace {
        let overlay: BTreeMap<PathBuf, Option<String>> = apply_plan(ws, plan)
            .into_iter()
            .map(|(p, c)| (p, Some(c)))
            .collect();
        ws.with_overlay(&overlay)
    }

    pub(crate) fn file<'a>(files: &'a BTreeMap<PathBuf, String>, path: &str) -> &'a str {
        files
            .get(&PathBuf::from("/ws").join(path))
            .map(String::as_str)
            .unwrap_or_else(|| panic!("{} not in plan", path))
    }
}
