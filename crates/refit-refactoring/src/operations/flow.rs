//! Statement ranges and the data and control flow crossing their borders.

use refit_ast::syntax::{
    ancestors, enclosing_declaration, enclosing_function, indentation, is_statement_container,
    line_end, line_start, span, statements, text,
};
use refit_ast::{visitor, Node};
use refit_foundation::{RefitError, RefitResult};
use refit_workspace::{LocalKind, SourceFile, Target, TypeRef, UseRole};
use std::collections::BTreeSet;
use std::ops::Range;

/// Consecutive sibling statements of one block
pub(crate) struct Selection<'f> {
    pub file: &'f SourceFile,
    pub statements: Vec<Node<'f>>,
    pub span: Range<usize>,
    pub function: Node<'f>,
    pub declaration: Node<'f>,
}

impl<'f> Selection<'f> {
    fn new(file: &'f SourceFile, selected: Vec<Node<'f>>) -> RefitResult<Self> {
        let (Some(first), Some(last)) = (selected.first().copied(), selected.last().copied())
        else {
            return Err(RefitError::unsupported("selection holds no statements"));
        };
        let function = enclosing_function(first)
            .ok_or_else(|| RefitError::unsupported("selection is not inside a function body"))?;
        let declaration = enclosing_declaration(first)
            .ok_or_else(|| RefitError::unsupported("selection is not inside a function body"))?;
        Ok(Self {
            file,
            span: first.start_byte()..last.end_byte(),
            statements: selected,
            function,
            declaration,
        })
    }

    /// Whole lines holding the selected statements
    pub fn lines(&self) -> Range<usize> {
        let content = &self.file.content;
        line_start(content, self.span.start)..line_end(content, self.span.end)
    }

    pub fn indent(&self) -> &'f str {
        indentation(&self.file.content, self.span.start)
    }

    pub fn contains(&self, range: &Range<usize>) -> bool {
        self.span.start <= range.start && range.end <= self.span.end
    }

    /// Inside a function literal that is itself part of the selection
    pub fn in_closure(&self, node: Node<'_>) -> bool {
        ancestors(node)
            .take_while(|a| self.contains(&span(*a)))
            .any(|a| a.kind() == "func_literal")
    }

    pub fn ends_with_return(&self) -> bool {
        self.statements
            .last()
            .map(|s| s.kind() == "return_statement")
            .unwrap_or(false)
    }

    /// Nodes of the selected statements matching `predicate`, closures excluded
    pub fn nodes(&self, predicate: impl Fn(Node<'f>) -> bool + Copy) -> Vec<Node<'f>> {
        self.statements
            .iter()
            .flat_map(|s| visitor::collect(*s, predicate))
            .filter(|n| !self.in_closure(*n))
            .collect()
    }
}

fn is_filler(text: &str) -> bool {
    text.lines().all(|line| {
        let line = line.trim().trim_matches(';').trim();
        line.is_empty() || line.starts_with("//")
    })
}

/// Statements exactly covered by a byte range (surrounding blanks ignored)
pub(crate) fn select_range(file: &SourceFile, range: Range<usize>) -> RefitResult<Selection<'_>> {
    let content = &file.content;
    let slice = &content[range.clone()];
    let start = range.start + (slice.len() - slice.trim_start().len());
    let end = range.start + slice.trim_end().len();
    if start >= end {
        return Err(RefitError::usage("selection is empty"));
    }
    let node = file
        .root()
        .descendant_for_byte_range(start, end)
        .ok_or_else(|| RefitError::usage("selection is outside the file"))?;
    let container = std::iter::once(node)
        .chain(ancestors(node))
        .find(|n| is_statement_container(n.kind()))
        .ok_or_else(|| RefitError::unsupported("selection is not inside a function body"))?;
    let selected: Vec<Node<'_>> = statements(container)
        .into_iter()
        .filter(|s| s.end_byte() > start && s.start_byte() < end)
        .collect();
    let aligned = match (selected.first(), selected.last()) {
        (Some(first), Some(last)) => {
            first.start_byte() >= start
                && last.end_byte() <= end
                && is_filler(&content[start..first.start_byte()])
                && is_filler(&content[last.end_byte()..end])
        }
        _ => false,
    };
    if !aligned {
        return Err(RefitError::unsupported(
            "selection must cover whole statements of one block",
        ));
    }
    Selection::new(file, selected)
}

/// Statements that never transfer control and can be fenced into a run
fn is_simple(node: Node<'_>) -> bool {
    matches!(
        node.kind(),
        "expression_statement"
            | "send_statement"
            | "inc_statement"
            | "dec_statement"
            | "assignment_statement"
            | "short_var_declaration"
            | "var_declaration"
            | "const_declaration"
            | "go_statement"
    )
}

/// Blank or comment lines between two statements fence them apart
fn fenced(content: &str, before: Node<'_>, after: Node<'_>) -> bool {
    let gap = &content[before.end_byte()..after.start_byte()];
    gap.matches('\n').count() > 1 || gap.lines().any(|l| l.trim().starts_with("//"))
}

/// The maximal run of simple statements around `offset`, bounded by blank
/// lines, comments, control statements and the block itself
pub(crate) fn select_block(file: &SourceFile, offset: usize) -> RefitResult<Selection<'_>> {
    let node = file
        .root()
        .descendant_for_byte_range(offset, offset)
        .ok_or_else(|| RefitError::usage("position is outside the file"))?;
    let statement = std::iter::once(node)
        .chain(ancestors(node))
        .find(|n| {
            n.parent()
                .map(|p| is_statement_container(p.kind()))
                .unwrap_or(false)
                && refit_ast::syntax::is_statement(*n)
        })
        .ok_or_else(|| RefitError::unsupported("position is not on a statement"))?;
    if !is_simple(statement) {
        return Err(RefitError::unsupported(format!(
            "{} cannot start a block extraction",
            statement.kind().replace('_', " ")
        )));
    }
    let Some(container) = statement.parent() else {
        return Err(RefitError::unsupported("position is not on a statement"));
    };
    let siblings = statements(container);
    let Some(index) = siblings.iter().position(|s| s.id() == statement.id()) else {
        return Err(RefitError::unsupported("position is not on a statement"));
    };
    let content = &file.content;
    let mut first = index;
    while first > 0
        && is_simple(siblings[first - 1])
        && !fenced(content, siblings[first - 1], siblings[first])
    {
        first -= 1;
    }
    let mut last = index;
    while last + 1 < siblings.len()
        && is_simple(siblings[last + 1])
        && !fenced(content, siblings[last], siblings[last + 1])
    {
        last += 1;
    }
    Selection::new(file, siblings[first..=last].to_vec())
}

/// What crosses the borders of a selection
#[derive(Debug, Default)]
pub(crate) struct Flow {
    /// Locals declared before the range that the range reads or assigns
    pub inputs: Vec<usize>,
    /// Locals the range produces for code after it
    pub outputs: Vec<usize>,
    /// Outputs declared inside the range
    pub declared: BTreeSet<usize>,
    /// Return statements of the enclosing function inside the range
    pub returns: Vec<Range<usize>>,
}

impl Flow {
    pub fn has_outer_outputs(&self) -> bool {
        self.outputs.iter().any(|o| !self.declared.contains(o))
    }
}

/// `x += 1`, `x++`: a write that also reads
fn is_compound_write(file: &SourceFile, ident: Range<usize>) -> bool {
    let Some(node) = file.node_at(ident) else {
        return false;
    };
    let Some(parent) = node.parent() else {
        return false;
    };
    match parent.kind() {
        "inc_statement" | "dec_statement" => true,
        "expression_list" => parent
            .parent()
            .filter(|a| a.kind() == "assignment_statement")
            .and_then(|a| a.child_by_field_name("operator"))
            .map(|op| text(op, &file.content) != "=")
            .unwrap_or(false),
        "assignment_statement" => parent
            .child_by_field_name("operator")
            .map(|op| text(op, &file.content) != "=")
            .unwrap_or(false),
        _ => false,
    }
}

/// `v.f = 1`, `arr[i]++`: a value-typed local modified through a selector or index
pub(crate) fn is_mutated_in_place(file: &SourceFile, ident: Range<usize>, type_ref: Option<&TypeRef>) -> bool {
    if matches!(
        type_ref,
        Some(TypeRef::Pointer(_) | TypeRef::Slice(_) | TypeRef::Map { .. } | TypeRef::Chan { .. })
    ) {
        return false;
    }
    let Some(mut current) = file.node_at(ident) else {
        return false;
    };
    let mut through = false;
    while let Some(parent) = current.parent() {
        let is_operand = matches!(parent.kind(), "selector_expression" | "index_expression")
            && parent
                .child_by_field_name("operand")
                .map(|o| o.id() == current.id())
                .unwrap_or(false);
        if !is_operand {
            break;
        }
        through = true;
        current = parent;
    }
    if !through {
        return false;
    }
    let Some(parent) = current.parent() else {
        return false;
    };
    match parent.kind() {
        "inc_statement" | "dec_statement" => true,
        "unary_expression" => parent
            .child_by_field_name("operator")
            .map(|op| text(op, &file.content) == "&")
            .unwrap_or(false),
        "expression_list" => parent
            .parent()
            .filter(|a| a.kind() == "assignment_statement")
            .and_then(|a| a.child_by_field_name("left"))
            .map(|left| left.id() == parent.id())
            .unwrap_or(false),
        _ => false,
    }
}

fn refuse(what: impl Into<String>) -> RefitError {
    RefitError::unsupported(what)
}

/// Jumps that leave the range and statements whose meaning depends on the
/// enclosing function
fn check_control(selection: &Selection<'_>, has_results: bool) -> RefitResult<()> {
    let source = &selection.file.content;
    if selection.declaration.child_by_field_name("type_parameters").is_some() {
        return Err(refuse("extraction from generic functions is not supported"));
    }
    let interesting = |n: Node<'_>| {
        matches!(
            n.kind(),
            "defer_statement"
                | "goto_statement"
                | "labeled_statement"
                | "fallthrough_statement"
                | "break_statement"
                | "continue_statement"
                | "return_statement"
                | "call_expression"
        )
    };
    for node in selection.nodes(interesting) {
        match node.kind() {
            "defer_statement" => {
                return Err(refuse("defer would run when the extracted function returns"))
            }
            "goto_statement" | "labeled_statement" => {
                return Err(refuse("labels and goto cannot be extracted"))
            }
            "fallthrough_statement" => return Err(refuse("fallthrough cannot be extracted")),
            "break_statement" | "continue_statement" => {
                if node.named_child_count() > 0 {
                    return Err(refuse("labeled break or continue cannot be extracted"));
                }
                let loops_only = node.kind() == "continue_statement";
                let target = ancestors(node)
                    .take_while(|a| !matches!(a.kind(), "func_literal" | "function_declaration" | "method_declaration"))
                    .find(|a| {
                        a.kind() == "for_statement"
                            || (!loops_only
                                && matches!(
                                    a.kind(),
                                    "expression_switch_statement"
                                        | "type_switch_statement"
                                        | "select_statement"
                                ))
                    });
                let inside = target
                    .map(|t| selection.contains(&span(t)))
                    .unwrap_or(false);
                if !inside {
                    return Err(refuse(format!(
                        "{} at line {} leaves the selected range",
                        text(node, source),
                        selection.file.position(node.start_byte()).line
                    )));
                }
            }
            "return_statement" => {
                if has_results && node.named_child_count() == 0 {
                    return Err(refuse("bare return with named results cannot be extracted"));
                }
            }
            "call_expression" => {
                let callee = node
                    .child_by_field_name("function")
                    .map(|f| text(f, source))
                    .unwrap_or("");
                if callee == "recover" {
                    return Err(refuse("recover only works in the deferred function itself"));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Compute inputs, outputs and returns of a selection
pub(crate) fn analyze(selection: &Selection<'_>, has_results: bool) -> RefitResult<Flow> {
    check_control(selection, has_results)?;
    let file = selection.file;
    let info = &file.info;

    let mut inputs = BTreeSet::new();
    let mut written = BTreeSet::new();
    let mut declared = BTreeSet::new();
    for ident in info.uses_in(selection.span.clone()) {
        let Target::Local(index) = ident.target else {
            continue;
        };
        let local = &info.locals[index];
        if selection.contains(&local.span) {
            declared.insert(index);
            continue;
        }
        match ident.role {
            UseRole::Declaration => {}
            UseRole::Write => {
                written.insert(index);
                if is_compound_write(file, ident.span.clone()) {
                    inputs.insert(index);
                }
            }
            _ => {
                inputs.insert(index);
                if is_mutated_in_place(file, ident.span.clone(), local.type_ref.as_ref()) {
                    written.insert(index);
                }
                let address_taken = file
                    .node_at(ident.span.clone())
                    .and_then(|n| n.parent())
                    .filter(|p| p.kind() == "unary_expression")
                    .and_then(|p| p.child_by_field_name("operator"))
                    .map(|op| text(op, &file.content) == "&")
                    .unwrap_or(false);
                if address_taken {
                    return Err(refuse(format!(
                        "the range takes the address of '{}', declared outside it",
                        local.name
                    )));
                }
            }
        }
    }
    // Assigned outer locals must exist inside the new function too.
    inputs.extend(written.iter().copied());

    let used_outside = |index: usize| {
        info.uses_of_local(index)
            .any(|u| u.role != UseRole::Declaration && !selection.contains(&u.span))
    };
    let mut outputs: Vec<usize> = Vec::new();
    for index in declared.iter().copied() {
        if used_outside(index) {
            if info.locals[index].kind == LocalKind::Type {
                return Err(refuse(format!(
                    "type '{}' declared in the range is used after it",
                    info.locals[index].name
                )));
            }
            outputs.push(index);
        }
    }
    outputs.extend(written.iter().copied().filter(|i| used_outside(*i)));

    let by_declaration = |a: &usize, b: &usize| info.locals[*a].span.start.cmp(&info.locals[*b].span.start);
    let mut inputs: Vec<usize> = inputs.into_iter().collect();
    inputs.sort_by(by_declaration);
    outputs.sort_by(by_declaration);
    outputs.dedup();
    let declared: BTreeSet<usize> = declared.into_iter().filter(|d| outputs.contains(d)).collect();

    let returns = selection
        .nodes(|n| n.kind() == "return_statement")
        .into_iter()
        .map(span)
        .collect();
    Ok(Flow {
        inputs,
        outputs,
        declared,
        returns,
    })
}

/// Result types of a function declaration or literal, one entry per value
pub(crate) fn result_types(function: Node<'_>, source: &str) -> Vec<String> {
    let Some(result) = function.child_by_field_name("result") else {
        return Vec::new();
    };
    if result.kind() != "parameter_list" {
        return vec![text(result, source).to_string()];
    }
    let mut out = Vec::new();
    let mut cursor = result.walk();
    for param in result.named_children(&mut cursor) {
        if param.kind() != "parameter_declaration" {
            continue;
        }
        let Some(ty) = param.child_by_field_name("type") else {
            continue;
        };
        let mut names = param.walk();
        let count = param.children_by_field_name("name", &mut names).count().max(1);
        for _ in 0..count {
            out.push(text(ty, source).to_string());
        }
    }
    out
}

/// Zero value spelled for a type written as `ty`
pub(crate) fn zero_value(ty: &str, is_struct: impl Fn(&str) -> bool) -> String {
    const NUMERIC: [&str; 17] = [
        "int", "int8", "int16", "int32", "int64", "uint", "uint8", "uint16", "uint32", "uint64",
        "uintptr", "float32", "float64", "complex64", "complex128", "byte", "rune",
    ];
    match ty {
        t if NUMERIC.contains(&t) => "0".to_string(),
        "string" => "\"\"".to_string(),
        "bool" => "false".to_string(),
        "error" | "any" => "nil".to_string(),
        t if t.starts_with('*')
            || t.starts_with("[]")
            || t.starts_with("map[")
            || t.starts_with("chan")
            || t.starts_with("<-chan")
            || t.starts_with("func")
            || t.starts_with("interface") =>
        {
            "nil".to_string()
        }
        t if is_struct(t) => format!("{}{{}}", t),
        t => format!("*new({})", t),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::line_span;
    use crate::operations::tests::workspace;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    const REPORT: &str = "package p\n\nfunc Report(items []int) int {\n\ttotal := 0\n\tfor _, v := range items {\n\t\ttotal += v\n\t}\n\tavg := total / len(items)\n\treturn avg\n}\n";

    fn names(file: &SourceFile, locals: &[usize]) -> Vec<String> {
        locals.iter().map(|i| file.info.locals[*i].name.clone()).collect()
    }

    #[test]
    fn test_inputs_and_outputs() {
        let ws = workspace(&[("p/p.go", REPORT)]);
        let file = ws.file(Path::new("p/p.go")).unwrap();
        let selection = select_range(file, line_span(file, 5, 7).unwrap()).unwrap();
        assert_eq!(selection.statements.len(), 1);
        let flow = analyze(&selection, true).unwrap();
        assert_eq!(names(file, &flow.inputs), vec!["items", "total"]);
        assert_eq!(names(file, &flow.outputs), vec!["total"]);
        assert!(flow.declared.is_empty());
        assert!(flow.returns.is_empty());
    }

    #[test]
    fn test_partial_statements_are_refused() {
        let ws = workspace(&[("p/p.go", REPORT)]);
        let file = ws.file(Path::new("p/p.go")).unwrap();
        let err = select_range(file, line_span(file, 5, 6).unwrap()).err().unwrap();
        assert_eq!(err.kind(), refit_foundation::ErrorKind::Unsupported);
    }

    #[test]
    fn test_escaping_break_is_refused() {
        let ws = workspace(&[(
            "p/p.go",
            "package p\n\nfunc f(xs []int) {\n\tfor _, x := range xs {\n\t\tif x > 2 {\n\t\t\tbreak\n\t\t}\n\t}\n}\n",
        )]);
        let file = ws.file(Path::new("p/p.go")).unwrap();
        let selection = select_range(file, line_span(file, 5, 7).unwrap()).unwrap();
        assert!(analyze(&selection, false).is_err());
        let whole_loop = select_range(file, line_span(file, 4, 8).unwrap()).unwrap();
        assert!(analyze(&whole_loop, false).is_ok());
    }

    #[test]
    fn test_block_run_stops_at_fences() {
        let ws = workspace(&[(
            "p/p.go",
            "package p\n\nfunc Run() {\n\ta := 1\n\tb := a + 1\n\tprintln(a, b)\n\n\tc := 3\n\tprintln(c)\n}\n",
        )]);
        let file = ws.file(Path::new("p/p.go")).unwrap();
        let offset = file.content.find("b :=").unwrap();
        let selection = select_block(file, offset).unwrap();
        assert_eq!(selection.statements.len(), 3);
        assert_eq!(file.position(selection.span.start).line, 4);
    }

    #[test]
    fn test_zero_values_and_results() {
        let is_struct = |t: &str| t == "Point";
        assert_eq!(zero_value("int", is_struct), "0");
        assert_eq!(zero_value("*Point", is_struct), "nil");
        assert_eq!(zero_value("Point", is_struct), "Point{}");
        assert_eq!(zero_value("Celsius", is_struct), "*new(Celsius)");

        let ws = workspace(&[(
            "p/p.go",
            "package p\n\nfunc f() (n, m int, err error) { return 0, 0, nil }\n",
        )]);
        let file = ws.file(Path::new("p/p.go")).unwrap();
        let function = visitor::find_first(file.root(), |n| n.kind() == "function_declaration").unwrap();
        assert_eq!(result_types(function, &file.content), vec!["int", "int", "error"]);
    }
}
