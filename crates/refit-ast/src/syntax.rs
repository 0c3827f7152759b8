//! Statement, declaration and text helpers over tree-sitter-go nodes.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::ops::Range;
use tree_sitter::Node;

/// Source text of a node
pub fn text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    source.get(node.start_byte()..node.end_byte()).unwrap_or("")
}

pub fn span(node: Node<'_>) -> Range<usize> {
    node.start_byte()..node.end_byte()
}

pub fn is_comment(node: Node<'_>) -> bool {
    node.kind() == "comment"
}

static STATEMENT_KINDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "expression_statement",
        "send_statement",
        "inc_statement",
        "dec_statement",
        "assignment_statement",
        "short_var_declaration",
        "var_declaration",
        "const_declaration",
        "type_declaration",
        "return_statement",
        "go_statement",
        "defer_statement",
        "if_statement",
        "for_statement",
        "expression_switch_statement",
        "type_switch_statement",
        "select_statement",
        "labeled_statement",
        "fallthrough_statement",
        "break_statement",
        "continue_statement",
        "goto_statement",
        "block",
        "empty_statement",
    ]
    .into_iter()
    .collect()
});

pub fn is_statement(node: Node<'_>) -> bool {
    STATEMENT_KINDS.contains(node.kind())
}

/// Kinds that own a list of statements
pub fn is_statement_container(kind: &str) -> bool {
    matches!(
        kind,
        "block"
            | "statement_list"
            | "expression_case"
            | "default_case"
            | "type_case"
            | "communication_case"
    )
}

/// Statements directly owned by a block, statement list or case clause.
///
/// Grammar versions differ in whether a `statement_list` node sits between a
/// block and its statements; both shapes are flattened here.
pub fn statements<'t>(container: Node<'t>) -> Vec<Node<'t>> {
    let mut out = Vec::new();
    let mut cursor = container.walk();
    if !cursor.goto_first_child() {
        return out;
    }
    loop {
        let child = cursor.node();
        let field = cursor.field_name();
        let is_clause_head = matches!(field, Some("value" | "type" | "communication"));
        if child.kind() == "statement_list" {
            out.extend(statements(child));
        } else if child.is_named() && !is_comment(child) && !is_clause_head && is_statement(child)
        {
            out.push(child);
        }
        if !cursor.goto_next_sibling() {
            break;
        }
    }
    out
}

/// Nearest ancestor (including the node itself) whose kind is in `kinds`
pub fn enclosing<'t>(node: Node<'t>, kinds: &[&str]) -> Option<Node<'t>> {
    let mut current = Some(node);
    while let Some(n) = current {
        if kinds.contains(&n.kind()) {
            return Some(n);
        }
        current = n.parent();
    }
    None
}

/// Ancestors from the parent upwards
pub fn ancestors(node: Node<'_>) -> impl Iterator<Item = Node<'_>> {
    std::iter::successors(node.parent(), |n| n.parent())
}

/// Enclosing function or method declaration, or function literal
pub fn enclosing_function(node: Node<'_>) -> Option<Node<'_>> {
    enclosing(
        node,
        &["function_declaration", "method_declaration", "func_literal"],
    )
}

/// Enclosing top-level function or method declaration
pub fn enclosing_declaration(node: Node<'_>) -> Option<Node<'_>> {
    enclosing(node, &["function_declaration", "method_declaration"])
}

/// Receiver type name of a method declaration, without pointer or type parameters
pub fn receiver_type_name(method: Node<'_>, source: &str) -> Option<String> {
    let receiver = method.child_by_field_name("receiver")?;
    let mut cursor = receiver.walk();
    let param = receiver
        .named_children(&mut cursor)
        .find(|n| n.kind() == "parameter_declaration")?;
    let mut ty = param.child_by_field_name("type")?;
    loop {
        match ty.kind() {
            "pointer_type" | "parenthesized_type" => ty = ty.named_child(0)?,
            "generic_type" => ty = ty.child_by_field_name("type")?,
            _ => break,
        }
    }
    Some(text(ty, source).to_string())
}

/// Byte offset of the start of the line containing `offset`
pub fn line_start(source: &str, offset: usize) -> usize {
    source[..offset.min(source.len())]
        .rfind('\n')
        .map(|i| i + 1)
        .unwrap_or(0)
}

/// Byte offset just past the newline ending the line containing `offset`
pub fn line_end(source: &str, offset: usize) -> usize {
    let offset = offset.min(source.len());
    source[offset..]
        .find('\n')
        .map(|i| offset + i + 1)
        .unwrap_or(source.len())
}

/// Leading whitespace of the line containing `offset`
pub fn indentation(source: &str, offset: usize) -> &str {
    let start = line_start(source, offset);
    let line = &source[start..];
    let width = line
        .bytes()
        .take_while(|b| *b == b' ' || *b == b'\t')
        .count();
    &line[..width]
}

/// Full-line span of a declaration including its doc comment and trailing newline.
///
/// Doc comments are the comment siblings immediately above the declaration
/// with no blank line in between.
pub fn declaration_span(node: Node<'_>, source: &str) -> Range<usize> {
    let mut start = node.start_byte();
    let mut prev = node.prev_sibling();
    while let Some(p) = prev {
        if !is_comment(p) {
            break;
        }
        let between = &source[p.end_byte()..start];
        if between.matches('\n').count() > 1 || !between.trim().is_empty() {
            break;
        }
        // A trailing comment on the previous code line is not a doc comment.
        if source[line_start(source, p.start_byte())..p.start_byte()]
            .trim()
            .is_empty()
        {
            start = p.start_byte();
            prev = p.prev_sibling();
        } else {
            break;
        }
    }

    let start = line_start(source, start);
    let end = line_end(source, node.end_byte());
    start..end
}

/// Span of a declaration plus one adjacent blank line so removal leaves tidy spacing
pub fn removal_span(node: Node<'_>, source: &str) -> Range<usize> {
    let span = declaration_span(node, source);
    let after = &source[span.end..];
    if after.starts_with('\n') {
        return span.start..span.end + 1;
    }
    if span.start >= 2 && &source[span.start - 2..span.start] == "\n\n" {
        return span.start - 1..span.end;
    }
    span
}

/// Token-normalised text: leaf tokens joined by single spaces, comments dropped.
///
/// Two expressions are syntactically identical when their normalised texts match.
pub fn normalized(node: Node<'_>, source: &str) -> String {
    let mut tokens = Vec::new();
    collect_tokens(node, source, &mut tokens);
    tokens.join(" ")
}

fn collect_tokens<'s>(node: Node<'_>, source: &'s str, tokens: &mut Vec<&'s str>) {
    if is_comment(node) {
        return;
    }
    let is_literal = matches!(
        node.kind(),
        "interpreted_string_literal" | "raw_string_literal" | "rune_literal"
    );
    if node.child_count() == 0 || is_literal {
        let t = text(node, source);
        if !t.is_empty() {
            tokens.push(t);
        }
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_tokens(child, source, tokens);
    }
}

/// Normalise free text the same way by parsing it as an expression
pub fn normalize_expression_text(expr: &str) -> Option<String> {
    let wrapped = format!("package p\nvar _ = {}\n", expr);
    let tree = crate::parser::parse_go(&wrapped).ok()?;
    if tree.root_node().has_error() {
        return None;
    }
    let value = crate::visitor::find_first(tree.root_node(), |n| {
        n.kind() == "expression_list"
            && n.parent().map(|p| p.kind() == "var_spec").unwrap_or(false)
    })?;
    let expr_node = value.named_child(0)?;
    Some(normalized(expr_node, &wrapped))
}

/// Re-indent a block of text from one indentation prefix to another
pub fn reindent(block: &str, from: &str, to: &str) -> String {
    let mut out = String::with_capacity(block.len());
    for line in block.split_inclusive('\n') {
        if line.trim().is_empty() {
            out.push_str(if line.ends_with('\n') { "\n" } else { "" });
            continue;
        }
        let stripped = line.strip_prefix(from).unwrap_or_else(|| line.trim_start());
        out.push_str(to);
        out.push_str(stripped);
    }
    out
}

/// Exported per the first code point
pub fn is_exported(name: &str) -> bool {
    name.chars().next().map(char::is_uppercase).unwrap_or(false)
}

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\p{L}_][\p{L}\p{Nd}_]*$").unwrap());

const KEYWORDS: [&str; 25] = [
    "break",
    "case",
    "chan",
    "const",
    "continue",
    "default",
    "defer",
    "else",
    "fallthrough",
    "for",
    "func",
    "go",
    "goto",
    "if",
    "import",
    "interface",
    "map",
    "package",
    "range",
    "return",
    "select",
    "struct",
    "switch",
    "type",
    "var",
];

/// Predeclared identifiers of the universe scope
pub const PREDECLARED: [&str; 44] = [
    "bool", "byte", "comparable", "complex64", "complex128", "error", "float32", "float64",
    "int", "int8", "int16", "int32", "int64", "rune", "string", "uint", "uint8", "uint16",
    "uint32", "uint64", "uintptr", "any", "true", "false", "iota", "nil", "append", "cap",
    "clear", "close", "complex", "copy", "delete", "imag", "len", "make", "max", "min", "new",
    "panic", "print", "println", "real", "recover",
];

pub fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name)
}

pub fn is_predeclared(name: &str) -> bool {
    PREDECLARED.contains(&name)
}

/// Identifier grammar: a letter or underscore followed by letters, digits, underscores
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name) && !is_keyword(name)
}
