//! Syntactic side-effect analysis.
//!
//! Purity here is conservative: an expression is pure only when every
//! sub-expression is known not to have observable effects. Calls are impure
//! unless the caller's oracle says otherwise.

use crate::syntax::{is_predeclared, text};
use tree_sitter::Node;

/// Calls to these builtins never have observable effects
const PURE_BUILTINS: [&str; 7] = ["len", "cap", "min", "max", "complex", "real", "imag"];

/// Default oracle: pure builtins and conversions to predeclared types
pub fn builtin_pure_call(call: Node<'_>, source: &str) -> bool {
    let Some(function) = call.child_by_field_name("function") else {
        return false;
    };
    if function.kind() != "identifier" {
        return matches!(
            function.kind(),
            "parenthesized_type" | "slice_type" | "array_type" | "map_type" | "pointer_type"
        );
    }
    let name = text(function, source);
    PURE_BUILTINS.contains(&name)
        || (is_predeclared(name)
            && !matches!(
                name,
                "append"
                    | "clear"
                    | "close"
                    | "copy"
                    | "delete"
                    | "make"
                    | "new"
                    | "panic"
                    | "print"
                    | "println"
                    | "recover"
            ))
}

/// Whether evaluating `node` more or fewer times is unobservable
pub fn is_pure(node: Node<'_>, source: &str, pure_call: &dyn Fn(Node<'_>) -> bool) -> bool {
    match node.kind() {
        "identifier" | "field_identifier" | "package_identifier" | "type_identifier"
        | "int_literal" | "float_literal" | "imaginary_literal" | "rune_literal"
        | "interpreted_string_literal" | "raw_string_literal" | "true" | "false" | "nil"
        | "iota" | "func_literal" | "comment" => true,
        "unary_expression" => {
            let receive = node
                .child_by_field_name("operator")
                .map(|op| text(op, source) == "<-")
                .unwrap_or(false);
            !receive && children_pure(node, source, pure_call)
        }
        "call_expression" => {
            pure_call(node)
                && node
                    .child_by_field_name("arguments")
                    .map(|args| children_pure(args, source, pure_call))
                    .unwrap_or(true)
        }
        "selector_expression"
        | "parenthesized_expression"
        | "binary_expression"
        | "index_expression"
        | "slice_expression"
        | "type_assertion_expression"
        | "composite_literal"
        | "literal_value"
        | "keyed_element"
        | "literal_element"
        | "expression_list"
        | "argument_list" => children_pure(node, source, pure_call),
        kind if kind.ends_with("_type") || kind == "type_arguments" => true,
        _ => false,
    }
}

fn children_pure(node: Node<'_>, source: &str, pure_call: &dyn Fn(Node<'_>) -> bool) -> bool {
    let mut cursor = node.walk();
    let all = node
        .named_children(&mut cursor)
        .all(|child| is_pure(child, source, pure_call));
    all
}

/// Pure according to the builtin oracle only
pub fn is_pure_default(node: Node<'_>, source: &str) -> bool {
    is_pure(node, source, &|call| builtin_pure_call(call, source))
}

/// Names, literals and selectors of names: cheap to duplicate and effect-free
pub fn is_trivial(node: Node<'_>, source: &str) -> bool {
    match node.kind() {
        "identifier" | "int_literal" | "float_literal" | "imaginary_literal" | "rune_literal"
        | "interpreted_string_literal" | "raw_string_literal" | "true" | "false" | "nil"
        | "iota" => true,
        "selector_expression" => node
            .child_by_field_name("operand")
            .map(|operand| is_trivial(operand, source))
            .unwrap_or(false),
        "parenthesized_expression" => node
            .named_child(0)
            .map(|inner| is_trivial(inner, source))
            .unwrap_or(false),
        "unary_expression" => {
            let op = node
                .child_by_field_name("operator")
                .map(|op| text(op, source))
                .unwrap_or("");
            matches!(op, "-" | "+" | "!" | "^" | "&")
                && node
                    .child_by_field_name("operand")
                    .map(|operand| is_trivial(operand, source))
                    .unwrap_or(false)
        }
        _ => false,
    }
}

/// Compile-time constant per syntax: literals, iota and operators over them.
///
/// Identifiers are accepted only when `is_const_name` says they denote constants.
pub fn is_constant_expression(
    node: Node<'_>,
    source: &str,
    is_const_name: &dyn Fn(&str) -> bool,
) -> bool {
    match node.kind() {
        "int_literal" | "float_literal" | "imaginary_literal" | "rune_literal"
        | "interpreted_string_literal" | "raw_string_literal" | "true" | "false" | "iota" => true,
        "identifier" => is_const_name(text(node, source)),
        "selector_expression" => is_const_name(text(node, source)),
        "binary_expression" | "parenthesized_expression" => {
            let mut cursor = node.walk();
            let all = node
                .named_children(&mut cursor)
                .all(|c| is_constant_expression(c, source, is_const_name));
            all
        }
        "unary_expression" => {
            let op = node
                .child_by_field_name("operator")
                .map(|op| text(op, source))
                .unwrap_or("");
            op != "<-"
                && op != "&"
                && op != "*"
                && node
                    .child_by_field_name("operand")
                    .map(|o| is_constant_expression(o, source, is_const_name))
                    .unwrap_or(false)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_go;
    use crate::visitor::find_first;

    fn with_expr<R>(expr: &str, check: impl Fn(Node<'_>, &str) -> R) -> R {
        let source = format!("package p\nvar _ = {}\n", expr);
        let tree = parse_go(&source).unwrap();
        let list = find_first(tree.root_node(), |n| n.kind() == "expression_list").unwrap();
        let node = list.named_child(0).unwrap();
        check(node, &source)
    }

    #[test]
    fn test_pure_expressions() {
        assert!(with_expr("a + b*2", is_pure_default));
        assert!(with_expr("len(xs) - 1", is_pure_default));
        assert!(with_expr("Point{X: 1, Y: y}", is_pure_default));
        assert!(with_expr("int64(x)", is_pure_default));
    }

    #[test]
    fn test_impure_expressions() {
        assert!(!with_expr("g()", is_pure_default));
        assert!(!with_expr("a + next()", is_pure_default));
        assert!(!with_expr("<-ch", is_pure_default));
        assert!(!with_expr("append(xs, 1)", is_pure_default));
    }

    #[test]
    fn test_trivial_expressions() {
        assert!(with_expr("x", is_trivial));
        assert!(with_expr("pkg.Value", is_trivial));
        assert!(with_expr("-1", is_trivial));
        assert!(!with_expr("a + b", is_trivial));
        assert!(!with_expr("f()", is_trivial));
    }

    #[test]
    fn test_constant_expressions() {
        let is_const = |name: &str| name == "Limit";
        assert!(with_expr("60 * 60", |n, s| is_constant_expression(n, s, &is_const)));
        assert!(with_expr("Limit + 1", |n, s| is_constant_expression(n, s, &is_const)));
        assert!(!with_expr("x + 1", |n, s| is_constant_expression(n, s, &is_const)));
    }
}
