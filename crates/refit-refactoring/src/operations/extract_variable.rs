//! Extract an expression into a variable or constant and replace its
//! identical occurrences.

use super::{line_span, offset_of, require_parsable};
use crate::builder::PlanBuilder;
use crate::context::{Operation, PlanContext};
use crate::impact;
use crate::naming::{check_identifier, names_in};
use refit_ast::purity::{is_constant_expression, is_pure_default};
use refit_ast::syntax::{
    ancestors, declaration_span, enclosing_declaration, indentation, is_statement,
    is_statement_container, line_start, normalize_expression_text, normalized, span, statements,
    text,
};
use refit_ast::{visitor, Node};
use refit_foundation::protocol::requests::{ExtractConstant, ExtractScope, ExtractVariable};
use refit_foundation::{Issue, IssueKind, RefactoringPlan, RefitError, RefitResult, Severity};
use refit_workspace::{LocalKind, SourceFile, Target, UseRole, Workspace};
use std::ops::Range;
use tracing::debug;

fn is_expression(kind: &str) -> bool {
    matches!(
        kind,
        "binary_expression"
            | "unary_expression"
            | "call_expression"
            | "selector_expression"
            | "index_expression"
            | "slice_expression"
            | "parenthesized_expression"
            | "type_assertion_expression"
            | "type_conversion_expression"
            | "composite_literal"
            | "func_literal"
            | "identifier"
            | "int_literal"
            | "float_literal"
            | "imaginary_literal"
            | "rune_literal"
            | "interpreted_string_literal"
            | "raw_string_literal"
            | "true"
            | "false"
            | "nil"
    )
}

/// Identity of an expression: its normalised text and what each name binds to
fn shape(file: &SourceFile, node: Node<'_>) -> (String, Vec<Target>) {
    let targets = file
        .info
        .uses_in(span(node))
        .map(|u| u.target.clone())
        .collect();
    (normalized(node, &file.content), targets)
}

/// Assigned, incremented or address-taken positions cannot hold a value
fn is_assignable_position(node: Node<'_>, source: &str) -> bool {
    let Some(parent) = node.parent() else {
        return false;
    };
    match parent.kind() {
        "inc_statement" | "dec_statement" => true,
        "unary_expression" => parent
            .child_by_field_name("operator")
            .map(|op| text(op, source) == "&")
            .unwrap_or(false),
        "expression_list" => parent
            .parent()
            .filter(|a| matches!(a.kind(), "assignment_statement" | "short_var_declaration"))
            .and_then(|a| a.child_by_field_name("left"))
            .map(|left| left.id() == parent.id())
            .unwrap_or(false),
        _ => false,
    }
}

/// Innermost statement directly owned by a block or case clause
fn anchor_statement(node: Node<'_>) -> Option<Node<'_>> {
    std::iter::once(node).chain(ancestors(node)).find(|n| {
        is_statement(*n)
            && n.parent()
                .map(|p| is_statement_container(p.kind()))
                .unwrap_or(false)
    })
}

/// Expression a statement range stands for when no text is given
fn detect_expression<'f>(file: &'f SourceFile, range: Range<usize>) -> RefitResult<Node<'f>> {
    let slice = &file.content[range.clone()];
    let start = range.start + (slice.len() - slice.trim_start().len());
    let end = range.start + slice.trim_end().len();
    let node = file
        .root()
        .named_descendant_for_byte_range(start, end)
        .ok_or_else(|| RefitError::usage("range is outside the file"))?;
    if is_expression(node.kind()) {
        return Ok(node);
    }
    let single = |list: Option<Node<'f>>| list.filter(|l| l.named_child_count() == 1).and_then(|l| l.named_child(0));
    let found = match node.kind() {
        "short_var_declaration" | "assignment_statement" => single(node.child_by_field_name("right")),
        "return_statement" => single(node.named_child(0)),
        "expression_statement" => node.named_child(0),
        "if_statement" | "for_statement" => node.child_by_field_name("condition"),
        "var_spec" | "const_spec" => single(node.child_by_field_name("value")),
        _ => None,
    };
    found
        .filter(|n| is_expression(n.kind()))
        .ok_or_else(|| {
            RefitError::usage("no single expression in the range; pass the expression text")
        })
}

/// First expression in `range` matching `expression` textually
fn find_expression<'f>(file: &'f SourceFile, range: Range<usize>, expression: &str) -> RefitResult<Node<'f>> {
    let wanted = normalize_expression_text(expression)
        .ok_or_else(|| RefitError::usage(format!("'{}' is not a Go expression", expression)))?;
    visitor::find_first(file.root(), |n| {
        n.start_byte() >= range.start
            && n.end_byte() <= range.end
            && is_expression(n.kind())
            && normalized(n, &file.content) == wanted
    })
    .ok_or_else(|| {
        RefitError::not_found(format!(
            "expression '{}' between the given lines",
            expression
        ))
    })
}

/// Whether `name`, spelled at `offset`, denotes a constant
fn is_constant_name(ws: &Workspace, file: &SourceFile, offset: usize, name: &str) -> bool {
    if let Some((qualifier, member)) = name.split_once('.') {
        return file
            .import_named(qualifier)
            .and_then(|import| ws.index(&import.path))
            .map(|index| index.constants.contains_key(member))
            .unwrap_or(false);
    }
    if let Some(local) = file.info.lookup_local(offset, name) {
        return file.info.locals[local].kind == LocalKind::Const;
    }
    ws.index(&file.package)
        .map(|index| index.constants.contains_key(name))
        .unwrap_or(false)
        || matches!(name, "true" | "false" | "iota")
}

/// Largest constant expression around `offset`
fn constant_at<'f>(ws: &Workspace, file: &'f SourceFile, offset: usize) -> RefitResult<Node<'f>> {
    let leaf = file
        .root()
        .descendant_for_byte_range(offset, offset)
        .ok_or_else(|| RefitError::usage("position is outside the file"))?;
    let constant = |n: Node<'f>| {
        is_constant_expression(n, &file.content, &|name| {
            is_constant_name(ws, file, n.start_byte(), name)
        })
    };
    let mut node = std::iter::once(leaf)
        .chain(ancestors(leaf))
        .find(|n| is_expression(n.kind()))
        .filter(|n| constant(*n))
        .ok_or_else(|| RefitError::unsupported("no constant expression at this position"))?;
    while let Some(parent) = node.parent() {
        if !is_expression(parent.kind()) || !constant(parent) {
            break;
        }
        node = parent;
    }
    Ok(node)
}

/// Declaration to insert and the region whose occurrences it replaces
struct Placement<'f> {
    insert_at: usize,
    indent: String,
    region: Range<usize>,
    /// Block whose statement holding the first occurrence gets the declaration
    container: Option<Node<'f>>,
    package_level: bool,
}

fn placement<'f>(file: &'f SourceFile, expression: Node<'f>, scope: ExtractScope) -> RefitResult<Placement<'f>> {
    let source = &file.content;
    if scope == ExtractScope::File {
        let declaration = std::iter::once(expression)
            .chain(ancestors(expression))
            .find(|n| n.parent().map(|p| p.kind() == "source_file").unwrap_or(false))
            .ok_or_else(|| RefitError::unsupported("expression is not inside a declaration"))?;
        let start = declaration_span(declaration, source).start;
        return Ok(Placement {
            insert_at: line_start(source, start),
            indent: String::new(),
            region: 0..source.len(),
            container: None,
            package_level: true,
        });
    }
    let anchor = anchor_statement(expression)
        .ok_or_else(|| RefitError::unsupported("expression is not inside a function body"))?;
    let container = match scope {
        ExtractScope::Expression | ExtractScope::Statement => None,
        ExtractScope::Block => anchor.parent(),
        _ => enclosing_declaration(anchor).and_then(|d| d.child_by_field_name("body")),
    };
    let region = match (scope, container) {
        (ExtractScope::Expression, _) => span(expression),
        (_, Some(container)) => span(container),
        _ => span(anchor),
    };
    Ok(Placement {
        insert_at: line_start(source, anchor.start_byte()),
        indent: indentation(source, anchor.start_byte()).to_string(),
        region,
        container,
        package_level: false,
    })
}

/// Occurrences of `expression` in `region`, outermost first and never nested
fn occurrences<'f>(file: &'f SourceFile, expression: Node<'f>, region: Range<usize>) -> Vec<Node<'f>> {
    let wanted = shape(file, expression);
    let mut found: Vec<Node<'f>> = Vec::new();
    for node in visitor::collect(file.root(), |n| {
        n.start_byte() >= region.start && n.end_byte() <= region.end && is_expression(n.kind())
    }) {
        if found.last().map(|l| node.start_byte() < l.end_byte()).unwrap_or(false) {
            continue;
        }
        if is_assignable_position(node, &file.content) {
            continue;
        }
        if shape(file, node) == wanted {
            found.push(node);
        }
    }
    found
}

/// Shared planner of extract variable and extract constant
fn plan_value<'f>(
    ctx: &PlanContext<'_>,
    mut builder: PlanBuilder<'_>,
    file: &'f SourceFile,
    expression: Node<'f>,
    name: &str,
    scope: ExtractScope,
    constant: bool,
) -> RefitResult<RefactoringPlan> {
    let ws = ctx.workspace;
    let source = &file.content;
    require_parsable(ws, file)?;
    if is_assignable_position(expression, source) {
        return Err(RefitError::unsupported(
            "the expression is assigned to and cannot be replaced by a value",
        ));
    }
    let mut place = placement(file, expression, scope)?;
    let expr_text = text(expression, source).to_string();

    let mut found = occurrences(file, expression, place.region.clone());
    if !found.iter().any(|n| n.id() == expression.id()) {
        found.push(expression);
        found.sort_by_key(|n| n.start_byte());
    }
    // Hoist above the statement of the container holding the first occurrence.
    if let (Some(container), Some(first)) = (place.container, found.first()) {
        let holder = statements(container)
            .into_iter()
            .find(|s| s.start_byte() <= first.start_byte() && first.end_byte() <= s.end_byte());
        if let Some(holder) = holder {
            place.insert_at = line_start(source, holder.start_byte());
            place.indent = indentation(source, holder.start_byte()).to_string();
        }
    }
    debug!(
        file = %ws.relative(&file.path).display(),
        name,
        occurrences = found.len(),
        ?scope,
        constant,
        "Planning value extraction"
    );

    let locals: Vec<usize> = file
        .info
        .uses_in(span(expression))
        .filter_map(|u| match u.target {
            Target::Local(index) => Some(index),
            _ => None,
        })
        .collect();
    for index in &locals {
        let local = &file.info.locals[*index];
        let visible = !place.package_level
            && local.scope.start <= place.insert_at
            && place.insert_at < local.scope.end
            && local.span.end <= place.insert_at;
        if !visible {
            return Err(RefitError::unsupported(format!(
                "'{}' is not visible where the declaration would go",
                local.name
            )));
        }
        let last = found.last().map(|n| n.end_byte()).unwrap_or(place.insert_at);
        let reassigned = file.info.uses_of_local(*index).any(|u| {
            u.role == UseRole::Write && u.span.start >= place.insert_at && u.span.end <= last
        });
        if reassigned && found.len() > 1 {
            return Err(RefitError::unsupported(format!(
                "'{}' is assigned between the occurrences",
                local.name
            )));
        }
    }

    let severity = if ctx.options.allow_breaking {
        Severity::Warning
    } else {
        Severity::Error
    };
    if constant {
        let is_const = |n: &str| is_constant_name(ws, file, expression.start_byte(), n);
        if !is_constant_expression(expression, source, &is_const) {
            return Err(RefitError::unsupported(format!(
                "'{}' is not a constant expression",
                expr_text
            )));
        }
    } else if !is_pure_default(expression, source) {
        if found.len() > 1 {
            builder.issue(ws.issue_at(
                Issue::error(
                    IssueKind::SideEffect,
                    format!(
                        "'{}' has side effects and occurs {} times; one evaluation would replace them",
                        expr_text,
                        found.len()
                    ),
                )
                .with_severity(severity),
                &file.path,
                expression.start_byte(),
            ));
        }
        if place.package_level {
            builder.issue(ws.issue_at(
                Issue::warning(
                    IssueKind::SideEffect,
                    format!("'{}' would be evaluated once at package initialisation", expr_text),
                ),
                &file.path,
                expression.start_byte(),
            ));
        }
    }

    if place.package_level {
        builder.issues(impact::package_conflicts(ws, &file.package, name, None));
    } else {
        let shadowed = file.info.lookup_local(place.insert_at, name).is_some()
            || names_in(file, place.insert_at..place.region.end.max(place.insert_at)).contains(name);
        if shadowed {
            builder.issue(ws.issue_at(
                Issue::error(
                    IssueKind::NameConflict,
                    format!("'{}' is already used in this scope", name),
                ),
                &file.path,
                place.insert_at,
            ));
        }
    }

    let declaration = match (place.package_level, constant) {
        (true, true) => format!("const {} = {}\n\n", name, expr_text),
        (true, false) => format!("var {} = {}\n\n", name, expr_text),
        (false, true) => format!("{}const {} = {}\n", place.indent, name, expr_text),
        (false, false) => format!("{}{} := {}\n", place.indent, name, expr_text),
    };
    builder.insert(
        &file.path,
        place.insert_at,
        declaration,
        format!("Declare {}", name),
    );
    for occurrence in &found {
        builder.replace(
            &file.path,
            span(*occurrence),
            name,
            format!("Use {}", name),
        );
    }
    builder.count_references(found.len());
    builder.finish()
}

impl Operation for ExtractVariable {
    fn validate(&self, ctx: &PlanContext<'_>) -> RefitResult<()> {
        check_identifier(&self.name)?;
        ctx.workspace.require_file(&self.file)?;
        Ok(())
    }

    fn plan(&self, ctx: &PlanContext<'_>) -> RefitResult<RefactoringPlan> {
        let file = ctx.workspace.require_file(&self.file)?;
        let range = line_span(file, self.start_line, self.end_line)?;
        let expression = match &self.expression {
            Some(expression) => find_expression(file, range, expression)?,
            None => detect_expression(file, range)?,
        };
        let builder = PlanBuilder::new(ctx.workspace, "extract_variable", serde_json::to_value(self)?);
        plan_value(ctx, builder, file, expression, &self.name, self.scope, false)
    }
}

impl Operation for ExtractConstant {
    fn validate(&self, ctx: &PlanContext<'_>) -> RefitResult<()> {
        check_identifier(&self.name)?;
        ctx.workspace.require_file(&self.file)?;
        Ok(())
    }

    fn plan(&self, ctx: &PlanContext<'_>) -> RefitResult<RefactoringPlan> {
        let ws = ctx.workspace;
        let file = ws.require_file(&self.file)?;
        let expression = constant_at(ws, file, offset_of(file, self.position)?)?;
        let builder = PlanBuilder::new(ws, "extract_constant", serde_json::to_value(self)?);
        plan_value(ctx, builder, file, expression, &self.name, self.scope, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::tests::{apply_plan, file, options, workspace};
    use crate::context::plan_request;
    use pretty_assertions::assert_eq;
    use refit_foundation::protocol::requests::SourcePosition;
    use refit_foundation::{ErrorKind, PlanOptions, RefactorRequest};
    use std::path::PathBuf;

    fn variable(lines: (u32, u32), expression: Option<&str>, name: &str, scope: ExtractScope) -> RefactorRequest {
        RefactorRequest::ExtractVariable(ExtractVariable {
            file: PathBuf::from("p/p.go"),
            start_line: lines.0,
            end_line: lines.1,
            name: name.to_string(),
            expression: expression.map(str::to_string),
            scope,
        })
    }

    fn constant(line: u32, column: u32, name: &str, scope: ExtractScope) -> RefactorRequest {
        RefactorRequest::ExtractConstant(ExtractConstant {
            file: PathBuf::from("p/p.go"),
            position: SourcePosition { line, column },
            name: name.to_string(),
            scope,
        })
    }

    #[test]
    fn test_identical_occurrences_share_one_variable() {
        let ws = workspace(&[(
            "p/p.go",
            "package p\n\nfunc Area(w, h int) int {\n\ta := w * h + 1\n\tb := w * h + 2\n\treturn a + b\n}\n",
        )]);
        let ctx = PlanContext::new(&ws, options());
        let plan = plan_request(&ctx, &variable((4, 5), Some("w*h"), "size", ExtractScope::Block)).unwrap();
        let files = apply_plan(&ws, &plan);
        assert_eq!(
            file(&files, "p/p.go"),
            "package p\n\nfunc Area(w, h int) int {\n\tsize := w * h\n\ta := size + 1\n\tb := size + 2\n\treturn a + b\n}\n"
        );
        assert_eq!(plan.impact.references, 2);
    }

    #[test]
    fn test_repeated_side_effect_needs_allow_breaking() {
        let source = "package p\n\nfunc f() int {\n\tx := next() + 1\n\ty := next() + 2\n\treturn x + y\n}\n\nfunc next() int { return 1 }\n";
        let ws = workspace(&[("p/p.go", source)]);
        let request = variable((4, 5), Some("next()"), "n", ExtractScope::Block);

        let ctx = PlanContext::new(&ws, options());
        let err = plan_request(&ctx, &request).unwrap_err();
        assert!(err.issues().iter().any(|i| i.kind == IssueKind::SideEffect));

        let lenient = PlanContext::new(
            &ws,
            PlanOptions {
                allow_breaking: true,
                force: false,
            },
        );
        let plan = plan_request(&lenient, &request).unwrap();
        assert_eq!(plan.impact.warnings().count(), 1);
    }

    #[test]
    fn test_expression_detected_from_return_line() {
        let ws = workspace(&[(
            "p/p.go",
            "package p\n\nfunc Total(price float64) float64 {\n\treturn price * 1.2\n}\n",
        )]);
        let ctx = PlanContext::new(&ws, options());
        let plan = plan_request(&ctx, &variable((4, 4), None, "gross", ExtractScope::Block)).unwrap();
        let files = apply_plan(&ws, &plan);
        assert_eq!(
            file(&files, "p/p.go"),
            "package p\n\nfunc Total(price float64) float64 {\n\tgross := price * 1.2\n\treturn gross\n}\n"
        );
    }

    #[test]
    fn test_loop_variable_is_not_visible_at_function_scope() {
        let source = "package p\n\nfunc g(xs []int) int {\n\tn := 0\n\tfor _, x := range xs {\n\t\tn += x * 2\n\t}\n\treturn n\n}\n";
        let ws = workspace(&[("p/p.go", source)]);
        let ctx = PlanContext::new(&ws, options());
        let err = plan_request(&ctx, &variable((6, 6), Some("x * 2"), "doubled", ExtractScope::Function)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);

        let plan = plan_request(&ctx, &variable((6, 6), Some("x * 2"), "doubled", ExtractScope::Block)).unwrap();
        let files = apply_plan(&ws, &plan);
        assert_eq!(
            file(&files, "p/p.go"),
            source.replace("\t\tn += x * 2\n", "\t\tdoubled := x * 2\n\t\tn += doubled\n")
        );
    }

    #[test]
    fn test_constant_at_position_local_and_package_level() {
        let source = "package p\n\nfunc Timeout() int {\n\treturn 60 * 1000\n}\n";
        let ws = workspace(&[("p/p.go", source)]);
        let ctx = PlanContext::new(&ws, options());

        let plan = plan_request(&ctx, &constant(4, 9, "millis", ExtractScope::Block)).unwrap();
        let files = apply_plan(&ws, &plan);
        assert_eq!(
            file(&files, "p/p.go"),
            "package p\n\nfunc Timeout() int {\n\tconst millis = 60 * 1000\n\treturn millis\n}\n"
        );

        let plan = plan_request(&ctx, &constant(4, 9, "millis", ExtractScope::File)).unwrap();
        let files = apply_plan(&ws, &plan);
        assert_eq!(
            file(&files, "p/p.go"),
            "package p\n\nconst millis = 60 * 1000\n\nfunc Timeout() int {\n\treturn millis\n}\n"
        );
    }

    #[test]
    fn test_non_constant_position_is_refused() {
        let ws = workspace(&[(
            "p/p.go",
            "package p\n\nfunc Twice(n int) int {\n\treturn n * 2\n}\n",
        )]);
        let ctx = PlanContext::new(&ws, options());
        let err = plan_request(&ctx, &constant(4, 9, "k", ExtractScope::Block)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }
}
