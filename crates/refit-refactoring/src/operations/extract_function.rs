//! Extract a statement range into a new function or method.

use super::flow::{self, Flow, Selection};
use super::{line_span, offset_of, require_parsable};
use crate::builder::PlanBuilder;
use crate::context::{Operation, PlanContext};
use crate::impact;
use crate::naming::{check_identifier, fresh_name, names_in};
use crate::rewrite::apply_local_edits;
use refit_ast::syntax::{line_end, reindent, span, text};
use refit_foundation::protocol::requests::{ExtractBlock, ExtractFunction, ExtractMethod};
use refit_foundation::{Issue, IssueKind, RefactoringPlan, RefitError, RefitResult};
use refit_workspace::{LocalKind, SourceFile, TypeRef, Workspace};
use std::collections::BTreeSet;
use tracing::debug;

/// How the call site hands control back to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// The range ends in a return: the call is returned directly
    Tail,
    /// Returns inside the range: a done flag tells the caller to return
    Sentinel,
    Normal,
}

/// Receiver of an extracted method
struct Receiver {
    /// `(c *Cart)`
    declaration: String,
    /// Variable the call is made on
    name: String,
    local: Option<usize>,
}

/// One parameter or result value of the new function
struct Value {
    name: String,
    ty: String,
}

fn render_local(ws: &Workspace, builder: &mut PlanBuilder<'_>, file: &SourceFile, index: usize) -> RefitResult<String> {
    let local = &file.info.locals[index];
    let mut needed = BTreeSet::new();
    let rendered = local
        .type_ref
        .as_ref()
        .and_then(|t| t.render(&ws.render_context(file), &mut needed))
        .ok_or_else(|| {
            RefitError::unsupported(format!("cannot infer the type of '{}'", local.name))
        })?;
    for path in needed {
        builder.ensure_import(&file.path, &path);
    }
    Ok(rendered)
}

/// `x, y int, s string`: consecutive parameters of one type share it
fn parameter_list(values: &[Value]) -> String {
    let mut groups: Vec<(Vec<&str>, &str)> = Vec::new();
    for value in values {
        match groups.last_mut() {
            Some((names, ty)) if *ty == value.ty => names.push(&value.name),
            _ => groups.push((vec![&value.name], &value.ty)),
        }
    }
    groups
        .into_iter()
        .map(|(names, ty)| format!("{} {}", names.join(", "), ty))
        .collect::<Vec<_>>()
        .join(", ")
}

fn result_list(types: &[String]) -> String {
    match types {
        [] => String::new(),
        [one] => format!(" {}", one),
        many => format!(" ({})", many.join(", ")),
    }
}

fn receiver_for(
    ws: &Workspace,
    selection: &Selection<'_>,
    flow: &Flow,
    receiver_type: &str,
) -> RefitResult<Receiver> {
    let file = selection.file;
    let source = &file.content;
    let index = ws
        .index(&file.package)
        .ok_or_else(|| RefitError::not_found(format!("package of {}", file.path.display())))?;
    if !index.types.contains_key(receiver_type) {
        return Err(RefitError::not_found(format!(
            "type '{}' in package {}",
            receiver_type, file.package_name
        )));
    }

    let declaration = selection.declaration;
    let same_receiver = declaration.kind() == "method_declaration"
        && refit_ast::syntax::receiver_type_name(declaration, source).as_deref()
            == Some(receiver_type);
    if same_receiver {
        let function = span(declaration);
        let local = file
            .info
            .locals
            .iter()
            .position(|l| l.kind == LocalKind::Receiver && l.function == function);
        let list = declaration
            .child_by_field_name("receiver")
            .map(|r| text(r, source).to_string())
            .unwrap_or_default();
        if let Some(index) = local {
            return Ok(Receiver {
                declaration: list,
                name: file.info.locals[index].name.clone(),
                local: Some(index),
            });
        }
    }

    let of_type = |t: &TypeRef| {
        t.deref()
            .named()
            .map(|(package, name)| package == file.package && name == receiver_type)
            .unwrap_or(false)
    };
    flow.inputs
        .iter()
        .copied()
        .find(|i| file.info.locals[*i].type_ref.as_ref().map(of_type).unwrap_or(false))
        .map(|i| {
            let local = &file.info.locals[i];
            let pointer = matches!(local.type_ref, Some(TypeRef::Pointer(_)));
            Receiver {
                declaration: format!(
                    "({} {}{})",
                    local.name,
                    if pointer { "*" } else { "" },
                    receiver_type
                ),
                name: local.name.clone(),
                local: Some(i),
            }
        })
        .ok_or_else(|| {
            RefitError::unsupported(format!(
                "no value of type {} is available in the selected range",
                receiver_type
            ))
        })
}

/// Expressions of the return statement at `span`, one entry per value
fn return_values(file: &SourceFile, span: &std::ops::Range<usize>) -> Option<Vec<String>> {
    let node = file.node_at(span.clone())?;
    let Some(list) = node.named_child(0) else {
        return Some(Vec::new());
    };
    if list.kind() != "expression_list" {
        return Some(vec![text(list, &file.content).to_string()]);
    }
    let mut cursor = list.walk();
    let values = list
        .named_children(&mut cursor)
        .filter(|n| n.kind() != "comment")
        .map(|n| text(n, &file.content).to_string())
        .collect();
    Some(values)
}

/// Place the done flag last, or just before a trailing `error`
fn with_flag(mut values: Vec<String>, flag: String, error_last: bool) -> Vec<String> {
    match values.len() {
        n if error_last && n > 0 => values.insert(n - 1, flag),
        _ => values.push(flag),
    }
    values
}

/// Body of a sentinel-mode function: every return also reports `true`
fn sentinel_body(
    selection: &Selection<'_>,
    flow: &Flow,
    region: std::ops::Range<usize>,
    output_zeros: &[String],
    error_last: bool,
) -> String {
    let file = selection.file;
    let edits = flow
        .returns
        .iter()
        .filter_map(|r| {
            let mut values: Vec<String> = output_zeros.to_vec();
            values.extend(return_values(file, r)?);
            let values = with_flag(values, "true".to_string(), error_last);
            Some((r.clone(), format!("return {}", values.join(", "))))
        })
        .collect();
    apply_local_edits(&file.content, region, edits)
}

/// Plan the extraction of `selection` into `name`, a method when
/// `receiver_type` is given
fn plan_extraction(
    ctx: &PlanContext<'_>,
    mut builder: PlanBuilder<'_>,
    selection: Selection<'_>,
    name: &str,
    receiver_type: Option<&str>,
) -> RefitResult<RefactoringPlan> {
    let ws = ctx.workspace;
    let file = selection.file;
    let source = &file.content;
    require_parsable(ws, file)?;

    let function_results = flow::result_types(selection.function, source);
    let mut flow = flow::analyze(&selection, !function_results.is_empty())?;
    let mode = if selection.ends_with_return() {
        Mode::Tail
    } else if !flow.returns.is_empty() {
        if flow.has_outer_outputs() {
            return Err(RefitError::unsupported(
                "the range both returns early and assigns variables used after it",
            ));
        }
        Mode::Sentinel
    } else {
        Mode::Normal
    };
    if mode == Mode::Tail {
        flow.outputs.clear();
    }
    debug!(
        file = %ws.relative(&file.path).display(),
        name,
        inputs = flow.inputs.len(),
        outputs = flow.outputs.len(),
        ?mode,
        "Planning extraction"
    );

    let receiver = match receiver_type {
        Some(ty) => {
            builder.issues(impact::member_conflicts(ws, &file.package, ty, name, None));
            let receiver = receiver_for(ws, &selection, &flow, ty)?;
            if let Some(local) = receiver.local {
                if flow.outputs.contains(&local) {
                    return Err(RefitError::unsupported(format!(
                        "the range assigns the receiver '{}'",
                        receiver.name
                    )));
                }
                flow.inputs.retain(|i| *i != local);
            }
            Some(receiver)
        }
        None => {
            builder.issues(impact::package_conflicts(ws, &file.package, name, None));
            None
        }
    };
    if let Some(local) = file.info.lookup_local(selection.span.start, name) {
        builder.issue(ws.issue_at(
            Issue::error(
                IssueKind::NameConflict,
                format!("local '{}' would shadow the extracted function", name),
            ),
            &file.path,
            file.info.locals[local].span.start,
        ));
    }

    let mut params = Vec::new();
    for index in &flow.inputs {
        params.push(Value {
            name: file.info.locals[*index].name.clone(),
            ty: render_local(ws, &mut builder, file, *index)?,
        });
    }
    let mut outputs = Vec::new();
    for index in &flow.outputs {
        outputs.push(Value {
            name: file.info.locals[*index].name.clone(),
            ty: render_local(ws, &mut builder, file, *index)?,
        });
    }
    let is_struct = |t: &str| {
        ws.index(&file.package)
            .map(|i| i.is_struct(t))
            .unwrap_or(false)
    };

    let indent = selection.indent();
    let region = selection.lines();
    // The flag precedes a trailing `error` when every return lists each value
    let error_last = mode == Mode::Sentinel
        && function_results.last().is_some_and(|t| t == "error")
        && flow.returns.iter().all(|r| {
            return_values(file, r).is_some_and(|v| v.len() == function_results.len())
        });
    let (results, body) = match mode {
        Mode::Tail => (function_results.clone(), source[region.clone()].to_string()),
        Mode::Normal => {
            let mut body = source[region.clone()].to_string();
            if !outputs.is_empty() {
                let names: Vec<&str> = outputs.iter().map(|o| o.name.as_str()).collect();
                body.push_str(&format!("{}return {}\n", indent, names.join(", ")));
            }
            (outputs.iter().map(|o| o.ty.clone()).collect(), body)
        }
        Mode::Sentinel => {
            let output_zeros: Vec<String> = outputs
                .iter()
                .map(|o| flow::zero_value(&o.ty, is_struct))
                .collect();
            let mut body =
                sentinel_body(&selection, &flow, region.clone(), &output_zeros, error_last);
            let mut fallthrough: Vec<String> = outputs.iter().map(|o| o.name.clone()).collect();
            fallthrough.extend(function_results.iter().map(|t| flow::zero_value(t, is_struct)));
            let fallthrough = with_flag(fallthrough, "false".to_string(), error_last);
            body.push_str(&format!("{}return {}\n", indent, fallthrough.join(", ")));
            let mut results: Vec<String> = outputs.iter().map(|o| o.ty.clone()).collect();
            results.extend(function_results.iter().cloned());
            (with_flag(results, "bool".to_string(), error_last), body)
        }
    };

    let function = format!(
        "func {}{}({}){} {{\n{}}}\n",
        receiver
            .as_ref()
            .map(|r| format!("{} ", r.declaration))
            .unwrap_or_default(),
        name,
        parameter_list(&params),
        result_list(&results),
        reindent(&body, indent, "\t"),
    );

    let args: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
    let call = format!(
        "{}{}({})",
        receiver
            .as_ref()
            .map(|r| format!("{}.", r.name))
            .unwrap_or_default(),
        name,
        args.join(", ")
    );
    let call_site = match mode {
        Mode::Tail if function_results.is_empty() => format!("{}\n{}return", call, indent),
        Mode::Tail => format!("return {}", call),
        Mode::Normal => assign_outputs(&flow, &outputs, &call, indent),
        Mode::Sentinel => {
            let mut taken = names_in(file, span(selection.declaration));
            if let Some(index) = ws.index(&file.package) {
                taken.extend(index.all().map(|s| s.name.clone()));
            }
            let is_taken = |n: &str| taken.contains(n);
            let values: Vec<String> = if function_results.len() == 1 {
                vec![fresh_name("r", is_taken)]
            } else {
                (1..=function_results.len())
                    .map(|i| fresh_name(&format!("r{}", i), is_taken))
                    .collect()
            };
            let done = fresh_name("done", is_taken);
            let mut lhs: Vec<String> = outputs.iter().map(|o| o.name.clone()).collect();
            lhs.extend(values.iter().cloned());
            let lhs = with_flag(lhs, done.clone(), error_last);
            let ret = if values.is_empty() {
                "return".to_string()
            } else {
                format!("return {}", values.join(", "))
            };
            format!(
                "{} := {}\n{indent}if {} {{\n{indent}\t{}\n{indent}}}",
                lhs.join(", "),
                call,
                done,
                ret,
                indent = indent
            )
        }
    };

    builder.replace(
        &file.path,
        region,
        format!("{}{}\n", indent, call_site),
        format!("Call extracted {}", name),
    );
    let at = line_end(source, selection.declaration.end_byte());
    let separator = if source[..at].ends_with('\n') { "\n" } else { "\n\n" };
    builder.insert(
        &file.path,
        at,
        format!("{}{}", separator, function),
        format!("Add {}", name),
    );
    builder.finish()
}

/// Call text binding the outputs: `:=` for new names, `=` for existing
/// ones, with `var` lines first when both occur
fn assign_outputs(flow: &Flow, outputs: &[Value], call: &str, indent: &str) -> String {
    if outputs.is_empty() {
        return call.to_string();
    }
    let names: Vec<&str> = outputs.iter().map(|o| o.name.as_str()).collect();
    let fresh = flow.declared.len();
    if fresh == outputs.len() {
        return format!("{} := {}", names.join(", "), call);
    }
    if fresh == 0 {
        return format!("{} = {}", names.join(", "), call);
    }
    let mut text = String::new();
    for (index, output) in flow.outputs.iter().zip(outputs) {
        if flow.declared.contains(index) {
            text.push_str(&format!("var {} {}\n{}", output.name, output.ty, indent));
        }
    }
    text.push_str(&format!("{} = {}", names.join(", "), call));
    text
}

impl Operation for ExtractFunction {
    fn validate(&self, ctx: &PlanContext<'_>) -> RefitResult<()> {
        check_identifier(&self.new_name)?;
        ctx.workspace.require_file(&self.file)?;
        Ok(())
    }

    fn plan(&self, ctx: &PlanContext<'_>) -> RefitResult<RefactoringPlan> {
        let file = ctx.workspace.require_file(&self.file)?;
        let selection = flow::select_range(file, line_span(file, self.start_line, self.end_line)?)?;
        let builder = PlanBuilder::new(ctx.workspace, "extract_function", serde_json::to_value(self)?);
        plan_extraction(ctx, builder, selection, &self.new_name, None)
    }
}

impl Operation for ExtractMethod {
    fn validate(&self, ctx: &PlanContext<'_>) -> RefitResult<()> {
        check_identifier(&self.new_name)?;
        check_identifier(&self.receiver_type)?;
        ctx.workspace.require_file(&self.file)?;
        Ok(())
    }

    fn plan(&self, ctx: &PlanContext<'_>) -> RefitResult<RefactoringPlan> {
        let file = ctx.workspace.require_file(&self.file)?;
        let selection = flow::select_range(file, line_span(file, self.start_line, self.end_line)?)?;
        let builder = PlanBuilder::new(ctx.workspace, "extract_method", serde_json::to_value(self)?);
        plan_extraction(ctx, builder, selection, &self.new_name, Some(&self.receiver_type))
    }
}

impl Operation for ExtractBlock {
    fn validate(&self, ctx: &PlanContext<'_>) -> RefitResult<()> {
        check_identifier(&self.new_name)?;
        ctx.workspace.require_file(&self.file)?;
        Ok(())
    }

    fn plan(&self, ctx: &PlanContext<'_>) -> RefitResult<RefactoringPlan> {
        let file = ctx.workspace.require_file(&self.file)?;
        let selection = flow::select_block(file, offset_of(file, self.position)?)?;
        let builder = PlanBuilder::new(ctx.workspace, "extract_block", serde_json::to_value(self)?);
        plan_extraction(ctx, builder, selection, &self.new_name, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::plan_request;
    use crate::operations::tests::{after, apply_plan, file, options, workspace};
    use pretty_assertions::assert_eq;
    use refit_foundation::protocol::requests::SourcePosition;
    use refit_foundation::{ErrorKind, RefactorRequest};
    use std::path::PathBuf;

    fn extract(path: &str, start_line: u32, end_line: u32, name: &str) -> RefactorRequest {
        RefactorRequest::ExtractFunction(ExtractFunction {
            file: PathBuf::from(path),
            start_line,
            end_line,
            new_name: name.to_string(),
        })
    }

    #[test]
    fn test_tail_range_becomes_returned_call() {
        let ws = workspace(&[(
            "geo/area.go",
            "package geo\n\nfunc Area(x, y int) int {\n\ts := x + y\n\tt := s * s\n\treturn t\n}\n",
        )]);
        let ctx = PlanContext::new(&ws, options());
        let plan = plan_request(&ctx, &extract("geo/area.go", 4, 6, "Square")).unwrap();
        let files = apply_plan(&ws, &plan);
        assert_eq!(
            file(&files, "geo/area.go"),
            "package geo\n\nfunc Area(x, y int) int {\n\treturn Square(x, y)\n}\n\nfunc Square(x, y int) int {\n\ts := x + y\n\tt := s * s\n\treturn t\n}\n"
        );
        assert!(after(&ws, &plan).checker_diagnostics().is_empty());
    }

    #[test]
    fn test_assigned_local_flows_back_to_caller() {
        let ws = workspace(&[(
            "p/p.go",
            "package p\n\nfunc Report(items []int) int {\n\ttotal := 0\n\tfor _, v := range items {\n\t\ttotal += v\n\t}\n\treturn total\n}\n",
        )]);
        let ctx = PlanContext::new(&ws, options());
        let plan = plan_request(&ctx, &extract("p/p.go", 5, 7, "sum")).unwrap();
        let files = apply_plan(&ws, &plan);
        assert_eq!(
            file(&files, "p/p.go"),
            "package p\n\nfunc Report(items []int) int {\n\ttotal := 0\n\ttotal = sum(items, total)\n\treturn total\n}\n\nfunc sum(items []int, total int) int {\n\tfor _, v := range items {\n\t\ttotal += v\n\t}\n\treturn total\n}\n"
        );
    }

    #[test]
    fn test_escaping_control_is_refused() {
        let ws = workspace(&[(
            "p/p.go",
            "package p\n\nfunc f(xs []int) {\n\tfor _, x := range xs {\n\t\tif x > 2 {\n\t\t\tbreak\n\t\t}\n\t}\n}\n\nfunc g() {\n\tdefer println(1)\n\tprintln(2)\n}\n",
        )]);
        let ctx = PlanContext::new(&ws, options());
        let err = plan_request(&ctx, &extract("p/p.go", 5, 7, "check")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        let err = plan_request(&ctx, &extract("p/p.go", 12, 13, "both")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn test_existing_name_is_a_conflict() {
        let ws = workspace(&[(
            "p/p.go",
            "package p\n\nfunc Used() {}\n\nfunc f() {\n\tprintln(1)\n}\n",
        )]);
        let ctx = PlanContext::new(&ws, options());
        assert!(plan_request(&ctx, &extract("p/p.go", 6, 6, "Used")).is_err());
    }

    #[test]
    fn test_early_return_uses_done_flag() {
        let ws = workspace(&[(
            "p/p.go",
            "package p\n\nfunc Find(xs []int, t int) int {\n\ti := 0\n\tfor i < len(xs) {\n\t\tif xs[i] == t {\n\t\t\treturn i\n\t\t}\n\t\ti++\n\t}\n\treturn -1\n}\n",
        )]);
        let ctx = PlanContext::new(&ws, options());
        let plan = plan_request(&ctx, &extract("p/p.go", 5, 10, "check")).unwrap();
        let files = apply_plan(&ws, &plan);
        assert_eq!(
            file(&files, "p/p.go"),
            "package p\n\nfunc Find(xs []int, t int) int {\n\ti := 0\n\tr, done := check(xs, t, i)\n\tif done {\n\t\treturn r\n\t}\n\treturn -1\n}\n\nfunc check(xs []int, t, i int) (int, bool) {\n\tfor i < len(xs) {\n\t\tif xs[i] == t {\n\t\t\treturn i, true\n\t\t}\n\t\ti++\n\t}\n\treturn 0, false\n}\n"
        );
    }

    #[test]
    fn test_done_flag_precedes_trailing_error() {
        let ws = workspace(&[(
            "p/p.go",
            "package p\n\nfunc Scan(xs []int, bad error) (int, error) {\n\ti := 0\n\tfor i < len(xs) {\n\t\tif xs[i] < 0 {\n\t\t\treturn i, bad\n\t\t}\n\t\ti++\n\t}\n\treturn len(xs), nil\n}\n",
        )]);
        let ctx = PlanContext::new(&ws, options());
        let plan = plan_request(&ctx, &extract("p/p.go", 5, 10, "check")).unwrap();
        let files = apply_plan(&ws, &plan);
        assert_eq!(
            file(&files, "p/p.go"),
            "package p\n\nfunc Scan(xs []int, bad error) (int, error) {\n\ti := 0\n\tr1, done, r2 := check(xs, bad, i)\n\tif done {\n\t\treturn r1, r2\n\t}\n\treturn len(xs), nil\n}\n\nfunc check(xs []int, bad error, i int) (int, bool, error) {\n\tfor i < len(xs) {\n\t\tif xs[i] < 0 {\n\t\t\treturn i, true, bad\n\t\t}\n\t\ti++\n\t}\n\treturn 0, false, nil\n}\n"
        );
    }

    #[test]
    fn test_extract_method_reuses_receiver() {
        let ws = workspace(&[(
            "p/cart.go",
            "package p\n\ntype Cart struct{ items []int }\n\nfunc (c *Cart) Total() int {\n\tsum := 0\n\tfor _, v := range c.items {\n\t\tsum += v\n\t}\n\treturn sum\n}\n",
        )]);
        let ctx = PlanContext::new(&ws, options());
        let request = RefactorRequest::ExtractMethod(ExtractMethod {
            file: PathBuf::from("p/cart.go"),
            start_line: 7,
            end_line: 9,
            new_name: "addItems".to_string(),
            receiver_type: "Cart".to_string(),
        });
        let plan = plan_request(&ctx, &request).unwrap();
        let files = apply_plan(&ws, &plan);
        assert_eq!(
            file(&files, "p/cart.go"),
            "package p\n\ntype Cart struct{ items []int }\n\nfunc (c *Cart) Total() int {\n\tsum := 0\n\tsum = c.addItems(sum)\n\treturn sum\n}\n\nfunc (c *Cart) addItems(sum int) int {\n\tfor _, v := range c.items {\n\t\tsum += v\n\t}\n\treturn sum\n}\n"
        );

        let clash = RefactorRequest::ExtractMethod(ExtractMethod {
            file: PathBuf::from("p/cart.go"),
            start_line: 7,
            end_line: 9,
            new_name: "items".to_string(),
            receiver_type: "Cart".to_string(),
        });
        assert!(plan_request(&ctx, &clash).is_err());
    }

    #[test]
    fn test_block_at_position_stops_at_blank_line() {
        let ws = workspace(&[(
            "p/p.go",
            "package p\n\nfunc Run() {\n\ta := 1\n\tb := a + 1\n\tprintln(a, b)\n\n\tc := 3\n\tprintln(c)\n}\n",
        )]);
        let ctx = PlanContext::new(&ws, options());
        let request = RefactorRequest::ExtractBlock(ExtractBlock {
            file: PathBuf::from("p/p.go"),
            position: SourcePosition { line: 4, column: 2 },
            new_name: "setup".to_string(),
        });
        let plan = plan_request(&ctx, &request).unwrap();
        let files = apply_plan(&ws, &plan);
        assert_eq!(
            file(&files, "p/p.go"),
            "package p\n\nfunc Run() {\n\tsetup()\n\n\tc := 3\n\tprintln(c)\n}\n\nfunc setup() {\n\ta := 1\n\tb := a + 1\n\tprintln(a, b)\n}\n"
        );
    }
}
