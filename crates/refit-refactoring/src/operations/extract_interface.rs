//! Declare an interface from a type's method set.

use super::require_parsable;
use crate::builder::PlanBuilder;
use crate::context::{Operation, PlanContext};
use crate::impact;
use crate::naming::check_identifier;
use crate::rewrite::{relocate, Relocation};
use refit_ast::syntax::{is_exported, line_end, text};
use refit_foundation::protocol::requests::ExtractInterface;
use refit_foundation::{RefactoringPlan, RefitError, RefitResult, SymbolKind};
use refit_workspace::resolver;
use refit_workspace::{LocalKind, Package, Symbol, UseRole, Workspace};
use std::ops::Range;
use std::path::PathBuf;
use tracing::debug;

trait ExtractInterfaceExt {
    fn source<'w>(&self, ws: &'w Workspace) -> RefitResult<&'w Symbol>;
    fn selected<'w>(&self, ws: &'w Workspace, source: &Symbol) -> RefitResult<Vec<&'w Symbol>>;
}

impl ExtractInterfaceExt for ExtractInterface {
    fn source<'w>(&self, ws: &'w Workspace) -> RefitResult<&'w Symbol> {
        let symbol = resolver::lookup(ws, &self.source_type, None, self.source_package.as_deref())?;
        if symbol.kind != SymbolKind::Type {
            return Err(RefitError::usage(format!(
                "'{}' is a {}, not a concrete named type",
                self.source_type, symbol.kind
            )));
        }
        Ok(symbol)
    }

    /// Methods the interface declares, in request order
    fn selected<'w>(&self, ws: &'w Workspace, source: &Symbol) -> RefitResult<Vec<&'w Symbol>> {
        let set = resolver::method_set(ws, &source.package, &source.name);
        if self.methods.is_empty() {
            let exported: Vec<&Symbol> = set.into_iter().filter(|m| m.exported).collect();
            if exported.is_empty() {
                return Err(RefitError::usage(format!(
                    "{} has no exported methods",
                    source.name
                )));
            }
            return Ok(exported);
        }
        self.methods
            .iter()
            .map(|name| {
                set.iter().copied().find(|m| &m.name == name).ok_or_else(|| {
                    RefitError::not_found(format!("method {}.{}", source.name, name))
                })
            })
            .collect()
    }
}

/// Span of `Name(params) results` inside a method declaration or interface element
fn method_spec_span(method: &Symbol) -> Range<usize> {
    let signature_len = method
        .signature
        .as_ref()
        .map(|s| s.len())
        .unwrap_or(method.span.len());
    method.name_span.start..method.span.start + signature_len
}

/// Where the declaration goes: after the source type in its own package,
/// at the end of the preferred file elsewhere
fn insertion_point(ws: &Workspace, target: &Package, source: &Symbol) -> RefitResult<(PathBuf, usize, String)> {
    if target.key == source.package {
        let file = ws.require_file(&source.file)?;
        let at = line_end(&file.content, source.span.end);
        return Ok((file.path.clone(), at, "\n".to_string()));
    }
    let file = target
        .preferred_file()
        .ok_or_else(|| RefitError::not_found(format!("source file in package {}", target.key)))?;
    let separator = if file.content.ends_with('\n') { "\n" } else { "\n\n" };
    Ok((file.path.clone(), file.content.len(), separator.to_string()))
}

/// Parameter that only ever calls interface methods, and the span of its type
struct Generalizable {
    file: PathBuf,
    type_span: Range<usize>,
}

fn generalizable_parameters(
    ws: &Workspace,
    source: &Symbol,
    methods: &[&Symbol],
    interface_exported: bool,
    target: &str,
) -> Vec<Generalizable> {
    let value_receivers = methods.iter().all(|m| !m.pointer_receiver);
    let mut out = Vec::new();
    let functions = ws.packages.values().flat_map(|p| {
        p.symbols
            .functions
            .values()
            .chain(p.symbols.methods.values().flatten())
    });
    for function in functions {
        if function.package != target && !interface_exported {
            continue;
        }
        let Some(file) = ws.file(&function.file) else {
            continue;
        };
        for param in &function.params {
            let Some(type_ref) = &param.type_ref else {
                continue;
            };
            let pointer = matches!(type_ref, refit_workspace::TypeRef::Pointer(_));
            let of_source = type_ref.deref().named()
                == Some((source.package.as_str(), source.name.as_str()));
            if !of_source || !(pointer || value_receivers) || param.variadic {
                continue;
            }
            let Some(name) = &param.name else {
                continue;
            };
            let Some(local) = file.info.locals.iter().position(|l| {
                l.kind == LocalKind::Param && &l.name == name && l.function == function.span
            }) else {
                continue;
            };
            let only_calls = file
                .info
                .uses_of_local(local)
                .filter(|u| u.role != UseRole::Declaration)
                .all(|u| {
                    methods.iter().any(|m| {
                        file.content[u.span.end..].starts_with(&format!(".{}(", m.name))
                    })
                });
            let declaration = file
                .node_at(file.info.locals[local].span.clone())
                .and_then(|n| n.parent())
                .filter(|p| p.kind() == "parameter_declaration");
            let Some(declaration) = declaration else {
                continue;
            };
            let mut cursor = declaration.walk();
            let names = declaration
                .children_by_field_name("name", &mut cursor)
                .count();
            let type_node = declaration.child_by_field_name("type");
            if let (true, 1, Some(type_node)) = (only_calls, names, type_node) {
                debug!(
                    function = %function.qualified_name(),
                    parameter = %name,
                    ty = text(type_node, &file.content),
                    "Generalizing parameter"
                );
                out.push(Generalizable {
                    file: file.path.clone(),
                    type_span: type_node.start_byte()..type_node.end_byte(),
                });
            }
        }
    }
    out
}

impl Operation for ExtractInterface {
    fn validate(&self, ctx: &PlanContext<'_>) -> RefitResult<()> {
        check_identifier(&self.interface_name)?;
        let ws = ctx.workspace;
        let source = self.source(ws)?;
        self.selected(ws, source)?;
        ws.resolve_package(&self.target_package)?;
        Ok(())
    }

    fn plan(&self, ctx: &PlanContext<'_>) -> RefitResult<RefactoringPlan> {
        let ws = ctx.workspace;
        let source = self.source(ws)?;
        let methods = self.selected(ws, source)?;
        let target = ws.resolve_package(&self.target_package)?;
        let (dest_path, at, separator) = insertion_point(ws, target, source)?;
        require_parsable(ws, ws.require_file(&dest_path)?)?;
        debug!(
            source = %source.qualified_name(),
            interface = %self.interface_name,
            target = %target.key,
            methods = methods.len(),
            "Planning interface extraction"
        );

        let mut builder = PlanBuilder::new(ws, "extract_interface", serde_json::to_value(self)?);
        builder.issues(impact::package_conflicts(ws, &target.key, &self.interface_name, None));

        let mut specs = Vec::new();
        for method in &methods {
            let file = ws.require_file(&method.file)?;
            let relocation = Relocation::new(file, method_spec_span(method), &dest_path, &target.key);
            specs.push(relocate(&mut builder, &relocation)?);
        }
        let mut declaration = format!("type {} interface {{\n", self.interface_name);
        for spec in &specs {
            declaration.push_str(&format!("\t{}\n", spec));
        }
        declaration.push_str("}\n");
        builder.insert(
            &dest_path,
            at,
            format!("{}{}", separator, declaration),
            format!("Declare interface {}", self.interface_name),
        );

        if self.update_call_sites {
            let sites = generalizable_parameters(
                ws,
                source,
                &methods,
                is_exported(&self.interface_name),
                &target.key,
            );
            builder.count_references(sites.len());
            for site in sites {
                let in_target = ws
                    .package_of(&site.file)
                    .map(|p| p.key == target.key)
                    .unwrap_or(false);
                let spelled = if in_target {
                    self.interface_name.clone()
                } else {
                    let qualifier = builder.ensure_import(&site.file, &target.key);
                    format!("{}.{}", qualifier, self.interface_name)
                };
                builder.replace(
                    &site.file,
                    site.type_span,
                    spelled,
                    format!("Accept {} instead of {}", self.interface_name, source.name),
                );
            }
        }
        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::plan_request;
    use crate::operations::tests::{after, apply_plan, file, options, workspace};
    use pretty_assertions::assert_eq;
    use refit_foundation::{ErrorKind, RefactorRequest};

    fn request(source: &str, name: &str, methods: &[&str], target: &str, update: bool) -> RefactorRequest {
        RefactorRequest::ExtractInterface(ExtractInterface {
            source_type: source.to_string(),
            interface_name: name.to_string(),
            methods: methods.iter().map(|m| m.to_string()).collect(),
            target_package: target.to_string(),
            source_package: None,
            update_call_sites: update,
        })
    }

    const STORE: &str = "package store\n\ntype File struct{ name string }\n\nfunc (f *File) Read(p []byte) (int, error) { return 0, nil }\n\nfunc (f *File) Close() error { return nil }\n\nfunc (f *File) reset() {}\n";

    const SHAPES: &str = "package shapes\n\ntype Point struct{ X, Y int }\n\ntype Poly struct{ pts []Point }\n\nfunc (p *Poly) Add(pt Point) { p.pts = append(p.pts, pt) }\n\nfunc (p *Poly) Len() int { return len(p.pts) }\n";

    #[test]
    fn test_exported_method_set_next_to_the_type() {
        let ws = workspace(&[("store/file.go", STORE)]);
        let ctx = PlanContext::new(&ws, options());
        let plan = plan_request(&ctx, &request("File", "ReadCloser", &[], "store", false)).unwrap();
        let files = apply_plan(&ws, &plan);
        assert_eq!(
            file(&files, "store/file.go"),
            STORE.replace(
                "type File struct{ name string }\n",
                "type File struct{ name string }\n\ntype ReadCloser interface {\n\tClose() error\n\tRead(p []byte) (int, error)\n}\n"
            )
        );
        assert!(after(&ws, &plan).checker_diagnostics().is_empty());
    }

    #[test]
    fn test_other_package_qualifies_signature_types() {
        let ws = workspace(&[
            ("shapes/shapes.go", SHAPES),
            ("api/api.go", "package api\n\nfunc Version() string { return \"1\" }\n"),
        ]);
        let ctx = PlanContext::new(&ws, options());
        let plan = plan_request(&ctx, &request("Poly", "Shape", &["Add", "Len"], "api", false)).unwrap();
        let files = apply_plan(&ws, &plan);
        assert_eq!(
            file(&files, "api/api.go"),
            "package api\n\nimport \"example.com/m/shapes\"\n\nfunc Version() string { return \"1\" }\n\ntype Shape interface {\n\tAdd(pt shapes.Point)\n\tLen() int\n}\n"
        );
    }

    #[test]
    fn test_unknown_method_and_name_clash() {
        let ws = workspace(&[("shapes/shapes.go", SHAPES)]);
        let ctx = PlanContext::new(&ws, options());
        let err = plan_request(&ctx, &request("Poly", "Shape", &["Area"], "shapes", false)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(plan_request(&ctx, &request("Poly", "Point", &["Len"], "shapes", false)).is_err());
    }

    #[test]
    fn test_call_sites_accept_the_interface() {
        let source = format!("{}\nfunc Size(p *Poly) int {{ return p.Len() }}\n\nfunc Grow(p *Poly) {{ p.pts = nil }}\n", SHAPES);
        let ws = workspace(&[("shapes/shapes.go", &source)]);
        let ctx = PlanContext::new(&ws, options());
        let plan = plan_request(&ctx, &request("Poly", "Sizer", &["Len"], "shapes", true)).unwrap();
        let files = apply_plan(&ws, &plan);
        let updated = file(&files, "shapes/shapes.go");
        assert!(updated.contains("func Size(p Sizer) int { return p.Len() }"));
        assert!(updated.contains("func Grow(p *Poly) { p.pts = nil }"));
        assert_eq!(plan.impact.references, 1);
    }
}
