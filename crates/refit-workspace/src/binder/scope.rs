use super::{BindContext, Diagnostic, FileInfo, IdentUse, LocalDecl, LocalKind, MemberKind, Target, UseRole};
use crate::types::TypeRef;
use refit_ast::syntax::{is_predeclared, span, text};
use refit_ast::Node;
use std::collections::{HashMap, HashSet};
use std::ops::Range;

pub(super) struct Scope {
    names: HashMap<String, usize>,
    end: usize,
}

pub(crate) struct Binder<'a> {
    pub(super) ctx: &'a BindContext<'a>,
    pub(super) source: &'a str,
    pub(super) info: FileInfo,
    scopes: Vec<Scope>,
    labels: Vec<HashSet<String>>,
    functions: Vec<Range<usize>>,
    import_used: Vec<bool>,
    read_locals: HashSet<usize>,
}

impl<'a> Binder<'a> {
    pub(crate) fn new(ctx: &'a BindContext<'a>, source: &'a str) -> Self {
        Self {
            ctx,
            source,
            info: FileInfo::default(),
            scopes: Vec::new(),
            labels: Vec::new(),
            functions: Vec::new(),
            import_used: vec![false; ctx.imports.len()],
            read_locals: HashSet::new(),
        }
    }

    pub(crate) fn finish(mut self) -> FileInfo {
        for (i, import) in self.ctx.imports.iter().enumerate() {
            if self.import_used[i] || import.is_blank() || import.path == "C" {
                continue;
            }
            self.diagnose(
                import.span.clone(),
                format!("\"{}\" imported and not used", import.path),
            );
        }
        self.info
    }

    pub(super) fn text(&self, node: Node<'_>) -> &'a str {
        text(node, self.source)
    }

    pub(super) fn diagnose(&mut self, span: Range<usize>, message: impl Into<String>) {
        self.info.diagnostics.push(Diagnostic {
            span,
            message: message.into(),
        });
    }

    pub(super) fn push_scope(&mut self, end: usize) {
        self.scopes.push(Scope {
            names: HashMap::new(),
            end,
        });
    }

    pub(super) fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    pub(super) fn in_current_scope(&self, name: &str) -> Option<usize> {
        self.scopes.last()?.names.get(name).copied()
    }

    pub(super) fn record(
        &mut self,
        node: Node<'_>,
        target: Target,
        role: UseRole,
        qualifier: Option<Range<usize>>,
    ) {
        if let Target::Local(index) = target {
            if !matches!(role, UseRole::Declaration | UseRole::Write) {
                self.read_locals.insert(index);
            }
        }
        if let Target::Import(index) = target {
            if let Some(used) = self.import_used.get_mut(index) {
                *used = true;
            }
        }
        self.info.uses.push(IdentUse {
            span: span(node),
            name: self.text(node).to_string(),
            target,
            role,
            qualifier,
        });
    }

    /// Declare a local in the innermost scope, visible from `visible_from`
    pub(super) fn declare(
        &mut self,
        node: Node<'_>,
        kind: LocalKind,
        type_ref: Option<TypeRef>,
        visible_from: usize,
        check_redeclared: bool,
    ) -> Option<usize> {
        let name = self.text(node);
        if name == "_" || self.scopes.is_empty() {
            return None;
        }
        if check_redeclared && self.in_current_scope(name).is_some() {
            self.diagnose(span(node), format!("{} redeclared in this block", name));
        }
        let end = self.scopes.last().map(|s| s.end).unwrap_or(visible_from);
        let function = self.functions.last().cloned().unwrap_or(0..0);
        let index = self.info.locals.len();
        self.info.locals.push(LocalDecl {
            name: name.to_string(),
            span: span(node),
            scope: visible_from..end,
            kind,
            type_ref,
            function,
        });
        if let Some(scope) = self.scopes.last_mut() {
            scope.names.insert(name.to_string(), index);
        }
        self.record(node, Target::Local(index), UseRole::Declaration, None);
        Some(index)
    }

    /// Resolve a bare identifier through locals, package, imports and universe
    pub(super) fn resolve_name(&mut self, name: &str) -> Target {
        for scope in self.scopes.iter().rev() {
            if let Some(index) = scope.names.get(name) {
                return Target::Local(*index);
            }
        }
        let own = self.ctx.indices.get(self.ctx.package);
        if own.and_then(|i| i.package_level(name)).is_some() {
            return Target::Package {
                package: self.ctx.package.to_string(),
                name: name.to_string(),
            };
        }
        if let Some(index) = self
            .ctx
            .imports
            .iter()
            .position(|i| i.name == name && !i.is_dot() && !i.is_blank())
        {
            return Target::Import(index);
        }
        for (i, import) in self.ctx.imports.iter().enumerate() {
            if !import.is_dot() {
                continue;
            }
            let found = self
                .ctx
                .indices
                .get(&import.path)
                .and_then(|idx| idx.package_level(name))
                .map(|s| s.exported)
                .unwrap_or(false);
            if found {
                self.import_used[i] = true;
                return Target::Package {
                    package: import.path.clone(),
                    name: name.to_string(),
                };
            }
        }
        if is_predeclared(name) {
            return Target::Builtin;
        }
        if self
            .ctx
            .imports
            .iter()
            .any(|i| i.is_dot() && !self.ctx.indices.contains_key(&i.path))
        {
            // Could come from a dot-imported package outside the workspace.
            return Target::External {
                path: String::new(),
            };
        }
        Target::Unresolved
    }

    pub(super) fn is_type_target(&self, target: &Target) -> bool {
        match target {
            Target::Local(index) => self
                .info
                .locals
                .get(*index)
                .map(|l| l.kind == LocalKind::Type)
                .unwrap_or(false),
            Target::Package { package, name } => self
                .ctx
                .indices
                .get(package)
                .map(|i| i.types.contains_key(name))
                .unwrap_or(false),
            _ => false,
        }
    }

    pub(super) fn with_function<R>(&mut self, node: Node<'_>, f: impl FnOnce(&mut Self) -> R) -> R {
        self.functions.push(span(node));
        self.labels.push(self.collect_labels(node));
        self.push_scope(node.end_byte());
        let result = f(self);
        self.pop_scope();
        self.labels.pop();
        self.functions.pop();
        result
    }

    fn collect_labels(&self, function: Node<'_>) -> HashSet<String> {
        let mut labels = HashSet::new();
        let Some(body) = function.child_by_field_name("body") else {
            return labels;
        };
        let mut stack = vec![body];
        while let Some(node) = stack.pop() {
            if node.kind() == "func_literal" {
                continue;
            }
            if node.kind() == "labeled_statement" {
                if let Some(label) = node.child_by_field_name("label") {
                    labels.insert(self.text(label).to_string());
                }
            }
            let mut cursor = node.walk();
            stack.extend(node.named_children(&mut cursor));
        }
        labels
    }

    pub(super) fn label(&mut self, node: Node<'_>, role: UseRole) {
        let name = self.text(node);
        let known = self
            .labels
            .last()
            .map(|l| l.contains(name))
            .unwrap_or(false);
        if !known {
            self.diagnose(span(node), format!("label {} not defined", name));
        }
        self.record(node, Target::Label, role, None);
    }

    /// Walk top-level declarations
    pub(crate) fn file(&mut self, root: Node<'_>) {
        let mut cursor = root.walk();
        for decl in root.named_children(&mut cursor) {
            match decl.kind() {
                "function_declaration" => self.function_declaration(decl),
                "method_declaration" => self.method_declaration(decl),
                "type_declaration" => self.package_types(decl),
                "var_declaration" | "const_declaration" => self.package_values(decl),
                _ => {}
            }
        }
    }

    fn function_declaration(&mut self, decl: Node<'_>) {
        if let Some(name) = decl.child_by_field_name("name") {
            let target = Target::Package {
                package: self.ctx.package.to_string(),
                name: self.text(name).to_string(),
            };
            if self.text(name) != "init" && self.text(name) != "_" {
                self.record(name, target, UseRole::Declaration, None);
            }
        }
        let first_local = self.info.locals.len();
        self.with_function(decl, |b| {
            if let Some(params) = decl.child_by_field_name("type_parameters") {
                b.type_parameters(params);
            }
            b.signature(decl, decl.start_byte());
            if let Some(body) = decl.child_by_field_name("body") {
                b.body(body);
            }
        });
        self.report_unused(first_local);
    }

    fn method_declaration(&mut self, decl: Node<'_>) {
        let owner = refit_ast::syntax::receiver_type_name(decl, self.source);
        if let (Some(name), Some(owner)) = (decl.child_by_field_name("name"), owner.clone()) {
            let target = Target::Member {
                package: self.ctx.package.to_string(),
                owner,
                name: self.text(name).to_string(),
                kind: MemberKind::Method,
            };
            self.record(name, target, UseRole::Declaration, None);
        }
        let first_local = self.info.locals.len();
        self.with_function(decl, |b| {
            if let Some(receiver) = decl.child_by_field_name("receiver") {
                b.receiver(receiver, decl.start_byte());
            }
            b.signature(decl, decl.start_byte());
            if let Some(body) = decl.child_by_field_name("body") {
                b.body(body);
            }
        });
        self.report_unused(first_local);
    }

    fn receiver(&mut self, receiver: Node<'_>, visible_from: usize) {
        let mut cursor = receiver.walk();
        let params: Vec<Node<'_>> = receiver
            .named_children(&mut cursor)
            .filter(|n| n.kind() == "parameter_declaration")
            .collect();
        for param in params {
            let Some(ty) = param.child_by_field_name("type") else {
                continue;
            };
            let mut base = ty;
            let mut pointer = false;
            while matches!(base.kind(), "pointer_type" | "parenthesized_type") {
                pointer |= base.kind() == "pointer_type";
                match base.named_child(0) {
                    Some(inner) => base = inner,
                    None => break,
                }
            }
            let type_ref = if base.kind() == "generic_type" {
                // Receiver type parameters are declared by the receiver itself.
                if let Some(args) = base.child_by_field_name("type_arguments") {
                    let mut stack = vec![args];
                    while let Some(node) = stack.pop() {
                        if matches!(node.kind(), "type_identifier" | "identifier") {
                            self.declare(node, LocalKind::Type, None, visible_from, false);
                            continue;
                        }
                        let mut c = node.walk();
                        stack.extend(node.named_children(&mut c));
                    }
                }
                match base.child_by_field_name("type") {
                    Some(name) => self.ty(name),
                    None => self.ty(base),
                }
            } else {
                self.ty(base)
            };
            let type_ref = if pointer {
                TypeRef::Pointer(Box::new(type_ref))
            } else {
                type_ref
            };
            let mut names_cursor = param.walk();
            let names: Vec<Node<'_>> = param
                .children_by_field_name("name", &mut names_cursor)
                .collect();
            for name in names {
                self.declare(
                    name,
                    LocalKind::Receiver,
                    Some(type_ref.clone()),
                    visible_from,
                    false,
                );
            }
        }
    }

    pub(super) fn type_parameters(&mut self, list: Node<'_>) {
        let mut cursor = list.walk();
        let decls: Vec<Node<'_>> = list.named_children(&mut cursor).collect();
        // Constraints may mention any parameter of the list, so declare first.
        for decl in &decls {
            let mut names_cursor = decl.walk();
            let names: Vec<Node<'_>> = decl
                .children_by_field_name("name", &mut names_cursor)
                .collect();
            for name in names {
                self.declare(name, LocalKind::Type, None, list.start_byte(), true);
            }
        }
        for decl in decls {
            if let Some(constraint) = decl.child_by_field_name("type") {
                self.ty(constraint);
            }
        }
    }

    /// Parameters and results of a function, method or literal
    pub(super) fn signature(&mut self, node: Node<'_>, visible_from: usize) {
        if let Some(params) = node.child_by_field_name("parameters") {
            self.parameter_list(params, LocalKind::Param, visible_from);
        }
        if let Some(result) = node.child_by_field_name("result") {
            if result.kind() == "parameter_list" {
                self.parameter_list(result, LocalKind::Result, visible_from);
            } else {
                self.ty(result);
            }
        }
    }

    fn parameter_list(&mut self, list: Node<'_>, kind: LocalKind, visible_from: usize) {
        let mut cursor = list.walk();
        let decls: Vec<Node<'_>> = list.named_children(&mut cursor).collect();
        for decl in decls {
            let variadic = decl.kind() == "variadic_parameter_declaration";
            if decl.kind() != "parameter_declaration" && !variadic {
                continue;
            }
            let mut type_ref = decl.child_by_field_name("type").map(|t| self.ty(t));
            if variadic {
                type_ref = type_ref.map(|t| TypeRef::Slice(Box::new(t)));
            }
            let mut names_cursor = decl.walk();
            let names: Vec<Node<'_>> = decl
                .children_by_field_name("name", &mut names_cursor)
                .collect();
            for name in names {
                self.declare(name, kind, type_ref.clone(), visible_from, true);
            }
        }
    }

    fn report_unused(&mut self, first_local: usize) {
        let unused: Vec<(Range<usize>, String)> = self.info.locals[first_local..]
            .iter()
            .enumerate()
            .filter(|(offset, local)| {
                local.kind == LocalKind::Var && !self.read_locals.contains(&(first_local + offset))
            })
            .map(|(_, local)| (local.span.clone(), local.name.clone()))
            .collect();
        for (span, name) in unused {
            self.diagnose(span, format!("declared and not used: {}", name));
        }
    }

    fn package_types(&mut self, decl: Node<'_>) {
        let mut cursor = decl.walk();
        let specs: Vec<Node<'_>> = decl.named_children(&mut cursor).collect();
        for spec in specs {
            if !matches!(spec.kind(), "type_spec" | "type_alias") {
                continue;
            }
            let Some(name) = spec.child_by_field_name("name") else {
                continue;
            };
            let owner = self.text(name).to_string();
            self.record(
                name,
                Target::Package {
                    package: self.ctx.package.to_string(),
                    name: owner.clone(),
                },
                UseRole::Declaration,
                None,
            );
            let Some(ty) = spec.child_by_field_name("type") else {
                continue;
            };
            self.push_scope(spec.end_byte());
            if let Some(params) = spec.child_by_field_name("type_parameters") {
                self.type_parameters(params);
            }
            match ty.kind() {
                "struct_type" => self.struct_members(&owner, ty),
                "interface_type" => self.interface_members(&owner, ty),
                _ => {
                    self.ty(ty);
                }
            }
            self.pop_scope();
        }
    }

    fn struct_members(&mut self, owner: &str, struct_type: Node<'_>) {
        let Some(list) =
            refit_ast::visitor::find_first(struct_type, |n| n.kind() == "field_declaration_list")
        else {
            return;
        };
        let mut cursor = list.walk();
        let fields: Vec<Node<'_>> = list
            .named_children(&mut cursor)
            .filter(|n| n.kind() == "field_declaration")
            .collect();
        for field in fields {
            let mut names_cursor = field.walk();
            let names: Vec<Node<'_>> = field
                .children_by_field_name("name", &mut names_cursor)
                .collect();
            for name in names {
                let target = Target::Member {
                    package: self.ctx.package.to_string(),
                    owner: owner.to_string(),
                    name: self.text(name).to_string(),
                    kind: MemberKind::Field,
                };
                self.record(name, target, UseRole::Declaration, None);
            }
            if let Some(ty) = field.child_by_field_name("type") {
                self.ty(ty);
            }
        }
    }

    fn interface_members(&mut self, owner: &str, interface_type: Node<'_>) {
        let mut cursor = interface_type.walk();
        let elems: Vec<Node<'_>> = interface_type.named_children(&mut cursor).collect();
        for elem in elems {
            match elem.kind() {
                "method_elem" | "method_spec" => {
                    if let Some(name) = elem.child_by_field_name("name") {
                        let target = Target::Member {
                            package: self.ctx.package.to_string(),
                            owner: owner.to_string(),
                            name: self.text(name).to_string(),
                            kind: MemberKind::InterfaceMethod,
                        };
                        self.record(name, target, UseRole::Declaration, None);
                    }
                    self.function_type_parts(elem);
                }
                "comment" => {}
                _ => {
                    self.ty(elem);
                }
            }
        }
    }

    /// Types of a signature without declaring its names
    pub(super) fn function_type_parts(&mut self, node: Node<'_>) {
        for field in ["parameters", "result"] {
            let Some(part) = node.child_by_field_name(field) else {
                continue;
            };
            if part.kind() != "parameter_list" {
                self.ty(part);
                continue;
            }
            let mut cursor = part.walk();
            let decls: Vec<Node<'_>> = part.named_children(&mut cursor).collect();
            for decl in decls {
                if let Some(ty) = decl.child_by_field_name("type") {
                    self.ty(ty);
                }
            }
        }
    }

    fn package_values(&mut self, decl: Node<'_>) {
        let spec_kind = if decl.kind() == "const_declaration" {
            "const_spec"
        } else {
            "var_spec"
        };
        for spec in crate::symbols::specs(decl, spec_kind) {
            let mut names_cursor = spec.walk();
            let names: Vec<Node<'_>> = spec
                .children_by_field_name("name", &mut names_cursor)
                .collect();
            for name in names {
                if self.text(name) == "_" {
                    continue;
                }
                let target = Target::Package {
                    package: self.ctx.package.to_string(),
                    name: self.text(name).to_string(),
                };
                self.record(name, target, UseRole::Declaration, None);
            }
            if let Some(ty) = spec.child_by_field_name("type") {
                self.ty(ty);
            }
            if let Some(values) = spec.child_by_field_name("value") {
                let mut cursor = values.walk();
                let exprs: Vec<Node<'_>> = values.named_children(&mut cursor).collect();
                for value in exprs {
                    self.expr(value);
                }
            }
        }
    }
}
