use super::scope::Binder;
use super::{LocalKind, MemberKind, Target, UseRole};
use crate::symbols::literal_type;
use crate::types::TypeRef;
use refit_ast::syntax::span;
use refit_ast::Node;
use refit_foundation::SymbolKind;

enum MemberLookup {
    Found(Target, Option<TypeRef>),
    /// The type is fully known and has no such member
    Missing,
    Unknown,
}

const MAX_EMBEDDING_DEPTH: usize = 4;

impl Binder<'_> {
    /// Bind an expression and return its type when it is a single value
    pub(super) fn expr(&mut self, node: Node<'_>) -> Option<TypeRef> {
        self.expr_role(node, UseRole::Read)
    }

    /// Bind an expression that may produce several values
    pub(super) fn expr_values(&mut self, node: Node<'_>) -> Vec<Option<TypeRef>> {
        match node.kind() {
            "call_expression" => self.call(node),
            "parenthesized_expression" => match node.named_child(0) {
                Some(inner) => self.expr_values(inner),
                None => vec![None],
            },
            _ => vec![self.expr(node)],
        }
    }

    fn expr_role(&mut self, node: Node<'_>, role: UseRole) -> Option<TypeRef> {
        if let Some(ty) = literal_type(node) {
            return Some(ty);
        }
        match node.kind() {
            "identifier" => self.ident(node, role),
            "selector_expression" => self.selector(node, role),
            "call_expression" => {
                let values = self.call(node);
                if values.len() == 1 {
                    values.into_iter().next().flatten()
                } else {
                    None
                }
            }
            "composite_literal" => self.composite(node),
            "func_literal" => {
                self.func_literal(node);
                None
            }
            "parenthesized_expression" => node
                .named_child(0)
                .and_then(|inner| self.expr_role(inner, role)),
            "unary_expression" => self.unary(node),
            "binary_expression" => {
                let left = node.child_by_field_name("left").and_then(|l| self.expr(l));
                let right = node.child_by_field_name("right").and_then(|r| self.expr(r));
                let op = node
                    .child_by_field_name("operator")
                    .map(|o| self.text(o))
                    .unwrap_or("");
                if matches!(op, "==" | "!=" | "<" | "<=" | ">" | ">=" | "&&" | "||") {
                    Some(TypeRef::basic("bool"))
                } else if matches!(op, "<<" | ">>") {
                    left
                } else {
                    left.or(right)
                }
            }
            "index_expression" => {
                let operand = node
                    .child_by_field_name("operand")
                    .and_then(|o| self.expr_role(o, role));
                let mut cursor = node.walk();
                let indices: Vec<Node<'_>> =
                    node.children_by_field_name("index", &mut cursor).collect();
                for index in indices {
                    self.expr(index);
                }
                operand.and_then(|t| self.underlying(&t).element())
            }
            "slice_expression" => {
                let operand = node.child_by_field_name("operand").and_then(|o| self.expr(o));
                for field in ["start", "end", "capacity"] {
                    if let Some(part) = node.child_by_field_name(field) {
                        self.expr(part);
                    }
                }
                operand.map(|t| match self.underlying(&t) {
                    TypeRef::Array { elem, .. } => TypeRef::Slice(elem),
                    TypeRef::Pointer(inner) => match *inner {
                        TypeRef::Array { elem, .. } => TypeRef::Slice(elem),
                        other => other,
                    },
                    _ => t,
                })
            }
            "type_assertion_expression" => {
                if let Some(operand) = node.child_by_field_name("operand") {
                    self.expr(operand);
                }
                node.child_by_field_name("type").map(|t| self.ty(t))
            }
            "type_conversion_expression" => {
                let ty = node.child_by_field_name("type").map(|t| self.ty(t));
                if let Some(operand) = node.child_by_field_name("operand") {
                    self.expr(operand);
                }
                ty
            }
            "true" | "false" => Some(TypeRef::basic("bool")),
            "nil" | "iota" | "comment" | "field_identifier" | "package_identifier"
            | "label_name" => None,
            "literal_value" => {
                self.literal_value(node, None);
                None
            }
            kind if kind.ends_with("_type") || kind == "type_identifier" => Some(self.ty(node)),
            _ => {
                let mut cursor = node.walk();
                let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
                for child in children {
                    self.expr(child);
                }
                None
            }
        }
    }

    fn ident(&mut self, node: Node<'_>, role: UseRole) -> Option<TypeRef> {
        let name = self.text(node);
        if name == "_" {
            return None;
        }
        let target = self.resolve_name(name);
        if target == Target::Unresolved {
            self.diagnose(span(node), format!("undefined: {}", name));
        }
        let role = if self.is_type_target(&target) {
            UseRole::TypeUse
        } else {
            role
        };
        let ty = self.value_type(&target, name);
        self.record(node, target, role, None);
        ty
    }

    /// Type of a value (or of a type name, for conversions) behind a target
    fn value_type(&self, target: &Target, name: &str) -> Option<TypeRef> {
        match target {
            Target::Local(index) => {
                let local = self.info.locals.get(*index)?;
                if local.kind == LocalKind::Type {
                    Some(TypeRef::Opaque {
                        package: self.ctx.package.to_string(),
                        text: local.name.clone(),
                    })
                } else {
                    local.type_ref.clone()
                }
            }
            Target::Package { package, name } => {
                let index = self.ctx.indices.get(package)?;
                if index.types.contains_key(name) {
                    return Some(TypeRef::Named {
                        package: package.clone(),
                        name: name.clone(),
                    });
                }
                index.package_level(name)?.type_ref.clone()
            }
            Target::Member { .. } => self.ctx.symbol(target)?.type_ref.clone(),
            Target::Builtin => match name {
                "true" | "false" => Some(TypeRef::basic("bool")),
                "nil" | "iota" => None,
                other if refit_ast::syntax::PREDECLARED[..22].contains(&other) => {
                    Some(TypeRef::basic(other))
                }
                _ => None,
            },
            _ => None,
        }
    }

    fn selector(&mut self, node: Node<'_>, role: UseRole) -> Option<TypeRef> {
        let (Some(operand), Some(field)) = (
            node.child_by_field_name("operand"),
            node.child_by_field_name("field"),
        ) else {
            return None;
        };
        let field_name = self.text(field);

        if operand.kind() == "identifier" {
            let qualifier = self.text(operand);
            if let Target::Import(index) = self.resolve_name(qualifier) {
                self.record(operand, Target::Import(index), UseRole::Read, None);
                return self.qualified(index, operand, field, role);
            }
        }

        let operand_type = self.expr(operand);
        let lookup = match &operand_type {
            Some(t) => self.lookup_member(t, field_name, 0),
            None => MemberLookup::Unknown,
        };
        match lookup {
            MemberLookup::Found(target, ty) => {
                self.record(field, target, role, None);
                ty
            }
            MemberLookup::Missing => {
                let type_name = operand_type
                    .as_ref()
                    .and_then(|t| t.named().map(|(_, n)| n.to_string()))
                    .unwrap_or_default();
                self.diagnose(
                    span(field),
                    format!(
                        "{}.{} undefined (type {} has no field or method {})",
                        self.text(operand),
                        field_name,
                        type_name,
                        field_name
                    ),
                );
                self.record(field, Target::Unresolved, role, None);
                None
            }
            MemberLookup::Unknown => {
                self.record(field, Target::UnknownMember, role, None);
                None
            }
        }
    }

    /// `pkg.Name` through import `index`
    fn qualified(
        &mut self,
        index: usize,
        qualifier: Node<'_>,
        name: Node<'_>,
        role: UseRole,
    ) -> Option<TypeRef> {
        let import = &self.ctx.imports[index];
        let path = import.path.clone();
        let text = self.text(name);
        let qualifier_span = Some(span(qualifier));
        let Some(package_index) = self.ctx.indices.get(&path) else {
            self.record(name, Target::External { path }, role, qualifier_span);
            return None;
        };
        let Some(symbol) = package_index.package_level(text) else {
            self.diagnose(span(name), format!("undefined: {}.{}", self.text(qualifier), text));
            self.record(name, Target::Unresolved, role, qualifier_span);
            return None;
        };
        if !symbol.exported {
            self.diagnose(
                span(name),
                format!(
                    "cannot refer to unexported name {}.{}",
                    self.text(qualifier),
                    text
                ),
            );
        }
        let is_type = package_index.types.contains_key(text);
        let ty = if is_type {
            Some(TypeRef::Named {
                package: path.clone(),
                name: text.to_string(),
            })
        } else {
            symbol.type_ref.clone()
        };
        let role = if is_type { UseRole::TypeUse } else { role };
        self.record(
            name,
            Target::Package {
                package: path,
                name: text.to_string(),
            },
            role,
            qualifier_span,
        );
        ty
    }

    /// Follow named types to their underlying type
    pub(super) fn underlying(&self, t: &TypeRef) -> TypeRef {
        let mut current = t.clone();
        for _ in 0..MAX_EMBEDDING_DEPTH {
            let next = match &current {
                TypeRef::Named { package, name } => self
                    .ctx
                    .indices
                    .get(package)
                    .and_then(|i| i.underlying.get(name))
                    .cloned(),
                _ => None,
            };
            match next {
                Some(next) => current = next,
                None => break,
            }
        }
        current
    }

    fn lookup_member(&self, t: &TypeRef, name: &str, depth: usize) -> MemberLookup {
        if depth > MAX_EMBEDDING_DEPTH {
            return MemberLookup::Unknown;
        }
        let Some((package, owner)) = t.named() else {
            return MemberLookup::Unknown;
        };
        let Some(index) = self.ctx.indices.get(package) else {
            return MemberLookup::Unknown;
        };
        let member = |kind| Target::Member {
            package: package.to_string(),
            owner: owner.to_string(),
            name: name.to_string(),
            kind,
        };
        if index.method(owner, name).is_some() {
            return MemberLookup::Found(member(MemberKind::Method), None);
        }
        if let Some(field) = index.field(owner, name) {
            return MemberLookup::Found(member(MemberKind::Field), field.type_ref.clone());
        }
        if index.interface_method(owner, name).is_some() {
            return MemberLookup::Found(member(MemberKind::InterfaceMethod), None);
        }

        let mut unknown = false;
        let embedded: Vec<TypeRef> = index
            .fields
            .get(owner)
            .map(|fields| {
                fields
                    .iter()
                    .filter(|f| f.embedded)
                    .filter_map(|f| f.type_ref.clone())
                    .collect()
            })
            .unwrap_or_default();
        let interfaces = index
            .embedded_interfaces
            .get(owner)
            .cloned()
            .unwrap_or_default();
        for inner in embedded.iter().chain(interfaces.iter()) {
            match self.lookup_member(inner, name, depth + 1) {
                found @ MemberLookup::Found(..) => return found,
                MemberLookup::Unknown => unknown = true,
                MemberLookup::Missing => {}
            }
        }
        if unknown {
            return MemberLookup::Unknown;
        }
        if index.fields.contains_key(owner) || index.interface_methods.contains_key(owner) {
            return MemberLookup::Missing;
        }
        match index.underlying.get(owner) {
            Some(TypeRef::Basic(_))
            | Some(TypeRef::Slice(_))
            | Some(TypeRef::Map { .. })
            | Some(TypeRef::Array { .. })
            | Some(TypeRef::Chan { .. }) => MemberLookup::Missing,
            _ => MemberLookup::Unknown,
        }
    }

    /// Bind a call and return its result types
    pub(super) fn call(&mut self, node: Node<'_>) -> Vec<Option<TypeRef>> {
        let Some(function) = node.child_by_field_name("function") else {
            return vec![None];
        };
        if let Some(type_args) = node.child_by_field_name("type_arguments") {
            self.ty(type_args);
        }
        let mut cursor = node.walk();
        let args: Vec<Node<'_>> = node
            .child_by_field_name("arguments")
            .map(|a| {
                a.named_children(&mut cursor)
                    .filter(|c| c.kind() != "comment")
                    .collect()
            })
            .unwrap_or_default();

        if function.kind() == "identifier" {
            let name = self.text(function);
            if matches!(name, "new" | "make" | "append" | "len" | "cap" | "copy")
                && self.resolve_name(name) == Target::Builtin
            {
                self.record(function, Target::Builtin, UseRole::Call, None);
                return vec![self.builtin_call(name, &args)];
            }
        }

        // Conversions spelled with composite type syntax: []byte(s), (*T)(p)
        let callee = strip_parens(function);
        if callee.kind().ends_with("_type") {
            let ty = self.ty(callee);
            for arg in args {
                self.expr(arg);
            }
            return vec![Some(ty)];
        }

        let function_type = self.expr_role(function, UseRole::Call);
        for arg in &args {
            self.argument(*arg);
        }

        let ident = callee_identifier(callee);
        let target = ident.and_then(|id| {
            let id_span = span(id);
            self.info
                .uses
                .iter()
                .rev()
                .find(|u| u.span == id_span)
                .map(|u| u.target.clone())
        });
        let Some(target) = target else {
            return vec![None];
        };
        // Conversion: T(x), int(x)
        if self.is_type_target(&target) || (target == Target::Builtin && function_type.is_some()) {
            return vec![function_type];
        }
        match self.ctx.symbol(&target) {
            Some(symbol) if matches!(symbol.kind, SymbolKind::Function | SymbolKind::Method) => {
                symbol.results.iter().map(|r| r.type_ref.clone()).collect()
            }
            _ => vec![None],
        }
    }

    fn argument(&mut self, arg: Node<'_>) {
        if arg.kind().ends_with("_type") || arg.kind() == "type_identifier" {
            self.ty(arg);
        } else {
            self.expr(arg);
        }
    }

    fn builtin_call(&mut self, name: &str, args: &[Node<'_>]) -> Option<TypeRef> {
        match name {
            "new" | "make" => {
                let first = args.first().map(|a| self.ty(*a));
                for arg in args.iter().skip(1) {
                    self.expr(*arg);
                }
                let first = first?;
                if name == "new" {
                    Some(TypeRef::Pointer(Box::new(first)))
                } else {
                    Some(first)
                }
            }
            _ => {
                let types: Vec<Option<TypeRef>> = args.iter().map(|a| self.expr(*a)).collect();
                match name {
                    "append" => types.into_iter().next().flatten(),
                    _ => Some(TypeRef::basic("int")),
                }
            }
        }
    }

    fn unary(&mut self, node: Node<'_>) -> Option<TypeRef> {
        let op = node
            .child_by_field_name("operator")
            .map(|o| self.text(o))
            .unwrap_or("");
        let operand = node.child_by_field_name("operand").and_then(|o| self.expr(o));
        match op {
            "&" => operand.map(|t| TypeRef::Pointer(Box::new(t))),
            "*" => operand.map(|t| match t {
                TypeRef::Pointer(inner) => *inner,
                other => other,
            }),
            "<-" => operand.and_then(|t| match self.underlying(&t) {
                TypeRef::Chan { elem, .. } => Some(*elem),
                _ => None,
            }),
            "!" => Some(TypeRef::basic("bool")),
            _ => operand,
        }
    }

    fn composite(&mut self, node: Node<'_>) -> Option<TypeRef> {
        let ty = node.child_by_field_name("type").map(|t| self.ty(t));
        if let Some(body) = node.child_by_field_name("body") {
            self.literal_value(body, ty.as_ref());
        }
        ty
    }

    fn literal_value(&mut self, body: Node<'_>, ty: Option<&TypeRef>) {
        let underlying = ty.map(|t| self.underlying(t));
        let struct_type = ty.and_then(|t| {
            let (package, name) = t.named()?;
            let index = self.ctx.indices.get(package)?;
            index
                .fields
                .contains_key(name)
                .then(|| (package.to_string(), name.to_string()))
        });
        let keyed_by_field = match &underlying {
            Some(TypeRef::Map { .. }) | Some(TypeRef::Slice(_)) | Some(TypeRef::Array { .. }) => {
                false
            }
            _ => true,
        };
        let element = underlying.as_ref().and_then(TypeRef::element);
        let key_type = match &underlying {
            Some(TypeRef::Map { key, .. }) => Some((**key).clone()),
            _ => None,
        };

        let mut cursor = body.walk();
        let elements: Vec<Node<'_>> = body.named_children(&mut cursor).collect();
        for element_node in elements {
            match element_node.kind() {
                "keyed_element" => {
                    let mut c = element_node.walk();
                    let parts: Vec<Node<'_>> = element_node
                        .named_children(&mut c)
                        .filter(|n| n.kind() != "comment")
                        .collect();
                    let (Some(key), Some(value)) = (parts.first(), parts.last()) else {
                        continue;
                    };
                    let key = unwrap_element(*key);
                    let value = unwrap_element(*value);
                    let mut value_type = element.clone();
                    if keyed_by_field && matches!(key.kind(), "identifier" | "field_identifier")
                    {
                        value_type = self.field_key(key, struct_type.as_ref());
                    } else if key.kind() == "literal_value" {
                        self.literal_value(key, key_type.as_ref());
                    } else {
                        self.expr(key);
                    }
                    if value.kind() == "literal_value" {
                        self.literal_value(value, value_type.as_ref());
                    } else {
                        self.expr(value);
                    }
                }
                "literal_element" | "literal_value" => {
                    let inner = unwrap_element(element_node);
                    if inner.kind() == "literal_value" {
                        self.literal_value(inner, element.as_ref());
                    } else {
                        self.expr(inner);
                    }
                }
                "comment" => {}
                _ => {
                    self.expr(element_node);
                }
            }
        }
    }

    /// Field name used as a composite literal key
    fn field_key(&mut self, key: Node<'_>, owner: Option<&(String, String)>) -> Option<TypeRef> {
        let name = self.text(key);
        let Some((package, type_name)) = owner else {
            self.record(key, Target::UnknownMember, UseRole::Write, None);
            return None;
        };
        let ty = TypeRef::Named {
            package: package.clone(),
            name: type_name.clone(),
        };
        match self.lookup_member(&ty, name, 0) {
            MemberLookup::Found(target, field_type) => {
                self.record(key, target, UseRole::Write, None);
                field_type
            }
            MemberLookup::Missing => {
                self.diagnose(
                    span(key),
                    format!("unknown field {} in struct literal of type {}", name, type_name),
                );
                self.record(key, Target::Unresolved, UseRole::Write, None);
                None
            }
            MemberLookup::Unknown => {
                self.record(key, Target::UnknownMember, UseRole::Write, None);
                None
            }
        }
    }

    fn func_literal(&mut self, node: Node<'_>) {
        self.with_function(node, |b| {
            b.signature(node, node.start_byte());
            if let Some(body) = node.child_by_field_name("body") {
                b.body(body);
            }
        });
    }

    /// Bind type syntax and convert it to a [`TypeRef`]
    pub(super) fn ty(&mut self, node: Node<'_>) -> TypeRef {
        let opaque = |b: &Self| TypeRef::Opaque {
            package: b.ctx.package.to_string(),
            text: b.text(node).to_string(),
        };
        match node.kind() {
            "type_identifier" | "identifier" => {
                let name = self.text(node);
                let target = self.resolve_name(name);
                if target == Target::Unresolved {
                    self.diagnose(span(node), format!("undefined: {}", name));
                }
                let ty = match &target {
                    Target::Package { package, name } => TypeRef::Named {
                        package: package.clone(),
                        name: name.clone(),
                    },
                    Target::Builtin => TypeRef::Basic(name.to_string()),
                    _ => opaque(self),
                };
                self.record(node, target, UseRole::TypeUse, None);
                ty
            }
            "qualified_type" => {
                let (Some(package), Some(name)) = (
                    node.child_by_field_name("package"),
                    node.child_by_field_name("name"),
                ) else {
                    return opaque(self);
                };
                let qualifier = self.text(package);
                match self.resolve_name(qualifier) {
                    Target::Import(index) => {
                        self.record(package, Target::Import(index), UseRole::Read, None);
                        let path = self.ctx.imports[index].path.clone();
                        let ty = self.qualified(index, package, name, UseRole::TypeUse);
                        ty.unwrap_or(TypeRef::External {
                            path,
                            name: self.text(name).to_string(),
                        })
                    }
                    _ => {
                        self.diagnose(span(package), format!("undefined: {}", qualifier));
                        opaque(self)
                    }
                }
            }
            "pointer_type" => match node.named_child(0) {
                Some(inner) => TypeRef::Pointer(Box::new(self.ty(inner))),
                None => opaque(self),
            },
            "slice_type" => match node.child_by_field_name("element") {
                Some(elem) => TypeRef::Slice(Box::new(self.ty(elem))),
                None => opaque(self),
            },
            "array_type" => {
                if let Some(len) = node.child_by_field_name("length") {
                    self.expr(len);
                }
                match node.child_by_field_name("element") {
                    Some(elem) => TypeRef::Array {
                        len: node
                            .child_by_field_name("length")
                            .map(|l| self.text(l).to_string())
                            .unwrap_or_default(),
                        elem: Box::new(self.ty(elem)),
                    },
                    None => opaque(self),
                }
            }
            "implicit_length_array_type" => match node.child_by_field_name("element") {
                Some(elem) => TypeRef::Array {
                    len: "...".to_string(),
                    elem: Box::new(self.ty(elem)),
                },
                None => opaque(self),
            },
            "map_type" => match (
                node.child_by_field_name("key"),
                node.child_by_field_name("value"),
            ) {
                (Some(key), Some(value)) => TypeRef::Map {
                    key: Box::new(self.ty(key)),
                    value: Box::new(self.ty(value)),
                },
                _ => opaque(self),
            },
            "channel_type" => match node.child_by_field_name("value") {
                Some(elem) => {
                    let full = self.text(node);
                    let dir = full
                        .strip_suffix(self.text(elem))
                        .unwrap_or("chan ")
                        .to_string();
                    TypeRef::Chan {
                        dir,
                        elem: Box::new(self.ty(elem)),
                    }
                }
                None => opaque(self),
            },
            "parenthesized_type" => match node.named_child(0) {
                Some(inner) => self.ty(inner),
                None => opaque(self),
            },
            "function_type" => {
                self.function_type_parts(node);
                opaque(self)
            }
            "struct_type" => {
                if let Some(list) =
                    refit_ast::visitor::find_first(node, |n| n.kind() == "field_declaration_list")
                {
                    let mut cursor = list.walk();
                    let fields: Vec<Node<'_>> = list.named_children(&mut cursor).collect();
                    for field in fields {
                        if let Some(ty) = field.child_by_field_name("type") {
                            self.ty(ty);
                        }
                    }
                }
                opaque(self)
            }
            "interface_type" => {
                let mut cursor = node.walk();
                let elems: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
                for elem in elems {
                    match elem.kind() {
                        "method_elem" | "method_spec" => self.function_type_parts(elem),
                        "comment" => {}
                        _ => {
                            self.ty(elem);
                        }
                    }
                }
                opaque(self)
            }
            "comment" | "interpreted_string_literal" | "raw_string_literal" => opaque(self),
            _ => {
                let mut cursor = node.walk();
                let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
                for child in children {
                    self.ty(child);
                }
                opaque(self)
            }
        }
    }
}

fn strip_parens(mut node: Node<'_>) -> Node<'_> {
    while matches!(node.kind(), "parenthesized_expression" | "parenthesized_type") {
        match node.named_child(0) {
            Some(inner) => node = inner,
            None => break,
        }
    }
    node
}

/// Identifier naming the called function: `f`, `x.f`, `f[T]`
fn callee_identifier(node: Node<'_>) -> Option<Node<'_>> {
    match node.kind() {
        "identifier" => Some(node),
        "selector_expression" => node.child_by_field_name("field"),
        "index_expression" | "generic_type" => node
            .child_by_field_name("operand")
            .or_else(|| node.child_by_field_name("type"))
            .and_then(|o| callee_identifier(strip_parens(o))),
        _ => None,
    }
}

fn unwrap_element(node: Node<'_>) -> Node<'_> {
    if node.kind() == "literal_element" {
        node.named_child(0).unwrap_or(node)
    } else {
        node
    }
}
