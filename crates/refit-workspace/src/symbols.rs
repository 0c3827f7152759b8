//! Per-package symbol indices.

use crate::model::ImportSpec;
use crate::types::TypeRef;
use refit_ast::syntax::{self, is_exported, is_predeclared, text};
use refit_ast::Node;
use refit_foundation::SymbolKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Workspace-wide identity of a symbol
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolId {
    pub package: String,
    pub kind: SymbolKind,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

/// A parameter or result of a function signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: Option<String>,
    pub type_text: String,
    pub type_ref: Option<TypeRef>,
    pub variadic: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub package: String,
    pub file: PathBuf,
    /// Removable unit: the whole declaration, or the spec inside a group
    pub span: Range<usize>,
    pub name_span: Range<usize>,
    pub exported: bool,
    pub signature: Option<String>,
    /// Receiver type for methods, struct for fields, interface for interface methods
    pub owner: Option<String>,
    pub pointer_receiver: bool,
    pub in_interface: bool,
    /// Declared alongside other names, so it cannot be removed on its own
    pub shared: bool,
    /// Spec inside a parenthesised group such as `var ( ... )`
    pub grouped: bool,
    pub embedded: bool,
    /// Declared type of variables, constants and fields
    pub type_ref: Option<TypeRef>,
    pub params: Vec<Param>,
    pub results: Vec<Param>,
}

impl Symbol {
    fn new(
        name: &str,
        kind: SymbolKind,
        package: &str,
        file: &Path,
        span: Range<usize>,
        name_span: Range<usize>,
    ) -> Self {
        Self {
            name: name.to_string(),
            kind,
            package: package.to_string(),
            file: file.to_path_buf(),
            span,
            name_span,
            exported: is_exported(name),
            signature: None,
            owner: None,
            pointer_receiver: false,
            in_interface: false,
            shared: false,
            grouped: false,
            embedded: false,
            type_ref: None,
            params: Vec::new(),
            results: Vec::new(),
        }
    }

    pub fn id(&self) -> SymbolId {
        SymbolId {
            package: self.package.clone(),
            kind: self.kind,
            name: self.name.clone(),
            owner: self.owner.clone(),
        }
    }

    /// Package-level: functions, types, variables and constants
    pub fn is_package_level(&self) -> bool {
        self.owner.is_none()
    }

    /// `Owner.Name` for members, `Name` otherwise
    pub fn qualified_name(&self) -> String {
        match &self.owner {
            Some(owner) => format!("{}.{}", owner, self.name),
            None => self.name.clone(),
        }
    }

    pub fn result_types(&self) -> Vec<TypeRef> {
        self.results.iter().filter_map(|r| r.type_ref.clone()).collect()
    }
}

/// Symbols of one package: one map per kind plus member maps keyed by owner type
#[derive(Debug, Clone, Default)]
pub struct SymbolIndex {
    pub functions: BTreeMap<String, Symbol>,
    pub types: BTreeMap<String, Symbol>,
    pub variables: BTreeMap<String, Symbol>,
    pub constants: BTreeMap<String, Symbol>,
    /// Receiver type name to its methods
    pub methods: BTreeMap<String, Vec<Symbol>>,
    /// Struct type name to its fields, embedded fields included
    pub fields: BTreeMap<String, Vec<Symbol>>,
    pub interface_methods: BTreeMap<String, Vec<Symbol>>,
    pub embedded_interfaces: BTreeMap<String, Vec<TypeRef>>,
    /// Underlying type of named non-struct, non-interface types
    pub underlying: BTreeMap<String, TypeRef>,
    /// Package-level names declared more than once
    pub duplicates: Vec<Symbol>,
}

impl SymbolIndex {
    /// Package-level symbol by name, whatever its kind
    pub fn package_level(&self, name: &str) -> Option<&Symbol> {
        self.functions
            .get(name)
            .or_else(|| self.types.get(name))
            .or_else(|| self.variables.get(name))
            .or_else(|| self.constants.get(name))
    }

    pub fn method(&self, owner: &str, name: &str) -> Option<&Symbol> {
        self.methods.get(owner)?.iter().find(|m| m.name == name)
    }

    pub fn field(&self, owner: &str, name: &str) -> Option<&Symbol> {
        self.fields.get(owner)?.iter().find(|f| f.name == name)
    }

    pub fn interface_method(&self, owner: &str, name: &str) -> Option<&Symbol> {
        self.interface_methods
            .get(owner)?
            .iter()
            .find(|m| m.name == name)
    }

    pub fn is_struct(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn is_interface(&self, name: &str) -> bool {
        self.types
            .get(name)
            .map(|t| t.kind == SymbolKind::Interface)
            .unwrap_or(false)
    }

    /// Every symbol, package-level first, in deterministic order
    pub fn all(&self) -> impl Iterator<Item = &Symbol> {
        self.functions
            .values()
            .chain(self.types.values())
            .chain(self.variables.values())
            .chain(self.constants.values())
            .chain(self.methods.values().flatten())
            .chain(self.fields.values().flatten())
            .chain(self.interface_methods.values().flatten())
    }

    pub fn len(&self) -> usize {
        self.all().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert_package_level(&mut self, symbol: Symbol) {
        if symbol.name == "_" || (symbol.kind == SymbolKind::Function && symbol.name == "init") {
            return;
        }
        if self.package_level(&symbol.name).is_some() {
            self.duplicates.push(symbol);
            return;
        }
        let map = match symbol.kind {
            SymbolKind::Function => &mut self.functions,
            SymbolKind::Type | SymbolKind::Interface => &mut self.types,
            SymbolKind::Variable => &mut self.variables,
            _ => &mut self.constants,
        };
        map.insert(symbol.name.clone(), symbol);
    }
}

/// Resolves type syntax to [`TypeRef`] from one file's point of view
pub struct TypeScope<'a> {
    pub package: &'a str,
    pub package_types: &'a BTreeSet<String>,
    pub imports: &'a [ImportSpec],
    pub workspace_packages: &'a BTreeSet<String>,
}

impl TypeScope<'_> {
    pub fn type_of(&self, node: Node<'_>, source: &str) -> TypeRef {
        match node.kind() {
            "type_identifier" | "identifier" => {
                let name = text(node, source);
                if self.package_types.contains(name) {
                    TypeRef::Named {
                        package: self.package.to_string(),
                        name: name.to_string(),
                    }
                } else if is_predeclared(name) {
                    TypeRef::Basic(name.to_string())
                } else {
                    self.opaque(node, source)
                }
            }
            "qualified_type" => {
                let (Some(pkg), Some(name)) = (
                    node.child_by_field_name("package"),
                    node.child_by_field_name("name"),
                ) else {
                    return self.opaque(node, source);
                };
                self.qualified(text(pkg, source), text(name, source))
                    .unwrap_or_else(|| self.opaque(node, source))
            }
            "pointer_type" => match node.named_child(0) {
                Some(inner) => TypeRef::Pointer(Box::new(self.type_of(inner, source))),
                None => self.opaque(node, source),
            },
            "slice_type" => match node.child_by_field_name("element") {
                Some(elem) => TypeRef::Slice(Box::new(self.type_of(elem, source))),
                None => self.opaque(node, source),
            },
            "array_type" => match (
                node.child_by_field_name("length"),
                node.child_by_field_name("element"),
            ) {
                (Some(len), Some(elem)) => TypeRef::Array {
                    len: text(len, source).to_string(),
                    elem: Box::new(self.type_of(elem, source)),
                },
                _ => self.opaque(node, source),
            },
            "map_type" => match (
                node.child_by_field_name("key"),
                node.child_by_field_name("value"),
            ) {
                (Some(key), Some(value)) => TypeRef::Map {
                    key: Box::new(self.type_of(key, source)),
                    value: Box::new(self.type_of(value, source)),
                },
                _ => self.opaque(node, source),
            },
            "channel_type" => match node.child_by_field_name("value") {
                Some(elem) => {
                    let full = text(node, source);
                    let elem_text = text(elem, source);
                    let dir = full
                        .strip_suffix(elem_text)
                        .unwrap_or("chan ")
                        .to_string();
                    TypeRef::Chan {
                        dir,
                        elem: Box::new(self.type_of(elem, source)),
                    }
                }
                None => self.opaque(node, source),
            },
            "parenthesized_type" => match node.named_child(0) {
                Some(inner) => self.type_of(inner, source),
                None => self.opaque(node, source),
            },
            _ => self.opaque(node, source),
        }
    }

    /// `pkg.Name` through this file's imports
    pub fn qualified(&self, qualifier: &str, name: &str) -> Option<TypeRef> {
        let import = self
            .imports
            .iter()
            .find(|i| i.name == qualifier && !i.is_blank() && !i.is_dot())?;
        if self.workspace_packages.contains(&import.path) {
            Some(TypeRef::Named {
                package: import.path.clone(),
                name: name.to_string(),
            })
        } else {
            Some(TypeRef::External {
                path: import.path.clone(),
                name: name.to_string(),
            })
        }
    }

    fn opaque(&self, node: Node<'_>, source: &str) -> TypeRef {
        TypeRef::Opaque {
            package: self.package.to_string(),
            text: text(node, source).to_string(),
        }
    }
}

/// Parameters of a `parameter_list`, one entry per declared name
pub fn parameters(list: Node<'_>, source: &str, scope: &TypeScope<'_>) -> Vec<Param> {
    let mut out = Vec::new();
    let mut cursor = list.walk();
    for decl in list.named_children(&mut cursor) {
        let variadic = decl.kind() == "variadic_parameter_declaration";
        if decl.kind() != "parameter_declaration" && !variadic {
            continue;
        }
        let Some(ty) = decl.child_by_field_name("type") else {
            continue;
        };
        let type_text = text(ty, source).to_string();
        let mut type_ref = scope.type_of(ty, source);
        if variadic {
            type_ref = TypeRef::Slice(Box::new(type_ref));
        }
        let mut names_cursor = decl.walk();
        let names: Vec<String> = decl
            .children_by_field_name("name", &mut names_cursor)
            .map(|n| text(n, source).to_string())
            .collect();
        if names.is_empty() {
            out.push(Param {
                name: None,
                type_text,
                type_ref: Some(type_ref),
                variadic,
            });
        } else {
            for name in names {
                out.push(Param {
                    name: Some(name),
                    type_text: type_text.clone(),
                    type_ref: Some(type_ref.clone()),
                    variadic,
                });
            }
        }
    }
    out
}

/// Result list of a function, method or method spec
pub fn results(decl: Node<'_>, source: &str, scope: &TypeScope<'_>) -> Vec<Param> {
    let Some(result) = decl.child_by_field_name("result") else {
        return Vec::new();
    };
    if result.kind() == "parameter_list" {
        return parameters(result, source, scope);
    }
    vec![Param {
        name: None,
        type_text: text(result, source).to_string(),
        type_ref: Some(scope.type_of(result, source)),
        variadic: false,
    }]
}

/// Signature text: the declaration up to its body
pub fn signature_text(decl: Node<'_>, source: &str) -> String {
    let end = decl
        .child_by_field_name("body")
        .map(|b| b.start_byte())
        .unwrap_or(decl.end_byte());
    source[decl.start_byte()..end].trim_end().to_string()
}

/// Top-level type names declared in a file
pub fn declared_type_names(root: Node<'_>, source: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut cursor = root.walk();
    for decl in root.named_children(&mut cursor) {
        if decl.kind() != "type_declaration" {
            continue;
        }
        let mut spec_cursor = decl.walk();
        for spec in decl.named_children(&mut spec_cursor) {
            if let Some(name) = spec.child_by_field_name("name") {
                names.push(text(name, source).to_string());
            }
        }
    }
    names
}

/// Specs of a var or const declaration, with or without a `*_spec_list` wrapper
pub fn specs<'t>(decl: Node<'t>, spec_kind: &str) -> Vec<Node<'t>> {
    let mut out = Vec::new();
    let mut cursor = decl.walk();
    for child in decl.named_children(&mut cursor) {
        if child.kind() == spec_kind {
            out.push(child);
        } else if child.kind().ends_with("_spec_list") {
            let mut inner = child.walk();
            out.extend(
                child
                    .named_children(&mut inner)
                    .filter(|c| c.kind() == spec_kind),
            );
        }
    }
    out
}

fn is_grouped(decl: Node<'_>) -> bool {
    let mut cursor = decl.walk();
    let grouped = decl
        .children(&mut cursor)
        .any(|c| c.kind() == "(" || c.kind().ends_with("_spec_list"));
    grouped
}

/// Untyped constant default type of a literal
pub fn literal_type(node: Node<'_>) -> Option<TypeRef> {
    let name = match node.kind() {
        "int_literal" => "int",
        "float_literal" => "float64",
        "imaginary_literal" => "complex128",
        "rune_literal" => "rune",
        "interpreted_string_literal" | "raw_string_literal" => "string",
        "true" | "false" => "bool",
        _ => return None,
    };
    Some(TypeRef::basic(name))
}

/// Collect symbols of one file into `index`
pub fn index_file(
    index: &mut SymbolIndex,
    file: &Path,
    root: Node<'_>,
    source: &str,
    scope: &TypeScope<'_>,
) {
    let mut cursor = root.walk();
    for decl in root.named_children(&mut cursor) {
        match decl.kind() {
            "function_declaration" => index_function(index, file, decl, source, scope),
            "method_declaration" => index_method(index, file, decl, source, scope),
            "type_declaration" => index_types(index, file, decl, source, scope),
            "var_declaration" => index_values(index, file, decl, source, scope, false),
            "const_declaration" => index_values(index, file, decl, source, scope, true),
            _ => {}
        }
    }
}

fn index_function(
    index: &mut SymbolIndex,
    file: &Path,
    decl: Node<'_>,
    source: &str,
    scope: &TypeScope<'_>,
) {
    let Some(name) = decl.child_by_field_name("name") else {
        return;
    };
    let mut symbol = Symbol::new(
        text(name, source),
        SymbolKind::Function,
        scope.package,
        file,
        syntax::span(decl),
        syntax::span(name),
    );
    symbol.signature = Some(signature_text(decl, source));
    if let Some(params) = decl.child_by_field_name("parameters") {
        symbol.params = parameters(params, source, scope);
    }
    symbol.results = results(decl, source, scope);
    index.insert_package_level(symbol);
}

fn index_method(
    index: &mut SymbolIndex,
    file: &Path,
    decl: Node<'_>,
    source: &str,
    scope: &TypeScope<'_>,
) {
    let (Some(name), Some(owner)) = (
        decl.child_by_field_name("name"),
        syntax::receiver_type_name(decl, source),
    ) else {
        return;
    };
    let mut symbol = Symbol::new(
        text(name, source),
        SymbolKind::Method,
        scope.package,
        file,
        syntax::span(decl),
        syntax::span(name),
    );
    symbol.pointer_receiver = decl
        .child_by_field_name("receiver")
        .map(|r| text(r, source).contains('*'))
        .unwrap_or(false);
    symbol.owner = Some(owner.clone());
    symbol.signature = Some(signature_text(decl, source));
    if let Some(params) = decl.child_by_field_name("parameters") {
        symbol.params = parameters(params, source, scope);
    }
    symbol.results = results(decl, source, scope);
    index.methods.entry(owner).or_default().push(symbol);
}

fn index_types(
    index: &mut SymbolIndex,
    file: &Path,
    decl: Node<'_>,
    source: &str,
    scope: &TypeScope<'_>,
) {
    let grouped = is_grouped(decl);
    let mut cursor = decl.walk();
    for spec in decl.named_children(&mut cursor) {
        if !matches!(spec.kind(), "type_spec" | "type_alias") {
            continue;
        }
        let (Some(name), Some(ty)) = (
            spec.child_by_field_name("name"),
            spec.child_by_field_name("type"),
        ) else {
            continue;
        };
        let type_name = text(name, source).to_string();
        let kind = if ty.kind() == "interface_type" {
            SymbolKind::Interface
        } else {
            SymbolKind::Type
        };
        let span = if grouped {
            syntax::span(spec)
        } else {
            syntax::span(decl)
        };
        let mut symbol = Symbol::new(
            &type_name,
            kind,
            scope.package,
            file,
            span,
            syntax::span(name),
        );
        symbol.grouped = grouped;
        let header_end = ty.start_byte();
        symbol.signature = Some(format!(
            "type {}{}",
            source[spec.start_byte()..header_end].trim_end(),
            match ty.kind() {
                "struct_type" => " struct",
                "interface_type" => " interface",
                _ => "",
            }
        ));
        if ty.kind() != "struct_type" && ty.kind() != "interface_type" {
            symbol.signature = Some(format!("type {}", text(spec, source)));
        }
        index.insert_package_level(symbol);

        match ty.kind() {
            "struct_type" => index_fields(index, file, &type_name, ty, source, scope),
            "interface_type" => index_interface(index, file, &type_name, ty, source, scope),
            _ => {
                index
                    .underlying
                    .insert(type_name.clone(), scope.type_of(ty, source));
            }
        }
    }
}

fn index_fields(
    index: &mut SymbolIndex,
    file: &Path,
    owner: &str,
    struct_type: Node<'_>,
    source: &str,
    scope: &TypeScope<'_>,
) {
    let fields = index.fields.entry(owner.to_string()).or_default();
    let Some(list) = refit_ast::visitor::find_first(struct_type, |n| {
        n.kind() == "field_declaration_list"
    }) else {
        return;
    };
    let mut cursor = list.walk();
    for decl in list.named_children(&mut cursor) {
        if decl.kind() != "field_declaration" {
            continue;
        }
        let Some(ty) = decl.child_by_field_name("type") else {
            continue;
        };
        let type_ref = scope.type_of(ty, source);
        let mut names_cursor = decl.walk();
        let names: Vec<Node<'_>> = decl
            .children_by_field_name("name", &mut names_cursor)
            .collect();
        if names.is_empty() {
            // Embedded field: named after its type
            let mut base = ty;
            while matches!(base.kind(), "pointer_type" | "generic_type") {
                match base.named_child(0) {
                    Some(inner) => base = inner,
                    None => break,
                }
            }
            let name_node = base.child_by_field_name("name").unwrap_or(base);
            let mut symbol = Symbol::new(
                text(name_node, source),
                SymbolKind::StructField,
                scope.package,
                file,
                syntax::span(decl),
                syntax::span(name_node),
            );
            symbol.owner = Some(owner.to_string());
            symbol.embedded = true;
            symbol.type_ref = Some(type_ref);
            fields.push(symbol);
            continue;
        }
        let shared = names.len() > 1;
        for name in names {
            let mut symbol = Symbol::new(
                text(name, source),
                SymbolKind::StructField,
                scope.package,
                file,
                syntax::span(decl),
                syntax::span(name),
            );
            symbol.owner = Some(owner.to_string());
            symbol.shared = shared;
            symbol.type_ref = Some(type_ref.clone());
            symbol.signature = Some(text(decl, source).to_string());
            fields.push(symbol);
        }
    }
}

fn index_interface(
    index: &mut SymbolIndex,
    file: &Path,
    owner: &str,
    interface_type: Node<'_>,
    source: &str,
    scope: &TypeScope<'_>,
) {
    let mut cursor = interface_type.walk();
    for elem in interface_type.named_children(&mut cursor) {
        match elem.kind() {
            "method_elem" | "method_spec" => {
                let Some(name) = elem.child_by_field_name("name") else {
                    continue;
                };
                let mut symbol = Symbol::new(
                    text(name, source),
                    SymbolKind::Method,
                    scope.package,
                    file,
                    syntax::span(elem),
                    syntax::span(name),
                );
                symbol.owner = Some(owner.to_string());
                symbol.in_interface = true;
                symbol.signature = Some(text(elem, source).to_string());
                if let Some(params) = elem.child_by_field_name("parameters") {
                    symbol.params = parameters(params, source, scope);
                }
                symbol.results = results(elem, source, scope);
                index
                    .interface_methods
                    .entry(owner.to_string())
                    .or_default()
                    .push(symbol);
            }
            "type_elem" | "constraint_elem" | "type_identifier" | "qualified_type" => {
                let ty = if elem.kind().ends_with("_elem") {
                    match elem.named_child(0) {
                        Some(t) => t,
                        None => continue,
                    }
                } else {
                    elem
                };
                index
                    .embedded_interfaces
                    .entry(owner.to_string())
                    .or_default()
                    .push(scope.type_of(ty, source));
            }
            _ => {}
        }
    }
    index.interface_methods.entry(owner.to_string()).or_default();
}

fn index_values(
    index: &mut SymbolIndex,
    file: &Path,
    decl: Node<'_>,
    source: &str,
    scope: &TypeScope<'_>,
    constant: bool,
) {
    let spec_kind = if constant { "const_spec" } else { "var_spec" };
    let all_specs = specs(decl, spec_kind);
    let grouped = is_grouped(decl) || all_specs.len() > 1;
    // Implicit repetition and iota make every const in the group depend on its position.
    let positional = constant
        && grouped
        && all_specs.iter().any(|s| {
            s.child_by_field_name("value").is_none() || text(*s, source).contains("iota")
        });

    let mut inherited: Option<TypeRef> = None;
    for spec in all_specs {
        let mut names_cursor = spec.walk();
        let names: Vec<Node<'_>> = spec
            .children_by_field_name("name", &mut names_cursor)
            .collect();
        let explicit = spec
            .child_by_field_name("type")
            .map(|t| scope.type_of(t, source));
        let values: Vec<Node<'_>> = spec
            .child_by_field_name("value")
            .map(|list| {
                let mut c = list.walk();
                list.named_children(&mut c).collect()
            })
            .unwrap_or_default();
        if constant && spec.child_by_field_name("value").is_none() {
            // implicit repetition keeps the previous spec's type
        } else {
            inherited = None;
        }

        let shared = names.len() > 1 || positional;
        for (i, name) in names.iter().enumerate() {
            let kind = if constant {
                SymbolKind::Constant
            } else {
                SymbolKind::Variable
            };
            let span = if grouped {
                syntax::span(spec)
            } else {
                syntax::span(decl)
            };
            let mut symbol = Symbol::new(
                text(*name, source),
                kind,
                scope.package,
                file,
                span,
                syntax::span(*name),
            );
            symbol.grouped = grouped;
            symbol.shared = shared;
            symbol.signature = Some(format!(
                "{} {}",
                if constant { "const" } else { "var" },
                text(spec, source)
            ));
            symbol.type_ref = explicit
                .clone()
                .or_else(|| values.get(i).and_then(|v| value_type(*v, source, scope)))
                .or_else(|| inherited.clone());
            if i == 0 && symbol.type_ref.is_some() {
                inherited = symbol.type_ref.clone();
            }
            index.insert_package_level(symbol);
        }
    }
}

/// Type of a package-level initializer when it is evident from syntax
fn value_type(value: Node<'_>, source: &str, scope: &TypeScope<'_>) -> Option<TypeRef> {
    if let Some(ty) = literal_type(value) {
        return Some(ty);
    }
    match value.kind() {
        "composite_literal" => value
            .child_by_field_name("type")
            .map(|t| scope.type_of(t, source)),
        "unary_expression" => {
            let operand = value.child_by_field_name("operand")?;
            let op = value.child_by_field_name("operator")?;
            if text(op, source) == "&" {
                value_type(operand, source, scope).map(|t| TypeRef::Pointer(Box::new(t)))
            } else {
                value_type(operand, source, scope)
            }
        }
        "binary_expression" => {
            let op = value
                .child_by_field_name("operator")
                .map(|o| text(o, source))
                .unwrap_or("");
            if matches!(op, "==" | "!=" | "<" | "<=" | ">" | ">=" | "&&" | "||") {
                return Some(TypeRef::basic("bool"));
            }
            value
                .child_by_field_name("left")
                .and_then(|l| value_type(l, source, scope))
        }
        "parenthesized_expression" => value
            .named_child(0)
            .and_then(|inner| value_type(inner, source, scope)),
        "call_expression" => {
            let function = value.child_by_field_name("function")?;
            let name = text(function, source);
            // Conversions to named or predeclared types
            if function.kind() == "identifier"
                && (scope.package_types.contains(name) || is_predeclared(name))
                && !matches!(name, "len" | "cap" | "append" | "make" | "new")
            {
                return Some(scope.type_of(function, source));
            }
            if name == "new" {
                let arg = value.child_by_field_name("arguments")?.named_child(0)?;
                return Some(TypeRef::Pointer(Box::new(scope.type_of(arg, source))));
            }
            if name == "make" {
                let arg = value.child_by_field_name("arguments")?.named_child(0)?;
                return Some(scope.type_of(arg, source));
            }
            None
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refit_ast::parse_go;
    use pretty_assertions::assert_eq;

    fn index_source(source: &str) -> SymbolIndex {
        let tree = parse_go(source).unwrap();
        let root = tree.root_node();
        let types: BTreeSet<String> = declared_type_names(root, source).into_iter().collect();
        let packages = BTreeSet::from(["p".to_string()]);
        let scope = TypeScope {
            package: "p",
            package_types: &types,
            imports: &[],
            workspace_packages: &packages,
        };
        let mut index = SymbolIndex::default();
        index_file(&mut index, Path::new("p/p.go"), root, source, &scope);
        index
    }

    #[test]
    fn test_index_functions_types_methods() {
        let source = r#"package p

// Add sums.
func Add(a, b int) int { return a + b }

type Point struct {
	X, Y int
	*Base
}

type Reader interface {
	Read(p []byte) (int, error)
}

func (pt *Point) Norm() int { return pt.X }

var (
	origin = Point{}
	count  int
)

const (
	A = iota
	B
)

const Limit = 10
"#;
        let index = index_source(source);
        let add = &index.functions["Add"];
        assert_eq!(add.signature.as_deref(), Some("func Add(a, b int) int"));
        assert_eq!(add.params.len(), 2);
        assert_eq!(add.results[0].type_ref, Some(TypeRef::basic("int")));
        assert!(add.exported);

        assert_eq!(index.types["Point"].kind, SymbolKind::Type);
        assert_eq!(index.types["Reader"].kind, SymbolKind::Interface);
        assert!(index.is_interface("Reader"));

        let fields = &index.fields["Point"];
        assert_eq!(fields.len(), 3);
        assert!(fields[0].shared);
        assert!(fields[2].embedded);
        assert_eq!(fields[2].name, "Base");

        let norm = index.method("Point", "Norm").unwrap();
        assert!(norm.pointer_receiver);

        let read = index.interface_method("Reader", "Read").unwrap();
        assert!(read.in_interface);
        assert_eq!(read.results.len(), 2);

        assert_eq!(
            index.variables["origin"].type_ref,
            Some(TypeRef::Named {
                package: "p".to_string(),
                name: "Point".to_string()
            })
        );
        assert!(index.variables["count"].grouped);
        assert!(index.constants["A"].shared);
        assert!(index.constants["B"].shared);
        assert!(!index.constants["Limit"].shared);
        assert!(!index.constants["Limit"].grouped);
    }

    #[test]
    fn test_duplicates_recorded() {
        let source = "package p\nfunc A() {}\nvar A = 1\nfunc init() {}\nfunc init() {}\n";
        let index = index_source(source);
        assert_eq!(index.duplicates.len(), 1);
        assert!(index.functions.get("init").is_none());
    }
}
