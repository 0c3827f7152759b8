//! Symbol resolver: lookup, reference discovery and interface satisfaction.
//!
//! References come from binder output, so a use matches a symbol only when
//! the binder resolved it to the same definition. Discovery runs in parallel
//! over packages; the workspace is never mutated here.

use crate::binder::{IdentUse, MemberKind, Target, UseRole};
use crate::model::{Package, SourceFile, Workspace};
use crate::symbols::Symbol;
use crate::types::TypeRef;
use rayon::prelude::*;
use refit_foundation::{Position, RefitError, RefitResult, SymbolKind};
use serde::Serialize;
use std::collections::BTreeSet;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Read,
    Write,
    Call,
    TypeUse,
}

impl ReferenceKind {
    fn from_role(role: UseRole) -> Option<Self> {
        match role {
            UseRole::Declaration => None,
            UseRole::Read => Some(ReferenceKind::Read),
            UseRole::Write => Some(ReferenceKind::Write),
            UseRole::Call => Some(ReferenceKind::Call),
            UseRole::TypeUse => Some(ReferenceKind::TypeUse),
        }
    }
}

/// A use-site of a symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub file: PathBuf,
    /// Identifier bytes
    pub span: Range<usize>,
    /// `pkg` of `pkg.Name`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<Range<usize>>,
    /// Package of the use-site
    pub package: String,
    pub kind: ReferenceKind,
    pub position: Position,
}

impl Reference {
    fn from_use(file: &SourceFile, ident: &IdentUse, kind: ReferenceKind) -> Self {
        Self {
            file: file.path.clone(),
            span: ident.span.clone(),
            qualifier: ident.qualifier.clone(),
            package: file.package.clone(),
            kind,
            position: file.position(ident.span.start),
        }
    }

    /// Full replaceable span: qualifier included
    pub fn full_span(&self) -> Range<usize> {
        match &self.qualifier {
            Some(q) => q.start..self.span.end,
            None => self.span.clone(),
        }
    }
}

fn sort_references(references: &mut [Reference]) {
    references.sort_by(|a, b| {
        a.file
            .cmp(&b.file)
            .then(a.span.start.cmp(&b.span.start))
            .then(a.span.end.cmp(&b.span.end))
    });
}

/// Whether `kind` accepts a symbol of kind `actual`
fn kind_matches(wanted: Option<SymbolKind>, actual: &Symbol) -> bool {
    match wanted {
        None => true,
        Some(SymbolKind::Type) => matches!(actual.kind, SymbolKind::Type | SymbolKind::Interface),
        Some(SymbolKind::Method) => actual.kind == SymbolKind::Method,
        Some(kind) => actual.kind == kind,
    }
}

fn describe(symbol: &Symbol) -> String {
    format!("{}.{} ({})", symbol.package, symbol.qualified_name(), symbol.kind)
}

/// Find one symbol by name.
///
/// `name` may be `Type.Member` to select a method, field or interface method.
/// `package` restricts the search to one package (any designation accepted
/// by [`Workspace::resolve_package`]).
pub fn lookup<'w>(
    ws: &'w Workspace,
    name: &str,
    kind: Option<SymbolKind>,
    package: Option<&str>,
) -> RefitResult<&'w Symbol> {
    let packages: Vec<&Package> = match package {
        Some(spec) => vec![ws.resolve_package(spec)?],
        None => ws.packages.values().collect(),
    };

    let mut candidates: Vec<&Symbol> = Vec::new();
    if let Some((owner, member)) = name.split_once('.') {
        for package in &packages {
            let index = &package.symbols;
            candidates.extend(index.method(owner, member));
            candidates.extend(index.field(owner, member));
            candidates.extend(index.interface_method(owner, member));
        }
        if candidates.is_empty() && package.is_none() {
            // `pkg.Name` spelling
            if let Ok(pkg) = ws.resolve_package(owner) {
                candidates.extend(pkg.symbols.package_level(member));
            }
        }
    } else {
        for package in &packages {
            candidates.extend(package.symbols.package_level(name));
        }
        if candidates.is_empty() {
            for package in &packages {
                let index = &package.symbols;
                candidates.extend(
                    index
                        .methods
                        .values()
                        .chain(index.fields.values())
                        .chain(index.interface_methods.values())
                        .flatten()
                        .filter(|s| s.name == name),
                );
            }
        }
    }
    candidates.retain(|s| kind_matches(kind, s));

    match candidates.len() {
        0 => Err(RefitError::not_found(match package {
            Some(p) => format!("symbol '{}' in package '{}'", name, p),
            None => format!("symbol '{}'", name),
        })),
        1 => Ok(candidates[0]),
        n => {
            // External test packages shadow nothing; prefer the non-test declaration.
            let primary: Vec<&Symbol> = candidates
                .iter()
                .copied()
                .filter(|s| {
                    ws.package(&s.package)
                        .map(|p| !p.external_test)
                        .unwrap_or(true)
                })
                .collect();
            if primary.len() == 1 {
                return Ok(primary[0]);
            }
            Err(RefitError::ambiguous(
                format!("'{}' matches {} symbols", name, n),
                candidates.iter().map(|s| describe(s)).collect(),
            ))
        }
    }
}

/// Binder target a symbol's uses resolve to
pub fn target_of(symbol: &Symbol) -> Target {
    match (&symbol.owner, symbol.kind) {
        (None, _) => Target::Package {
            package: symbol.package.clone(),
            name: symbol.name.clone(),
        },
        (Some(owner), kind) => Target::Member {
            package: symbol.package.clone(),
            owner: owner.clone(),
            name: symbol.name.clone(),
            kind: if kind == SymbolKind::StructField {
                MemberKind::Field
            } else if symbol.in_interface {
                MemberKind::InterfaceMethod
            } else {
                MemberKind::Method
            },
        },
    }
}

/// Symbol a binder target designates
pub fn symbol_for<'w>(ws: &'w Workspace, target: &Target) -> Option<&'w Symbol> {
    match target {
        Target::Package { package, name } => ws.index(package)?.package_level(name),
        Target::Member {
            package,
            owner,
            name,
            kind,
        } => {
            let index = ws.index(package)?;
            match kind {
                MemberKind::Method => index.method(owner, name),
                MemberKind::Field => index.field(owner, name),
                MemberKind::InterfaceMethod => index.interface_method(owner, name),
            }
        }
        _ => None,
    }
}

fn collect_uses(
    ws: &Workspace,
    matches: impl Fn(&IdentUse) -> bool + Sync,
) -> Vec<Reference> {
    let packages: Vec<_> = ws.packages.values().collect();
    let mut references: Vec<Reference> = packages
        .par_iter()
        .flat_map_iter(|package| {
            let mut found = Vec::new();
            for file in package.files.values() {
                for ident in &file.info.uses {
                    if !matches(ident) {
                        continue;
                    }
                    if let Some(kind) = ReferenceKind::from_role(ident.role) {
                        found.push(Reference::from_use(file, ident, kind));
                    }
                }
            }
            found
        })
        .collect();
    sort_references(&mut references);
    references
}

/// Every use of `symbol` across the workspace, sorted by file and offset
pub fn references(ws: &Workspace, symbol: &Symbol) -> Vec<Reference> {
    let target = target_of(symbol);
    let references = collect_uses(ws, |u| u.target == target);
    debug!(
        symbol = %symbol.qualified_name(),
        package = %symbol.package,
        count = references.len(),
        "Collected references"
    );
    references
}

/// Member selections whose operand type is unknown but whose spelling matches
pub fn possible_references(ws: &Workspace, symbol: &Symbol) -> Vec<Reference> {
    if symbol.is_package_level() {
        return Vec::new();
    }
    collect_uses(ws, |u| u.target == Target::UnknownMember && u.name == symbol.name)
}

/// Every occurrence of a local, declaration included
pub fn local_occurrences(file: &SourceFile, index: usize) -> Vec<Range<usize>> {
    let mut spans: Vec<Range<usize>> = file
        .info
        .uses_of_local(index)
        .map(|u| u.span.clone())
        .collect();
    spans.sort_by_key(|s| s.start);
    spans.dedup();
    spans
}

/// What sits under a cursor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolAt<'w> {
    Symbol(&'w Symbol),
    Local { file: PathBuf, index: usize },
    /// Import qualifier of a workspace package
    Package(String),
}

/// Symbol defined or referenced at a byte offset of `file`
pub fn symbol_at<'w>(ws: &'w Workspace, file: &Path, offset: usize) -> Option<SymbolAt<'w>> {
    let source = ws.file(file)?;
    let ident = source.info.use_at(offset)?;
    match &ident.target {
        Target::Local(index) => Some(SymbolAt::Local {
            file: source.path.clone(),
            index: *index,
        }),
        Target::Import(index) => {
            let import = source.imports.get(*index)?;
            ws.package(&import.path)
                .map(|p| SymbolAt::Package(p.key.clone()))
        }
        target => symbol_for(ws, target).map(SymbolAt::Symbol),
    }
}

/// Whether code in `from_package` may refer to `symbol`
pub fn is_visible_from(symbol: &Symbol, from_package: &str) -> bool {
    symbol.exported || symbol.package == from_package
}

/// Methods callable on values of the named type, promoted ones included
pub fn method_set<'w>(ws: &'w Workspace, package: &str, type_name: &str) -> Vec<&'w Symbol> {
    let mut out: Vec<&Symbol> = Vec::new();
    let mut seen_names: BTreeSet<String> = BTreeSet::new();
    let mut visited: BTreeSet<(String, String)> = BTreeSet::new();
    let mut queue: Vec<(String, String)> = vec![(package.to_string(), type_name.to_string())];
    // Breadth-first: shallower methods win over promoted ones.
    while !queue.is_empty() {
        let mut next = Vec::new();
        for (pkg, name) in queue {
            if !visited.insert((pkg.clone(), name.clone())) {
                continue;
            }
            let Some(index) = ws.index(&pkg) else {
                continue;
            };
            let own: Vec<&Symbol> = index
                .methods
                .get(&name)
                .into_iter()
                .flatten()
                .chain(index.interface_methods.get(&name).into_iter().flatten())
                .collect();
            for method in own {
                if seen_names.insert(method.name.clone()) {
                    out.push(method);
                }
            }
            for embedded in index
                .fields
                .get(&name)
                .into_iter()
                .flatten()
                .filter(|f| f.embedded)
            {
                if let Some((p, n)) = embedded.type_ref.as_ref().and_then(TypeRef::named) {
                    next.push((p.to_string(), n.to_string()));
                }
            }
            for embedded in index.embedded_interfaces.get(&name).into_iter().flatten() {
                if let Some((p, n)) = embedded.named() {
                    next.push((p.to_string(), n.to_string()));
                }
            }
        }
        queue = next;
    }
    out.sort_by(|a, b| a.name.cmp(&b.name));
    out
}

fn shape_matches(required: &Symbol, candidate: &Symbol) -> bool {
    required.name == candidate.name
        && required.params.len() == candidate.params.len()
        && required.results.len() == candidate.results.len()
}

/// Whether the type's method set covers every method of the interface
pub fn satisfies(ws: &Workspace, concrete: &Symbol, interface: &Symbol) -> bool {
    let required = method_set(ws, &interface.package, &interface.name);
    if required.is_empty() {
        return false;
    }
    let available = method_set(ws, &concrete.package, &concrete.name);
    required.iter().all(|req| {
        // Unexported interface methods can only be satisfied inside their package.
        (req.exported || concrete.package == interface.package)
            && available.iter().any(|m| shape_matches(req, m))
    })
}

/// Concrete workspace types implementing `interface`
pub fn implementations<'w>(ws: &'w Workspace, interface: &Symbol) -> Vec<&'w Symbol> {
    ws.packages
        .values()
        .flat_map(|p| p.symbols.types.values())
        .filter(|t| t.kind == SymbolKind::Type)
        .filter(|t| satisfies(ws, t, interface))
        .collect()
}

/// Workspace interfaces with a non-empty method set that `concrete` satisfies
pub fn interfaces_satisfied_by<'w>(ws: &'w Workspace, concrete: &Symbol) -> Vec<&'w Symbol> {
    ws.packages
        .values()
        .flat_map(|p| p.symbols.types.values())
        .filter(|t| t.kind == SymbolKind::Interface)
        .filter(|iface| satisfies(ws, concrete, iface))
        .collect()
}

/// Type symbol owning a member, when it is a workspace type
pub fn owner_of<'w>(ws: &'w Workspace, member: &Symbol) -> Option<&'w Symbol> {
    let owner = member.owner.as_ref()?;
    ws.index(&member.package)?.types.get(owner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn workspace(files: &[(&str, &str)]) -> Workspace {
        let sources: BTreeMap<PathBuf, String> = files
            .iter()
            .map(|(p, c)| (PathBuf::from(p), c.to_string()))
            .collect();
        Workspace::from_sources("/ws", Some("example.com/m"), sources)
    }

    fn add_workspace() -> Workspace {
        workspace(&[
            (
                "p/p.go",
                "package p\n\nfunc Add(a, b int) int { return a + b }\n\nfunc twice(x int) int { return Add(x, x) }\n",
            ),
            (
                "q/q.go",
                "package q\n\nimport \"example.com/m/p\"\n\nfunc Use() int { return p.Add(1, 2) }\n",
            ),
        ])
    }

    #[test]
    fn test_lookup_and_references() {
        let ws = add_workspace();
        let add = lookup(&ws, "Add", None, None).unwrap();
        assert_eq!(add.package, "example.com/m/p");

        let refs = references(&ws, add);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].file, PathBuf::from("/ws/p/p.go"));
        assert_eq!(refs[0].kind, ReferenceKind::Call);
        assert!(refs[0].qualifier.is_none());
        assert_eq!(refs[1].package, "example.com/m/q");
        assert!(refs[1].qualifier.is_some());

        let err = lookup(&ws, "Missing", None, None).unwrap_err();
        assert_eq!(err.kind(), refit_foundation::ErrorKind::NotFound);
    }

    #[test]
    fn test_lookup_ambiguity_and_package_filter() {
        let ws = workspace(&[
            ("a/a.go", "package a\n\nfunc Run() {}\n"),
            ("b/b.go", "package b\n\nfunc Run() {}\n"),
        ]);
        let err = lookup(&ws, "Run", None, None).unwrap_err();
        assert_eq!(err.kind(), refit_foundation::ErrorKind::Ambiguous);
        let run = lookup(&ws, "Run", Some(SymbolKind::Function), Some("b")).unwrap();
        assert_eq!(run.package, "example.com/m/b");
    }

    #[test]
    fn test_method_references_match_receiver() {
        let ws = workspace(&[(
            "p/p.go",
            r#"package p

type A struct{}
type B struct{}

func (A) Close() {}
func (B) Close() {}

func f(a A, b B) {
	a.Close()
	b.Close()
	a.Close()
}
"#,
        )]);
        let close_a = lookup(&ws, "A.Close", None, None).unwrap();
        let refs = references(&ws, close_a);
        assert_eq!(refs.len(), 2);
        assert!(lookup(&ws, "Close", None, None).is_err());
    }

    #[test]
    fn test_implementations_and_symbol_at() {
        let source = r#"package p

type Reader interface {
	Read(buf []byte) (int, error)
}

type File struct{}

func (f *File) Read(buf []byte) (int, error) { return 0, nil }

type Other struct{}

func (Other) Read() {}
"#;
        let ws = workspace(&[("p/p.go", source)]);
        let reader = lookup(&ws, "Reader", None, None).unwrap();
        let impls: Vec<&str> = implementations(&ws, reader)
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(impls, vec!["File"]);

        let file = lookup(&ws, "File", None, None).unwrap();
        let ifaces = interfaces_satisfied_by(&ws, file);
        assert_eq!(ifaces.len(), 1);

        let offset = source.find("File struct").unwrap() + 1;
        let at = symbol_at(&ws, Path::new("p/p.go"), offset).unwrap();
        assert_eq!(at, SymbolAt::Symbol(file));
    }
}
