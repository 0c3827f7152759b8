//! Name binding and light type inference.
//!
//! The binder walks one file with a scope stack and records, for every
//! identifier occurrence, what it refers to. It also infers enough types to
//! resolve member selections and reports the checker diagnostics the engine
//! compares before and after executing a plan.

mod expr;
mod scope;
mod stmt;

use crate::model::ImportSpec;
use crate::symbols::{Symbol, SymbolIndex};
use crate::types::TypeRef;
use refit_ast::Tree;
use std::collections::BTreeMap;
use std::ops::Range;

pub(crate) use scope::Binder;

/// Kind of member a selector resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemberKind {
    Method,
    Field,
    InterfaceMethod,
}

/// What an identifier occurrence refers to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// Index into [`FileInfo::locals`]
    Local(usize),
    /// Package-level symbol of a workspace package
    Package { package: String, name: String },
    Member {
        package: String,
        owner: String,
        name: String,
        kind: MemberKind,
    },
    /// Import qualifier; index into the file's imports
    Import(usize),
    Builtin,
    /// Name exported by a package outside the workspace
    External { path: String },
    /// Selection on an operand whose type could not be inferred
    UnknownMember,
    Label,
    Unresolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UseRole {
    Declaration,
    Read,
    Write,
    Call,
    TypeUse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentUse {
    pub span: Range<usize>,
    pub name: String,
    pub target: Target,
    pub role: UseRole,
    /// Span of `pkg` when the use is spelled `pkg.Name`
    pub qualifier: Option<Range<usize>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalKind {
    Var,
    Param,
    Result,
    Receiver,
    Const,
    Type,
}

/// A name declared inside a function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDecl {
    pub name: String,
    pub span: Range<usize>,
    /// Region in which the name is visible
    pub scope: Range<usize>,
    pub kind: LocalKind,
    pub type_ref: Option<TypeRef>,
    /// Innermost function (declaration or literal) declaring the name
    pub function: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub span: Range<usize>,
    pub message: String,
}

/// Binder output for one file
#[derive(Debug, Clone, Default)]
pub struct FileInfo {
    pub uses: Vec<IdentUse>,
    pub locals: Vec<LocalDecl>,
    pub diagnostics: Vec<Diagnostic>,
}

impl FileInfo {
    /// Identifier occurrence covering `offset`
    pub fn use_at(&self, offset: usize) -> Option<&IdentUse> {
        self.uses
            .iter()
            .find(|u| u.span.start <= offset && offset <= u.span.end)
    }

    pub fn uses_in(&self, span: Range<usize>) -> impl Iterator<Item = &IdentUse> {
        self.uses
            .iter()
            .filter(move |u| u.span.start >= span.start && u.span.end <= span.end)
    }

    pub fn uses_of_local(&self, index: usize) -> impl Iterator<Item = &IdentUse> {
        self.uses
            .iter()
            .filter(move |u| u.target == Target::Local(index))
    }

    /// Locals whose scope covers `offset`
    pub fn visible_locals(&self, offset: usize) -> impl Iterator<Item = (usize, &LocalDecl)> {
        self.locals
            .iter()
            .enumerate()
            .filter(move |(_, l)| l.scope.start <= offset && offset < l.scope.end)
    }

    /// Innermost local named `name` visible at `offset`
    pub fn lookup_local(&self, offset: usize, name: &str) -> Option<usize> {
        self.visible_locals(offset)
            .filter(|(_, l)| l.name == name)
            .max_by_key(|(_, l)| l.scope.start)
            .map(|(i, _)| i)
    }

    /// Locals declared anywhere inside `span`
    pub fn locals_in(&self, span: Range<usize>) -> impl Iterator<Item = (usize, &LocalDecl)> {
        self.locals
            .iter()
            .enumerate()
            .filter(move |(_, l)| l.span.start >= span.start && l.span.end <= span.end)
    }
}

/// Read-only view of the workspace the binder resolves against
pub struct BindContext<'a> {
    pub package: &'a str,
    pub indices: &'a BTreeMap<String, SymbolIndex>,
    pub imports: &'a [ImportSpec],
}

impl BindContext<'_> {
    pub fn symbol(&self, target: &Target) -> Option<&Symbol> {
        match target {
            Target::Package { package, name } => self.indices.get(package)?.package_level(name),
            Target::Member {
                package,
                owner,
                name,
                kind,
            } => {
                let index = self.indices.get(package)?;
                match kind {
                    MemberKind::Method => index.method(owner, name),
                    MemberKind::Field => index.field(owner, name),
                    MemberKind::InterfaceMethod => index.interface_method(owner, name),
                }
            }
            _ => None,
        }
    }
}

/// Bind every identifier of a file
pub fn bind_file(ctx: &BindContext<'_>, tree: &Tree, source: &str) -> FileInfo {
    let mut binder = Binder::new(ctx, source);
    binder.file(tree.root_node());
    binder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::{declared_type_names, index_file, TypeScope};
    use refit_ast::parse_go;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;
    use std::path::Path;

    fn bind(source: &str) -> FileInfo {
        let tree = parse_go(source).unwrap();
        let types: BTreeSet<String> = declared_type_names(tree.root_node(), source)
            .into_iter()
            .collect();
        let packages = BTreeSet::from(["p".to_string()]);
        let scope = TypeScope {
            package: "p",
            package_types: &types,
            imports: &[],
            workspace_packages: &packages,
        };
        let mut index = SymbolIndex::default();
        index_file(&mut index, Path::new("p.go"), tree.root_node(), source, &scope);
        let indices = BTreeMap::from([("p".to_string(), index)]);
        let ctx = BindContext {
            package: "p",
            indices: &indices,
            imports: &[],
        };
        bind_file(&ctx, &tree, source)
    }

    fn messages(info: &FileInfo) -> Vec<String> {
        info.diagnostics.iter().map(|d| d.message.clone()).collect()
    }

    #[test]
    fn test_locals_and_package_names() {
        let source = r#"package p

var total int

func Add(a, b int) int {
	s := a + b
	total = s
	return s
}
"#;
        let info = bind(source);
        assert!(info.diagnostics.is_empty(), "{:?}", info.diagnostics);
        let names: Vec<&str> = info.locals.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "s"]);
        assert_eq!(info.locals[2].type_ref, Some(TypeRef::basic("int")));

        let total_write = info
            .uses
            .iter()
            .find(|u| u.name == "total" && u.role == UseRole::Write)
            .unwrap();
        assert_eq!(
            total_write.target,
            Target::Package {
                package: "p".to_string(),
                name: "total".to_string()
            }
        );
        let s_uses: Vec<UseRole> = info.uses_of_local(2).map(|u| u.role).collect();
        assert_eq!(s_uses, vec![UseRole::Declaration, UseRole::Read, UseRole::Read]);
    }

    #[test]
    fn test_member_resolution_through_inference() {
        let source = r#"package p

type Inner struct{ N int }

type Outer struct {
	Inner
	Name string
}

func (o *Outer) Label() string { return o.Name }

func use() int {
	o := &Outer{Name: "x"}
	_ = o.Label()
	return o.N
}
"#;
        let info = bind(source);
        assert!(info.diagnostics.is_empty(), "{:?}", info.diagnostics);
        let label_call = info
            .uses
            .iter()
            .find(|u| u.name == "Label" && u.role == UseRole::Call)
            .unwrap();
        assert_eq!(
            label_call.target,
            Target::Member {
                package: "p".to_string(),
                owner: "Outer".to_string(),
                name: "Label".to_string(),
                kind: MemberKind::Method
            }
        );
        // promoted through the embedded Inner
        let promoted = info
            .uses
            .iter()
            .find(|u| u.name == "N" && u.role != UseRole::Declaration)
            .unwrap();
        assert_eq!(
            promoted.target,
            Target::Member {
                package: "p".to_string(),
                owner: "Inner".to_string(),
                name: "N".to_string(),
                kind: MemberKind::Field
            }
        );
        let key = info
            .uses
            .iter()
            .find(|u| u.name == "Name" && u.role == UseRole::Write)
            .unwrap();
        assert!(matches!(key.target, Target::Member { kind: MemberKind::Field, .. }));
    }

    #[test]
    fn test_checker_diagnostics() {
        let source = r#"package p

func f() {
	x := 1
	x := 2
	y := missing
	var z int
	_ = y
	_ = x
}
"#;
        let info = bind(source);
        let msgs = messages(&info);
        assert!(msgs.contains(&"no new variables on left side of :=".to_string()));
        assert!(msgs.contains(&"undefined: missing".to_string()));
        assert!(msgs.contains(&"declared and not used: z".to_string()));
    }

    #[test]
    fn test_scopes_of_if_and_shadowing() {
        let source = r#"package p

func f(v int) int {
	if v := v * 2; v > 3 {
		return v
	}
	return v
}
"#;
        let info = bind(source);
        assert!(info.diagnostics.is_empty(), "{:?}", info.diagnostics);
        assert_eq!(info.locals.len(), 2);
        let inner = &info.locals[1];
        let inner_uses = info.uses_of_local(1).count();
        // declaration, condition, return inside the if
        assert_eq!(inner_uses, 3);
        let outer_reads = info
            .uses_of_local(0)
            .filter(|u| u.role == UseRole::Read)
            .count();
        assert_eq!(outer_reads, 2);
        assert!(inner.scope.end < source.rfind("return v").unwrap());
    }

    #[test]
    fn test_labels_and_range() {
        let source = r#"package p

func f(xs []string) int {
	n := 0
outer:
	for i, s := range xs {
		for range s {
			if i > 2 {
				break outer
			}
			n++
		}
	}
	return n
}
"#;
        let info = bind(source);
        assert!(info.diagnostics.is_empty(), "{:?}", info.diagnostics);
        let s = info.locals.iter().find(|l| l.name == "s").unwrap();
        assert_eq!(s.type_ref, Some(TypeRef::basic("string")));
        let i = info.locals.iter().find(|l| l.name == "i").unwrap();
        assert_eq!(i.type_ref, Some(TypeRef::basic("int")));
        assert!(info.uses.iter().any(|u| u.target == Target::Label));
    }
}
