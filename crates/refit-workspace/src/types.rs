//! Lightweight type representation used by the binder's inference.
//!
//! Types are recorded relative to packages, not to files, so they can be
//! rendered back into source text from any file's point of view.

use crate::model::ImportSpec;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeRef {
    /// Predeclared type (int, string, error, ...)
    Basic(String),
    /// Named type declared in a workspace package
    Named { package: String, name: String },
    /// Named type from a package outside the workspace
    External { path: String, name: String },
    Pointer(Box<TypeRef>),
    Slice(Box<TypeRef>),
    Array { len: String, elem: Box<TypeRef> },
    Map { key: Box<TypeRef>, value: Box<TypeRef> },
    Chan { dir: String, elem: Box<TypeRef> },
    /// Source text valid only inside the declaring package
    Opaque { package: String, text: String },
}

impl TypeRef {
    pub fn basic(name: &str) -> Self {
        TypeRef::Basic(name.to_string())
    }

    /// Strip one level of pointer indirection
    pub fn deref(&self) -> &TypeRef {
        match self {
            TypeRef::Pointer(inner) => inner,
            other => other,
        }
    }

    /// Element type produced by indexing or ranging
    pub fn element(&self) -> Option<TypeRef> {
        match self.deref() {
            TypeRef::Slice(elem) | TypeRef::Array { elem, .. } => Some((**elem).clone()),
            TypeRef::Map { value, .. } => Some((**value).clone()),
            TypeRef::Chan { elem, .. } => Some((**elem).clone()),
            TypeRef::Basic(name) if name == "string" => Some(TypeRef::basic("byte")),
            _ => None,
        }
    }

    /// Key type produced by ranging
    pub fn range_key(&self) -> Option<TypeRef> {
        match self.deref() {
            TypeRef::Slice(_) | TypeRef::Array { .. } => Some(TypeRef::basic("int")),
            TypeRef::Map { key, .. } => Some((**key).clone()),
            TypeRef::Basic(name) if name == "string" => Some(TypeRef::basic("int")),
            TypeRef::Basic(name) if name.starts_with("int") || name.starts_with("uint") => {
                Some(self.clone())
            }
            TypeRef::Chan { elem, .. } => Some((**elem).clone()),
            _ => None,
        }
    }

    /// Value type produced by ranging (strings yield runes)
    pub fn range_value(&self) -> Option<TypeRef> {
        match self.deref() {
            TypeRef::Basic(name) if name == "string" => Some(TypeRef::basic("rune")),
            TypeRef::Chan { .. } => None,
            other => other.element(),
        }
    }

    /// Named workspace type this value's methods and fields come from
    pub fn named(&self) -> Option<(&str, &str)> {
        match self.deref() {
            TypeRef::Named { package, name } => Some((package, name)),
            _ => None,
        }
    }

    /// Render as source text from the point of view of `ctx`.
    ///
    /// Packages that must be imported for the text to be valid are added to
    /// `needed`. Returns `None` when the type cannot be spelled there.
    pub fn render(&self, ctx: &RenderContext<'_>, needed: &mut BTreeSet<String>) -> Option<String> {
        match self {
            TypeRef::Basic(name) => Some(name.clone()),
            TypeRef::Named { package, name } => {
                if package == ctx.package {
                    return Some(name.clone());
                }
                let qualifier = ctx.qualifier_for(package, needed)?;
                Some(format!("{}.{}", qualifier, name))
            }
            TypeRef::External { path, name } => {
                let qualifier = ctx.qualifier_for(path, needed)?;
                Some(format!("{}.{}", qualifier, name))
            }
            TypeRef::Pointer(inner) => Some(format!("*{}", inner.render(ctx, needed)?)),
            TypeRef::Slice(elem) => Some(format!("[]{}", elem.render(ctx, needed)?)),
            TypeRef::Array { len, elem } => Some(format!("[{}]{}", len, elem.render(ctx, needed)?)),
            TypeRef::Map { key, value } => Some(format!(
                "map[{}]{}",
                key.render(ctx, needed)?,
                value.render(ctx, needed)?
            )),
            TypeRef::Chan { dir, elem } => Some(format!("{}{}", dir, elem.render(ctx, needed)?)),
            TypeRef::Opaque { package, text } => (package == ctx.package).then(|| text.clone()),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Basic(name) => f.write_str(name),
            TypeRef::Named { package, name } => write!(f, "{}.{}", package, name),
            TypeRef::External { path, name } => write!(f, "{}.{}", path, name),
            TypeRef::Pointer(inner) => write!(f, "*{}", inner),
            TypeRef::Slice(elem) => write!(f, "[]{}", elem),
            TypeRef::Array { len, elem } => write!(f, "[{}]{}", len, elem),
            TypeRef::Map { key, value } => write!(f, "map[{}]{}", key, value),
            TypeRef::Chan { dir, elem } => write!(f, "{}{}", dir, elem),
            TypeRef::Opaque { text, .. } => f.write_str(text),
        }
    }
}

/// The file a type or name is being written into
pub struct RenderContext<'a> {
    pub package: &'a str,
    pub imports: &'a [ImportSpec],
    /// Package key to declared package name, for workspace packages
    pub package_names: &'a BTreeMap<String, String>,
}

impl RenderContext<'_> {
    /// Local name under which `path` is (or will be) imported
    pub fn qualifier_for(&self, path: &str, needed: &mut BTreeSet<String>) -> Option<String> {
        if let Some(import) = self
            .imports
            .iter()
            .find(|i| i.path == path && !i.is_blank() && !i.is_dot())
        {
            return Some(import.name.clone());
        }
        needed.insert(path.to_string());
        Some(default_import_name(path, self.package_names))
    }
}

/// Name a package is referred to by when imported without an alias
pub fn default_import_name(path: &str, package_names: &BTreeMap<String, String>) -> String {
    if let Some(name) = package_names.get(path) {
        return name.clone();
    }
    let mut segments = path.rsplit('/');
    let last = segments.next().unwrap_or(path);
    let is_major_version = last.len() > 1
        && last.starts_with('v')
        && last[1..].chars().all(|c| c.is_ascii_digit());
    let name = if is_major_version {
        segments.next().unwrap_or(last)
    } else {
        last
    };
    name.replace(['-', '.'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn import(path: &str, name: &str) -> ImportSpec {
        ImportSpec {
            path: path.to_string(),
            alias: None,
            name: name.to_string(),
            span: 0..0,
            decl_span: 0..0,
        }
    }

    #[test]
    fn test_render_relative_to_package() {
        let names = BTreeMap::from([("example.com/m/geo".to_string(), "geo".to_string())]);
        let imports = vec![import("strings", "strings")];
        let ctx = RenderContext {
            package: "example.com/m/app",
            imports: &imports,
            package_names: &names,
        };
        let mut needed = BTreeSet::new();

        let point = TypeRef::Pointer(Box::new(TypeRef::Named {
            package: "example.com/m/geo".to_string(),
            name: "Point".to_string(),
        }));
        assert_eq!(point.render(&ctx, &mut needed).as_deref(), Some("*geo.Point"));
        assert!(needed.contains("example.com/m/geo"));

        let builder = TypeRef::External {
            path: "strings".to_string(),
            name: "Builder".to_string(),
        };
        let map = TypeRef::Map {
            key: Box::new(TypeRef::basic("string")),
            value: Box::new(builder),
        };
        assert_eq!(
            map.render(&ctx, &mut needed).as_deref(),
            Some("map[string]strings.Builder")
        );
        assert_eq!(needed.len(), 1);

        let opaque = TypeRef::Opaque {
            package: "example.com/m/geo".to_string(),
            text: "struct{}".to_string(),
        };
        assert_eq!(opaque.render(&ctx, &mut needed), None);
    }

    #[test]
    fn test_default_import_names() {
        let names = BTreeMap::new();
        assert_eq!(default_import_name("github.com/x/yaml/v3", &names), "yaml");
        assert_eq!(default_import_name("net/http", &names), "http");
        assert_eq!(default_import_name("go-kit", &names), "go_kit");
    }

    #[test]
    fn test_range_types() {
        let m = TypeRef::Map {
            key: Box::new(TypeRef::basic("string")),
            value: Box::new(TypeRef::basic("int")),
        };
        assert_eq!(m.range_key(), Some(TypeRef::basic("string")));
        assert_eq!(m.range_value(), Some(TypeRef::basic("int")));
        let s = TypeRef::basic("string");
        assert_eq!(s.range_value(), Some(TypeRef::basic("rune")));
    }
}
