//! Read-only questions asked of a workspace snapshot

use refit_ast::complexity::file_complexity;
use refit_foundation::{Issue, Position, RefitError, RefitResult, SymbolKind};
use refit_workspace::resolver::{self, SymbolAt};
use refit_workspace::{Symbol, Workspace};
use serde::Serialize;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// A span in a workspace file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub file: PathBuf,
    pub span: Range<usize>,
    pub position: Position,
}

impl Location {
    fn new(ws: &Workspace, file: &Path, span: Range<usize>) -> Self {
        Self {
            file: file.to_path_buf(),
            position: ws.position(file, span.start),
            span,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub name: String,
    /// `None` for function-local names
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<SymbolKind>,
    pub package: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub exported: bool,
    pub definition: Location,
}

impl SymbolInfo {
    pub fn of(ws: &Workspace, symbol: &Symbol) -> Self {
        Self {
            name: symbol.qualified_name(),
            kind: Some(symbol.kind),
            package: symbol.package.clone(),
            detail: symbol.signature.clone(),
            exported: symbol.exported,
            definition: Location::new(ws, &symbol.file, symbol.name_span.clone()),
        }
    }
}

/// What sits at `offset` of `file`
pub fn symbol_at(ws: &Workspace, file: &Path, offset: usize) -> Option<SymbolInfo> {
    match resolver::symbol_at(ws, file, offset)? {
        SymbolAt::Symbol(symbol) => Some(SymbolInfo::of(ws, symbol)),
        SymbolAt::Local { file, index } => {
            let source = ws.file(&file)?;
            let local = source.info.locals.get(index)?;
            Some(SymbolInfo {
                name: local.name.clone(),
                kind: None,
                package: source.package.clone(),
                detail: local.type_ref.as_ref().map(|t| t.to_string()),
                exported: false,
                definition: Location::new(ws, &file, local.span.clone()),
            })
        }
        SymbolAt::Package(key) => {
            let package = ws.package(&key)?;
            let file = package.primary_file()?;
            let clause = file.root().named_child(0).map(|n| n.byte_range()).unwrap_or(0..0);
            Some(SymbolInfo {
                name: package.name.clone(),
                kind: Some(SymbolKind::Package),
                package: key,
                detail: None,
                exported: true,
                definition: Location::new(ws, &file.path, clause),
            })
        }
    }
}

/// Uses of whatever sits at `offset`, declaration excluded
pub fn references_at(ws: &Workspace, file: &Path, offset: usize) -> RefitResult<Vec<Location>> {
    let target = resolver::symbol_at(ws, file, offset).ok_or_else(|| {
        RefitError::not_found(format!("symbol at {}:{}", file.display(), offset))
    })?;
    match target {
        SymbolAt::Symbol(symbol) => Ok(resolver::references(ws, symbol)
            .into_iter()
            .map(|r| Location::new(ws, &r.file, r.span))
            .collect()),
        SymbolAt::Local { file, index } => {
            let source = ws.require_file(&file)?;
            let declaration = source.info.locals.get(index).map(|l| l.span.clone());
            Ok(resolver::local_occurrences(source, index)
                .into_iter()
                .filter(|span| Some(span) != declaration.as_ref())
                .map(|span| Location::new(ws, &file, span))
                .collect())
        }
        SymbolAt::Package(_) => Err(RefitError::unsupported(
            "references of a package are not tracked",
        )),
    }
}

/// Definition, uses and implementations of one named symbol
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolReport {
    pub symbol: SymbolInfo,
    pub references: Vec<Location>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub implementations: Vec<SymbolInfo>,
}

pub fn describe(ws: &Workspace, name: &str, package: Option<&str>) -> RefitResult<SymbolReport> {
    let symbol = resolver::lookup(ws, name, None, package)?;
    let references = resolver::references(ws, symbol)
        .into_iter()
        .map(|r| Location::new(ws, &r.file, r.span))
        .collect();
    let implementations = if symbol.kind == SymbolKind::Interface {
        resolver::implementations(ws, symbol)
            .into_iter()
            .map(|s| SymbolInfo::of(ws, s))
            .collect()
    } else {
        Vec::new()
    };
    Ok(SymbolReport {
        symbol: SymbolInfo::of(ws, symbol),
        references,
        implementations,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSummary {
    pub root: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    pub packages: usize,
    pub files: usize,
    pub symbols: usize,
    pub diagnostics: Vec<Issue>,
}

pub fn summary(ws: &Workspace) -> WorkspaceSummary {
    WorkspaceSummary {
        root: ws.root.clone(),
        module: ws.module_path.clone(),
        packages: ws.packages.len(),
        files: ws.files().count(),
        symbols: ws.packages.values().map(|p| p.symbols.len()).sum(),
        diagnostics: ws.checker_diagnostics(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexityEntry {
    /// Path relative to the workspace root
    pub file: PathBuf,
    pub function: String,
    pub line: u32,
    pub complexity: u32,
}

/// Functions at or above `min`, most complex first
pub fn complexity(ws: &Workspace, min: u32) -> Vec<ComplexityEntry> {
    let mut entries: Vec<ComplexityEntry> = ws
        .files()
        .flat_map(|file| {
            file_complexity(&file.tree, &file.content)
                .into_iter()
                .filter(move |f| f.complexity >= min)
                .map(move |f| ComplexityEntry {
                    file: ws.relative(&file.path).to_path_buf(),
                    function: match &f.receiver {
                        Some(receiver) => format!("{}.{}", receiver, f.name),
                        None => f.name.clone(),
                    },
                    line: f.line,
                    complexity: f.complexity,
                })
        })
        .collect();
    entries.sort_by(|a, b| {
        b.complexity
            .cmp(&a.complexity)
            .then_with(|| a.file.cmp(&b.file))
            .then(a.line.cmp(&b.line))
    });
    entries
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

    const LIB: &str = "package p\n\nfunc Add(a, b int) int { return a + b }\n\nfunc Twice(x int) int {\n\ty := Add(x, x)\n\treturn y\n}\n";

    #[test]
    fn test_symbol_and_references_at_cursor() {
        let ws = workspace(&[("p/p.go", LIB)]);
        let path = PathBuf::from("/ws/p/p.go");
        let call = LIB.find("Add(x").unwrap();

        let info = symbol_at(&ws, &path, call + 1).unwrap();
        assert_eq!(info.name, "Add");
        assert_eq!(info.kind, Some(SymbolKind::Function));
        assert_eq!(info.definition.position, Position::new(3, 6));

        let refs = references_at(&ws, &path, call).unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].span, call..call + 3);
    }

    #[test]
    fn test_local_references_skip_declaration() {
        let ws = workspace(&[("p/p.go", LIB)]);
        let path = PathBuf::from("/ws/p/p.go");
        let use_site = LIB.rfind("y\n").unwrap();
        let info = symbol_at(&ws, &path, use_site).unwrap();
        assert_eq!(info.kind, None);
        let refs = references_at(&ws, &path, use_site).unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].span.start, use_site);
    }

    #[test]
    fn test_complexity_threshold() {
        let source = "package p\n\nfunc Flat() {}\n\nfunc Branchy(a, b bool) int {\n\tif a && b {\n\t\treturn 1\n\t}\n\tfor i := 0; i < 3; i++ {\n\t}\n\treturn 0\n}\n";
        let ws = workspace(&[("p/p.go", source)]);
        let entries = complexity(&ws, 2);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].function, "Branchy");
        assert_eq!(entries[0].complexity, 4);
        assert_eq!(entries[0].file, PathBuf::from("p/p.go"));
    }

    #[test]
    fn test_summary_counts() {
        let ws = workspace(&[("p/p.go", LIB)]);
        let summary = summary(&ws);
        assert_eq!(summary.packages, 1);
        assert_eq!(summary.files, 1);
        assert_eq!(summary.symbols, 2);
        assert!(summary.diagnostics.is_empty());
    }
}
