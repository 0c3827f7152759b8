//! Workspace, package and file model.
//!
//! The workspace owns every package; packages own their files and symbol
//! index. Files point back to their package by key, never by reference.

use crate::binder::FileInfo;
use crate::import_graph::ImportGraph;
use crate::symbols::SymbolIndex;
use crate::types::RenderContext;
use refit_ast::{FileSet, LineIndex, Node, SyntaxError, Tree};
use refit_foundation::{Issue, IssueKind, Position, RefitError, RefitResult};
use std::collections::BTreeMap;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// One import spec of a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    pub path: String,
    pub alias: Option<String>,
    /// Local name: the alias, or the imported package's declared name
    pub name: String,
    pub span: Range<usize>,
    /// Enclosing `import` declaration
    pub decl_span: Range<usize>,
}

impl ImportSpec {
    pub fn is_blank(&self) -> bool {
        self.name == "_"
    }

    pub fn is_dot(&self) -> bool {
        self.name == "."
    }
}

/// Options controlling which files a workspace load picks up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// Directory names skipped during discovery
    pub exclude: Vec<String>,
    pub include_tests: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            exclude: vec!["vendor".to_string(), "testdata".to_string()],
            include_tests: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Key of the owning package
    pub package: String,
    pub package_name: String,
    pub content: String,
    pub tree: Tree,
    pub lines: LineIndex,
    /// Base of this file in the workspace file set
    pub base: usize,
    pub imports: Vec<ImportSpec>,
    pub syntax_errors: Vec<SyntaxError>,
    pub info: FileInfo,
}

impl SourceFile {
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn is_parsable(&self) -> bool {
        self.syntax_errors.is_empty()
    }

    pub fn is_test(&self) -> bool {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.ends_with("_test.go"))
            .unwrap_or(false)
    }

    pub fn position(&self, offset: usize) -> Position {
        self.lines.position(offset)
    }

    pub fn text(&self, span: Range<usize>) -> &str {
        self.content.get(span).unwrap_or("")
    }

    /// Smallest named node covering `span`
    pub fn node_at(&self, span: Range<usize>) -> Option<Node<'_>> {
        self.root()
            .named_descendant_for_byte_range(span.start, span.end)
    }

    pub fn import_of(&self, path: &str) -> Option<&ImportSpec> {
        self.imports
            .iter()
            .find(|i| i.path == path && !i.is_blank() && !i.is_dot())
    }

    pub fn import_named(&self, name: &str) -> Option<&ImportSpec> {
        self.imports.iter().find(|i| i.name == name)
    }

    /// Offset just past the package clause, where a new import block goes
    pub fn package_clause_end(&self) -> usize {
        let mut cursor = self.root().walk();
        let clause = self
            .root()
            .named_children(&mut cursor)
            .find(|n| n.kind() == "package_clause");
        clause
            .map(|c| refit_ast::syntax::line_end(&self.content, c.end_byte()))
            .unwrap_or(0)
    }

    /// Offset just past the last top-level import declaration
    pub fn imports_end(&self) -> Option<usize> {
        self.imports.iter().map(|i| i.decl_span.end).max()
    }
}

#[derive(Debug, Clone)]
pub struct Package {
    /// Canonical import path
    pub key: String,
    pub name: String,
    pub dir: PathBuf,
    pub files: BTreeMap<PathBuf, SourceFile>,
    pub symbols: SymbolIndex,
    /// `package foo_test` living beside `package foo`
    pub external_test: bool,
}

impl Package {
    /// First non-test file, used as the default insertion target
    pub fn primary_file(&self) -> Option<&SourceFile> {
        self.files
            .values()
            .find(|f| !f.is_test())
            .or_else(|| self.files.values().next())
    }

    /// The file whose name matches the package name, else the primary file
    pub fn preferred_file(&self) -> Option<&SourceFile> {
        let wanted = format!("{}.go", self.name);
        self.files
            .values()
            .find(|f| f.path.file_name().and_then(|n| n.to_str()) == Some(wanted.as_str()))
            .or_else(|| self.primary_file())
    }
}

/// A loaded workspace: the single consistent snapshot every plan is built from
#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
    /// Module path declared by `go.mod`
    pub module_path: Option<String>,
    pub packages: BTreeMap<String, Package>,
    pub file_set: FileSet,
    /// Package key to declared package name
    pub package_names: BTreeMap<String, String>,
    /// Load-time issues: syntax errors and package-level checker findings
    pub diagnostics: Vec<Issue>,
    pub(crate) file_index: BTreeMap<PathBuf, String>,
    pub(crate) options: LoadOptions,
}

impl Workspace {
    /// Absolute path of `path`, which may be relative to the root
    pub fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Path relative to the workspace root, for display
    pub fn relative<'p>(&self, path: &'p Path) -> &'p Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }

    pub fn file(&self, path: &Path) -> Option<&SourceFile> {
        let path = self.absolute(path);
        let key = self.file_index.get(&path)?;
        self.packages.get(key)?.files.get(&path)
    }

    pub fn require_file(&self, path: &Path) -> RefitResult<&SourceFile> {
        self.file(path)
            .ok_or_else(|| RefitError::not_found(format!("file {}", path.display())))
    }

    pub fn package(&self, key: &str) -> Option<&Package> {
        self.packages.get(key)
    }

    /// Package owning a file
    pub fn package_of(&self, path: &Path) -> Option<&Package> {
        let key = self.file_index.get(&self.absolute(path))?;
        self.packages.get(key)
    }

    pub fn files(&self) -> impl Iterator<Item = &SourceFile> {
        self.packages.values().flat_map(|p| p.files.values())
    }

    pub fn file_count(&self) -> usize {
        self.file_index.len()
    }

    pub fn index(&self, key: &str) -> Option<&SymbolIndex> {
        self.packages.get(key).map(|p| &p.symbols)
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// A file that failed to parse may not be edited
    pub fn is_parsable(&self, path: &Path) -> bool {
        self.file(path).map(SourceFile::is_parsable).unwrap_or(true)
    }

    pub fn position(&self, path: &Path, offset: usize) -> Position {
        self.file(path)
            .map(|f| f.position(offset))
            .unwrap_or_else(|| Position::new(1, 1))
    }

    /// Issue located at a byte offset of a file
    pub fn issue_at(&self, issue: Issue, path: &Path, offset: usize) -> Issue {
        issue.at(self.relative(path), self.position(path, offset))
    }

    pub fn render_context<'a>(&'a self, file: &'a SourceFile) -> RenderContext<'a> {
        RenderContext {
            package: &file.package,
            imports: &file.imports,
            package_names: &self.package_names,
        }
    }

    /// Resolve a user-supplied package designation.
    ///
    /// Accepted, in order: exact canonical key, unique package name, a path
    /// relative to the root, and `.` for the root package.
    pub fn resolve_package(&self, spec: &str) -> RefitResult<&Package> {
        if let Some(package) = self.packages.get(spec) {
            return Ok(package);
        }

        let by_name: Vec<&Package> = self
            .packages
            .values()
            .filter(|p| p.name == spec && !p.external_test)
            .collect();
        match by_name.len() {
            1 => return Ok(by_name[0]),
            n if n > 1 => {
                return Err(RefitError::ambiguous(
                    format!("package name '{}' matches {} packages", spec, n),
                    by_name.iter().map(|p| p.key.clone()).collect(),
                ))
            }
            _ => {}
        }

        let trimmed = spec.trim_start_matches("./").trim_end_matches('/');
        let dir = if trimmed == "." || trimmed.is_empty() {
            self.root.clone()
        } else {
            self.root.join(trimmed)
        };
        let by_dir: Vec<&Package> = self
            .packages
            .values()
            .filter(|p| p.dir == dir && !p.external_test)
            .collect();
        match by_dir.len() {
            1 => Ok(by_dir[0]),
            0 => Err(RefitError::not_found(format!("package '{}'", spec))),
            _ => Err(RefitError::ambiguous(
                format!("directory '{}' holds several packages", spec),
                by_dir.iter().map(|p| p.key.clone()).collect(),
            )),
        }
    }

    /// Canonical key a package in `dir` would get, existing or not
    pub fn key_for_dir(&self, dir: &Path) -> String {
        let rel = self
            .relative(dir)
            .to_string_lossy()
            .replace('\\', "/");
        let rel = rel.trim_matches('/');
        match (&self.module_path, rel.is_empty()) {
            (Some(module), true) => module.clone(),
            (Some(module), false) => format!("{}/{}", module, rel),
            (None, true) => ".".to_string(),
            (None, false) => rel.to_string(),
        }
    }

    /// Package import graph over workspace packages
    pub fn import_graph(&self) -> ImportGraph {
        let mut graph = ImportGraph::new();
        for package in self.packages.values() {
            graph.add_package(&package.key);
            for file in package.files.values() {
                for import in &file.imports {
                    if self.packages.contains_key(&import.path) {
                        graph.add_edge(&package.key, &import.path);
                    }
                }
            }
        }
        graph
    }

    /// Checker findings: syntax errors, package-level and per-file diagnostics
    pub fn checker_diagnostics(&self) -> Vec<Issue> {
        let mut issues = self.diagnostics.clone();
        for file in self.files() {
            for diagnostic in &file.info.diagnostics {
                issues.push(
                    Issue::error(IssueKind::TypeCheck, diagnostic.message.clone())
                        .at(self.relative(&file.path), file.position(diagnostic.span.start)),
                );
            }
        }
        issues
    }
}
