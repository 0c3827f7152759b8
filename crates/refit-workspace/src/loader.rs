//! Workspace discovery, parsing and indexing.

use crate::binder::{bind_file, BindContext, FileInfo};
use crate::model::{ImportSpec, LoadOptions, Package, SourceFile, Workspace};
use crate::symbols::{declared_type_names, index_file, SymbolIndex, TypeScope};
use crate::types::default_import_name;
use rayon::prelude::*;
use refit_ast::syntax::{span, text};
use refit_ast::{parse_go, syntax_errors, FileSet, LineIndex, SyntaxError, Tree};
use refit_foundation::{Issue, IssueKind, RefitError, RefitResult};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

struct ParsedFile {
    path: PathBuf,
    content: String,
    tree: Tree,
    package_name: String,
    imports: Vec<ImportSpec>,
    syntax_errors: Vec<SyntaxError>,
}

impl ParsedFile {
    fn parse(path: PathBuf, content: String) -> Option<Self> {
        let tree = match parse_go(&content) {
            Ok(tree) => tree,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to parse file");
                return None;
            }
        };
        let package_name = {
            let root = tree.root_node();
            let mut cursor = root.walk();
            let name = root
                .named_children(&mut cursor)
                .find(|n| n.kind() == "package_clause")
                .and_then(|clause| clause.named_child(0))
                .map(|name| text(name, &content).to_string())
                .unwrap_or_default();
            name
        };
        let imports = raw_imports(&tree, &content);
        let syntax_errors = syntax_errors(&tree, &content);
        Some(Self {
            path,
            content,
            tree,
            package_name,
            imports,
            syntax_errors,
        })
    }
}

/// Import specs with the alias only; local names are filled once package names are known
fn raw_imports(tree: &Tree, source: &str) -> Vec<ImportSpec> {
    let root = tree.root_node();
    let mut imports = Vec::new();
    let mut cursor = root.walk();
    for decl in root.named_children(&mut cursor) {
        if decl.kind() != "import_declaration" {
            continue;
        }
        let specs = refit_ast::visitor::collect(decl, |n| n.kind() == "import_spec");
        for spec in specs {
            let Some(path) = spec.child_by_field_name("path") else {
                continue;
            };
            let path_text = text(path, source).trim_matches(|c| c == '"' || c == '`');
            let alias = spec
                .child_by_field_name("name")
                .map(|n| text(n, source).to_string());
            imports.push(ImportSpec {
                path: path_text.to_string(),
                alias,
                name: String::new(),
                span: span(spec),
                decl_span: span(decl),
            });
        }
    }
    imports
}

/// `module` directive of a go.mod file
pub fn module_path(root: &Path) -> Option<String> {
    let content = std::fs::read_to_string(root.join("go.mod")).ok()?;
    content.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("module")?;
        let name = rest.trim().trim_matches('"');
        (!name.is_empty()).then(|| name.to_string())
    })
}

fn discover(root: &Path, options: &LoadOptions) -> RefitResult<Vec<(PathBuf, String)>> {
    let exclude: BTreeSet<String> = options.exclude.iter().cloned().collect();
    let walker = ignore::WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            !(is_dir
                && entry
                    .file_name()
                    .to_str()
                    .map(|n| exclude.contains(n))
                    .unwrap_or(false))
        })
        .build();

    let mut sources = Vec::new();
    for entry in walker.flatten() {
        let path = entry.path();
        let is_go = path.extension().and_then(|e| e.to_str()) == Some("go");
        if !is_go || !path.is_file() {
            continue;
        }
        let is_test = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.ends_with("_test.go"))
            .unwrap_or(false);
        if is_test && !options.include_tests {
            continue;
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            RefitError::io(
                format!("Failed to read {}: {}", path.display(), e),
                Some(path.to_path_buf()),
            )
        })?;
        sources.push((path.to_path_buf(), content));
    }
    sources.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(sources)
}

impl Workspace {
    /// Scan, parse, index and bind every Go file under `root`
    pub fn load(root: &Path, options: &LoadOptions) -> RefitResult<Self> {
        let start = Instant::now();
        let root = root.canonicalize().map_err(|e| {
            RefitError::io(
                format!("Cannot open workspace {}: {}", root.display(), e),
                Some(root.to_path_buf()),
            )
        })?;
        if !root.is_dir() {
            return Err(RefitError::usage(format!(
                "Workspace root {} is not a directory",
                root.display()
            )));
        }
        let module = module_path(&root);
        let sources = discover(&root, options)?;
        let workspace = Self::build(root, module, sources, options.clone());
        info!(
            root = %workspace.root.display(),
            packages = workspace.packages.len(),
            files = workspace.file_count(),
            diagnostics = workspace.diagnostics.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Workspace loaded"
        );
        Ok(workspace)
    }

    /// Build a workspace from in-memory sources; relative paths are joined to `root`
    pub fn from_sources<P: Into<PathBuf>>(
        root: impl Into<PathBuf>,
        module: Option<&str>,
        sources: impl IntoIterator<Item = (P, String)>,
    ) -> Self {
        let root = root.into();
        let sources = sources
            .into_iter()
            .map(|(path, content)| {
                let path = path.into();
                let path = if path.is_absolute() {
                    path
                } else {
                    root.join(path)
                };
                (path, content)
            })
            .collect();
        Self::build(
            root,
            module.map(str::to_string),
            sources,
            LoadOptions::default(),
        )
    }

    /// Re-read every file from disk
    pub fn reload(&self) -> RefitResult<Self> {
        Self::load(&self.root, &self.options)
    }

    /// Current sources with some files replaced, added (`Some`) or removed (`None`)
    pub fn with_overlay(&self, overlay: &BTreeMap<PathBuf, Option<String>>) -> Self {
        let mut sources: BTreeMap<PathBuf, String> = self
            .files()
            .map(|f| (f.path.clone(), f.content.clone()))
            .collect();
        for (path, content) in overlay {
            let path = self.absolute(path);
            match content {
                Some(content) => {
                    sources.insert(path, content.clone());
                }
                None => {
                    sources.remove(&path);
                }
            }
        }
        Self::build(
            self.root.clone(),
            self.module_path.clone(),
            sources.into_iter().collect(),
            self.options.clone(),
        )
    }

    fn build(
        root: PathBuf,
        module_path: Option<String>,
        sources: Vec<(PathBuf, String)>,
        options: LoadOptions,
    ) -> Self {
        let mut parsed: Vec<ParsedFile> = sources
            .into_par_iter()
            .filter_map(|(path, content)| ParsedFile::parse(path, content))
            .collect();
        parsed.sort_by(|a, b| a.path.cmp(&b.path));

        let mut workspace = Workspace {
            root,
            module_path,
            packages: BTreeMap::new(),
            file_set: FileSet::new(),
            package_names: BTreeMap::new(),
            diagnostics: Vec::new(),
            file_index: BTreeMap::new(),
            options,
        };

        // Group files into packages by directory and package clause
        let mut groups: BTreeMap<String, (String, PathBuf, Vec<ParsedFile>)> = BTreeMap::new();
        for file in parsed {
            let dir = file
                .path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| workspace.root.clone());
            let mut key = workspace.key_for_dir(&dir);
            if file.package_name.ends_with("_test") {
                key.push_str("_test");
            }
            if let Some((name, _, _)) = groups.get(&key) {
                if *name != file.package_name && !file.package_name.is_empty() {
                    workspace.diagnostics.push(
                        Issue::error(
                            IssueKind::TypeCheck,
                            format!(
                                "found packages {} and {} in {}",
                                name,
                                file.package_name,
                                dir.display()
                            ),
                        )
                        .in_file(workspace.relative(&file.path)),
                    );
                    key = format!("{}#{}", key, file.package_name);
                }
            }
            let entry = groups
                .entry(key)
                .or_insert_with(|| (file.package_name.clone(), dir.clone(), Vec::new()));
            entry.2.push(file);
        }

        workspace.package_names = groups
            .iter()
            .map(|(key, (name, _, _))| (key.clone(), name.clone()))
            .collect();
        for (_, _, files) in groups.values_mut() {
            for file in files.iter_mut() {
                for import in file.imports.iter_mut() {
                    import.name = import.alias.clone().unwrap_or_else(|| {
                        default_import_name(&import.path, &workspace.package_names)
                    });
                }
            }
        }

        // Symbol indices: every package before any binding
        let workspace_packages: BTreeSet<String> = groups.keys().cloned().collect();
        let mut indices: BTreeMap<String, SymbolIndex> = BTreeMap::new();
        for (key, (_, _, files)) in &groups {
            let types: BTreeSet<String> = files
                .iter()
                .flat_map(|f| declared_type_names(f.tree.root_node(), &f.content))
                .collect();
            let mut index = SymbolIndex::default();
            for file in files {
                let scope = TypeScope {
                    package: key,
                    package_types: &types,
                    imports: &file.imports,
                    workspace_packages: &workspace_packages,
                };
                index_file(
                    &mut index,
                    &file.path,
                    file.tree.root_node(),
                    &file.content,
                    &scope,
                );
            }
            indices.insert(key.clone(), index);
        }

        // Bind every file against the complete set of indices
        let jobs: Vec<(&String, &ParsedFile)> = groups
            .iter()
            .flat_map(|(key, (_, _, files))| files.iter().map(move |f| (key, f)))
            .collect();
        let infos: Vec<FileInfo> = jobs
            .par_iter()
            .map(|(key, file)| {
                let ctx = BindContext {
                    package: key,
                    indices: &indices,
                    imports: &file.imports,
                };
                bind_file(&ctx, &file.tree, &file.content)
            })
            .collect();
        drop(jobs);

        let mut infos = infos.into_iter();
        for (key, (name, dir, files)) in groups {
            let symbols = indices.remove(&key).unwrap_or_default();
            let mut package = Package {
                key: key.clone(),
                external_test: name.ends_with("_test"),
                name,
                dir,
                files: BTreeMap::new(),
                symbols,
            };
            for file in files {
                let info = infos.next().unwrap_or_default();
                let base = workspace.file_set.add(&file.path, file.content.len());
                let lines = LineIndex::new(&file.content);
                for error in &file.syntax_errors {
                    workspace.diagnostics.push(
                        Issue::error(IssueKind::UnparsableFile, error.message.clone())
                            .at(workspace.relative(&file.path), lines.position(error.start)),
                    );
                }
                workspace.file_index.insert(file.path.clone(), key.clone());
                package.files.insert(
                    file.path.clone(),
                    SourceFile {
                        path: file.path,
                        package: key.clone(),
                        package_name: file.package_name,
                        content: file.content,
                        tree: file.tree,
                        lines,
                        base,
                        imports: file.imports,
                        syntax_errors: file.syntax_errors,
                        info,
                    },
                );
            }
            let issues = package_diagnostics(&workspace, &package);
            workspace.diagnostics.extend(issues);
            debug!(package = %key, files = package.files.len(), symbols = package.symbols.len(), "Indexed package");
            workspace.packages.insert(key, package);
        }
        workspace
    }
}

/// Checker findings that need the whole package: redeclarations and member clashes
fn package_diagnostics(workspace: &Workspace, package: &Package) -> Vec<Issue> {
    let mut issues = Vec::new();
    let locate = |file: &Path, offset: usize| {
        let position = package
            .files
            .get(file)
            .map(|f| f.position(offset))
            .unwrap_or_else(|| refit_foundation::Position::new(1, 1));
        (workspace.relative(file).to_path_buf(), position)
    };

    for duplicate in &package.symbols.duplicates {
        let (file, position) = locate(&duplicate.file, duplicate.name_span.start);
        issues.push(
            Issue::error(
                IssueKind::TypeCheck,
                format!("{} redeclared in this block", duplicate.name),
            )
            .at(file, position),
        );
    }

    for (owner, methods) in &package.symbols.methods {
        let mut seen = BTreeSet::new();
        for method in methods {
            let (file, position) = locate(&method.file, method.name_span.start);
            if !seen.insert(method.name.as_str()) {
                issues.push(
                    Issue::error(
                        IssueKind::TypeCheck,
                        format!("method {}.{} already declared", owner, method.name),
                    )
                    .at(file, position),
                );
            } else if package.symbols.field(owner, &method.name).is_some() {
                issues.push(
                    Issue::error(
                        IssueKind::TypeCheck,
                        format!("field and method with the same name {}", method.name),
                    )
                    .at(file, position),
                );
            }
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_parsed_file_reads_package_clause_and_imports() {
        let parsed = ParsedFile::parse(
            PathBuf::from("/ws/q/q.go"),
            "// Package q\npackage q\n\nimport (\n\tfmtx \"fmt\"\n\t\"example.com/m/p\"\n)\n".to_string(),
        )
        .unwrap();
        assert_eq!(parsed.package_name, "q");
        assert_eq!(parsed.imports.len(), 2);
        assert!(parsed.syntax_errors.is_empty());
        assert_eq!(parsed.tree.root_node().kind(), "source_file");
    }

    #[test]
    fn test_load_groups_packages_by_directory() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "go.mod", "module example.com/m\n\ngo 1.22\n");
        write(temp.path(), "p/p.go", "package p\n\nfunc Add(a, b int) int { return a + b }\n");
        write(
            temp.path(),
            "q/q.go",
            "package q\n\nimport \"example.com/m/p\"\n\nfunc Use() int { return p.Add(1, 2) }\n",
        );
        write(temp.path(), "q/q_test.go", "package q_test\n");
        write(temp.path(), "vendor/x/x.go", "package x\n");

        let ws = Workspace::load(temp.path(), &LoadOptions::default()).unwrap();
        let keys: Vec<&str> = ws.packages.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["example.com/m/p", "example.com/m/q", "example.com/m/q_test"]
        );
        assert_eq!(ws.module_path.as_deref(), Some("example.com/m"));
        assert!(ws.checker_diagnostics().is_empty(), "{:?}", ws.checker_diagnostics());

        let q = ws.package("example.com/m/q").unwrap();
        let file = q.files.values().next().unwrap();
        assert_eq!(file.imports[0].name, "p");
        assert_eq!(ws.file_set.len(), 3);
    }

    #[test]
    fn test_syntax_errors_become_issues() {
        let ws = Workspace::from_sources(
            "/ws",
            None,
            vec![("a/a.go", "package a\n\nfunc Broken( {\n".to_string())],
        );
        assert!(!ws.is_parsable(Path::new("a/a.go")));
        assert!(ws
            .diagnostics
            .iter()
            .any(|i| i.kind == IssueKind::UnparsableFile));
    }

    #[test]
    fn test_duplicate_declarations_and_unused_imports() {
        let ws = Workspace::from_sources(
            "/ws",
            None,
            vec![
                ("a/a.go", "package a\n\nimport \"strings\"\n\nfunc F() {}\n".to_string()),
                ("a/b.go", "package a\n\nvar F = 1\n".to_string()),
            ],
        );
        let messages: Vec<String> = ws
            .checker_diagnostics()
            .into_iter()
            .map(|i| i.message)
            .collect();
        assert!(messages.contains(&"F redeclared in this block".to_string()));
        assert!(messages.contains(&"\"strings\" imported and not used".to_string()));
    }

    #[test]
    fn test_resolve_package_designations() {
        let ws = Workspace::from_sources(
            "/ws",
            Some("example.com/m"),
            vec![
                ("main.go", "package main\n\nfunc main() {}\n".to_string()),
                ("lib/geo/geo.go", "package geo\n".to_string()),
            ],
        );
        assert_eq!(ws.resolve_package("example.com/m/lib/geo").unwrap().name, "geo");
        assert_eq!(ws.resolve_package("geo").unwrap().key, "example.com/m/lib/geo");
        assert_eq!(ws.resolve_package("lib/geo").unwrap().name, "geo");
        assert_eq!(ws.resolve_package(".").unwrap().key, "example.com/m");
        assert!(ws.resolve_package("nope").is_err());
    }
}
