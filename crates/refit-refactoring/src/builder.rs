//! Builder for refactoring plans.
//!
//! Operations push raw changes through a [`PlanBuilder`] and ask it for
//! import names instead of editing import declarations themselves. When the
//! operation is done, [`PlanBuilder::finish`]:
//!
//! - renders files the plan creates,
//! - drops imports whose every use was rewritten away,
//! - merges added imports into each file's existing declarations,
//! - rejects edits to unparsable files and new import cycles,
//! - finalizes the plan and checks that no two changes overlap.
//!
//! # Example
//! ```rust,ignore
//! let mut builder = PlanBuilder::new(ws, "move_symbol", request.to_json());
//! let name = builder.ensure_import(&use_site, "example.com/m/r");
//! builder.replace(&use_site, span, format!("{}.Add", name), "Qualify moved symbol");
//! let plan = builder.finish()?;
//! ```

use crate::imports::{import_changes, render_block, NewImport};
use refit_foundation::{
    Change, ChangeKind, Issue, IssueKind, RefactoringPlan, RefitError, RefitResult,
};
use refit_workspace::types::default_import_name;
use refit_workspace::{ImportGraph, SourceFile, Target, Workspace};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A file the plan creates
#[derive(Debug, Clone)]
struct NewFile {
    package: String,
    package_name: String,
    imports: BTreeMap<String, NewImport>,
    bodies: Vec<String>,
}

impl NewFile {
    fn import_name(import: &NewImport, package_names: &BTreeMap<String, String>) -> String {
        import
            .alias
            .clone()
            .unwrap_or_else(|| default_import_name(&import.path, package_names))
    }

    fn render(&self) -> String {
        let mut out = format!("package {}\n\n", self.package_name);
        let imports: Vec<NewImport> = self.imports.values().cloned().collect();
        if !imports.is_empty() {
            out.push_str(&render_block(&imports));
            out.push('\n');
        }
        out.push_str(&self.bodies.join("\n"));
        out
    }
}

pub struct PlanBuilder<'w> {
    ws: &'w Workspace,
    plan: RefactoringPlan,
    seen: HashSet<(PathBuf, usize, usize, String)>,
    added_imports: BTreeMap<PathBuf, BTreeMap<String, NewImport>>,
    new_files: BTreeMap<PathBuf, NewFile>,
}

impl<'w> PlanBuilder<'w> {
    pub fn new(ws: &'w Workspace, operation: &str, arguments: serde_json::Value) -> Self {
        Self {
            ws,
            plan: RefactoringPlan::new(operation, arguments),
            seen: HashSet::new(),
            added_imports: BTreeMap::new(),
            new_files: BTreeMap::new(),
        }
    }

    pub fn workspace(&self) -> &'w Workspace {
        self.ws
    }

    /// Add a change; exact duplicates are dropped
    pub fn push(&mut self, mut change: Change) {
        change.file = self.ws.absolute(&change.file);
        let key = (
            change.file.clone(),
            change.start,
            change.end,
            change.replacement.clone(),
        );
        if self.seen.insert(key) {
            self.plan.push(change);
        }
    }

    pub fn replace(
        &mut self,
        file: &Path,
        span: Range<usize>,
        text: impl Into<String>,
        description: impl Into<String>,
    ) {
        self.push(Change::replace(file, span.start, span.end, text, description));
    }

    pub fn insert(
        &mut self,
        file: &Path,
        at: usize,
        text: impl Into<String>,
        description: impl Into<String>,
    ) {
        self.push(Change::insert(file, at, text, description));
    }

    pub fn delete(&mut self, file: &Path, span: Range<usize>, description: impl Into<String>) {
        self.push(Change::delete(file, span.start, span.end, description));
    }

    pub fn changes(&self) -> &[Change] {
        &self.plan.changes
    }

    /// Whether some replacement or deletion in `file` covers `span`
    pub fn covers(&self, file: &Path, span: &Range<usize>) -> bool {
        let file = self.ws.absolute(file);
        self.plan.changes.iter().any(|c| {
            c.file == file && !c.is_insertion() && c.start <= span.start && span.end <= c.end
        })
    }

    pub fn issue(&mut self, issue: Issue) {
        self.plan.impact.push(issue);
    }

    pub fn issues(&mut self, issues: impl IntoIterator<Item = Issue>) {
        self.plan.impact.extend(issues);
    }

    pub fn count_references(&mut self, count: usize) {
        self.plan.impact.references += count;
    }

    pub fn count_breaking_callers(&mut self, count: usize) {
        self.plan.impact.breaking_callers += count;
    }

    /// Register a file the plan creates in `package`
    pub fn create_file(&mut self, path: &Path, package: &str, package_name: &str) {
        let path = self.ws.absolute(path);
        self.new_files.entry(path).or_insert_with(|| NewFile {
            package: package.to_string(),
            package_name: package_name.to_string(),
            imports: BTreeMap::new(),
            bodies: Vec::new(),
        });
    }

    /// Append a declaration to a created file
    pub fn append_to_new_file(&mut self, path: &Path, text: impl Into<String>) {
        let path = self.ws.absolute(path);
        if let Some(file) = self.new_files.get_mut(&path) {
            file.bodies.push(text.into());
        }
    }

    pub fn is_new_file(&self, path: &Path) -> bool {
        self.new_files.contains_key(&self.ws.absolute(path))
    }

    /// Package key of a created file
    pub fn new_file_package(&self, path: &Path) -> Option<&str> {
        self.new_files
            .get(&self.ws.absolute(path))
            .map(|f| f.package.as_str())
    }

    /// Packages the plan creates files in that the workspace does not know
    pub fn new_packages(&self) -> BTreeSet<String> {
        self.new_files
            .values()
            .filter(|f| self.ws.package(&f.package).is_none())
            .map(|f| f.package.clone())
            .collect()
    }

    /// Name under which `file` refers to package `path`, importing it when needed.
    ///
    /// Existing imports are reused. A new import takes the package's default
    /// name, or a numbered alias when that name is already taken in the file.
    pub fn ensure_import(&mut self, file: &Path, path: &str) -> String {
        let ws = self.ws;
        let file_path = ws.absolute(file);
        let package_names = &ws.package_names;

        if let Some(new_file) = self.new_files.get_mut(&file_path) {
            if let Some(existing) = new_file.imports.get(path) {
                return NewFile::import_name(existing, package_names);
            }
            let taken: BTreeSet<String> = new_file
                .imports
                .values()
                .map(|i| NewFile::import_name(i, package_names))
                .collect();
            let index = ws.index(&new_file.package);
            let default = default_import_name(path, package_names);
            let name = crate::naming::fresh_name(&default, |n| {
                taken.contains(n) || index.map(|i| i.package_level(n).is_some()).unwrap_or(false)
            });
            new_file.imports.insert(
                path.to_string(),
                NewImport {
                    path: path.to_string(),
                    alias: (name != default).then(|| name.clone()),
                },
            );
            return name;
        }

        let Some(source) = ws.file(&file_path) else {
            return default_import_name(path, package_names);
        };
        if let Some(import) = source.import_of(path) {
            return import.name.clone();
        }
        let added = self.added_imports.entry(file_path).or_default();
        if let Some(import) = added.get(path) {
            return import
                .alias
                .clone()
                .unwrap_or_else(|| default_import_name(path, package_names));
        }
        let taken: BTreeSet<String> = source
            .imports
            .iter()
            .map(|i| i.name.clone())
            .chain(
                added
                    .values()
                    .map(|i| NewFile::import_name(i, package_names)),
            )
            .collect();
        let index = ws.index(&source.package);
        let default = default_import_name(path, package_names);
        let name = crate::naming::fresh_name(&default, |n| {
            taken.contains(n) || index.map(|i| i.package_level(n).is_some()).unwrap_or(false)
        });
        added.insert(
            path.to_string(),
            NewImport {
                path: path.to_string(),
                alias: (name != default).then(|| name.clone()),
            },
        );
        name
    }

    /// Imports of `file` whose every use sits inside a rewritten span
    fn orphaned_imports(&self, file: &SourceFile) -> BTreeSet<usize> {
        let changes: Vec<&Change> = self
            .plan
            .changes
            .iter()
            .filter(|c| c.file == file.path)
            .collect();
        if changes.iter().all(|c| c.is_insertion()) {
            return BTreeSet::new();
        }
        let mut orphaned = BTreeSet::new();
        for (index, import) in file.imports.iter().enumerate() {
            if import.is_blank() || import.is_dot() {
                continue;
            }
            let uses: Vec<&Range<usize>> = file
                .info
                .uses
                .iter()
                .filter(|u| u.target == Target::Import(index))
                .map(|u| &u.span)
                .collect();
            if uses.is_empty() {
                continue;
            }
            let all_rewritten = uses.iter().all(|span| {
                changes
                    .iter()
                    .any(|c| !c.is_insertion() && c.start <= span.start && span.end <= c.end)
            });
            let reintroduced = changes
                .iter()
                .any(|c| mentions_qualifier(&c.replacement, &import.name));
            if all_rewritten && !reintroduced {
                orphaned.insert(index);
            }
        }
        orphaned
    }

    fn final_import_graph(&self, removed: &BTreeMap<PathBuf, BTreeSet<usize>>) -> ImportGraph {
        let new_packages = self.new_packages();
        let known = |path: &str| self.ws.package(path).is_some() || new_packages.contains(path);
        let mut graph = ImportGraph::new();
        for package in self.ws.packages.values() {
            graph.add_package(&package.key);
            for file in package.files.values() {
                let dropped = removed.get(&file.path);
                for (index, import) in file.imports.iter().enumerate() {
                    if dropped.map(|d| d.contains(&index)).unwrap_or(false) {
                        continue;
                    }
                    if known(&import.path) {
                        graph.add_edge(&package.key, &import.path);
                    }
                }
                for import in self.added_imports.get(&file.path).into_iter().flat_map(|m| m.keys()) {
                    if known(import) {
                        graph.add_edge(&package.key, import);
                    }
                }
            }
        }
        for file in self.new_files.values() {
            graph.add_package(&file.package);
            for import in file.imports.keys() {
                if known(import) {
                    graph.add_edge(&file.package, import);
                }
            }
        }
        graph
    }

    /// Render created files, synthesise import edits, run plan-wide checks
    pub fn finish(mut self) -> RefitResult<RefactoringPlan> {
        for (path, file) in &self.new_files {
            if self.ws.file(path).is_some() || path.exists() {
                return Err(RefitError::usage(format!(
                    "cannot create {}: file already exists",
                    self.ws.relative(path).display()
                )));
            }
            let change = Change::create_file(
                path,
                file.render(),
                format!("Create {}", self.ws.relative(path).display()),
            );
            self.plan.push(change);
        }

        let edited: BTreeSet<PathBuf> = self
            .plan
            .changes
            .iter()
            .filter(|c| c.kind != ChangeKind::CreateFile)
            .map(|c| c.file.clone())
            .chain(self.added_imports.keys().cloned())
            .collect();

        let mut removed: BTreeMap<PathBuf, BTreeSet<usize>> = BTreeMap::new();
        let mut import_edits = Vec::new();
        for path in &edited {
            let Some(file) = self.ws.file(path) else {
                continue;
            };
            let orphaned = self.orphaned_imports(file);
            let added: Vec<NewImport> = self
                .added_imports
                .get(path)
                .map(|m| m.values().cloned().collect())
                .unwrap_or_default();
            if orphaned.is_empty() && added.is_empty() {
                continue;
            }
            debug!(
                file = %self.ws.relative(path).display(),
                removed = orphaned.len(),
                added = added.len(),
                "Synthesised import edits"
            );
            import_edits.extend(import_changes(file, &orphaned, &added));
            removed.insert(path.clone(), orphaned);
        }
        for change in import_edits {
            self.push(change);
        }

        for path in &edited {
            if let Some(file) = self.ws.file(path) {
                if !file.is_parsable() {
                    self.plan.impact.push(
                        Issue::error(
                            IssueKind::UnparsableFile,
                            "file has syntax errors and cannot be edited",
                        )
                        .in_file(self.ws.relative(path)),
                    );
                }
            }
        }

        let before = self.ws.import_graph().cycles();
        for cycle in self.final_import_graph(&removed).cycles() {
            if !before.contains(&cycle) {
                let mut path = cycle.clone();
                if let Some(first) = cycle.first() {
                    path.push(first.clone());
                }
                self.plan.impact.push(Issue::error(
                    IssueKind::ImportCycle,
                    format!("import cycle: {}", path.join(" -> ")),
                ));
            }
        }

        self.plan.finalize();
        self.plan.check_overlaps()?;
        Ok(self.plan)
    }
}

/// Whether `text` spells `name.` with `name` starting at an identifier boundary
fn mentions_qualifier(text: &str, name: &str) -> bool {
    let needle = format!("{}.", name);
    text.match_indices(&needle).any(|(at, _)| {
        text[..at]
            .chars()
            .next_back()
            .map(|c| !(c.is_alphanumeric() || c == '_' || c == '.'))
            .unwrap_or(true)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::tests::{apply_plan, workspace};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_orphaned_import_replaced_by_new_one() {
        let ws = workspace(&[
            ("p/p.go", "package p\n\nfunc Add(a, b int) int { return a + b }\n"),
            (
                "q/q.go",
                "package q\n\nimport \"example.com/m/p\"\n\nfunc Use() int { return p.Add(1, 2) }\n",
            ),
        ]);
        let q = Path::new("/ws/q/q.go");
        let mut builder = PlanBuilder::new(&ws, "test", serde_json::json!({}));
        let name = builder.ensure_import(q, "example.com/m/r");
        assert_eq!(name, "r");
        let content = &ws.file(q).unwrap().content;
        let at = content.find("p.Add").unwrap();
        builder.replace(q, at..at + 5, "r.Add", "requalify");
        let plan = builder.finish().unwrap();

        let files = apply_plan(&ws, &plan);
        assert_eq!(
            files[q],
            "package q\n\nimport \"example.com/m/r\"\n\nfunc Use() int { return r.Add(1, 2) }\n"
        );
    }

    #[test]
    fn test_conflicting_import_name_gets_alias() {
        let ws = workspace(&[(
            "a/a.go",
            "package a\n\nimport \"example.com/m/x/util\"\n\nfunc F() { util.Do() }\n",
        )]);
        let a = Path::new("/ws/a/a.go");
        let mut builder = PlanBuilder::new(&ws, "test", serde_json::json!({}));
        assert_eq!(builder.ensure_import(a, "example.com/m/x/util"), "util");
        assert_eq!(builder.ensure_import(a, "example.com/m/y/util"), "util2");
        assert_eq!(builder.ensure_import(a, "example.com/m/y/util"), "util2");
        let plan = builder.finish().unwrap();
        let files = apply_plan(&ws, &plan);
        assert!(files[a].contains("import util2 \"example.com/m/y/util\"\n"));
    }

    #[test]
    fn test_new_cycle_is_reported() {
        let ws = workspace(&[
            ("a/a.go", "package a\n\nimport \"example.com/m/b\"\n\nvar X = b.Y\n"),
            ("b/b.go", "package b\n\nvar Y = 1\n"),
        ]);
        let mut builder = PlanBuilder::new(&ws, "test", serde_json::json!({}));
        let b = Path::new("/ws/b/b.go");
        let name = builder.ensure_import(b, "example.com/m/a");
        builder.insert(b, ws.file(b).unwrap().content.len(), format!("\nvar Z = {}.X\n", name), "use a");
        let plan = builder.finish().unwrap();
        let cycles: Vec<&Issue> = plan
            .impact
            .issues
            .iter()
            .filter(|i| i.kind == IssueKind::ImportCycle)
            .collect();
        assert_eq!(cycles.len(), 1);
        assert_eq!(
            cycles[0].message,
            "import cycle: example.com/m/a -> example.com/m/b -> example.com/m/a"
        );
    }

    #[test]
    fn test_created_file_rendering() {
        let ws = workspace(&[("p/p.go", "package p\n")]);
        let mut builder = PlanBuilder::new(&ws, "test", serde_json::json!({}));
        let path = Path::new("/ws/r/add.go");
        builder.create_file(path, "example.com/m/r", "r");
        let fmt = builder.ensure_import(path, "fmt");
        builder.append_to_new_file(path, format!("func Hi() {{ {}.Println() }}\n", fmt));
        let plan = builder.finish().unwrap();
        assert_eq!(plan.created_files.len(), 1);
        assert_eq!(
            plan.changes[0].replacement,
            "package r\n\nimport \"fmt\"\n\nfunc Hi() { fmt.Println() }\n"
        );
    }

    #[test]
    fn test_qualifier_mentions() {
        assert!(mentions_qualifier("r.Add(1)", "r"));
        assert!(mentions_qualifier("x + (r.Add)", "r"));
        assert!(!mentions_qualifier("bar.Add", "r"));
        assert!(!mentions_qualifier("s.r.Add", "r"));
    }
}
