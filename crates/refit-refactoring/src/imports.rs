//! Import declaration edits for one file.

use refit_ast::syntax::{line_end, line_start};
use refit_foundation::Change;
use refit_workspace::{ImportSpec, SourceFile};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

/// An import spec to add: path plus optional alias
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct NewImport {
    pub path: String,
    pub alias: Option<String>,
}

impl NewImport {
    fn spec(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{} \"{}\"", alias, self.path),
            None => format!("\"{}\"", self.path),
        }
    }
}

/// `import "x"` or a grouped block for several specs, with trailing newline
pub(crate) fn render_block(imports: &[NewImport]) -> String {
    match imports {
        [] => String::new(),
        [single] => format!("import {}\n", single.spec()),
        many => {
            let mut out = String::from("import (\n");
            for import in many {
                out.push_str(&format!("\t{}\n", import.spec()));
            }
            out.push_str(")\n");
            out
        }
    }
}

fn is_grouped(file: &SourceFile, decl: &Range<usize>) -> bool {
    file.text(decl.clone())
        .trim_start_matches("import")
        .trim_start()
        .starts_with('(')
}

/// Whole-line span of a removed declaration, plus one blank line after it
fn decl_removal(content: &str, decl: &Range<usize>) -> Range<usize> {
    let start = line_start(content, decl.start);
    let end = line_end(content, decl.end);
    if content[end..].starts_with('\n') {
        start..end + 1
    } else {
        start..end
    }
}

fn spec_removal(content: &str, spec: &ImportSpec) -> Range<usize> {
    let start = line_start(content, spec.span.start);
    let end = line_end(content, spec.span.end);
    let alone = content[start..end].trim() == content[spec.span.clone()].trim();
    if alone {
        start..end
    } else {
        spec.span.clone()
    }
}

/// Changes that remove the imports at `removed` (indices into `file.imports`)
/// and add `added`, keeping the file's existing declaration layout.
pub(crate) fn import_changes(
    file: &SourceFile,
    removed: &BTreeSet<usize>,
    added: &[NewImport],
) -> Vec<Change> {
    let content = &file.content;
    let mut changes = Vec::new();

    let mut decls: BTreeMap<usize, (Range<usize>, Vec<usize>)> = BTreeMap::new();
    for (index, import) in file.imports.iter().enumerate() {
        decls
            .entry(import.decl_span.start)
            .or_insert_with(|| (import.decl_span.clone(), Vec::new()))
            .1
            .push(index);
    }

    let mut surviving_group: Option<Range<usize>> = None;
    let mut surviving_single: Option<Range<usize>> = None;
    let mut removed_decls: Vec<Range<usize>> = Vec::new();

    for (decl, specs) in decls.values() {
        let gone: Vec<usize> = specs.iter().copied().filter(|i| removed.contains(i)).collect();
        if gone.len() == specs.len() {
            removed_decls.push(decl.clone());
            continue;
        }
        for index in gone {
            let span = spec_removal(content, &file.imports[index]);
            changes.push(Change::delete(
                &file.path,
                span.start,
                span.end,
                format!("Remove unused import \"{}\"", file.imports[index].path),
            ));
        }
        if is_grouped(file, decl) {
            surviving_group.get_or_insert_with(|| decl.clone());
        } else {
            surviving_single = Some(decl.clone());
        }
    }

    let mut added: Vec<NewImport> = added.to_vec();
    added.sort();
    added.dedup();
    let description = |imports: &[NewImport]| {
        let paths: Vec<&str> = imports.iter().map(|i| i.path.as_str()).collect();
        format!("Import {}", paths.join(", "))
    };

    let mut replaced_first_removed = false;
    if !added.is_empty() {
        if let Some(group) = surviving_group {
            let close = group.end.saturating_sub(1);
            let close_line = line_start(content, close);
            let specs: String = added.iter().map(|i| format!("\t{}\n", i.spec())).collect();
            if content[close_line..close].trim().is_empty() {
                changes.push(Change::insert(&file.path, close_line, specs, description(&added)));
            } else {
                changes.push(Change::insert(
                    &file.path,
                    close,
                    format!("\n{}", specs),
                    description(&added),
                ));
            }
        } else if let Some(single) = surviving_single {
            let at = line_end(content, single.end);
            let text: String = added.iter().map(|i| format!("import {}\n", i.spec())).collect();
            changes.push(Change::insert(&file.path, at, text, description(&added)));
        } else if let Some(first) = removed_decls.first() {
            let start = line_start(content, first.start);
            let end = line_end(content, first.end);
            changes.push(Change::replace(
                &file.path,
                start,
                end,
                render_block(&added),
                description(&added),
            ));
            replaced_first_removed = true;
        } else {
            changes.push(Change::insert(
                &file.path,
                file.package_clause_end(),
                format!("\n{}", render_block(&added)),
                description(&added),
            ));
        }
    }

    for (i, decl) in removed_decls.iter().enumerate() {
        if i == 0 && replaced_first_removed {
            continue;
        }
        let span = decl_removal(content, decl);
        changes.push(Change::delete(
            &file.path,
            span.start,
            span.end,
            "Remove unused import declaration",
        ));
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::tests::workspace;
    use pretty_assertions::assert_eq;
    use refit_foundation::apply_changes;
    use std::path::Path;

    fn apply(file: &SourceFile, changes: &[Change]) -> String {
        let refs: Vec<&Change> = changes.iter().collect();
        apply_changes(&file.content, &refs).unwrap()
    }

    fn import(path: &str) -> NewImport {
        NewImport {
            path: path.to_string(),
            alias: None,
        }
    }

    #[test]
    fn test_add_to_group_and_remove_spec() {
        let ws = workspace(&[(
            "a/a.go",
            "package a\n\nimport (\n\t\"fmt\"\n\t\"strings\"\n)\n\nfunc F() { fmt.Println(strings.ToUpper(\"x\")) }\n",
        )]);
        let file = ws.file(Path::new("a/a.go")).unwrap();
        let changes = import_changes(file, &BTreeSet::from([1]), &[import("os")]);
        assert_eq!(
            apply(file, &changes),
            "package a\n\nimport (\n\t\"fmt\"\n\t\"os\"\n)\n\nfunc F() { fmt.Println(strings.ToUpper(\"x\")) }\n"
        );
    }

    #[test]
    fn test_replace_removed_single_import() {
        let ws = workspace(&[(
            "a/a.go",
            "package a\n\nimport \"fmt\"\n\nfunc F() {}\n",
        )]);
        let file = ws.file(Path::new("a/a.go")).unwrap();
        let changes = import_changes(
            file,
            &BTreeSet::from([0]),
            &[NewImport {
                path: "example.com/m/r".to_string(),
                alias: None,
            }],
        );
        assert_eq!(
            apply(file, &changes),
            "package a\n\nimport \"example.com/m/r\"\n\nfunc F() {}\n"
        );

        let removed_only = import_changes(file, &BTreeSet::from([0]), &[]);
        assert_eq!(apply(file, &removed_only), "package a\n\nfunc F() {}\n");
    }

    #[test]
    fn test_new_block_after_package_clause() {
        let ws = workspace(&[("a/a.go", "package a\n\nfunc F() {}\n")]);
        let file = ws.file(Path::new("a/a.go")).unwrap();
        let changes = import_changes(file, &BTreeSet::new(), &[import("os"), import("fmt")]);
        assert_eq!(
            apply(file, &changes),
            "package a\n\nimport (\n\t\"fmt\"\n\t\"os\"\n)\n\nfunc F() {}\n"
        );
    }
}
