//! Textual changes and refactoring plans.

use super::impact::ImpactReport;
use crate::error::{RefitError, RefitResult};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Classification of a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Replace,
    Insert,
    Delete,
    /// Whole content of a file that does not exist yet
    CreateFile,
}

/// A single textual edit: replace `[start, end)` of `file` with `replacement`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub file: PathBuf,
    pub start: usize,
    pub end: usize,
    pub replacement: String,
    pub description: String,
    pub kind: ChangeKind,
}

impl Change {
    pub fn replace(
        file: impl AsRef<Path>,
        start: usize,
        end: usize,
        replacement: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            file: file.as_ref().to_path_buf(),
            start,
            end,
            replacement: replacement.into(),
            description: description.into(),
            kind: ChangeKind::Replace,
        }
    }

    pub fn insert(
        file: impl AsRef<Path>,
        at: usize,
        text: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            file: file.as_ref().to_path_buf(),
            start: at,
            end: at,
            replacement: text.into(),
            description: description.into(),
            kind: ChangeKind::Insert,
        }
    }

    pub fn delete(
        file: impl AsRef<Path>,
        start: usize,
        end: usize,
        description: impl Into<String>,
    ) -> Self {
        Self {
            file: file.as_ref().to_path_buf(),
            start,
            end,
            replacement: String::new(),
            description: description.into(),
            kind: ChangeKind::Delete,
        }
    }

    pub fn create_file(
        file: impl AsRef<Path>,
        content: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            file: file.as_ref().to_path_buf(),
            start: 0,
            end: 0,
            replacement: content.into(),
            description: description.into(),
            kind: ChangeKind::CreateFile,
        }
    }

    pub fn is_insertion(&self) -> bool {
        self.start == self.end
    }

    /// Whether two changes to the same file touch the same bytes.
    ///
    /// Two insertions never overlap; an insertion overlaps a replacement only
    /// when it falls strictly inside it.
    pub fn overlaps(&self, other: &Change) -> bool {
        if self.file != other.file {
            return false;
        }
        if self.kind == ChangeKind::CreateFile && other.kind == ChangeKind::CreateFile {
            return true;
        }
        match (self.is_insertion(), other.is_insertion()) {
            (true, true) => false,
            (true, false) => other.start < self.start && self.start < other.end,
            (false, true) => self.start < other.start && other.start < self.end,
            (false, false) => self.start < other.end && other.start < self.end,
        }
    }
}

/// Apply changes to one file's content.
///
/// Changes are applied in descending start order. At equal starts, spans are
/// applied before insertions and insertions keep their submission order in the
/// resulting text.
pub fn apply_changes(content: &str, changes: &[&Change]) -> RefitResult<String> {
    check_overlaps(changes)?;

    let mut order: Vec<usize> = (0..changes.len()).collect();
    order.sort_by_key(|&i| {
        let c = changes[i];
        (Reverse(c.start), c.is_insertion(), Reverse(i))
    });

    let mut text = content.to_string();
    for i in order {
        let change = changes[i];
        if change.start > change.end
            || change.end > text.len()
            || !text.is_char_boundary(change.start)
            || !text.is_char_boundary(change.end)
        {
            return Err(RefitError::usage(format!(
                "change '{}' has invalid span {}..{} for {}",
                change.description,
                change.start,
                change.end,
                change.file.display()
            )));
        }
        text.replace_range(change.start..change.end, &change.replacement);
    }
    Ok(text)
}

fn check_overlaps(changes: &[&Change]) -> RefitResult<()> {
    let mut sorted: Vec<&Change> = changes.to_vec();
    sorted.sort_by_key(|c| (c.start, c.end));
    for (i, a) in sorted.iter().enumerate() {
        for b in sorted.iter().skip(i + 1) {
            if b.start >= a.end && !(a.is_insertion() && b.start == a.start) {
                break;
            }
            if a.overlaps(b) {
                return Err(RefitError::Overlap {
                    file: a.file.clone(),
                    first: (a.start, a.end),
                    second: (b.start, b.end),
                });
            }
        }
    }
    Ok(())
}

/// A validated, non-overlapping set of changes plus its impact
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefactoringPlan {
    /// Operation that produced the plan (e.g. "rename_symbol")
    pub operation: String,
    /// Request arguments, echoed for preview and audit
    pub arguments: serde_json::Value,
    pub changes: Vec<Change>,
    pub affected_files: BTreeSet<PathBuf>,
    pub created_files: BTreeSet<PathBuf>,
    pub impact: ImpactReport,
}

impl RefactoringPlan {
    pub fn new(operation: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            operation: operation.into(),
            arguments,
            ..Default::default()
        }
    }

    pub fn push(&mut self, change: Change) {
        if change.kind == ChangeKind::CreateFile {
            self.created_files.insert(change.file.clone());
        }
        self.affected_files.insert(change.file.clone());
        self.changes.push(change);
    }

    pub fn extend(&mut self, changes: impl IntoIterator<Item = Change>) {
        for change in changes {
            self.push(change);
        }
    }

    /// Recompute derived sets after changes were assembled
    pub fn finalize(&mut self) {
        self.affected_files = self.changes.iter().map(|c| c.file.clone()).collect();
        self.created_files = self
            .changes
            .iter()
            .filter(|c| c.kind == ChangeKind::CreateFile)
            .map(|c| c.file.clone())
            .collect();
        self.impact.files_affected = self.affected_files.len();
        self.impact.sort();
    }

    /// Changes grouped per file, in submission order within each file
    pub fn changes_by_file(&self) -> BTreeMap<&Path, Vec<&Change>> {
        let mut grouped: BTreeMap<&Path, Vec<&Change>> = BTreeMap::new();
        for change in &self.changes {
            grouped.entry(change.file.as_path()).or_default().push(change);
        }
        grouped
    }

    /// Reject the plan when two changes in one file overlap
    pub fn check_overlaps(&self) -> RefitResult<()> {
        for changes in self.changes_by_file().values() {
            check_overlaps(changes)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_apply_in_descending_order() {
        let content = "func Add(a, b int) int { return a + b }";
        let a = Change::replace("p.go", 5, 8, "Sum", "rename");
        let b = Change::replace("p.go", 32, 33, "x", "rename param use");
        let result = apply_changes(content, &[&a, &b]).unwrap();
        assert_eq!(result, "func Sum(a, b int) int { return x + b }");
    }

    #[test]
    fn test_insertions_keep_submission_order() {
        let content = "ab";
        let first = Change::insert("f.go", 1, "1", "first");
        let second = Change::insert("f.go", 1, "2", "second");
        let result = apply_changes(content, &[&first, &second]).unwrap();
        assert_eq!(result, "a12b");
    }

    #[test]
    fn test_insertion_before_replacement_at_same_offset() {
        let content = "hello world";
        let replace = Change::replace("f.go", 6, 11, "there", "replace");
        let insert = Change::insert("f.go", 6, "big ", "insert");
        let result = apply_changes(content, &[&replace, &insert]).unwrap();
        assert_eq!(result, "hello big there");
    }

    #[test]
    fn test_overlap_rejected() {
        let a = Change::replace("f.go", 0, 5, "x", "a");
        let b = Change::replace("f.go", 3, 8, "y", "b");
        let err = apply_changes("0123456789", &[&a, &b]).unwrap_err();
        assert!(matches!(err, RefitError::Overlap { .. }));

        let inside = Change::insert("f.go", 2, "z", "inside");
        assert!(a.overlaps(&inside));
        let adjacent = Change::replace("f.go", 5, 6, "q", "adjacent");
        assert!(!a.overlaps(&adjacent));
    }

    #[test]
    fn test_out_of_bounds_is_usage_error() {
        let a = Change::replace("f.go", 3, 30, "x", "too far");
        let err = apply_changes("abc", &[&a]).unwrap_err();
        assert!(matches!(err, RefitError::Usage { .. }));
    }

    #[test]
    fn test_plan_tracks_files() {
        let mut plan = RefactoringPlan::new("move_symbol", serde_json::json!({}));
        plan.push(Change::delete("p/p.go", 10, 20, "remove"));
        plan.push(Change::create_file("r/add.go", "package r\n", "create"));
        plan.push(Change::replace("q/q.go", 1, 2, "r", "qualifier"));
        plan.finalize();

        assert_eq!(plan.affected_files.len(), 3);
        assert_eq!(plan.impact.files_affected, 3);
        assert!(plan.created_files.contains(Path::new("r/add.go")));
        assert_eq!(plan.changes_by_file().len(), 3);
        plan.check_overlaps().unwrap();
    }
}
