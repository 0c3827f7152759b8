//! Unified diff previews of rendered plans

use crate::serializer::Rendered;
use std::path::Path;

const CONTEXT: usize = 3;

/// Largest middle section diffed line-by-line; bigger rewrites become one hunk
const MAX_LCS_CELLS: usize = 4_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Keep,
    Remove,
    Add,
}

/// Line operations turning `old` into `new`
fn line_ops(old: &[&str], new: &[&str]) -> Vec<(Op, usize, usize)> {
    let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    let old_mid = &old[prefix..old.len() - suffix];
    let new_mid = &new[prefix..new.len() - suffix];

    let mut ops: Vec<(Op, usize, usize)> = (0..prefix).map(|i| (Op::Keep, i, i)).collect();
    if old_mid.len() * new_mid.len() <= MAX_LCS_CELLS {
        // lcs[i][j]: common lines of old_mid[i..] and new_mid[j..]
        let (n, m) = (old_mid.len(), new_mid.len());
        let mut lcs = vec![vec![0u32; m + 1]; n + 1];
        for i in (0..n).rev() {
            for j in (0..m).rev() {
                lcs[i][j] = if old_mid[i] == new_mid[j] {
                    lcs[i + 1][j + 1] + 1
                } else {
                    lcs[i + 1][j].max(lcs[i][j + 1])
                };
            }
        }
        let (mut i, mut j) = (0, 0);
        while i < n || j < m {
            if i < n && j < m && old_mid[i] == new_mid[j] {
                ops.push((Op::Keep, prefix + i, prefix + j));
                i += 1;
                j += 1;
            } else if i < n && (j == m || lcs[i + 1][j] >= lcs[i][j + 1]) {
                ops.push((Op::Remove, prefix + i, prefix + j));
                i += 1;
            } else {
                ops.push((Op::Add, prefix + i, prefix + j));
                j += 1;
            }
        }
    } else {
        ops.extend((0..old_mid.len()).map(|i| (Op::Remove, prefix + i, prefix)));
        ops.extend((0..new_mid.len()).map(|j| (Op::Add, old.len() - suffix, prefix + j)));
    }
    ops.extend((0..suffix).map(|k| (Op::Keep, old.len() - suffix + k, new.len() - suffix + k)));
    ops
}

/// Unified diff between two versions of one file
///
/// ```text
/// --- a/p/p.go
/// +++ b/p/p.go
/// @@ -3,1 +3,1 @@
/// -func Add() {}
/// +func Sum() {}
/// ```
pub fn unified_diff(path: &Path, old: &str, new: &str) -> String {
    if old == new {
        return String::new();
    }
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();
    let ops = line_ops(&old_lines, &new_lines);

    let mut diff = String::new();
    let from = if old.is_empty() {
        "/dev/null".to_string()
    } else {
        format!("a/{}", path.display())
    };
    diff.push_str(&format!("--- {}\n+++ b/{}\n", from, path.display()));

    let changed: Vec<usize> = ops
        .iter()
        .enumerate()
        .filter(|(_, (op, _, _))| *op != Op::Keep)
        .map(|(k, _)| k)
        .collect();
    let mut k = 0;
    while k < changed.len() {
        // Grow the hunk while the gap to the next change fits in shared context
        let start = changed[k].saturating_sub(CONTEXT);
        let mut last = changed[k];
        while k + 1 < changed.len() && changed[k + 1] - last <= 2 * CONTEXT {
            k += 1;
            last = changed[k];
        }
        let end = (last + CONTEXT + 1).min(ops.len());
        let hunk = &ops[start..end];

        let old_count = hunk.iter().filter(|(op, _, _)| *op != Op::Add).count();
        let new_count = hunk.iter().filter(|(op, _, _)| *op != Op::Remove).count();
        let (_, old_start, new_start) = hunk[0];
        diff.push_str(&format!(
            "@@ -{},{} +{},{} @@\n",
            if old_count == 0 { old_start } else { old_start + 1 },
            old_count,
            if new_count == 0 { new_start } else { new_start + 1 },
            new_count
        ));
        for (op, i, j) in hunk {
            match op {
                Op::Keep => diff.push_str(&format!(" {}\n", old_lines[*i])),
                Op::Remove => diff.push_str(&format!("-{}\n", old_lines[*i])),
                Op::Add => diff.push_str(&format!("+{}\n", new_lines[*j])),
            }
        }
        k += 1;
    }
    diff
}

/// Diff of every rendered file, paths shown relative to `root`
pub fn render_preview(root: &Path, rendered: &[Rendered]) -> String {
    rendered
        .iter()
        .map(|file| {
            let shown = file.path.strip_prefix(root).unwrap_or(&file.path);
            unified_diff(shown, &file.original, &file.content)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_line_change_with_context() {
        let old = "package p\n\nimport \"fmt\"\n\nfunc Add() {}\n\nfunc main() { fmt.Println() }\n";
        let new = old.replace("func Add()", "func Sum()");
        assert_eq!(
            unified_diff(Path::new("p/p.go"), old, &new),
            "--- a/p/p.go\n+++ b/p/p.go\n@@ -2,6 +2,6 @@\n \n import \"fmt\"\n \n-func Add() {}\n+func Sum() {}\n \n func main() { fmt.Println() }\n"
        );
    }

    #[test]
    fn test_distant_changes_make_separate_hunks() {
        let old: String = (1..=20).map(|i| format!("line {}\n", i)).collect();
        let new = old.replace("line 2\n", "two\n").replace("line 18\n", "eighteen\n");
        let diff = unified_diff(Path::new("f.go"), &old, &new);
        assert_eq!(diff.matches("@@ -").count(), 2);
        assert!(diff.contains("@@ -1,5 +1,5 @@\n line 1\n-line 2\n+two\n"));
        assert!(diff.contains("-line 18\n+eighteen\n"));
    }

    #[test]
    fn test_created_file_diffs_from_dev_null() {
        let diff = unified_diff(Path::new("q/q.go"), "", "package q\n\nvar X = 1\n");
        assert_eq!(
            diff,
            "--- /dev/null\n+++ b/q/q.go\n@@ -0,0 +1,3 @@\n+package q\n+\n+var X = 1\n"
        );
    }

    #[test]
    fn test_identical_content_has_no_diff() {
        assert_eq!(unified_diff(Path::new("f.go"), "a\n", "a\n"), "");
    }
}
