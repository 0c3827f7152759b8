//! Position mapping: byte offsets, 1-based line/column, and LSP UTF-16 positions.
//!
//! Every conversion goes through a per-file table of line start offsets.

use refit_foundation::Position;
use std::path::{Path, PathBuf};

/// Line start offsets for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            text.bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self {
            line_starts,
            len: text.len(),
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 1-based line and byte column of `offset`
    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.len);
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        Position::new(
            (line + 1) as u32,
            (offset - self.line_starts[line] + 1) as u32,
        )
    }

    /// 0-based line of `offset`
    pub fn line_of(&self, offset: usize) -> usize {
        self.position(offset).line as usize - 1
    }

    /// Byte offset of the first byte on a 1-based line
    pub fn line_start(&self, line: u32) -> Option<usize> {
        if line == 0 {
            return None;
        }
        self.line_starts.get(line as usize - 1).copied()
    }

    /// Byte offset just past the last byte of a 1-based line, newline included
    pub fn line_end(&self, line: u32) -> Option<usize> {
        if line == 0 || line as usize > self.line_starts.len() {
            return None;
        }
        Some(
            self.line_starts
                .get(line as usize)
                .copied()
                .unwrap_or(self.len),
        )
    }

    /// Byte offset of a 1-based line and byte column
    pub fn offset(&self, line: u32, column: u32) -> Option<usize> {
        let start = self.line_start(line)?;
        let end = self.line_end(line)?;
        let offset = start + column.checked_sub(1)? as usize;
        (offset <= end).then_some(offset)
    }

    /// LSP position (0-based line, UTF-16 code unit column) of `offset`
    pub fn to_utf16(&self, text: &str, offset: usize) -> (u32, u32) {
        let offset = offset.min(self.len);
        let line = self.line_of(offset);
        let start = self.line_starts[line];
        let column: usize = text
            .get(start..offset)
            .map(|s| s.chars().map(char::len_utf16).sum())
            .unwrap_or(0);
        (line as u32, column as u32)
    }

    /// Byte offset of an LSP position; columns past the line end clamp to it
    pub fn from_utf16(&self, text: &str, line: u32, character: u32) -> Option<usize> {
        let start = *self.line_starts.get(line as usize)?;
        let end = self
            .line_starts
            .get(line as usize + 1)
            .map(|next| next - 1)
            .unwrap_or(self.len);
        let line_text = text.get(start..end)?;

        let mut units = 0u32;
        for (i, ch) in line_text.char_indices() {
            if units >= character {
                return Some(start + i);
            }
            units += ch.len_utf16() as u32;
        }
        Some(end)
    }
}

#[derive(Debug, Clone)]
struct FileEntry {
    path: PathBuf,
    base: usize,
    len: usize,
}

/// Shared position space over all files of a workspace.
///
/// Each file occupies `[base, base + len]`; bases are separated by one so
/// that end-of-file positions stay unambiguous.
#[derive(Debug, Clone, Default)]
pub struct FileSet {
    files: Vec<FileEntry>,
    next_base: usize,
}

impl FileSet {
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            next_base: 1,
        }
    }

    /// Register a file and return its base
    pub fn add(&mut self, path: impl AsRef<Path>, len: usize) -> usize {
        if self.next_base == 0 {
            self.next_base = 1;
        }
        let base = self.next_base;
        self.files.push(FileEntry {
            path: path.as_ref().to_path_buf(),
            base,
            len,
        });
        self.next_base = base + len + 1;
        base
    }

    pub fn base(&self, path: &Path) -> Option<usize> {
        self.files.iter().find(|f| f.path == path).map(|f| f.base)
    }

    /// Global position of a byte offset in a file
    pub fn global(&self, path: &Path, offset: usize) -> Option<usize> {
        self.files
            .iter()
            .find(|f| f.path == path && offset <= f.len)
            .map(|f| f.base + offset)
    }

    /// File and byte offset of a global position
    pub fn resolve(&self, pos: usize) -> Option<(&Path, usize)> {
        let index = self.files.partition_point(|f| f.base <= pos);
        let entry = self.files.get(index.checked_sub(1)?)?;
        let offset = pos - entry.base;
        (offset <= entry.len).then_some((entry.path.as_path(), offset))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
