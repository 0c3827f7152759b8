//! Conversions between editor coordinates and workspace byte offsets
//!
//! LSP positions are 0-based lines with UTF-16 code unit columns. Every
//! conversion goes through the file's line index.

use refit_foundation::{ChangeKind, RefactoringPlan, RefitError, RefitResult};
use refit_workspace::{SourceFile, Workspace};
use std::collections::{BTreeMap, HashMap};
use std::ops;
use std::path::{Path, PathBuf};
use tower_lsp::jsonrpc;
use tower_lsp::lsp_types::{
    CreateFile, DocumentChangeOperation, DocumentChanges, Location, OneOf,
    OptionalVersionedTextDocumentIdentifier, Position, Range, ResourceOp, TextDocumentEdit,
    TextEdit, Url, WorkspaceEdit,
};

/// Filesystem path of a `file://` URI, canonicalized when it exists
pub fn path_of(uri: &Url) -> Option<PathBuf> {
    let path = uri.to_file_path().ok()?;
    Some(std::fs::canonicalize(&path).unwrap_or(path))
}

pub fn uri_of(path: &Path) -> RefitResult<Url> {
    Url::from_file_path(path)
        .map_err(|_| RefitError::usage(format!("not an absolute path: {}", path.display())))
}

pub fn offset_of(file: &SourceFile, position: Position) -> Option<usize> {
    file.lines
        .from_utf16(&file.content, position.line, position.character)
}

pub fn lsp_position(file: &SourceFile, offset: usize) -> Position {
    let (line, character) = file.lines.to_utf16(&file.content, offset);
    Position::new(line, character)
}

pub fn lsp_range(file: &SourceFile, span: &ops::Range<usize>) -> Range {
    Range::new(lsp_position(file, span.start), lsp_position(file, span.end))
}

pub fn location(ws: &Workspace, path: &Path, span: &ops::Range<usize>) -> Option<Location> {
    let file = ws.file(path)?;
    let uri = uri_of(&file.path).ok()?;
    Some(Location::new(uri, lsp_range(file, span)))
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Byte span of the identifier touching `offset`
pub fn identifier_at(content: &str, offset: usize) -> Option<ops::Range<usize>> {
    let offset = offset.min(content.len());
    if !content.is_char_boundary(offset) {
        return None;
    }
    let start = content[..offset]
        .char_indices()
        .rev()
        .take_while(|(_, c)| is_identifier_char(*c))
        .last()
        .map(|(i, _)| i)
        .unwrap_or(offset);
    let end = content[offset..]
        .char_indices()
        .find(|(_, c)| !is_identifier_char(*c))
        .map(|(i, _)| offset + i)
        .unwrap_or(content.len());
    (start < end).then_some(start..end)
}

/// Express a plan as an LSP workspace edit against the snapshot it was built on
///
/// Plans that only touch existing files become a plain `changes` map; plans
/// creating files need `documentChanges` so the create precedes its content.
pub fn workspace_edit(ws: &Workspace, plan: &RefactoringPlan) -> RefitResult<WorkspaceEdit> {
    let mut edits: BTreeMap<PathBuf, Vec<TextEdit>> = BTreeMap::new();
    let mut created: Vec<(PathBuf, String)> = Vec::new();
    for change in &plan.changes {
        if change.kind == ChangeKind::CreateFile {
            created.push((change.file.clone(), change.replacement.clone()));
            continue;
        }
        let file = ws.require_file(&change.file)?;
        edits.entry(file.path.clone()).or_default().push(TextEdit::new(
            lsp_range(file, &(change.start..change.end)),
            change.replacement.clone(),
        ));
    }

    if created.is_empty() {
        let changes = edits
            .into_iter()
            .map(|(path, edits)| Ok((uri_of(&path)?, edits)))
            .collect::<RefitResult<HashMap<_, _>>>()?;
        return Ok(WorkspaceEdit {
            changes: Some(changes),
            ..Default::default()
        });
    }

    let mut operations = Vec::new();
    for (path, content) in created {
        let uri = uri_of(&path)?;
        operations.push(DocumentChangeOperation::Op(ResourceOp::Create(CreateFile {
            uri: uri.clone(),
            options: None,
            annotation_id: None,
        })));
        operations.push(text_document_edit(uri, vec![TextEdit::new(Range::default(), content)]));
    }
    for (path, edits) in edits {
        operations.push(text_document_edit(uri_of(&path)?, edits));
    }
    Ok(WorkspaceEdit {
        document_changes: Some(DocumentChanges::Operations(operations)),
        ..Default::default()
    })
}

fn text_document_edit(uri: Url, edits: Vec<TextEdit>) -> DocumentChangeOperation {
    DocumentChangeOperation::Edit(TextDocumentEdit {
        text_document: OptionalVersionedTextDocumentIdentifier { uri, version: None },
        edits: edits.into_iter().map(OneOf::Left).collect(),
    })
}

/// Map an engine error onto a JSON-RPC error carrying the full report
pub fn rpc_error(err: RefitError) -> jsonrpc::Error {
    use refit_foundation::ErrorKind;
    let code = match err.kind() {
        ErrorKind::Usage => jsonrpc::ErrorCode::InvalidParams,
        ErrorKind::Cancelled => jsonrpc::ErrorCode::RequestCancelled,
        // RequestFailed
        _ => jsonrpc::ErrorCode::ServerError(-32803),
    };
    jsonrpc::Error {
        code,
        message: err.to_string().into(),
        data: serde_json::to_value(err.report()).ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use refit_foundation::Change;

    fn workspace(source: &str) -> Workspace {
        Workspace::from_sources(
            "/ws",
            Some("example.com/m"),
            [(PathBuf::from("p/p.go"), source.to_string())],
        )
    }

    #[test]
    fn test_identifier_at() {
        let text = "x := fooBar(1)";
        assert_eq!(identifier_at(text, 7), Some(5..11));
        assert_eq!(identifier_at(text, 5), Some(5..11));
        // End of identifier still touches it
        assert_eq!(identifier_at(text, 11), Some(5..11));
        assert_eq!(identifier_at(text, 3), None);
    }

    #[test]
    fn test_positions_count_utf16_units() {
        // "é" is two bytes and one UTF-16 unit; "😀" is four bytes and two units
        let source = "package p\n\nvar s = \"é😀\"; var Name = 1\n";
        let ws = workspace(source);
        let file = ws.file(Path::new("/ws/p/p.go")).unwrap();
        let name = source.find("Name").unwrap();

        let position = lsp_position(file, name);
        assert_eq!(position, Position::new(2, 19));
        assert_eq!(offset_of(file, position), Some(name));
    }

    #[test]
    fn test_workspace_edit_for_existing_files() {
        let source = "package p\n\nfunc Add(a, b int) int { return a + b }\n";
        let ws = workspace(source);
        let start = source.find("Add").unwrap();
        let mut plan = RefactoringPlan::new("rename_symbol", serde_json::Value::Null);
        plan.push(Change::replace("/ws/p/p.go", start, start + 3, "Sum", "rename"));
        plan.finalize();

        let edit = workspace_edit(&ws, &plan).unwrap();
        let changes = edit.changes.unwrap();
        let edits = &changes[&Url::parse("file:///ws/p/p.go").unwrap()];
        assert_eq!(
            edits,
            &vec![TextEdit::new(
                Range::new(Position::new(2, 5), Position::new(2, 8)),
                "Sum".to_string()
            )]
        );
    }

    #[test]
    fn test_workspace_edit_creates_files_first() {
        let ws = workspace("package p\n");
        let mut plan = RefactoringPlan::new("move_symbol", serde_json::Value::Null);
        plan.push(Change::create_file("/ws/r/r.go", "package r\n", "create"));
        plan.push(Change::insert("/ws/p/p.go", 10, "// moved\n", "note"));
        plan.finalize();

        let edit = workspace_edit(&ws, &plan).unwrap();
        assert!(edit.changes.is_none());
        let Some(DocumentChanges::Operations(operations)) = edit.document_changes else {
            panic!("expected document operations");
        };
        assert_eq!(operations.len(), 3);
        assert!(matches!(
            &operations[0],
            DocumentChangeOperation::Op(ResourceOp::Create(create)) if create.uri.path() == "/ws/r/r.go"
        ));
    }

    #[test]
    fn test_usage_errors_are_invalid_params() {
        let err = rpc_error(RefitError::usage("bad name"));
        assert_eq!(err.code, jsonrpc::ErrorCode::InvalidParams);
        assert_eq!(err.data.unwrap()["kind"], "usage");
    }
}
