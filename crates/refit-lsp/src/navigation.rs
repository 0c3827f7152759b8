//! Hover, go-to-definition, references and rename targets
//!
//! Everything here answers from the engine's current snapshot.

use crate::convert::{identifier_at, location, lsp_range, offset_of};
use refit_foundation::protocol::requests::{RenameLocal, RenameSymbol};
use refit_foundation::{RefactorRequest, RefitError, RefitResult, Scope};
use refit_services::queries;
use refit_services::SymbolInfo;
use refit_workspace::resolver::{self, SymbolAt};
use refit_workspace::{SourceFile, Workspace};
use std::path::Path;
use tower_lsp::lsp_types::{
    GotoDefinitionResponse, Hover, HoverContents, Location, MarkupContent, MarkupKind, Position,
    Range,
};

fn cursor<'w>(ws: &'w Workspace, path: &Path, position: Position) -> RefitResult<(&'w SourceFile, usize)> {
    let file = ws.require_file(path)?;
    let offset = offset_of(file, position).ok_or_else(|| {
        RefitError::usage(format!(
            "position {}:{} is outside {}",
            position.line,
            position.character,
            path.display()
        ))
    })?;
    Ok((file, offset))
}

fn hover_text(info: &SymbolInfo) -> String {
    let kind = info
        .kind
        .map(|k| k.to_string())
        .unwrap_or_else(|| "local".to_string());
    let mut text = format!(
        "```go\n{}\n```\n\n{} `{}` in package `{}`",
        info.detail.as_deref().unwrap_or(&info.name),
        kind,
        info.name,
        info.package
    );
    if info.kind.is_some() && !info.exported {
        text.push_str(" (unexported)");
    }
    text
}

pub fn hover(ws: &Workspace, path: &Path, position: Position) -> Option<Hover> {
    let (file, offset) = cursor(ws, path, position).ok()?;
    let info = queries::symbol_at(ws, &file.path, offset)?;
    Some(Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value: hover_text(&info),
        }),
        range: identifier_at(&file.content, offset).map(|span| lsp_range(file, &span)),
    })
}

pub fn definition(ws: &Workspace, path: &Path, position: Position) -> Option<GotoDefinitionResponse> {
    let (file, offset) = cursor(ws, path, position).ok()?;
    let info = queries::symbol_at(ws, &file.path, offset)?;
    location(ws, &info.definition.file, &info.definition.span).map(GotoDefinitionResponse::Scalar)
}

pub fn references(
    ws: &Workspace,
    path: &Path,
    position: Position,
    include_declaration: bool,
) -> RefitResult<Vec<Location>> {
    let (file, offset) = cursor(ws, path, position)?;
    let mut locations = Vec::new();
    if include_declaration {
        if let Some(info) = queries::symbol_at(ws, &file.path, offset) {
            locations.extend(location(ws, &info.definition.file, &info.definition.span));
        }
    }
    for found in queries::references_at(ws, &file.path, offset)? {
        locations.extend(location(ws, &found.file, &found.span));
    }
    Ok(locations)
}

/// Range shown in the editor's rename box, or `None` when nothing renameable is there
pub fn prepare_rename(ws: &Workspace, path: &Path, position: Position) -> Option<Range> {
    let (file, offset) = cursor(ws, path, position).ok()?;
    match resolver::symbol_at(ws, &file.path, offset)? {
        SymbolAt::Symbol(_) | SymbolAt::Local { .. } => {
            identifier_at(&file.content, offset).map(|span| lsp_range(file, &span))
        }
        SymbolAt::Package(_) => None,
    }
}

/// Planner request renaming whatever sits under the cursor
pub fn rename_request(
    ws: &Workspace,
    path: &Path,
    position: Position,
    new_name: &str,
) -> RefitResult<RefactorRequest> {
    let (file, offset) = cursor(ws, path, position)?;
    match resolver::symbol_at(ws, &file.path, offset) {
        Some(SymbolAt::Symbol(symbol)) => Ok(RefactorRequest::RenameSymbol(RenameSymbol {
            symbol: symbol.qualified_name(),
            new_name: new_name.to_string(),
            package: Some(symbol.package.clone()),
            scope: Scope::Workspace,
            symbol_kind: Some(symbol.kind),
            rename_implementations: symbol.in_interface,
        })),
        Some(SymbolAt::Local { .. }) => {
            let at = file.position(offset);
            Ok(RefactorRequest::RenameLocal(RenameLocal {
                file: file.path.clone(),
                line: at.line,
                column: at.column,
                new_name: new_name.to_string(),
            }))
        }
        Some(SymbolAt::Package(key)) => Err(RefitError::unsupported(format!(
            "renaming package '{}' is not supported",
            key
        ))),
        None => Err(RefitError::not_found(format!(
            "symbol at {}:{}:{}",
            path.display(),
            position.line + 1,
            position.character + 1
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    const LIB: &str = "package p\n\nfunc Add(a, b int) int { return a + b }\n\nfunc Twice(x int) int {\n\ty := Add(x, x)\n\treturn y\n}\n";

    fn workspace() -> Workspace {
        Workspace::from_sources(
            "/ws",
            Some("example.com/m"),
            [(PathBuf::from("p/p.go"), LIB.to_string())],
        )
    }

    fn path() -> PathBuf {
        PathBuf::from("/ws/p/p.go")
    }

    #[test]
    fn test_hover_on_call_site() {
        let ws = workspace();
        // `Add` in `y := Add(x, x)`
        let hover = hover(&ws, &path(), Position::new(5, 7)).unwrap();
        let HoverContents::Markup(markup) = hover.contents else {
            panic!("expected markdown");
        };
        assert!(markup.value.contains("function `Add` in package"));
        assert_eq!(hover.range, Some(Range::new(Position::new(5, 6), Position::new(5, 9))));
    }

    #[test]
    fn test_definition_jumps_to_declaration() {
        let ws = workspace();
        let Some(GotoDefinitionResponse::Scalar(found)) = definition(&ws, &path(), Position::new(5, 7)) else {
            panic!("expected a single location");
        };
        assert_eq!(found.range, Range::new(Position::new(2, 5), Position::new(2, 8)));
    }

    #[test]
    fn test_references_with_and_without_declaration() {
        let ws = workspace();
        let uses = references(&ws, &path(), Position::new(2, 6), false).unwrap();
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].range.start, Position::new(5, 6));

        let all = references(&ws, &path(), Position::new(2, 6), true).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_rename_request_for_symbol_and_local() {
        let ws = workspace();
        let request = rename_request(&ws, &path(), Position::new(5, 7), "Sum").unwrap();
        assert!(matches!(
            request,
            RefactorRequest::RenameSymbol(ref r) if r.symbol == "Add" && r.new_name == "Sum"
        ));

        // `y` in `return y`
        let request = rename_request(&ws, &path(), Position::new(6, 8), "z").unwrap();
        assert_eq!(
            request,
            RefactorRequest::RenameLocal(RenameLocal {
                file: path(),
                line: 7,
                column: 9,
                new_name: "z".to_string(),
            })
        );
    }

    #[test]
    fn test_prepare_rename_outside_identifiers() {
        let ws = workspace();
        assert_eq!(prepare_rename(&ws, &path(), Position::new(1, 0)), None);
        assert_eq!(
            prepare_rename(&ws, &path(), Position::new(2, 6)),
            Some(Range::new(Position::new(2, 5), Position::new(2, 8)))
        );
    }
}
