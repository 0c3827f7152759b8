//! Refactoring code actions
//!
//! Actions carry no edit. Each one holds the request it would run, prefilled
//! from the cursor, and the JSON schema of that request in `data`; the client
//! completes the missing fields (usually a name) and sends the request back
//! through [`APPLY_COMMAND`].

use crate::convert::offset_of;
use refit_foundation::SymbolKind;
use refit_workspace::resolver::{self, SymbolAt};
use refit_workspace::{Symbol, Workspace};
use serde_json::{json, Value};
use std::path::Path;
use tower_lsp::lsp_types::{CodeAction, CodeActionKind, Range};

/// Command executing a completed refactoring request
pub const APPLY_COMMAND: &str = "refit.applyRefactoring";

pub const EXTRACT_FUNCTION: CodeActionKind = CodeActionKind::new("refactor.extract.function");
pub const EXTRACT_METHOD: CodeActionKind = CodeActionKind::new("refactor.extract.method");
pub const EXTRACT_INTERFACE: CodeActionKind = CodeActionKind::new("refactor.extract.interface");
pub const EXTRACT_VARIABLE: CodeActionKind = CodeActionKind::new("refactor.extract.variable");
pub const EXTRACT_CONSTANT: CodeActionKind = CodeActionKind::new("refactor.extract.constant");
pub const EXTRACT_BLOCK: CodeActionKind = CodeActionKind::new("refactor.extract.block");
pub const INLINE_FUNCTION: CodeActionKind = CodeActionKind::new("refactor.inline.function");
pub const INLINE_METHOD: CodeActionKind = CodeActionKind::new("refactor.inline.method");
pub const INLINE_VARIABLE: CodeActionKind = CodeActionKind::new("refactor.inline.variable");
pub const INLINE_CONSTANT: CodeActionKind = CodeActionKind::new("refactor.inline.constant");
pub const MOVE: CodeActionKind = CodeActionKind::new("refactor.move");
pub const RENAME: CodeActionKind = CodeActionKind::new("refactor.rename");
pub const CHANGE_SIGNATURE: CodeActionKind = CodeActionKind::new("refactor.change.signature");
pub const SAFE_DELETE: CodeActionKind = CodeActionKind::new("refactor.safe.delete");
pub const BATCH: CodeActionKind = CodeActionKind::new("refactor.batch");

/// Kinds advertised in the server capabilities
pub fn advertised_kinds() -> Vec<CodeActionKind> {
    vec![
        EXTRACT_FUNCTION,
        EXTRACT_METHOD,
        EXTRACT_INTERFACE,
        EXTRACT_VARIABLE,
        EXTRACT_CONSTANT,
        EXTRACT_BLOCK,
        INLINE_FUNCTION,
        INLINE_METHOD,
        INLINE_VARIABLE,
        INLINE_CONSTANT,
        MOVE,
        RENAME,
        CHANGE_SIGNATURE,
        SAFE_DELETE,
        BATCH,
    ]
}

fn object(required: &[&str], properties: Value) -> Value {
    json!({
        "type": "object",
        "required": required,
        "properties": properties,
    })
}

fn string() -> Value {
    json!({ "type": "string" })
}

fn line() -> Value {
    json!({ "type": "integer", "minimum": 1 })
}

fn boolean() -> Value {
    json!({ "type": "boolean", "default": false })
}

fn position() -> Value {
    object(&["line", "column"], json!({ "line": line(), "column": line() }))
}

fn scope() -> Value {
    json!({ "enum": ["workspace", "package"], "default": "workspace" })
}

/// JSON schema of the request behind an operation kind
pub fn schema(kind: &str) -> Value {
    match kind {
        "moveSymbol" => object(
            &["symbol", "fromPackage", "toPackage"],
            json!({
                "symbol": string(),
                "fromPackage": string(),
                "toPackage": string(),
                "createTarget": boolean(),
                "targetFile": string(),
            }),
        ),
        "renameSymbol" => object(
            &["symbol", "newName"],
            json!({
                "symbol": string(),
                "newName": string(),
                "package": string(),
                "scope": scope(),
                "symbolKind": string(),
                "renameImplementations": boolean(),
            }),
        ),
        "renameInterfaceMethod" => object(
            &["interface", "method", "newMethod"],
            json!({
                "interface": string(),
                "method": string(),
                "newMethod": string(),
                "package": string(),
                "updateImplementations": boolean(),
            }),
        ),
        "renameLocal" => object(
            &["file", "line", "column", "newName"],
            json!({ "file": string(), "line": line(), "column": line(), "newName": string() }),
        ),
        "extractFunction" => object(
            &["file", "startLine", "endLine", "newName"],
            json!({ "file": string(), "startLine": line(), "endLine": line(), "newName": string() }),
        ),
        "extractMethod" => object(
            &["file", "startLine", "endLine", "newName", "receiverType"],
            json!({
                "file": string(),
                "startLine": line(),
                "endLine": line(),
                "newName": string(),
                "receiverType": string(),
            }),
        ),
        "extractInterface" => object(
            &["sourceType", "interfaceName", "targetPackage"],
            json!({
                "sourceType": string(),
                "interfaceName": string(),
                "methods": { "type": "array", "items": string() },
                "targetPackage": string(),
                "sourcePackage": string(),
                "updateCallSites": boolean(),
            }),
        ),
        "extractVariable" => object(
            &["file", "startLine", "endLine", "name"],
            json!({
                "file": string(),
                "startLine": line(),
                "endLine": line(),
                "name": string(),
                "expression": string(),
                "scope": { "enum": ["expression", "statement", "block", "function", "file"], "default": "block" },
            }),
        ),
        "extractConstant" => object(
            &["file", "position", "name"],
            json!({
                "file": string(),
                "position": position(),
                "name": string(),
                "scope": { "enum": ["expression", "statement", "block", "function", "file"], "default": "block" },
            }),
        ),
        "extractBlock" => object(
            &["file", "position", "newName"],
            json!({ "file": string(), "position": position(), "newName": string() }),
        ),
        "inlineMethod" => object(
            &["method", "receiverType"],
            json!({ "method": string(), "receiverType": string(), "targetFile": string() }),
        ),
        "inlineFunction" | "inlineConstant" => object(
            &["name", "sourceFile"],
            json!({
                "name": string(),
                "sourceFile": string(),
                "targetFiles": { "type": "array", "items": string() },
            }),
        ),
        "inlineVariable" => object(
            &["name", "sourceFile"],
            json!({
                "name": string(),
                "sourceFile": string(),
                "targetFiles": { "type": "array", "items": string() },
                "line": line(),
            }),
        ),
        "changeSignature" => object(
            &["function", "sourceFile", "params"],
            json!({
                "function": string(),
                "sourceFile": string(),
                "params": {
                    "type": "array",
                    "items": object(&["name", "type"], json!({
                        "name": string(),
                        "type": string(),
                        "fromIndex": { "type": "integer", "minimum": 0 },
                        "defaultValue": string(),
                    })),
                },
                "returns": { "type": "array", "items": string() },
                "scope": scope(),
                "receiverType": string(),
            }),
        ),
        "safeDelete" => object(
            &["symbol", "sourceFile"],
            json!({
                "symbol": string(),
                "sourceFile": string(),
                "scope": scope(),
                "force": boolean(),
                "symbolKind": string(),
            }),
        ),
        "batch" => object(
            &["requests"],
            json!({ "requests": { "type": "array", "items": { "type": "object", "required": ["kind"] } } }),
        ),
        _ => Value::Null,
    }
}

fn action(title: String, kind: CodeActionKind, arguments: Value) -> CodeAction {
    let operation = arguments["kind"].as_str().unwrap_or("batch").to_string();
    CodeAction {
        title,
        kind: Some(kind),
        data: Some(json!({
            "command": APPLY_COMMAND,
            "arguments": arguments,
            "schema": schema(&operation),
        })),
        ..Default::default()
    }
}

fn symbol_actions(ws: &Workspace, symbol: &Symbol, actions: &mut Vec<CodeAction>) {
    let name = symbol.qualified_name();
    let source_file = ws.relative(&symbol.file).to_path_buf();
    let package_level = symbol.owner.is_none();

    if symbol.in_interface {
        if let Some(interface) = &symbol.owner {
            actions.push(action(
                format!("Rename interface method '{}'", name),
                RENAME,
                json!({
                    "kind": "renameInterfaceMethod",
                    "interface": interface,
                    "method": symbol.name,
                    "package": symbol.package,
                }),
            ));
        }
        return;
    }

    actions.push(action(
        format!("Rename '{}'", name),
        RENAME,
        json!({
            "kind": "renameSymbol",
            "symbol": name,
            "package": symbol.package,
            "symbolKind": symbol.kind,
        }),
    ));
    if package_level {
        actions.push(action(
            format!("Move '{}' to another package", name),
            MOVE,
            json!({ "kind": "moveSymbol", "symbol": name, "fromPackage": symbol.package }),
        ));
    }

    match symbol.kind {
        SymbolKind::Function => {
            actions.push(action(
                format!("Inline function '{}'", name),
                INLINE_FUNCTION,
                json!({ "kind": "inlineFunction", "name": symbol.name, "sourceFile": source_file }),
            ));
            actions.push(action(
                format!("Change signature of '{}'", name),
                CHANGE_SIGNATURE,
                json!({ "kind": "changeSignature", "function": symbol.name, "sourceFile": source_file }),
            ));
        }
        SymbolKind::Method => {
            if let Some(receiver) = &symbol.owner {
                actions.push(action(
                    format!("Inline method '{}'", name),
                    INLINE_METHOD,
                    json!({ "kind": "inlineMethod", "method": symbol.name, "receiverType": receiver }),
                ));
                actions.push(action(
                    format!("Change signature of '{}'", name),
                    CHANGE_SIGNATURE,
                    json!({
                        "kind": "changeSignature",
                        "function": symbol.name,
                        "sourceFile": source_file,
                        "receiverType": receiver,
                    }),
                ));
            }
        }
        SymbolKind::Variable if package_level => actions.push(action(
            format!("Inline variable '{}'", name),
            INLINE_VARIABLE,
            json!({ "kind": "inlineVariable", "name": symbol.name, "sourceFile": source_file }),
        )),
        SymbolKind::Constant => actions.push(action(
            format!("Inline constant '{}'", name),
            INLINE_CONSTANT,
            json!({ "kind": "inlineConstant", "name": symbol.name, "sourceFile": source_file }),
        )),
        SymbolKind::Type => actions.push(action(
            format!("Extract interface from '{}'", name),
            EXTRACT_INTERFACE,
            json!({
                "kind": "extractInterface",
                "sourceType": symbol.name,
                "sourcePackage": symbol.package,
            }),
        )),
        _ => {}
    }

    if symbol.kind != SymbolKind::StructField {
        actions.push(action(
            format!("Safe delete '{}'", name),
            SAFE_DELETE,
            json!({
                "kind": "safeDelete",
                "symbol": name,
                "sourceFile": source_file,
                "symbolKind": symbol.kind,
            }),
        ));
    }
}

/// Refactorings applicable at `range` of `path`
pub fn code_actions(ws: &Workspace, path: &Path, range: Range) -> Vec<CodeAction> {
    let Some(file) = ws.file(path) else {
        return Vec::new();
    };
    let (Some(start), Some(end)) = (offset_of(file, range.start), offset_of(file, range.end)) else {
        return Vec::new();
    };
    let relative = ws.relative(&file.path).to_path_buf();
    let first = file.position(start);
    let mut actions = Vec::new();

    if end > start {
        let last = file.position(end);
        // A selection ending at column 1 stops on the previous line
        let end_line = if last.column == 1 && last.line > first.line {
            last.line - 1
        } else {
            last.line
        };
        let lines = json!({ "file": relative, "startLine": first.line, "endLine": end_line });
        let with_kind = |kind: &str| {
            let mut arguments = lines.clone();
            arguments["kind"] = json!(kind);
            arguments
        };

        actions.push(action(
            "Extract function".to_string(),
            EXTRACT_FUNCTION,
            with_kind("extractFunction"),
        ));
        actions.push(action(
            "Extract method".to_string(),
            EXTRACT_METHOD,
            with_kind("extractMethod"),
        ));
        let mut variable = with_kind("extractVariable");
        if first.line == last.line {
            variable["expression"] = json!(file.text(start..end).trim());
        }
        actions.push(action("Extract variable".to_string(), EXTRACT_VARIABLE, variable));
    }

    let at = json!({ "line": first.line, "column": first.column });
    actions.push(action(
        "Extract constant".to_string(),
        EXTRACT_CONSTANT,
        json!({ "kind": "extractConstant", "file": relative, "position": at }),
    ));
    actions.push(action(
        "Extract block into function".to_string(),
        EXTRACT_BLOCK,
        json!({ "kind": "extractBlock", "file": relative, "position": at }),
    ));

    match resolver::symbol_at(ws, &file.path, start) {
        Some(SymbolAt::Symbol(symbol)) => symbol_actions(ws, symbol, &mut actions),
        Some(SymbolAt::Local { file: local_file, index }) => {
            let found = ws
                .file(&local_file)
                .and_then(|f| f.info.locals.get(index).map(|l| (f, l)));
            if let Some((source, local)) = found {
                let declared = source.position(local.span.start);
                actions.push(action(
                    format!("Rename local '{}'", local.name),
                    RENAME,
                    json!({
                        "kind": "renameLocal",
                        "file": relative,
                        "line": first.line,
                        "column": first.column,
                    }),
                ));
                actions.push(action(
                    format!("Inline variable '{}'", local.name),
                    INLINE_VARIABLE,
                    json!({
                        "kind": "inlineVariable",
                        "name": local.name,
                        "sourceFile": relative,
                        "line": declared.line,
                    }),
                ));
            }
        }
        Some(SymbolAt::Package(_)) | None => {}
    }

    actions.push(action(
        "Apply several refactorings as one batch".to_string(),
        BATCH,
        json!({ "requests": [] }),
    ));
    actions
}

/// Keep actions whose kind falls under one of `only` (hierarchical match)
pub fn filter_only(actions: Vec<CodeAction>, only: Option<&[CodeActionKind]>) -> Vec<CodeAction> {
    let Some(only) = only else {
        return actions;
    };
    actions
        .into_iter()
        .filter(|action| {
            let kind = action.kind.as_ref().map(|k| k.as_str()).unwrap_or("");
            only.iter().any(|wanted| {
                let wanted = wanted.as_str();
                kind == wanted || kind.strip_prefix(wanted).is_some_and(|rest| rest.starts_with('.'))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use tower_lsp::lsp_types::Position;

    const LIB: &str = "package p\n\nconst Limit = 10\n\nfunc Add(a, b int) int { return a + b }\n\nfunc Twice(x int) int {\n\ty := Add(x, x)\n\treturn y\n}\n";

    fn workspace() -> Workspace {
        Workspace::from_sources(
            "/ws",
            Some("example.com/m"),
            [(PathBuf::from("p/p.go"), LIB.to_string())],
        )
    }

    fn kinds(actions: &[CodeAction]) -> Vec<&str> {
        actions
            .iter()
            .filter_map(|a| a.kind.as_ref().map(|k| k.as_str()))
            .collect()
    }

    #[test]
    fn test_function_under_cursor() {
        let ws = workspace();
        let cursor = Range::new(Position::new(4, 6), Position::new(4, 6));
        let actions = code_actions(&ws, Path::new("/ws/p/p.go"), cursor);
        let kinds = kinds(&actions);
        for expected in [
            "refactor.rename",
            "refactor.move",
            "refactor.inline.function",
            "refactor.change.signature",
            "refactor.safe.delete",
            "refactor.batch",
        ] {
            assert!(kinds.contains(&expected), "missing {}", expected);
        }
        // No selection, nothing to extract by lines
        assert!(!kinds.contains(&"refactor.extract.function"));

        let inline = actions
            .iter()
            .find(|a| a.kind.as_ref() == Some(&INLINE_FUNCTION))
            .unwrap();
        let data = inline.data.as_ref().unwrap();
        assert_eq!(data["arguments"]["name"], "Add");
        assert_eq!(data["arguments"]["sourceFile"], "p/p.go");
        assert_eq!(data["schema"]["required"], json!(["name", "sourceFile"]));
    }

    #[test]
    fn test_selection_offers_extractions() {
        let ws = workspace();
        // Whole `y := Add(x, x)` line, ending at the start of the next one
        let selection = Range::new(Position::new(7, 0), Position::new(8, 0));
        let actions = code_actions(&ws, Path::new("/ws/p/p.go"), selection);
        let extract = actions
            .iter()
            .find(|a| a.kind.as_ref() == Some(&EXTRACT_FUNCTION))
            .unwrap();
        let arguments = &extract.data.as_ref().unwrap()["arguments"];
        assert_eq!(arguments["startLine"], 8);
        assert_eq!(arguments["endLine"], 8);
        assert_eq!(arguments["kind"], "extractFunction");
    }

    #[test]
    fn test_only_filter_is_hierarchical() {
        let ws = workspace();
        let selection = Range::new(Position::new(7, 6), Position::new(7, 15));
        let actions = code_actions(&ws, Path::new("/ws/p/p.go"), selection);
        let only = [CodeActionKind::new("refactor.extract")];
        let filtered = filter_only(actions, Some(&only));
        assert!(!filtered.is_empty());
        assert!(kinds(&filtered).iter().all(|k| k.starts_with("refactor.extract.")));

        let variable = filtered
            .iter()
            .find(|a| a.kind.as_ref() == Some(&EXTRACT_VARIABLE))
            .unwrap();
        assert_eq!(variable.data.as_ref().unwrap()["arguments"]["expression"], "Add(x, x)");
    }

    #[test]
    fn test_every_advertised_kind_has_a_schema() {
        for kind in [
            "moveSymbol",
            "renameSymbol",
            "renameInterfaceMethod",
            "renameLocal",
            "extractFunction",
            "extractMethod",
            "extractInterface",
            "extractVariable",
            "extractConstant",
            "extractBlock",
            "inlineMethod",
            "inlineFunction",
            "inlineVariable",
            "inlineConstant",
            "changeSignature",
            "safeDelete",
            "batch",
        ] {
            assert_eq!(schema(kind)["type"], "object", "{}", kind);
        }
        assert_eq!(advertised_kinds().len(), 15);
    }
}
