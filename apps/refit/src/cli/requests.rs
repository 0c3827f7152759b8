//! Turning parsed commands into planner requests

use super::{ChangeCommand, Commands, ExtractCommand, GlobalArgs, InlineCommand};
use refit_foundation::protocol::requests::{
    ChangeSignature, ExtractBlock, ExtractConstant, ExtractFunction, ExtractInterface,
    ExtractMethod, ExtractScope, ExtractVariable, InlineConstant, InlineFunction, InlineMethod,
    InlineVariable, MoveSymbol, ParamSpec, RenameLocal, RenameSymbol, SafeDelete, SourcePosition,
};
use refit_foundation::{RefactorRequest, RefitError, RefitResult, Scope};
use std::path::PathBuf;

/// `NAME:TYPE[@FROM_INDEX][=DEFAULT]`
pub fn parse_param(text: &str) -> Result<ParamSpec, String> {
    let (head, default_value) = match text.split_once('=') {
        Some((head, default)) => (head, Some(default.trim().to_string())),
        None => (text, None),
    };
    let (head, from_index) = match head.rsplit_once('@') {
        Some((head, index)) => {
            let index = index
                .trim()
                .parse::<usize>()
                .map_err(|_| format!("invalid parameter index in '{}'", text))?;
            (head, Some(index))
        }
        None => (head, None),
    };
    let (name, type_name) = head
        .split_once(':')
        .ok_or_else(|| format!("expected NAME:TYPE, got '{}'", text))?;
    let (name, type_name) = (name.trim(), type_name.trim());
    if name.is_empty() || type_name.is_empty() {
        return Err(format!("expected NAME:TYPE, got '{}'", text));
    }
    Ok(ParamSpec {
        name: name.to_string(),
        type_name: type_name.to_string(),
        from_index,
        default_value,
    })
}

pub fn parse_extract_scope(text: &str) -> Result<ExtractScope, String> {
    serde_json::from_value(serde_json::Value::String(text.to_ascii_lowercase())).map_err(|_| {
        format!(
            "unknown scope '{}' (expected expression, statement, block, function or file)",
            text
        )
    })
}

/// `FILE:LINE:COLUMN` addresses a local; anything else names a symbol
fn local_target(target: &str) -> Option<(PathBuf, u32, u32)> {
    let mut parts = target.rsplitn(3, ':');
    let column = parts.next()?.parse().ok()?;
    let line = parts.next()?.parse().ok()?;
    let file = parts.next().filter(|f| !f.is_empty())?;
    Some((PathBuf::from(file), line, column))
}

fn scope(global: &GlobalArgs) -> Scope {
    if global.package_only {
        Scope::Package
    } else {
        Scope::Workspace
    }
}

pub fn from_command(command: Commands, global: &GlobalArgs) -> RefitResult<RefactorRequest> {
    let request = match command {
        Commands::Move {
            symbol,
            from,
            to,
            target_file,
        } => RefactorRequest::MoveSymbol(MoveSymbol {
            symbol,
            from_package: from,
            to_package: to,
            create_target: global.create_target,
            target_file,
        }),
        Commands::Rename {
            target,
            new_name,
            package,
            kind,
        } => match local_target(&target) {
            Some((file, line, column)) => RefactorRequest::RenameLocal(RenameLocal {
                file,
                line,
                column,
                new_name,
            }),
            None => RefactorRequest::RenameSymbol(RenameSymbol {
                symbol: target,
                new_name,
                package,
                scope: scope(global),
                symbol_kind: kind,
                rename_implementations: global.rename_implementations,
            }),
        },
        Commands::Extract(extract) => from_extract(extract),
        Commands::Inline(inline) => from_inline(inline),
        Commands::Change(ChangeCommand::Signature {
            function,
            file,
            params,
            returns,
            no_results,
            receiver,
        }) => RefactorRequest::ChangeSignature(ChangeSignature {
            function,
            source_file: file,
            params,
            returns: if no_results {
                Some(Vec::new())
            } else if returns.is_empty() {
                None
            } else {
                Some(returns)
            },
            scope: scope(global),
            receiver_type: receiver,
        }),
        Commands::Delete { symbol, file, kind } => RefactorRequest::SafeDelete(SafeDelete {
            symbol,
            source_file: file,
            scope: scope(global),
            force: global.force,
            symbol_kind: kind,
        }),
        other => {
            return Err(RefitError::usage(format!(
                "{:?} is not a refactoring command",
                other
            )))
        }
    };
    Ok(request)
}

fn from_extract(command: ExtractCommand) -> RefactorRequest {
    match command {
        ExtractCommand::Function { lines, name } => {
            RefactorRequest::ExtractFunction(ExtractFunction {
                file: lines.file,
                start_line: lines.start_line,
                end_line: lines.end_line,
                new_name: name,
            })
        }
        ExtractCommand::Method {
            lines,
            name,
            receiver,
        } => RefactorRequest::ExtractMethod(ExtractMethod {
            file: lines.file,
            start_line: lines.start_line,
            end_line: lines.end_line,
            new_name: name,
            receiver_type: receiver,
        }),
        ExtractCommand::Interface {
            source_type,
            name,
            target_package,
            methods,
            source_package,
            update_call_sites,
        } => RefactorRequest::ExtractInterface(ExtractInterface {
            source_type,
            interface_name: name,
            methods,
            target_package,
            source_package,
            update_call_sites,
        }),
        ExtractCommand::Variable {
            lines,
            name,
            expression,
            scope,
        } => RefactorRequest::ExtractVariable(ExtractVariable {
            file: lines.file,
            start_line: lines.start_line,
            end_line: lines.end_line,
            name,
            expression,
            scope: scope.unwrap_or_default(),
        }),
        ExtractCommand::Constant { at, name, scope } => {
            RefactorRequest::ExtractConstant(ExtractConstant {
                file: at.file,
                position: SourcePosition {
                    line: at.line,
                    column: at.column,
                },
                name,
                scope: scope.unwrap_or_default(),
            })
        }
        ExtractCommand::Block { at, name } => RefactorRequest::ExtractBlock(ExtractBlock {
            file: at.file,
            position: SourcePosition {
                line: at.line,
                column: at.column,
            },
            new_name: name,
        }),
    }
}

fn from_inline(command: InlineCommand) -> RefactorRequest {
    match command {
        InlineCommand::Function {
            name,
            file,
            targets,
        } => RefactorRequest::InlineFunction(InlineFunction {
            name,
            source_file: file,
            target_files: targets,
        }),
        InlineCommand::Method {
            method,
            receiver,
            target_file,
        } => RefactorRequest::InlineMethod(InlineMethod {
            method,
            receiver_type: receiver,
            target_file,
        }),
        InlineCommand::Variable {
            name,
            file,
            targets,
            line,
        } => RefactorRequest::InlineVariable(InlineVariable {
            name,
            source_file: file,
            target_files: targets,
            line,
        }),
        InlineCommand::Constant {
            name,
            file,
            targets,
        } => RefactorRequest::InlineConstant(InlineConstant {
            name,
            source_file: file,
            target_files: targets,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;
    use pretty_assertions::assert_eq;

    fn request(args: &[&str]) -> RefactorRequest {
        let cli = Cli::try_parse_from(std::iter::once("refit").chain(args.iter().copied())).unwrap();
        from_command(cli.command, &cli.global).unwrap()
    }

    #[test]
    fn test_parse_param_forms() {
        assert_eq!(
            parse_param("ctx:context.Context=context.Background()").unwrap(),
            ParamSpec {
                name: "ctx".to_string(),
                type_name: "context.Context".to_string(),
                from_index: None,
                default_value: Some("context.Background()".to_string()),
            }
        );
        let kept = parse_param("b:int@1").unwrap();
        assert_eq!(kept.from_index, Some(1));
        assert_eq!(kept.default_value, None);
        assert!(parse_param("missing-type").is_err());
        assert!(parse_param("a:int@x").is_err());
    }

    #[test]
    fn test_rename_local_target() {
        assert_eq!(
            request(&["rename", "p/p.go:6:2", "z"]),
            RefactorRequest::RenameLocal(RenameLocal {
                file: PathBuf::from("p/p.go"),
                line: 6,
                column: 2,
                new_name: "z".to_string(),
            })
        );
    }

    #[test]
    fn test_global_flags_reach_the_request() {
        let RefactorRequest::RenameSymbol(rename) = request(&[
            "rename",
            "Reader.Read",
            "Fetch",
            "--rename-implementations",
            "--package-only",
        ]) else {
            panic!("expected a symbol rename");
        };
        assert!(rename.rename_implementations);
        assert_eq!(rename.scope, Scope::Package);

        let RefactorRequest::SafeDelete(delete) =
            request(&["--force", "delete", "Helper", "--file", "p/p.go"])
        else {
            panic!("expected a safe delete");
        };
        assert!(delete.force);
    }

    #[test]
    fn test_change_signature_results() {
        let RefactorRequest::ChangeSignature(change) = request(&[
            "change",
            "signature",
            "Add",
            "--file",
            "p/p.go",
            "--param",
            "b:int@1",
            "--param",
            "a:int@0",
            "--no-results",
        ]) else {
            panic!("expected change signature");
        };
        assert_eq!(change.params.len(), 2);
        assert_eq!(change.returns, Some(Vec::new()));
    }

    #[test]
    fn test_extract_scope_parsing() {
        assert_eq!(parse_extract_scope("File").unwrap(), ExtractScope::File);
        assert!(parse_extract_scope("module").is_err());
        let RefactorRequest::ExtractConstant(constant) = request(&[
            "extract", "constant", "--file", "p/p.go", "--line", "3", "--column", "14", "--name",
            "Limit",
        ]) else {
            panic!("expected extract constant");
        };
        assert_eq!(constant.scope, ExtractScope::Block);
        assert_eq!(constant.position, SourcePosition { line: 3, column: 14 });
    }
}
