//! Value-only refactoring requests, one per operation.

use crate::error::{RefitError, RefitResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Kinds of named program entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Method,
    Type,
    Interface,
    Variable,
    Constant,
    #[serde(alias = "struct-field", alias = "field")]
    StructField,
    Package,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Type => "type",
            SymbolKind::Interface => "interface",
            SymbolKind::Variable => "variable",
            SymbolKind::Constant => "constant",
            SymbolKind::StructField => "struct-field",
            SymbolKind::Package => "package",
        };
        f.write_str(label)
    }
}

impl std::str::FromStr for SymbolKind {
    type Err = RefitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "function" | "func" => Ok(SymbolKind::Function),
            "method" => Ok(SymbolKind::Method),
            "type" | "struct" => Ok(SymbolKind::Type),
            "interface" => Ok(SymbolKind::Interface),
            "variable" | "var" => Ok(SymbolKind::Variable),
            "constant" | "const" => Ok(SymbolKind::Constant),
            "struct-field" | "struct_field" | "field" => Ok(SymbolKind::StructField),
            "package" => Ok(SymbolKind::Package),
            other => Err(RefitError::usage(format!("unknown symbol kind '{}'", other))),
        }
    }
}

/// Where an operation may apply edits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    #[default]
    Workspace,
    /// Only the declaring package; external references are refused
    Package,
}

/// Occurrence scope for extract variable / constant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractScope {
    Expression,
    Statement,
    #[default]
    Block,
    Function,
    /// Package-level declaration; occurrences replaced across the file
    File,
}

/// Flags that relax planning checks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanOptions {
    /// Downgrade breaking-change errors (visibility, side effects, removed arguments)
    #[serde(default)]
    pub allow_breaking: bool,
    /// Execute despite soft Error issues; hard invariants still reject
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveSymbol {
    pub symbol: String,
    pub from_package: String,
    pub to_package: String,
    #[serde(default)]
    pub create_target: bool,
    /// Explicit destination file inside the target package
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameSymbol {
    pub symbol: String,
    pub new_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol_kind: Option<SymbolKind>,
    /// For interface methods: also rename the method on every implementation
    #[serde(default)]
    pub rename_implementations: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameInterfaceMethod {
    pub interface: String,
    pub method: String,
    pub new_method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    #[serde(default)]
    pub update_implementations: bool,
}

/// Rename a function-local binding at a position (editor rename)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameLocal {
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
    pub new_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractFunction {
    pub file: PathBuf,
    pub start_line: u32,
    pub end_line: u32,
    pub new_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractMethod {
    pub file: PathBuf,
    pub start_line: u32,
    pub end_line: u32,
    pub new_name: String,
    pub receiver_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractInterface {
    pub source_type: String,
    pub interface_name: String,
    /// Method names; empty selects the whole exported method set
    #[serde(default)]
    pub methods: Vec<String>,
    pub target_package: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_package: Option<String>,
    #[serde(default)]
    pub update_call_sites: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractVariable {
    pub file: PathBuf,
    pub start_line: u32,
    pub end_line: u32,
    pub name: String,
    /// Expression text to extract; detected from the range when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default)]
    pub scope: ExtractScope,
}

/// 1-based line and column in a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePosition {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractConstant {
    pub file: PathBuf,
    pub position: SourcePosition,
    pub name: String,
    #[serde(default)]
    pub scope: ExtractScope,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractBlock {
    pub file: PathBuf,
    pub position: SourcePosition,
    pub new_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineMethod {
    pub method: String,
    pub receiver_type: String,
    /// Restrict inlining to call sites in this file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineFunction {
    pub name: String,
    pub source_file: PathBuf,
    #[serde(default)]
    pub target_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineVariable {
    pub name: String,
    pub source_file: PathBuf,
    #[serde(default)]
    pub target_files: Vec<PathBuf>,
    /// Declaration line when several locals share the name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineConstant {
    pub name: String,
    pub source_file: PathBuf,
    #[serde(default)]
    pub target_files: Vec<PathBuf>,
}

/// One parameter of the new signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    /// Index of the existing parameter this one keeps; matched by name when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_index: Option<usize>,
    /// Argument synthesised at call sites for a new parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSignature {
    pub function: String,
    pub source_file: PathBuf,
    pub params: Vec<ParamSpec>,
    /// New result types; unchanged when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<Vec<String>>,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeDelete {
    pub symbol: String,
    pub source_file: PathBuf,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub force: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol_kind: Option<SymbolKind>,
}

/// Sum type over all refactoring requests; the engine dispatches on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RefactorRequest {
    MoveSymbol(MoveSymbol),
    RenameSymbol(RenameSymbol),
    RenameInterfaceMethod(RenameInterfaceMethod),
    RenameLocal(RenameLocal),
    ExtractFunction(ExtractFunction),
    ExtractMethod(ExtractMethod),
    ExtractInterface(ExtractInterface),
    ExtractVariable(ExtractVariable),
    ExtractConstant(ExtractConstant),
    ExtractBlock(ExtractBlock),
    InlineMethod(InlineMethod),
    InlineFunction(InlineFunction),
    InlineVariable(InlineVariable),
    InlineConstant(InlineConstant),
    ChangeSignature(ChangeSignature),
    SafeDelete(SafeDelete),
}

impl RefactorRequest {
    /// Stable operation name used in plans and logs
    pub fn operation_name(&self) -> &'static str {
        match self {
            RefactorRequest::MoveSymbol(_) => "move_symbol",
            RefactorRequest::RenameSymbol(_) => "rename_symbol",
            RefactorRequest::RenameInterfaceMethod(_) => "rename_interface_method",
            RefactorRequest::RenameLocal(_) => "rename_local",
            RefactorRequest::ExtractFunction(_) => "extract_function",
            RefactorRequest::ExtractMethod(_) => "extract_method",
            RefactorRequest::ExtractInterface(_) => "extract_interface",
            RefactorRequest::ExtractVariable(_) => "extract_variable",
            RefactorRequest::ExtractConstant(_) => "extract_constant",
            RefactorRequest::ExtractBlock(_) => "extract_block",
            RefactorRequest::InlineMethod(_) => "inline_method",
            RefactorRequest::InlineFunction(_) => "inline_function",
            RefactorRequest::InlineVariable(_) => "inline_variable",
            RefactorRequest::InlineConstant(_) => "inline_constant",
            RefactorRequest::ChangeSignature(_) => "change_signature",
            RefactorRequest::SafeDelete(_) => "safe_delete",
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Shape checks that need no workspace
    pub fn check_shape(&self) -> RefitResult<()> {
        fn non_empty(field: &str, value: &str) -> RefitResult<()> {
            if value.trim().is_empty() {
                return Err(RefitError::usage(format!("'{}' must not be empty", field)));
            }
            Ok(())
        }
        fn line_range(start: u32, end: u32) -> RefitResult<()> {
            if start == 0 || end < start {
                return Err(RefitError::usage(format!(
                    "invalid line range {}..{}",
                    start, end
                )));
            }
            Ok(())
        }
        fn position(pos: &SourcePosition) -> RefitResult<()> {
            if pos.line == 0 || pos.column == 0 {
                return Err(RefitError::usage("positions are 1-based"));
            }
            Ok(())
        }

        match self {
            RefactorRequest::MoveSymbol(r) => {
                non_empty("symbol", &r.symbol)?;
                non_empty("fromPackage", &r.from_package)?;
                non_empty("toPackage", &r.to_package)
            }
            RefactorRequest::RenameSymbol(r) => {
                non_empty("symbol", &r.symbol)?;
                non_empty("newName", &r.new_name)
            }
            RefactorRequest::RenameInterfaceMethod(r) => {
                non_empty("interface", &r.interface)?;
                non_empty("method", &r.method)?;
                non_empty("newMethod", &r.new_method)
            }
            RefactorRequest::RenameLocal(r) => {
                position(&SourcePosition {
                    line: r.line,
                    column: r.column,
                })?;
                non_empty("newName", &r.new_name)
            }
            RefactorRequest::ExtractFunction(r) => {
                line_range(r.start_line, r.end_line)?;
                non_empty("newName", &r.new_name)
            }
            RefactorRequest::ExtractMethod(r) => {
                line_range(r.start_line, r.end_line)?;
                non_empty("newName", &r.new_name)?;
                non_empty("receiverType", &r.receiver_type)
            }
            RefactorRequest::ExtractInterface(r) => {
                non_empty("sourceType", &r.source_type)?;
                non_empty("interfaceName", &r.interface_name)?;
                non_empty("targetPackage", &r.target_package)
            }
            RefactorRequest::ExtractVariable(r) => {
                line_range(r.start_line, r.end_line)?;
                non_empty("name", &r.name)
            }
            RefactorRequest::ExtractConstant(r) => {
                position(&r.position)?;
                non_empty("name", &r.name)
            }
            RefactorRequest::ExtractBlock(r) => {
                position(&r.position)?;
                non_empty("newName", &r.new_name)
            }
            RefactorRequest::InlineMethod(r) => {
                non_empty("method", &r.method)?;
                non_empty("receiverType", &r.receiver_type)
            }
            RefactorRequest::InlineFunction(r) => non_empty("name", &r.name),
            RefactorRequest::InlineVariable(r) => non_empty("name", &r.name),
            RefactorRequest::InlineConstant(r) => non_empty("name", &r.name),
            RefactorRequest::ChangeSignature(r) => {
                non_empty("function", &r.function)?;
                for param in &r.params {
                    non_empty("params[].name", &param.name)?;
                    non_empty("params[].type", &param.type_name)?;
                }
                Ok(())
            }
            RefactorRequest::SafeDelete(r) => non_empty("symbol", &r.symbol),
        }
    }
}
