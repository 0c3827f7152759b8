//! Workspace model for refit
//!
//! Loads a directory of Go sources into packages, builds per-package symbol
//! indices, binds every identifier occurrence, and answers resolver queries
//! (lookup, references, implementations) against that single snapshot.

pub mod binder;
pub mod import_graph;
mod loader;
pub mod model;
pub mod resolver;
pub mod symbols;
pub mod types;

pub use binder::{FileInfo, IdentUse, LocalDecl, LocalKind, MemberKind, Target, UseRole};
pub use import_graph::ImportGraph;
pub use loader::module_path;
pub use model::{ImportSpec, LoadOptions, Package, SourceFile, Workspace};
pub use resolver::{Reference, ReferenceKind, SymbolAt};
pub use symbols::{Param, Symbol, SymbolId, SymbolIndex};
pub use types::{RenderContext, TypeRef};
