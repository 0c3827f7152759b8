//! Go syntax layer for refit
//!
//! Wraps tree-sitter-go with the pieces the planner needs: parsing with
//! syntax diagnostics, byte/line/UTF-16 position mapping, an early-exit
//! visitor, statement and declaration helpers, and the purely syntactic
//! analyses (side-effect freedom, cyclomatic complexity).

pub mod complexity;
pub mod error;
pub mod parser;
pub mod position;
pub mod purity;
pub mod syntax;
pub mod visitor;

pub use error::{AstError, AstResult};
pub use parser::{parse_go, syntax_errors, SyntaxError};
pub use position::{FileSet, LineIndex};
pub use tree_sitter::{Node, Tree};
pub use visitor::{walk, VisitControl, Visitor};
