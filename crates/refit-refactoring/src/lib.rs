//! Operation layer for refit
//!
//! Every refactoring kind is an [`Operation`]: it validates a request against
//! one workspace snapshot and plans textual changes without touching the
//! filesystem. Shared machinery lives beside the operations:
//!
//! - [`builder::PlanBuilder`] accumulates changes, synthesises import edits
//!   and runs the checks every plan must pass (cycles, unparsable files)
//! - [`rewrite`] relocates source regions between packages and substitutes
//!   expressions with correct parenthesisation
//! - [`impact`] holds the conflict, visibility and dangling-reference checks

pub mod builder;
pub mod context;
pub mod impact;
mod imports;
pub mod naming;
pub mod operations;
pub mod rewrite;

pub use builder::PlanBuilder;
pub use context::{operation_for, plan_request, Operation, PlanContext};
pub use impact::gate;
