//! Service layer for refit
//!
//! [`RefactorEngine`] is what the CLI and the editor server drive: it plans
//! requests against the shared workspace, previews plans as unified diffs and
//! executes them transactionally through the [`serializer`]. Batches of
//! requests are merged into one plan by [`batch`].

pub mod batch;
pub mod engine;
pub mod preview;
pub mod queries;
pub mod serializer;

pub use batch::{plan_batch, BatchFile, ChangeClass};
pub use engine::{load_options, verify_syntax, RefactorEngine};
pub use preview::{render_preview, unified_diff};
pub use queries::{ComplexityEntry, Location, SymbolInfo, SymbolReport, WorkspaceSummary};
pub use serializer::{backup_path, Applied, DiskStore, FileStore, Rendered, Serializer};
