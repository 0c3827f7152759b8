//! Results of plan execution.

use super::impact::Issue;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A pre-execution copy of a file, kept for rollback
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    pub original: PathBuf,
    pub backup: PathBuf,
}

/// Outcome of a successful plan execution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub operation: String,
    pub modified_files: Vec<PathBuf>,
    pub created_files: Vec<PathBuf>,
    /// Backups left on disk; empty when cleanup was requested
    pub backups: Vec<Backup>,
    /// Warnings carried over from the plan's impact report
    pub warnings: Vec<Issue>,
    pub compilation_checked: bool,
}
