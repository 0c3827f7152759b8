//! The refactoring engine front-ends talk to
//!
//! Owns the workspace behind a readers-writer lock: planning and queries
//! share it, execution holds it exclusively from the first write until the
//! reloaded snapshot replaces it. CPU-bound phases run on blocking tasks
//! under the per-phase deadlines from configuration.

use crate::batch::plan_batch;
use crate::preview::render_preview;
use crate::queries::{self, ComplexityEntry, Location, SymbolInfo, SymbolReport, WorkspaceSummary};
use crate::serializer::{DiskStore, FileStore, Rendered, Serializer};
use refit_ast::{parse_go, syntax_errors};
use refit_config::AppConfig;
use refit_foundation::{
    apply_changes, ChangeKind, ExecutionResult, Issue, IssueKind, PlanOptions, RefactorRequest,
    RefactoringPlan, RefitError, RefitResult,
};
use refit_refactoring::{gate, plan_request, PlanContext};
use refit_workspace::{LoadOptions, Workspace};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub fn load_options(config: &AppConfig) -> LoadOptions {
    LoadOptions {
        exclude: config.workspace.exclude.clone(),
        include_tests: config.workspace.include_tests,
    }
}

/// Run CPU-bound work off the runtime, mapping an exceeded deadline to `Cancelled`
async fn blocking<T, F>(phase: &'static str, limit: Duration, work: F) -> RefitResult<T>
where
    F: FnOnce() -> RefitResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(limit, tokio::task::spawn_blocking(work)).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(RefitError::io(format!("{} task failed: {}", phase, join), None)),
        Err(_) => {
            warn!(phase, limit_ms = limit.as_millis() as u64, "Phase deadline exceeded");
            Err(RefitError::cancelled(format!("{} (timeout)", phase)))
        }
    }
}

async fn load(root: PathBuf, config: &AppConfig) -> RefitResult<Workspace> {
    let options = load_options(config);
    blocking("parse", config.timeouts.parse(), move || {
        Workspace::load(&root, &options)
    })
    .await
}

/// Checker diagnostics counted by file and message; positions move with edits
fn diagnostic_counts(diagnostics: &[Issue]) -> HashMap<(Option<PathBuf>, String), usize> {
    let mut counts = HashMap::new();
    for issue in diagnostics {
        *counts
            .entry((issue.file.clone(), issue.message.clone()))
            .or_insert(0) += 1;
    }
    counts
}

/// Diagnostics of `after` that `before` did not have
fn introduced(before: &[Issue], after: Vec<Issue>) -> Vec<Issue> {
    let mut remaining = diagnostic_counts(before);
    after
        .into_iter()
        .filter(|issue| {
            match remaining.get_mut(&(issue.file.clone(), issue.message.clone())) {
                Some(count) if *count > 0 => {
                    *count -= 1;
                    false
                }
                _ => true,
            }
        })
        .collect()
}

/// Refuse plans whose edited Go files gain syntax errors
pub fn verify_syntax(ws: &Workspace, plan: &RefactoringPlan) -> RefitResult<()> {
    let mut issues = Vec::new();
    for (path, changes) in plan.changes_by_file() {
        if path.extension().and_then(|e| e.to_str()) != Some("go") {
            continue;
        }
        let created = changes.iter().any(|c| c.kind == ChangeKind::CreateFile);
        let (original, errors_before) = match (created, ws.file(path)) {
            (false, Some(file)) => (file.content.as_str(), file.syntax_errors.len()),
            (true, _) => ("", 0),
            (false, None) => continue,
        };
        let edited = apply_changes(original, &changes)?;
        let tree = parse_go(&edited)?;
        let errors = syntax_errors(&tree, &edited);
        if errors.len() > errors_before {
            let first = &errors[0];
            let position = refit_ast::LineIndex::new(&edited).position(first.start);
            debug!(file = %path.display(), errors = errors.len(), "Edit introduces syntax errors");
            issues.push(
                Issue::error(
                    IssueKind::UnparsableFile,
                    format!("edit leaves a syntax error: {}", first.message),
                )
                .at(ws.relative(path), position),
            );
        }
    }
    if issues.is_empty() {
        Ok(())
    } else {
        Err(RefitError::from_issues(issues))
    }
}

pub struct RefactorEngine {
    workspace: Arc<RwLock<Workspace>>,
    config: AppConfig,
    store: Arc<dyn FileStore>,
    cancel: CancellationToken,
}

impl RefactorEngine {
    pub fn new(workspace: Workspace, config: AppConfig) -> Self {
        Self {
            workspace: Arc::new(RwLock::new(workspace)),
            config,
            store: Arc::new(DiskStore),
            cancel: CancellationToken::new(),
        }
    }

    /// Load the workspace at `root` and wrap it in an engine
    pub async fn open(root: &Path, config: AppConfig) -> RefitResult<Self> {
        let workspace = load(root.to_path_buf(), &config).await?;
        Ok(Self::new(workspace, config))
    }

    /// Replace the filesystem used during execution
    pub fn with_store(mut self, store: Arc<dyn FileStore>) -> Self {
        self.store = store;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Token cancelling in-flight planning and execution
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn check_cancelled(&self, phase: &str) -> RefitResult<()> {
        if self.cancel.is_cancelled() {
            info!(phase, "Request cancelled");
            return Err(RefitError::cancelled(phase));
        }
        Ok(())
    }

    /// Swap in the workspace rooted at `root`
    pub async fn load_workspace(&self, root: &Path) -> RefitResult<()> {
        let workspace = load(root.to_path_buf(), &self.config).await?;
        *self.workspace.write().await = workspace;
        Ok(())
    }

    /// Re-read the current workspace from disk
    pub async fn reload(&self) -> RefitResult<()> {
        let root = self.workspace.read().await.root.clone();
        self.load_workspace(&root).await
    }

    /// Run a read-only closure against the current snapshot
    pub async fn read<R>(&self, f: impl FnOnce(&Workspace) -> R) -> R {
        let guard = self.workspace.read().await;
        f(&guard)
    }

    pub async fn plan(&self, request: RefactorRequest, options: PlanOptions) -> RefitResult<RefactoringPlan> {
        self.check_cancelled("plan")?;
        let guard = self.workspace.clone().read_owned().await;
        debug!(operation = request.operation_name(), "Planning");
        blocking("plan", self.config.timeouts.plan(), move || {
            let ctx = PlanContext::new(&guard, options);
            plan_request(&ctx, &request)
        })
        .await
    }

    pub async fn plan_batch(
        &self,
        requests: Vec<RefactorRequest>,
        options: PlanOptions,
    ) -> RefitResult<RefactoringPlan> {
        self.check_cancelled("plan")?;
        let guard = self.workspace.clone().read_owned().await;
        blocking("plan", self.config.timeouts.plan(), move || {
            let ctx = PlanContext::new(&guard, options);
            plan_batch(&ctx, &requests)
        })
        .await
    }

    /// Checks a plan must pass before execution
    pub async fn validate_plan(&self, plan: &RefactoringPlan, options: &PlanOptions) -> RefitResult<()> {
        plan.check_overlaps()?;
        gate(plan, options)?;
        if self.config.execution.verify_syntax {
            let guard = self.workspace.read().await;
            verify_syntax(&guard, plan)?;
        }
        Ok(())
    }

    /// Unified diff of what executing the plan would write
    pub async fn preview_plan(&self, plan: &RefactoringPlan) -> RefitResult<String> {
        let root = self.workspace.read().await.root.clone();
        let serializer = Serializer::new(self.store.clone(), self.cancel.clone());
        let rendered = serializer.render(plan).await?;
        Ok(render_preview(&root, &rendered))
    }

    /// Apply a plan transactionally.
    ///
    /// Either every file is written and the reloaded workspace passes the
    /// post-execution check, or every file is restored and the error carries
    /// the backup set.
    pub async fn execute_plan(&self, plan: &RefactoringPlan, options: PlanOptions) -> RefitResult<ExecutionResult> {
        let started = Instant::now();
        self.check_cancelled("execute")?;
        self.validate_plan(plan, &options).await?;
        let deadline = started + self.config.timeouts.execute();

        // Step 1: exclusive access until the new snapshot is in place
        let mut guard = self.workspace.write().await;
        let serializer = Serializer::new(self.store.clone(), self.cancel.clone());

        // Step 2: render in memory and refuse plans built from stale content
        let rendered = serializer.render(plan).await?;
        check_fresh(&guard, &rendered)?;
        let baseline = guard.checker_diagnostics();

        // Step 3: back up and write
        let applied = serializer.write(&rendered, Some(deadline)).await?;

        // Step 4: reload and compare checker findings
        let root = guard.root.clone();
        let reloaded = match load(root, &self.config).await {
            Ok(ws) => ws,
            Err(err) => {
                error!(error = %err, "Reload after execution failed, rolling back");
                if let Err(restore_err) = serializer.rollback(&applied).await {
                    warn!(error = %restore_err, "Rollback incomplete");
                }
                return Err(err.with_backups(applied.backups));
            }
        };
        let compilation_checked = !self.config.execution.skip_compilation;
        if compilation_checked {
            let diagnostics = introduced(&baseline, reloaded.checker_diagnostics());
            if !diagnostics.is_empty() {
                error!(
                    operation = %plan.operation,
                    diagnostics = diagnostics.len(),
                    first = %diagnostics[0],
                    "Plan broke the build, rolling back"
                );
                if let Err(restore_err) = serializer.rollback(&applied).await {
                    warn!(error = %restore_err, "Rollback incomplete");
                }
                return Err(RefitError::Compilation {
                    diagnostics,
                    backups: applied.backups,
                });
            }
        }
        *guard = reloaded;
        drop(guard);

        // Step 5: keep or discard backups
        let backups = if self.config.execution.cleanup_backups {
            serializer.discard(&applied.backups).await;
            Vec::new()
        } else {
            applied.backups
        };

        info!(
            operation = %plan.operation,
            modified = applied.modified_files.len(),
            created = applied.created_files.len(),
            compilation_checked,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Plan executed"
        );
        Ok(ExecutionResult {
            operation: plan.operation.clone(),
            modified_files: applied.modified_files,
            created_files: applied.created_files,
            backups,
            warnings: plan.impact.warnings().cloned().collect(),
            compilation_checked,
        })
    }

    pub async fn symbol_at(&self, file: &Path, offset: usize) -> Option<SymbolInfo> {
        let guard = self.workspace.read().await;
        queries::symbol_at(&guard, &guard.absolute(file), offset)
    }

    pub async fn references(&self, file: &Path, offset: usize) -> RefitResult<Vec<Location>> {
        let guard = self.workspace.read().await;
        queries::references_at(&guard, &guard.absolute(file), offset)
    }

    pub async fn describe(&self, name: &str, package: Option<&str>) -> RefitResult<SymbolReport> {
        let guard = self.workspace.read().await;
        queries::describe(&guard, name, package)
    }

    pub async fn summary(&self) -> WorkspaceSummary {
        let guard = self.workspace.read().await;
        queries::summary(&guard)
    }

    pub async fn complexity(&self, min: u32) -> Vec<ComplexityEntry> {
        let guard = self.workspace.read().await;
        queries::complexity(&guard, min)
    }
}

/// Disk content must still match the snapshot the plan was built from
fn check_fresh(ws: &Workspace, rendered: &[Rendered]) -> RefitResult<()> {
    for file in rendered {
        if let Some(source) = ws.file(&file.path) {
            if source.content != file.original {
                let message = format!(
                    "{} changed on disk since the workspace was loaded",
                    ws.relative(&file.path).display()
                );
                return Err(RefitError::conflict(message, Vec::new()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use refit_foundation::Change;
    use std::collections::BTreeMap;

    fn workspace(files: &[(&str, &str)]) -> Workspace {
        let sources: BTreeMap<PathBuf, String> = files
            .iter()
            .map(|(p, c)| (PathBuf::from(p), c.to_string()))
            .collect();
        Workspace::from_sources("/ws", Some("example.com/m"), sources)
    }

    #[test]
    fn test_introduced_ignores_existing_diagnostics() {
        let old = Issue::error(IssueKind::TypeCheck, "undefined: x").in_file("p/p.go");
        let new = Issue::error(IssueKind::TypeCheck, "undefined: y").in_file("p/p.go");
        let result = introduced(&[old.clone()], vec![old.clone(), new.clone(), old.clone()]);
        assert_eq!(result, vec![new, old]);
    }

    #[test]
    fn test_verify_syntax_rejects_broken_edit() {
        let ws = workspace(&[("p/p.go", "package p\n\nfunc Add() {}\n")]);
        let mut plan = RefactoringPlan::new("test", serde_json::Value::Null);
        plan.push(Change::delete("/ws/p/p.go", 22, 23, "drop brace"));
        plan.finalize();
        let err = verify_syntax(&ws, &plan).unwrap_err();
        assert_eq!(err.issues()[0].kind, IssueKind::UnparsableFile);

        let mut fine = RefactoringPlan::new("test", serde_json::Value::Null);
        fine.push(Change::replace("/ws/p/p.go", 16, 19, "Sum", "rename"));
        fine.finalize();
        assert!(verify_syntax(&ws, &fine).is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_engine_refuses_to_plan() {
        let ws = workspace(&[("p/p.go", "package p\n\nfunc Add() {}\n")]);
        let engine = RefactorEngine::new(ws, AppConfig::default());
        engine.cancellation_token().cancel();
        let request: RefactorRequest = serde_json::from_str(
            r#"{"kind":"renameSymbol","symbol":"Add","newName":"Sum"}"#,
        )
        .unwrap();
        let err = engine.plan(request, PlanOptions::default()).await.unwrap_err();
        assert_eq!(err.kind(), refit_foundation::ErrorKind::Cancelled);
    }
}
