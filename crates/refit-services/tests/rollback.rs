mod common;

use async_trait::async_trait;
use common::{config, fixture, snapshot, ADD_P, USE_Q};
use pretty_assertions::assert_eq;
use refit_foundation::{
    Change, ErrorKind, IssueKind, PlanOptions, RefactorRequest, RefactoringPlan, RefitError, RefitResult,
};
use refit_services::{DiskStore, FileStore, RefactorEngine};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Disk store whose n-th write fails
struct FailingStore {
    fail_on: usize,
    writes: AtomicUsize,
    cancel_instead: Option<CancellationToken>,
}

impl FailingStore {
    fn failing(fail_on: usize) -> Self {
        Self {
            fail_on,
            writes: AtomicUsize::new(0),
            cancel_instead: None,
        }
    }

    fn cancelling(after: usize, token: CancellationToken) -> Self {
        Self {
            fail_on: after,
            writes: AtomicUsize::new(0),
            cancel_instead: Some(token),
        }
    }
}

#[async_trait]
impl FileStore for FailingStore {
    async fn read(&self, path: &Path) -> RefitResult<String> {
        DiskStore.read(path).await
    }

    async fn write_atomic(&self, path: &Path, content: &str) -> RefitResult<()> {
        let n = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_on {
            match &self.cancel_instead {
                Some(token) => token.cancel(),
                None => {
                    return Err(RefitError::io(
                        "injected failure",
                        Some(path.to_path_buf()),
                    ))
                }
            }
        }
        DiskStore.write_atomic(path, content).await
    }

    async fn copy(&self, from: &Path, to: &Path) -> RefitResult<()> {
        DiskStore.copy(from, to).await
    }

    async fn remove(&self, path: &Path) -> RefitResult<()> {
        DiskStore.remove(path).await
    }

    async fn exists(&self, path: &Path) -> bool {
        DiskStore.exists(path).await
    }
}

fn move_request() -> RefactorRequest {
    serde_json::from_value(serde_json::json!({
        "kind": "moveSymbol",
        "symbol": "Add",
        "fromPackage": "p",
        "toPackage": "example.com/m/r",
        "createTarget": true
    }))
    .unwrap()
}

#[tokio::test]
async fn test_failure_on_any_write_restores_every_file() {
    // The move touches three files; fail each write position in turn
    for fail_on in 1..=3 {
        let dir = fixture(&[("p/p.go", ADD_P), ("q/q.go", USE_Q)]);
        let before = snapshot(dir.path());
        let engine = RefactorEngine::open(dir.path(), config())
            .await
            .unwrap()
            .with_store(Arc::new(FailingStore::failing(fail_on)));

        let plan = engine.plan(move_request(), PlanOptions::default()).await.unwrap();
        let err = engine.execute_plan(&plan, PlanOptions::default()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Io, "failure on write {}", fail_on);
        assert_eq!(err.backups().len(), 2);
        assert_eq!(snapshot(dir.path()), before, "failure on write {}", fail_on);
        assert!(!dir.path().join("r").join("add.go").exists());
    }
}

#[tokio::test]
async fn test_cancellation_between_writes_rolls_back() {
    let dir = fixture(&[("p/p.go", ADD_P), ("q/q.go", USE_Q)]);
    let before = snapshot(dir.path());
    let engine = RefactorEngine::open(dir.path(), config()).await.unwrap();
    let token = engine.cancellation_token();
    let engine = engine.with_store(Arc::new(FailingStore::cancelling(1, token)));

    let plan = engine.plan(move_request(), PlanOptions::default()).await.unwrap();
    let err = engine.execute_plan(&plan, PlanOptions::default()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(err.backups().len(), 2);
    assert_eq!(snapshot(dir.path()), before);
}

#[tokio::test]
async fn test_compilation_gate_restores_files() {
    let dir = fixture(&[("p/p.go", ADD_P), ("q/q.go", USE_Q)]);
    let before = snapshot(dir.path());
    let engine = RefactorEngine::open(dir.path(), config()).await.unwrap();

    // Rename only the call site: parses fine, but no longer type checks
    let q = dir.path().canonicalize().unwrap().join("q/q.go");
    let call = USE_Q.find("Add(1").unwrap();
    let mut plan = RefactoringPlan::new("test", serde_json::Value::Null);
    plan.push(Change::replace(&q, call, call + 3, "Missing", "break the call"));
    plan.finalize();

    let err = engine.execute_plan(&plan, PlanOptions::default()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Compilation);
    assert!(err
        .issues()
        .iter()
        .any(|i| i.kind == IssueKind::TypeCheck && i.message.contains("Missing")));
    assert_eq!(err.backups().len(), 1);
    assert_eq!(snapshot(dir.path()), before);

    // The engine still serves the pre-execution snapshot
    let report = engine.describe("Add", None).await.unwrap();
    assert_eq!(report.references.len(), 1);
}

#[tokio::test]
async fn test_skip_compilation_keeps_broken_edit() {
    let dir = fixture(&[("p/p.go", ADD_P), ("q/q.go", USE_Q)]);
    let mut config = config();
    config.execution.skip_compilation = true;
    let engine = RefactorEngine::open(dir.path(), config).await.unwrap();

    let q = dir.path().canonicalize().unwrap().join("q/q.go");
    let call = USE_Q.find("Add(1").unwrap();
    let mut plan = RefactoringPlan::new("test", serde_json::Value::Null);
    plan.push(Change::replace(&q, call, call + 3, "Missing", "break the call"));
    plan.finalize();

    let result = engine.execute_plan(&plan, PlanOptions::default()).await.unwrap();
    assert!(!result.compilation_checked);
    assert!(std::fs::read_to_string(&q).unwrap().contains("p.Missing(1, 2)"));
}
