mod common;

use common::{backups, config, engine, fixture, read, snapshot, ADD_P, USE_Q};
use pretty_assertions::assert_eq;
use refit_foundation::{ErrorKind, IssueKind, PlanOptions, RefactorRequest};
use refit_services::RefactorEngine;

fn request(json: serde_json::Value) -> RefactorRequest {
    serde_json::from_value(json).unwrap()
}

#[tokio::test]
async fn test_move_into_new_package_end_to_end() {
    let dir = fixture(&[("p/p.go", ADD_P), ("q/q.go", USE_Q)]);
    let engine = engine(&dir).await;

    let plan = engine
        .plan(
            request(serde_json::json!({
                "kind": "moveSymbol",
                "symbol": "Add",
                "fromPackage": "p",
                "toPackage": "example.com/m/r",
                "createTarget": true
            })),
            PlanOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(plan.affected_files.len(), 3);
    assert_eq!(plan.impact.errors().count(), 0);

    let result = engine.execute_plan(&plan, PlanOptions::default()).await.unwrap();
    assert!(result.compilation_checked);
    assert_eq!(result.created_files.len(), 1);
    assert_eq!(result.modified_files.len(), 2);

    assert_eq!(read(&dir, "r/add.go"), "package r\n\nfunc Add(a, b int) int { return a + b }\n");
    assert_eq!(
        read(&dir, "q/q.go"),
        "package q\n\nimport \"example.com/m/r\"\n\nfunc Use() int { return r.Add(1, 2) }\n"
    );
    // cleanup_backups is on by default
    assert!(backups(dir.path()).is_empty());

    let report = engine.describe("Add", Some("r")).await.unwrap();
    assert_eq!(report.references.len(), 1);
}

#[tokio::test]
async fn test_planning_twice_is_identical() {
    let dir = fixture(&[("p/p.go", ADD_P), ("q/q.go", USE_Q)]);
    let engine = engine(&dir).await;
    let rename = request(serde_json::json!({
        "kind": "renameSymbol",
        "symbol": "Add",
        "newName": "Sum"
    }));
    let first = engine.plan(rename.clone(), PlanOptions::default()).await.unwrap();
    let second = engine.plan(rename, PlanOptions::default()).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[tokio::test]
async fn test_rename_round_trip_restores_bytes() {
    let dir = fixture(&[("p/p.go", ADD_P), ("q/q.go", USE_Q)]);
    let before = snapshot(dir.path());
    let engine = engine(&dir).await;

    let references_before = engine.describe("Add", None).await.unwrap().references.len();
    for (from, to) in [("Add", "Sum"), ("Sum", "Add")] {
        let plan = engine
            .plan(
                request(serde_json::json!({"kind": "renameSymbol", "symbol": from, "newName": to})),
                PlanOptions::default(),
            )
            .await
            .unwrap();
        engine.execute_plan(&plan, PlanOptions::default()).await.unwrap();
        let renamed = engine.describe(to, None).await.unwrap();
        assert_eq!(renamed.references.len(), references_before);
    }
    assert_eq!(snapshot(dir.path()), before);
}

#[tokio::test]
async fn test_preview_does_not_touch_disk() {
    let dir = fixture(&[("p/p.go", ADD_P), ("q/q.go", USE_Q)]);
    let before = snapshot(dir.path());
    let engine = engine(&dir).await;
    let plan = engine
        .plan(
            request(serde_json::json!({"kind": "renameSymbol", "symbol": "Add", "newName": "Sum"})),
            PlanOptions::default(),
        )
        .await
        .unwrap();
    let diff = engine.preview_plan(&plan).await.unwrap();
    assert!(diff.contains("--- a/p/p.go\n+++ b/p/p.go\n"));
    assert!(diff.contains("-func Use() int { return p.Add(1, 2) }\n+func Use() int { return p.Sum(1, 2) }\n"));
    assert_eq!(snapshot(dir.path()), before);
}

#[tokio::test]
async fn test_forced_delete_executes_with_warnings() {
    let dir = fixture(&[
        ("p/p.go", "package p\n\nfunc Helper() int { return 1 }\n\nfunc Keep() {}\n"),
        (
            "q/q.go",
            "package q\n\nimport \"example.com/m/p\"\n\nfunc A() int { return p.Helper() }\n\nfunc B() int { return p.Helper() + 1 }\n",
        ),
    ]);
    let mut config = config();
    config.execution.skip_compilation = true;
    let engine = RefactorEngine::open(dir.path(), config).await.unwrap();

    let plan = engine
        .plan(
            request(serde_json::json!({
                "kind": "safeDelete",
                "symbol": "Helper",
                "sourceFile": "p/p.go",
                "force": true
            })),
            PlanOptions::default(),
        )
        .await
        .unwrap();
    let result = engine.execute_plan(&plan, PlanOptions::default()).await.unwrap();
    assert!(!result.compilation_checked);
    assert_eq!(result.warnings.len(), 2);
    assert!(result.warnings.iter().all(|w| w.kind == IssueKind::UnresolvedReference));
    assert_eq!(read(&dir, "p/p.go"), "package p\n\nfunc Keep() {}\n");
}

#[tokio::test]
async fn test_interface_rename_needs_implementations_flag() {
    let dir = fixture(&[(
        "store/store.go",
        "package store\n\ntype Reader interface {\n\tRead() string\n}\n\ntype File struct{}\n\nfunc (f File) Read() string { return \"\" }\n\nfunc Use(r Reader) string { return r.Read() }\n",
    )]);
    let engine = engine(&dir).await;
    let rename = |flag: bool| {
        request(serde_json::json!({
            "kind": "renameSymbol",
            "symbol": "Reader.Read",
            "newName": "Fetch",
            "renameImplementations": flag
        }))
    };
    let err = engine.plan(rename(false), PlanOptions::default()).await.unwrap_err();
    assert!(err.issues().iter().any(|i| i.kind == IssueKind::SignatureBreak));

    let plan = engine.plan(rename(true), PlanOptions::default()).await.unwrap();
    engine.execute_plan(&plan, PlanOptions::default()).await.unwrap();
    let content = read(&dir, "store/store.go");
    assert!(content.contains("\tFetch() string\n"));
    assert!(content.contains("func (f File) Fetch() string"));
    assert!(content.contains("return r.Fetch()"));
}

#[tokio::test]
async fn test_stale_plan_is_refused() {
    let dir = fixture(&[("p/p.go", ADD_P), ("q/q.go", USE_Q)]);
    let engine = engine(&dir).await;
    let plan = engine
        .plan(
            request(serde_json::json!({"kind": "renameSymbol", "symbol": "Add", "newName": "Sum"})),
            PlanOptions::default(),
        )
        .await
        .unwrap();
    std::fs::write(dir.path().join("p/p.go"), format!("// edited\n{}", ADD_P)).unwrap();
    let err = engine.execute_plan(&plan, PlanOptions::default()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(read(&dir, "q/q.go").contains("p.Add(1, 2)"));
}

#[tokio::test]
async fn test_backups_kept_when_cleanup_disabled() {
    let dir = fixture(&[("p/p.go", ADD_P), ("q/q.go", USE_Q)]);
    let mut config = config();
    config.execution.cleanup_backups = false;
    let engine = RefactorEngine::open(dir.path(), config).await.unwrap();
    let plan = engine
        .plan(
            request(serde_json::json!({"kind": "renameSymbol", "symbol": "Add", "newName": "Sum"})),
            PlanOptions::default(),
        )
        .await
        .unwrap();
    let result = engine.execute_plan(&plan, PlanOptions::default()).await.unwrap();
    assert_eq!(result.backups.len(), 2);
    assert_eq!(backups(dir.path()).len(), 2);
    for backup in &result.backups {
        let name = backup.backup.file_name().unwrap().to_string_lossy().to_string();
        let stamp = name.rsplit(".bak.").next().unwrap();
        assert_eq!(stamp.len(), 17);
        assert!(stamp.chars().all(|c| c.is_ascii_digit()));
    }
}

#[tokio::test]
async fn test_batch_executes_as_one_plan() {
    let dir = fixture(&[
        ("p/p.go", "package p\n\nfunc Add(a, b int) int { return a + b }\n\nfunc unused() {}\n"),
        ("q/q.go", USE_Q),
    ]);
    let engine = engine(&dir).await;
    let requests = refit_services::BatchFile::parse(
        r#"[
            {"kind": "renameSymbol", "symbol": "Add", "newName": "Sum"},
            {"kind": "safeDelete", "symbol": "unused", "sourceFile": "p/p.go"}
        ]"#,
    )
    .unwrap();
    let plan = engine.plan_batch(requests, PlanOptions::default()).await.unwrap();
    engine.execute_plan(&plan, PlanOptions::default()).await.unwrap();
    let p = read(&dir, "p/p.go");
    assert!(p.contains("func Sum(a, b int) int { return a + b }"));
    assert!(!p.contains("unused"));
    assert!(read(&dir, "q/q.go").contains("p.Sum(1, 2)"));
}
