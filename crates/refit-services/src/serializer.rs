//! Transactional application of plans to disk
//!
//! A plan is rendered completely in memory before anything is written. Every
//! existing file is then copied to `<path>.bak.<timestamp>`, and each new
//! content is written through a temporary file in the same directory that is
//! persisted over the target. If any step fails, files are restored from
//! their backups in reverse order and files the plan created are removed, so
//! a plan is either applied completely or not at all.

use async_trait::async_trait;
use chrono::Utc;
use refit_foundation::{
    apply_changes, Backup, ChangeKind, Issue, IssueKind, RefactoringPlan, RefitError, RefitResult,
};
use std::ffi::OsString;
use std::fmt::Display;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Filesystem access used during execution
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn read(&self, path: &Path) -> RefitResult<String>;

    /// Replace `path` with `content` so readers never observe a partial file
    async fn write_atomic(&self, path: &Path, content: &str) -> RefitResult<()>;

    async fn copy(&self, from: &Path, to: &Path) -> RefitResult<()>;

    async fn remove(&self, path: &Path) -> RefitResult<()>;

    async fn exists(&self, path: &Path) -> bool;
}

fn io_error(action: &str, path: &Path, err: impl Display) -> RefitError {
    RefitError::io(
        format!("Failed to {} {}: {}", action, path.display(), err),
        Some(path.to_path_buf()),
    )
}

/// The real filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskStore;

#[async_trait]
impl FileStore for DiskStore {
    async fn read(&self, path: &Path) -> RefitResult<String> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| io_error("read", path, e))
    }

    async fn write_atomic(&self, path: &Path, content: &str) -> RefitResult<()> {
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_error("create directory", &dir, e))?;

        let target = path.to_path_buf();
        let content = content.to_string();
        tokio::task::spawn_blocking(move || -> RefitResult<()> {
            let mut temp = NamedTempFile::new_in(&dir)
                .map_err(|e| io_error("create temporary file in", &dir, e))?;
            temp.write_all(content.as_bytes())
                .map_err(|e| io_error("write", &target, e))?;
            if let Ok(metadata) = std::fs::metadata(&target) {
                temp.as_file()
                    .set_permissions(metadata.permissions())
                    .map_err(|e| io_error("set permissions on", &target, e))?;
            }
            temp.as_file()
                .sync_all()
                .map_err(|e| io_error("sync", &target, e))?;
            temp.persist(&target)
                .map_err(|e| io_error("replace", &target, e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| io_error("write", path, e))?
    }

    async fn copy(&self, from: &Path, to: &Path) -> RefitResult<()> {
        tokio::fs::copy(from, to)
            .await
            .map(|_| ())
            .map_err(|e| io_error("copy", from, e))
    }

    async fn remove(&self, path: &Path) -> RefitResult<()> {
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| io_error("remove", path, e))
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }
}

/// New content of one file, computed before anything is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub path: PathBuf,
    pub original: String,
    pub content: String,
    /// The plan creates this file
    pub created: bool,
}

/// Files touched by a completed write phase
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applied {
    pub modified_files: Vec<PathBuf>,
    pub created_files: Vec<PathBuf>,
    pub backups: Vec<Backup>,
}

/// `<path>.bak.<timestamp>`
pub fn backup_path(path: &Path, stamp: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(format!(".bak.{}", stamp));
    PathBuf::from(name)
}

pub fn backup_stamp() -> String {
    Utc::now().format("%Y%m%d%H%M%S%3f").to_string()
}

pub struct Serializer {
    store: Arc<dyn FileStore>,
    cancel: CancellationToken,
}

impl Serializer {
    pub fn new(store: Arc<dyn FileStore>, cancel: CancellationToken) -> Self {
        Self { store, cancel }
    }

    /// Compute the post-plan content of every affected file
    pub async fn render(&self, plan: &RefactoringPlan) -> RefitResult<Vec<Rendered>> {
        plan.check_overlaps()?;
        let mut rendered = Vec::new();
        for (path, changes) in plan.changes_by_file() {
            let created = changes.iter().any(|c| c.kind == ChangeKind::CreateFile);
            let exists = self.store.exists(path).await;
            let original = match (created, exists) {
                (true, true) => {
                    let message = format!("{} already exists", path.display());
                    return Err(RefitError::conflict(
                        message.clone(),
                        vec![Issue::error(IssueKind::NameConflict, message).in_file(path)],
                    ));
                }
                (true, false) => String::new(),
                (false, false) => {
                    return Err(RefitError::not_found(format!("file {}", path.display())))
                }
                (false, true) => self.store.read(path).await?,
            };
            let content = apply_changes(&original, &changes)?;
            rendered.push(Rendered {
                path: path.to_path_buf(),
                original,
                content,
                created,
            });
        }
        Ok(rendered)
    }

    fn checkpoint(&self, deadline: Option<Instant>) -> RefitResult<()> {
        if self.cancel.is_cancelled() {
            return Err(RefitError::cancelled("write"));
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(RefitError::cancelled("execute (timeout)"));
        }
        Ok(())
    }

    /// Render and write a plan
    pub async fn apply(&self, plan: &RefactoringPlan, deadline: Option<Instant>) -> RefitResult<Applied> {
        let rendered = self.render(plan).await?;
        self.write(&rendered, deadline).await
    }

    /// Back up and write rendered files, rolling back on the first failure
    pub async fn write(&self, rendered: &[Rendered], deadline: Option<Instant>) -> RefitResult<Applied> {
        if rendered.is_empty() {
            return Ok(Applied::default());
        }
        self.checkpoint(deadline)?;

        // Step 1: back up every file that already exists
        let backups = self.back_up(rendered).await?;

        // Step 2: write, checking for cancellation between files
        let mut applied = Applied {
            backups,
            ..Default::default()
        };
        for file in rendered {
            let result = match self.checkpoint(deadline) {
                Ok(()) => self.store.write_atomic(&file.path, &file.content).await,
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                error!(
                    file = %file.path.display(),
                    error = %err,
                    written = applied.modified_files.len() + applied.created_files.len(),
                    "Write failed, rolling back"
                );
                if let Err(restore_err) = self.rollback(&applied).await {
                    warn!(error = %restore_err, "Rollback incomplete");
                }
                return Err(err.with_backups(applied.backups));
            }
            debug!(file = %file.path.display(), created = file.created, "Wrote file");
            if file.created {
                applied.created_files.push(file.path.clone());
            } else {
                applied.modified_files.push(file.path.clone());
            }
        }

        info!(
            modified = applied.modified_files.len(),
            created = applied.created_files.len(),
            backups = applied.backups.len(),
            "Plan written"
        );
        Ok(applied)
    }

    async fn back_up(&self, rendered: &[Rendered]) -> RefitResult<Vec<Backup>> {
        let stamp = backup_stamp();
        let mut backups = Vec::new();
        for file in rendered.iter().filter(|f| !f.created) {
            let backup = backup_path(&file.path, &stamp);
            if let Err(err) = self.store.copy(&file.path, &backup).await {
                self.discard(&backups).await;
                return Err(err);
            }
            backups.push(Backup {
                original: file.path.clone(),
                backup,
            });
        }
        debug!(count = backups.len(), stamp = %stamp, "Backups taken");
        Ok(backups)
    }

    /// Restore backed-up files in reverse order and remove created files.
    ///
    /// Every step is attempted; the first failure is returned.
    pub async fn rollback(&self, applied: &Applied) -> RefitResult<()> {
        let mut first_error = None;
        for backup in applied.backups.iter().rev() {
            if let Err(err) = self.store.copy(&backup.backup, &backup.original).await {
                warn!(file = %backup.original.display(), error = %err, "Failed to restore file");
                first_error.get_or_insert(err);
            }
        }
        for created in applied.created_files.iter().rev() {
            if let Err(err) = self.store.remove(created).await {
                warn!(file = %created.display(), error = %err, "Failed to remove created file");
                first_error.get_or_insert(err);
            }
        }
        info!(
            restored = applied.backups.len(),
            removed = applied.created_files.len(),
            "Rolled back"
        );
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Delete backup files
    pub async fn discard(&self, backups: &[Backup]) {
        for backup in backups {
            if let Err(err) = self.store.remove(&backup.backup).await {
                warn!(file = %backup.backup.display(), error = %err, "Failed to delete backup");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use refit_foundation::{Change, ErrorKind};
    use tempfile::TempDir;

    fn serializer() -> Serializer {
        Serializer::new(Arc::new(DiskStore), CancellationToken::new())
    }

    fn plan(changes: Vec<Change>) -> RefactoringPlan {
        let mut plan = RefactoringPlan::new("test", serde_json::Value::Null);
        plan.extend(changes);
        plan.finalize();
        plan
    }

    #[test]
    fn test_backup_path_appends_suffix() {
        assert_eq!(
            backup_path(Path::new("/ws/p/p.go"), "20240101120000123"),
            PathBuf::from("/ws/p/p.go.bak.20240101120000123")
        );
        assert_eq!(backup_stamp().len(), 17);
    }

    #[tokio::test]
    async fn test_apply_writes_and_keeps_backups() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("p.go");
        std::fs::write(&path, "package p\n\nfunc Add() {}\n").unwrap();
        let created = dir.path().join("q").join("q.go");

        let plan = plan(vec![
            Change::replace(&path, 16, 19, "Sum", "rename"),
            Change::create_file(&created, "package q\n", "create"),
        ]);
        let applied = serializer().apply(&plan, None).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "package p\n\nfunc Sum() {}\n");
        assert_eq!(std::fs::read_to_string(&created).unwrap(), "package q\n");
        assert_eq!(applied.modified_files, vec![path.clone()]);
        assert_eq!(applied.created_files, vec![created]);
        assert_eq!(applied.backups.len(), 1);
        assert_eq!(
            std::fs::read_to_string(&applied.backups[0].backup).unwrap(),
            "package p\n\nfunc Add() {}\n"
        );
    }

    #[tokio::test]
    async fn test_overlap_rejected_before_writing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("p.go");
        std::fs::write(&path, "package p\n").unwrap();
        let plan = plan(vec![
            Change::replace(&path, 0, 7, "x", "a"),
            Change::replace(&path, 3, 9, "y", "b"),
        ]);
        let err = serializer().apply(&plan, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Overlap);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "package p\n");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_creating_an_existing_file_conflicts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("p.go");
        std::fs::write(&path, "package p\n").unwrap();
        let plan = plan(vec![Change::create_file(&path, "package q\n", "create")]);
        let err = serializer().apply(&plan, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_cancelled_before_writing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("p.go");
        std::fs::write(&path, "package p\n").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let serializer = Serializer::new(Arc::new(DiskStore), cancel);
        let plan = plan(vec![Change::insert(&path, 10, "\nvar X = 1\n", "add")]);
        let err = serializer.apply(&plan, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "package p\n");
    }
}
