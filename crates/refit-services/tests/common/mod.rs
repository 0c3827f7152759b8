//! Shared test utilities

#![allow(dead_code)]

use refit_config::AppConfig;
use refit_services::RefactorEngine;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const MODULE: &str = "module example.com/m\n\ngo 1.21\n";

/// Write a Go module with `files` into a fresh temporary directory
pub fn fixture(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("go.mod"), MODULE).unwrap();
    for (path, content) in files {
        let path = dir.path().join(path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
    dir
}

pub fn read(dir: &TempDir, path: &str) -> String {
    std::fs::read_to_string(dir.path().join(path)).unwrap()
}

/// Every file under `root` except backups, keyed by relative path
pub fn snapshot(root: &Path) -> BTreeMap<PathBuf, String> {
    fn visit(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, String>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                visit(root, &path, out);
            } else if !path.to_string_lossy().contains(".bak.") {
                let relative = path.strip_prefix(root).unwrap().to_path_buf();
                out.insert(relative, std::fs::read_to_string(&path).unwrap());
            }
        }
    }
    let mut out = BTreeMap::new();
    visit(root, root, &mut out);
    out
}

/// Backup files left under `root`
pub fn backups(root: &Path) -> Vec<PathBuf> {
    fn visit(dir: &Path, out: &mut Vec<PathBuf>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                visit(&path, out);
            } else if path.to_string_lossy().contains(".bak.") {
                out.push(path);
            }
        }
    }
    let mut out = Vec::new();
    visit(root, &mut out);
    out.sort();
    out
}

pub fn config() -> AppConfig {
    AppConfig::default()
}

pub async fn engine(dir: &TempDir) -> RefactorEngine {
    RefactorEngine::open(dir.path(), config()).await.unwrap()
}

pub const ADD_P: &str = "package p\n\nfunc Add(a, b int) int { return a + b }\n";

pub const USE_Q: &str =
    "package q\n\nimport \"example.com/m/p\"\n\nfunc Use() int { return p.Add(1, 2) }\n";
