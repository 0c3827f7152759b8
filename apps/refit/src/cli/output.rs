//! Human and JSON rendering of command results

use refit_foundation::{ErrorKind, ExecutionResult, Issue, RefactoringPlan, RefitError};
use refit_services::{ComplexityEntry, Location, SymbolReport, WorkspaceSummary};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};

fn relative(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_issues(issues: &[Issue], root: &Path) {
    for issue in issues {
        let mut issue = issue.clone();
        if let Some(file) = &issue.file {
            issue.file = Some(relative(root, file));
        }
        eprintln!("   {}", issue);
    }
}

/// Usage errors exit with 2, every other failure with 1
pub fn exit_code(err: &RefitError) -> i32 {
    match err.kind() {
        ErrorKind::Usage => 2,
        _ => 1,
    }
}

/// Print `err` and return the exit code it maps to
pub fn report_error(err: &anyhow::Error, json: bool) -> i32 {
    let Some(refit) = err.downcast_ref::<RefitError>() else {
        if json {
            println!("{}", json!({ "error": { "kind": "io", "message": format!("{:#}", err) } }));
        } else {
            eprintln!("❌ Error: {:#}", err);
        }
        return 1;
    };
    if json {
        println!("{}", json!({ "error": refit.report() }));
    } else {
        eprintln!("❌ Error: {}", refit);
        print_issues(refit.issues(), Path::new(""));
        for backup in refit.backups() {
            eprintln!("   backup kept: {}", backup.backup.display());
        }
    }
    exit_code(refit)
}

pub fn dry_run(
    plan: &RefactoringPlan,
    preview: &str,
    verdict: Option<&RefitError>,
    root: &Path,
    json: bool,
) -> anyhow::Result<()> {
    if json {
        return print_json(&json!({
            "dryRun": true,
            "plan": plan,
            "preview": preview,
            "error": verdict.map(RefitError::report),
        }));
    }
    print!("{}", preview);
    eprintln!(
        "🔍 Dry run: {} change(s) in {} file(s), {} reference(s)",
        plan.changes.len(),
        plan.affected_files.len(),
        plan.impact.references
    );
    match verdict {
        Some(err) => {
            eprintln!("❌ Plan would be rejected: {}", err);
            print_issues(err.issues(), root);
        }
        None => print_issues(&plan.impact.issues, root),
    }
    Ok(())
}

pub fn executed(result: &ExecutionResult, root: &Path, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(result);
    }
    println!(
        "✅ {}: {} file(s) modified, {} created",
        result.operation,
        result.modified_files.len(),
        result.created_files.len()
    );
    for file in &result.modified_files {
        println!("   M {}", relative(root, file).display());
    }
    for file in &result.created_files {
        println!("   A {}", relative(root, file).display());
    }
    for backup in &result.backups {
        println!("   backup {}", relative(root, &backup.backup).display());
    }
    if !result.compilation_checked {
        eprintln!("⚠️  Type check skipped");
    }
    print_issues(&result.warnings, root);
    Ok(())
}

pub fn summary(summary: &WorkspaceSummary, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(summary);
    }
    println!("Workspace: {}", summary.root.display());
    if let Some(module) = &summary.module {
        println!("Module:    {}", module);
    }
    println!("Packages:  {}", summary.packages);
    println!("Files:     {}", summary.files);
    println!("Symbols:   {}", summary.symbols);
    if !summary.diagnostics.is_empty() {
        println!("Diagnostics:");
        for issue in &summary.diagnostics {
            let mut issue = issue.clone();
            if let Some(file) = &issue.file {
                issue.file = Some(relative(&summary.root, file));
            }
            println!("   {}", issue);
        }
    }
    Ok(())
}

fn location(root: &Path, location: &Location) -> String {
    format!(
        "{}:{}",
        relative(root, &location.file).display(),
        location.position
    )
}

pub fn symbol_report(report: &SymbolReport, root: &Path, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(report);
    }
    let symbol = &report.symbol;
    let kind = symbol
        .kind
        .map(|k| k.to_string())
        .unwrap_or_else(|| "local".to_string());
    println!("{} {} (package {})", kind, symbol.name, symbol.package);
    if let Some(detail) = &symbol.detail {
        println!("   {}", detail);
    }
    println!("   defined at {}", location(root, &symbol.definition));
    if !symbol.exported {
        println!("   unexported");
    }
    println!("References: {}", report.references.len());
    for reference in &report.references {
        println!("   {}", location(root, reference));
    }
    if !report.implementations.is_empty() {
        println!("Implementations:");
        for implementation in &report.implementations {
            println!(
                "   {} at {}",
                implementation.name,
                location(root, &implementation.definition)
            );
        }
    }
    Ok(())
}

pub fn complexity(entries: &[ComplexityEntry], min: u32, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No functions with complexity >= {}", min);
        return Ok(());
    }
    for entry in entries {
        println!(
            "{:>4}  {}:{}  {}",
            entry.complexity,
            entry.file.display(),
            entry.line,
            entry.function
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&RefitError::usage("bad name")), 2);
        assert_eq!(exit_code(&RefitError::not_found("Missing")), 1);
    }

    #[test]
    fn test_report_error_maps_wrapped_errors() {
        let err = anyhow::Error::new(RefitError::usage("bad name"));
        assert_eq!(report_error(&err, true), 2);
        let other = anyhow::anyhow!("disk full");
        assert_eq!(report_error(&other, false), 1);
    }

    #[test]
    fn test_relative_paths() {
        assert_eq!(
            relative(Path::new("/ws"), Path::new("/ws/p/p.go")),
            PathBuf::from("p/p.go")
        );
        assert_eq!(
            relative(Path::new("/ws"), Path::new("/elsewhere/x.go")),
            PathBuf::from("/elsewhere/x.go")
        );
    }
}
