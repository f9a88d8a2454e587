//! Report → human/json string formatting.
//!
//! Two modes:
//! - **Human** (default): one line per fact, warnings prefixed `warning:`
//! - **JSON** (`--json`): `serde_json::to_string_pretty`

use std::path::Path;

use mintd_bundle::TransferManifest;
use mintd_core::DependencyRecord;
use mintd_engine::catalog_update::CatalogUpdate;
use mintd_engine::enclave::{
    CleanReport, EnclaveWarning, PackageReport, ProductListing, PullReport, VerifyReport,
};
use mintd_engine::error::{
    CatalogUpdateError, ConfigError, EnclaveError, ImportError, RegistryError,
};
use mintd_engine::fetch::FetchOutcome;
use mintd_engine::import::ImportReport;
use mintd_engine::registry::{ProductSummary, RegistrationOutcome, RegistrationStatus, RetryResult};
use mintd_engine::MintConfig;
use serde_json::{json, Value};

/// Output formatting mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

/// A hard failure, ready to print.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub message: String,
    pub suggestion: Option<String>,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
        }
    }
}

macro_rules! failure_from {
    ($($ty:ty),* $(,)?) => {
        $(impl From<$ty> for Failure {
            fn from(e: $ty) -> Self {
                Self {
                    message: e.to_string(),
                    suggestion: e.suggestion(),
                }
            }
        })*
    };
}

failure_from!(EnclaveError, ImportError, RegistryError, CatalogUpdateError);

impl From<ConfigError> for Failure {
    fn from(e: ConfigError) -> Self {
        Self::new(e.to_string())
    }
}

impl From<mintd_core::CoreError> for Failure {
    fn from(e: mintd_core::CoreError) -> Self {
        Self::new(e.to_string())
    }
}

fn pretty(v: Value) -> String {
    serde_json::to_string_pretty(&v).unwrap_or_else(|_| v.to_string())
}

/// Format an error.
pub fn format_error(err: &Failure, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => pretty(json!({
            "error": err.message,
            "suggestion": err.suggestion,
        })),
        OutputMode::Human => match &err.suggestion {
            Some(s) => format!("error: {}\n  hint: {}", err.message, s),
            None => format!("error: {}", err.message),
        },
    }
}

fn warning_lines(warnings: &[EnclaveWarning]) -> Vec<String> {
    warnings.iter().map(|w| format!("warning: {}", w)).collect()
}

fn warning_values(warnings: &[EnclaveWarning]) -> Vec<String> {
    warnings.iter().map(|w| w.to_string()).collect()
}

// =========================================================================
// Enclave
// =========================================================================

pub fn format_init(root: &Path, name: &str, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => pretty(json!({ "root": root, "enclave_name": name })),
        OutputMode::Human => format!("Enclave '{}' ready at {}", name, root.display()),
    }
}

pub fn format_add(repo: &str, stage: &str, warning: Option<&EnclaveWarning>, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => pretty(json!({
            "repo": repo,
            "stage": stage,
            "warning": warning.map(|w| w.to_string()),
        })),
        OutputMode::Human => match warning {
            Some(w) => format!("warning: {}", w),
            None => format!("Approved {} (stage: {})", repo, stage),
        },
    }
}

pub fn format_listing(listing: &[ProductListing], mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => pretty(Value::Array(
            listing
                .iter()
                .map(|l| {
                    json!({
                        "repo": l.product.repo,
                        "stage": l.product.stage,
                        "registry_entry": l.product.registry_entry,
                        "transfers": l.transfers.iter().map(|t| json!({
                            "content_hash": t.content_hash,
                            "transfer_date": t.transfer_date,
                            "transfer_id": t.transfer_id,
                            "local_path": t.local_path,
                        })).collect::<Vec<_>>(),
                    })
                })
                .collect(),
        )),
        OutputMode::Human => {
            if listing.is_empty() {
                return "No approved products".to_string();
            }
            let mut lines = Vec::new();
            for l in listing {
                lines.push(format!(
                    "{} (stage: {}, {} transferred)",
                    l.product.repo,
                    l.product.stage,
                    l.transfers.len()
                ));
                for t in &l.transfers {
                    lines.push(format!(
                        "  {}  {}  {}",
                        t.transfer_date, t.transfer_id, t.local_path
                    ));
                }
            }
            lines.join("\n")
        }
    }
}

pub fn format_pull(report: &PullReport, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => pretty(Value::Array(
            report
                .repos
                .iter()
                .map(|r| match &r.result {
                    Ok(v) => json!({
                        "repo": r.repo,
                        "version": v.version.as_str(),
                        "content_hash": v.content_hash,
                        "source_revision": v.source_revision,
                        "local_path": v.local_path,
                        "warnings": warning_values(&v.warnings),
                    }),
                    Err(e) => json!({
                        "repo": r.repo,
                        "error": e.to_string(),
                        "suggestion": e.suggestion(),
                    }),
                })
                .collect(),
        )),
        OutputMode::Human => {
            let mut lines = Vec::new();
            for r in &report.repos {
                match &r.result {
                    Ok(v) => {
                        lines.push(format!("{}: promoted {} -> {}", r.repo, v.version, v.local_path));
                        lines.extend(warning_lines(&v.warnings));
                    }
                    Err(e) => {
                        lines.push(format!("{}: failed: {}", r.repo, e));
                        if let Some(s) = e.suggestion() {
                            lines.push(format!("  hint: {}", s));
                        }
                    }
                }
            }
            lines.join("\n")
        }
    }
}

pub fn format_package(report: &PackageReport, mode: OutputMode) -> String {
    let b = &report.bundle;
    match mode {
        OutputMode::Json => pretty(json!({
            "path": b.path,
            "transfer_id": b.transfer_id,
            "entries": report.entries.iter().map(|e| json!({
                "repo": e.repo,
                "version_folder": e.version_folder,
                "content_hash": e.content_hash,
            })).collect::<Vec<_>>(),
            "bundle_size_bytes": b.bundle_size_bytes,
            "checksum": b.checksum,
            "warnings": warning_values(&report.warnings),
        })),
        OutputMode::Human => {
            let mut lines = warning_lines(&report.warnings);
            for e in &report.entries {
                lines.push(format!("  {}/{}", e.repo, e.version_folder));
            }
            lines.push(format!(
                "Packaged {} version(s) into {} ({} bytes, xxh3 {})",
                b.entry_count,
                b.path.display(),
                b.bundle_size_bytes,
                b.checksum
            ));
            lines.join("\n")
        }
    }
}

pub fn format_unpack(dest: &Path, manifest: &TransferManifest, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => pretty(json!({
            "dest": dest,
            "transfer_id": manifest.transfer_id,
            "enclave_name": manifest.enclave_name,
            "entries": manifest.contents.len(),
        })),
        OutputMode::Human => format!(
            "Unpacked {} ({} version(s)) to {}",
            manifest.transfer_id,
            manifest.contents.len(),
            dest.display()
        ),
    }
}

pub fn format_verify(report: &VerifyReport, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => pretty(json!({
            "transfer_id": report.transfer_id,
            "installed": report.installed.iter().map(|i| json!({
                "repo": i.repo,
                "version": i.version,
                "local_path": i.local_path,
            })).collect::<Vec<_>>(),
            "warnings": warning_values(&report.warnings),
        })),
        OutputMode::Human => {
            let mut lines = warning_lines(&report.warnings);
            for i in &report.installed {
                lines.push(format!("  {} -> {}", i.repo, i.local_path));
            }
            lines.push(format!(
                "Verified {}: {} version(s) installed",
                report.transfer_id,
                report.installed.len()
            ));
            lines.join("\n")
        }
    }
}

pub fn format_clean(report: &CleanReport, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => pretty(json!({
            "staging_removed": report.staging_removed,
            "versions_removed": report.versions_removed.iter().map(|v| json!({
                "repo": v.repo,
                "version": v.version,
            })).collect::<Vec<_>>(),
            "manifest_entries_removed": report.manifest_entries_removed,
        })),
        OutputMode::Human => {
            let mut lines: Vec<String> = report
                .versions_removed
                .iter()
                .map(|v| format!("  removed {}/{}", v.repo, v.version))
                .collect();
            lines.push(format!(
                "Removed {} staging clone(s), {} version(s), {} manifest record(s)",
                report.staging_removed.len(),
                report.versions_removed.len(),
                report.manifest_entries_removed
            ));
            lines.join("\n")
        }
    }
}

// =========================================================================
// Data
// =========================================================================

pub fn format_fetch(outcome: &FetchOutcome, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => pretty(json!({
            "product": outcome.product,
            "source": outcome.source,
            "dest": outcome.dest.display().to_string(),
            "source_revision": outcome.source_revision,
        })),
        OutputMode::Human => format!(
            "{}: pulled {} to {}",
            outcome.product,
            outcome.source,
            outcome.dest.display()
        ),
    }
}

pub fn format_import(report: &ImportReport, mode: OutputMode) -> String {
    let summary = report.summary();
    match mode {
        OutputMode::Json => pretty(json!({
            "summary": summary,
            "completed": report.transaction.completed(),
            "failed": report.transaction.failed(),
            "metadata_errors": report.imports.iter().filter_map(|i| match &i.result {
                Ok(o) => o.metadata_error.as_ref().map(|e| json!({
                    "product": i.product,
                    "error": e.to_string(),
                })),
                Err(_) => None,
            }).collect::<Vec<_>>(),
        })),
        OutputMode::Human => {
            let mut lines = Vec::new();
            for i in &report.imports {
                match &i.result {
                    Ok(o) => {
                        lines.push(format!(
                            "{}: imported to {} ({})",
                            i.product,
                            o.result.local_path.as_deref().unwrap_or_default(),
                            o.result.artifact_pointer.as_deref().unwrap_or_default()
                        ));
                        if let Some(e) = &o.metadata_error {
                            lines.push(format!("warning: import succeeded but {}", e));
                        }
                    }
                    Err(e) => {
                        lines.push(format!("{}: failed: {}", i.product, e));
                        if let Some(s) = e.suggestion() {
                            lines.push(format!("  hint: {}", s));
                        }
                    }
                }
            }
            lines.push(format!(
                "{} imported, {} failed",
                summary.successful, summary.failed
            ));
            if summary.failed > 0 {
                lines.push(format!(
                    "State saved to {}",
                    report.transaction.state_path().display()
                ));
            }
            lines.join("\n")
        }
    }
}

pub fn format_products(products: &[ProductSummary], mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => pretty(json!(products)),
        OutputMode::Human => {
            if products.is_empty() {
                return "No data products registered".to_string();
            }
            products
                .iter()
                .map(|p| {
                    let description = if p.description.is_empty() {
                        "N/A"
                    } else {
                        p.description.as_str()
                    };
                    format!("{}\n  {}", p.name, description)
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
    }
}

pub fn format_dependencies(deps: &[DependencyRecord], mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => pretty(json!(deps)),
        OutputMode::Human => {
            if deps.is_empty() {
                return "No data dependencies found in this project".to_string();
            }
            deps.iter()
                .map(|d| {
                    let stage = if d.stage.is_empty() { "N/A" } else { d.stage.as_str() };
                    format!(
                        "{}\n  stage: {}\n  local path: {}\n  imported: {}",
                        d.source, stage, d.local_path, d.imported_at
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
    }
}

// =========================================================================
// Registry
// =========================================================================

pub fn format_registration(outcome: &RegistrationOutcome, mode: OutputMode) -> String {
    match (outcome, mode) {
        (RegistrationOutcome::Submitted { pr_url }, OutputMode::Json) => {
            pretty(json!({ "status": "submitted", "pr_url": pr_url }))
        }
        (RegistrationOutcome::Submitted { pr_url }, OutputMode::Human) => {
            format!("Registration submitted for review: {}", pr_url)
        }
        (RegistrationOutcome::Deferred { pending_file, error }, OutputMode::Json) => pretty(json!({
            "status": "deferred",
            "pending_file": pending_file,
            "error": error.to_string(),
        })),
        (RegistrationOutcome::Deferred { pending_file, error }, OutputMode::Human) => format!(
            "warning: registration failed: {}\nSaved to {}; run 'mintd registry retry' later",
            error,
            pending_file.display()
        ),
    }
}

pub fn format_status(name: &str, status: &RegistrationStatus, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => match status {
            RegistrationStatus::Registered { kind, full_name, url } => pretty(json!({
                "name": name,
                "status": "registered",
                "type": kind.type_name(),
                "full_name": full_name,
                "url": url,
            })),
            RegistrationStatus::PendingReview { pr_url, pr_title } => pretty(json!({
                "name": name,
                "status": "pending",
                "pr_url": pr_url,
                "pr_title": pr_title,
            })),
            RegistrationStatus::NotFound => pretty(json!({ "name": name, "status": "not_found" })),
        },
        OutputMode::Human => match status {
            RegistrationStatus::Registered { full_name, url, .. } => {
                format!("{} is registered as {}\n  {}", name, full_name, url)
            }
            RegistrationStatus::PendingReview { pr_url, pr_title } => {
                format!("{} is pending review: {}\n  {}", name, pr_title, pr_url)
            }
            RegistrationStatus::NotFound => format!("{} is not registered", name),
        },
    }
}

pub fn format_retry(results: &[RetryResult], mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => pretty(Value::Array(
            results
                .iter()
                .map(|r| match &r.outcome {
                    Ok(url) => json!({ "full_name": r.full_name, "pr_url": url }),
                    Err(e) => json!({ "full_name": r.full_name, "error": e.to_string() }),
                })
                .collect(),
        )),
        OutputMode::Human => {
            if results.is_empty() {
                return "No pending registrations".to_string();
            }
            results
                .iter()
                .map(|r| match &r.outcome {
                    Ok(url) => format!("{}: submitted {}", r.full_name, url),
                    Err(e) => format!("{}: still failing: {}", r.full_name, e),
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
    }
}

pub fn format_catalog_update(update: &CatalogUpdate, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => {
            let changes: Vec<Value> = update
                .changes()
                .iter()
                .map(|c| json!({
                    "path": c.path,
                    "old": c.old.as_ref().map(|v| v.render()),
                    "new": c.new.as_ref().map(|v| v.render()),
                }))
                .collect();
            match update {
                CatalogUpdate::NoChanges => pretty(json!({ "status": "no_changes" })),
                CatalogUpdate::DryRun { .. } => {
                    pretty(json!({ "status": "dry_run", "changes": changes }))
                }
                CatalogUpdate::Proposed { branch, pr_url, .. } => pretty(json!({
                    "status": "proposed",
                    "changes": changes,
                    "branch": branch,
                    "pr_url": pr_url,
                })),
            }
        }
        OutputMode::Human => {
            let mut lines: Vec<String> =
                update.changes().iter().map(|c| format!("  {}", c)).collect();
            match update {
                CatalogUpdate::NoChanges => lines.push("No changes".to_string()),
                CatalogUpdate::DryRun { changes } => {
                    lines.push(format!("{} change(s) (dry run, nothing written)", changes.len()))
                }
                CatalogUpdate::Proposed { changes, pr_url, .. } => lines.push(format!(
                    "{} change(s) proposed: {}",
                    changes.len(),
                    pr_url
                )),
            }
            lines.join("\n")
        }
    }
}

// =========================================================================
// Config
// =========================================================================

pub fn format_config(config: &MintConfig, path: &Path, mode: OutputMode) -> Result<String, Failure> {
    match mode {
        OutputMode::Json => Ok(pretty(json!({
            "path": path,
            "exists": path.exists(),
            "registry": {
                "url": config.registry.url,
                "default_branch": config.registry.default_branch,
            },
            "storage": {
                "endpoint": config.storage.endpoint,
                "region": config.storage.region,
            },
            "tools": { "timeout_secs": config.tools.timeout_secs },
            "enclave": { "compression_level": config.enclave.compression_level },
        }))),
        OutputMode::Human => {
            let origin = if path.exists() { "" } else { " (not found, defaults)" };
            Ok(format!("# {}{}\n{}", path.display(), origin, config.to_toml()?))
        }
    }
}

pub fn format_config_init(path: &Path, written: bool, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => pretty(json!({ "path": path, "written": written })),
        OutputMode::Human if written => format!("Wrote default config to {}", path.display()),
        OutputMode::Human => format!("Config already exists at {}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_with_hint() {
        let f = Failure {
            message: "dvc command not found".into(),
            suggestion: Some("Install DVC".into()),
        };
        assert_eq!(
            format_error(&f, OutputMode::Human),
            "error: dvc command not found\n  hint: Install DVC"
        );
        let json: Value = serde_json::from_str(&format_error(&f, OutputMode::Json)).unwrap();
        assert_eq!(json["suggestion"], "Install DVC");
    }

    #[test]
    fn test_failure_carries_suggestion() {
        let f = Failure::from(RegistryError::NotFound {
            name: "study".into(),
        });
        assert!(f.message.contains("study"));
        assert!(f.suggestion.unwrap().contains("registry register"));
    }

    #[test]
    fn test_status_human() {
        assert_eq!(
            format_status("study", &RegistrationStatus::NotFound, OutputMode::Human),
            "study is not registered"
        );
    }
}
