//! Reconcile a local project descriptor with its registry entry
//!
//! The entry is always fetched fresh, diffed against the local descriptor,
//! and only when something differs (and this is not a dry run) proposed back
//! to the registry as a timestamped branch plus pull request.

use crate::error::{CatalogUpdateError, CatalogUpdateResult};
use crate::registry::{utc_timestamp, EntryProposal, Registry};
use mintd_core::{diff, merge_sections, CatalogChange, CatalogValue, DescriptorStore, SYNCED_SECTIONS};
use std::path::Path;
use tracing::info;

/// Result of an update request
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogUpdate {
    /// Local descriptor matches the registry; nothing was written
    NoChanges,
    /// Changes found; nothing was written
    DryRun {
        /// Change leaves, registry value first
        changes: Vec<CatalogChange>,
    },
    /// Changes submitted for review
    Proposed {
        /// Change leaves, registry value first
        changes: Vec<CatalogChange>,
        /// Branch the change was pushed to
        branch: String,
        /// Pull request URL
        pr_url: String,
    },
}

impl CatalogUpdate {
    /// Change leaves, empty for `NoChanges`
    pub fn changes(&self) -> &[CatalogChange] {
        match self {
            CatalogUpdate::NoChanges => &[],
            CatalogUpdate::DryRun { changes } | CatalogUpdate::Proposed { changes, .. } => changes,
        }
    }
}

/// Diff `local` against the registry entry for `name` and propose the merge.
///
/// # Errors
///
/// `CatalogUpdateError::Registry` wrapping `RegistryError::NotFound` if the
/// project was never registered.
pub fn update_catalog_entry(
    registry: &dyn Registry,
    name: &str,
    local: &CatalogValue,
    dry_run: bool,
) -> CatalogUpdateResult<CatalogUpdate> {
    let remote = registry.fetch_entry(name)?;
    info!(target: "mintd::registry", entry = %remote.path, "Found catalog entry");

    let changes = diff(&remote.value, local);
    if changes.is_empty() {
        info!(target: "mintd::registry", project = name, "No changes between local and registry");
        return Ok(CatalogUpdate::NoChanges);
    }
    if dry_run {
        return Ok(CatalogUpdate::DryRun { changes });
    }

    let mut merged = merge_sections(&remote.value, local, SYNCED_SECTIONS);
    merged.set_path("status.last_updated", utc_timestamp().into());

    let branch = format!(
        "update-{}-{}",
        name,
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    );
    let title = format!("Update catalog entry: {}", name);
    let proposal = EntryProposal {
        kind: remote.kind,
        name: name.to_string(),
        entry: merged,
        branch: branch.clone(),
        commit_message: title.clone(),
        body: pull_request_body(name, &changes),
        title,
    };
    let pr_url = registry.submit(&proposal)?;
    Ok(CatalogUpdate::Proposed {
        changes,
        branch,
        pr_url,
    })
}

/// Update the registry entry of the project rooted at `project`.
///
/// `name` defaults to the descriptor's `project.name`.
pub fn update_project(
    registry: &dyn Registry,
    project: &Path,
    name: Option<&str>,
    dry_run: bool,
) -> CatalogUpdateResult<CatalogUpdate> {
    let local: CatalogValue = DescriptorStore::for_project(project).load_raw()?;
    let name = match name {
        Some(n) => n.to_string(),
        None => local
            .str_at("project.name")
            .ok_or_else(|| {
                CatalogUpdateError::InvalidDescriptor("missing project.name".to_string())
            })?
            .to_string(),
    };
    update_catalog_entry(registry, &name, &local, dry_run)
}

fn pull_request_body(name: &str, changes: &[CatalogChange]) -> String {
    let mut lines: Vec<String> = changes
        .iter()
        .map(|c| {
            format!(
                "- `{}`: {} → {}",
                c.path,
                render(c.old.as_ref()),
                render(c.new.as_ref())
            )
        })
        .collect();
    lines.push("- `status.last_updated`: Updated timestamp".to_string());
    format!(
        "## Registry Update: {name}\n\n\
         This PR updates the catalog entry for **{name}**.\n\n\
         ### Changes\n{}\n\n\
         ### Updated by\n{}\n",
        lines.join("\n"),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    )
}

fn render(value: Option<&CatalogValue>) -> String {
    value.map_or_else(|| "None".to_string(), CatalogValue::render)
}
