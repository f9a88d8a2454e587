//! Registering a project in the catalog
//!
//! Registration is auxiliary to project creation: if the registry cannot be
//! reached the request is parked in the pending store and reported, never
//! raised. Only an unusable descriptor is a hard error.

use super::{utc_timestamp, EntryProposal, PendingRegistrations, Registry};
use crate::error::{RegistryError, RegistryResult};
use mintd_core::{CatalogValue, DescriptorStore, EntryKind, PROJECT_DESCRIPTOR_FILE};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Top-level sections every descriptor must carry
pub const REQUIRED_SECTIONS: &[&str] = &["project", "metadata", "ownership", "access_control", "status"];

const REQUIRED_PROJECT_FIELDS: &[&str] = &["name", "type", "full_name"];

const DEFAULT_STORAGE_ENDPOINT: &str = "https://s3.wasabisys.com";
const DEFAULT_STORAGE_REGION: &str = "us-east-1";

fn invalid(reason: impl Into<String>) -> RegistryError {
    RegistryError::InvalidEntry {
        path: PROJECT_DESCRIPTOR_FILE.to_string(),
        reason: reason.into(),
    }
}

/// Load and validate the descriptor of the project at `project`.
///
/// The descriptor must carry every [`REQUIRED_SECTIONS`] entry, a complete
/// `project` identity, and at least one team with `admin` permission when
/// teams are listed.
pub fn load_project_metadata(project: &Path) -> RegistryResult<CatalogValue> {
    let metadata: CatalogValue = DescriptorStore::for_project(project).load_raw()?;

    for section in REQUIRED_SECTIONS {
        if metadata.get(section).is_none() {
            return Err(invalid(format!("missing required field '{}'", section)));
        }
    }
    for field in REQUIRED_PROJECT_FIELDS {
        if metadata.get_path(&format!("project.{}", field)).is_none() {
            return Err(invalid(format!("missing required project field '{}'", field)));
        }
    }
    if let Some(teams) = metadata.get_path("access_control.teams") {
        let teams = match teams {
            CatalogValue::Sequence(t) => t.as_slice(),
            _ => return Err(invalid("access_control.teams must be a list")),
        };
        if teams.is_empty() {
            return Err(invalid("access_control.teams must contain at least one team"));
        }
        if !teams.iter().any(|t| t.str_at("permission") == Some("admin")) {
            return Err(invalid("at least one team must have 'admin' permission"));
        }
    }
    Ok(metadata)
}

fn string_map(pairs: &[(&str, &str)]) -> CatalogValue {
    CatalogValue::Mapping(
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), CatalogValue::from(*v)))
            .collect::<BTreeMap<_, _>>(),
    )
}

/// Build the catalog entry for a validated descriptor.
///
/// Returns the entry kind, short name and the entry itself. Data and
/// analysis projects get a default storage section when they have none;
/// analysis projects get an empty dependency list.
pub fn catalog_entry_for(metadata: &CatalogValue) -> RegistryResult<(EntryKind, String, CatalogValue)> {
    let name = metadata
        .str_at("project.name")
        .ok_or_else(|| invalid("missing project.name"))?
        .to_string();
    let type_name = metadata
        .str_at("project.type")
        .ok_or_else(|| invalid("missing project.type"))?;
    let kind = EntryKind::from_type(type_name)
        .ok_or_else(|| invalid(format!("cannot register projects of type '{}'", type_name)))?;
    let full_name = metadata
        .str_at("project.full_name")
        .unwrap_or(&name)
        .to_string();

    let mut entry = metadata.clone();
    entry.set_path("status.last_updated", utc_timestamp().into());

    if matches!(kind, EntryKind::Data | EntryKind::Project) && entry.get("storage").is_none() {
        let bucket = if kind == EntryKind::Data {
            "lab-data"
        } else {
            "lab-projects"
        };
        let mut storage = string_map(&[
            ("estimated_size", "TBD"),
            ("sensitivity", "restricted"),
        ]);
        storage.set_path(
            "dvc",
            string_map(&[
                ("remote_name", full_name.as_str()),
                ("bucket", bucket),
                ("path", full_name.as_str()),
                ("endpoint", DEFAULT_STORAGE_ENDPOINT),
                ("region", DEFAULT_STORAGE_REGION),
            ]),
        );
        entry.set_path("storage", storage);
    }

    if kind == EntryKind::Project && entry.get_path("metadata.data_dependencies").is_none() {
        entry.set_path("metadata.data_dependencies", CatalogValue::Sequence(Vec::new()));
    }

    Ok((kind, name, entry))
}

/// Branch, commit and pull request for registering `metadata`
pub fn registration_proposal(metadata: &CatalogValue) -> RegistryResult<EntryProposal> {
    let (kind, name, entry) = catalog_entry_for(metadata)?;
    let type_name = kind.type_name();
    let full_name = entry.str_at("project.full_name").unwrap_or(&name).to_string();
    let created_by = entry
        .str_at("ownership.created_by")
        .or_else(|| entry.str_at("project.created_by"))
        .unwrap_or("Unknown")
        .to_string();
    let title = format!("Register new {} project: {}", type_name, name);
    let body = format!(
        "## Project Registration\n\n\
         This PR registers a new {type_name} project: **{name}**\n\n\
         ### Details\n\
         - **Type**: {type_name}\n\
         - **Full Name**: {full_name}\n\
         - **Created by**: {created_by}\n"
    );
    Ok(EntryProposal {
        kind,
        branch: format!("register-{}", name),
        commit_message: title.clone(),
        title,
        body,
        name,
        entry,
    })
}

/// What became of a registration attempt
#[derive(Debug)]
pub enum RegistrationOutcome {
    /// Pull request opened
    Submitted {
        /// Pull request URL
        pr_url: String,
    },
    /// Registry unreachable or rejected the change; saved for retry
    Deferred {
        /// Pending file written
        pending_file: PathBuf,
        /// Why submission failed
        error: RegistryError,
    },
}

/// Register the project at `project`.
///
/// Descriptor problems are returned as errors. A failed submission is saved
/// to `pending` and reported as [`RegistrationOutcome::Deferred`].
pub fn register_project(
    registry: &dyn Registry,
    pending: &PendingRegistrations,
    project: &Path,
) -> RegistryResult<RegistrationOutcome> {
    let metadata = load_project_metadata(project)?;
    let proposal = registration_proposal(&metadata)?;

    match registry.submit(&proposal) {
        Ok(pr_url) => {
            info!(target: "mintd::registry", project = %proposal.name, pr = %pr_url, "Registration submitted");
            Ok(RegistrationOutcome::Submitted { pr_url })
        }
        Err(error) => {
            warn!(
                target: "mintd::registry",
                project = %proposal.name,
                error = %error,
                "Registration failed, saved for retry"
            );
            let pending_file = pending.save(project, &metadata)?;
            Ok(RegistrationOutcome::Deferred {
                pending_file,
                error,
            })
        }
    }
}

/// Result of retrying one pending registration
#[derive(Debug)]
pub struct RetryResult {
    /// `project.full_name` of the registration
    pub full_name: String,
    /// Pull request URL, or why it failed again
    pub outcome: RegistryResult<String>,
}

/// Re-submit every pending registration, clearing the ones that succeed
pub fn retry_pending(
    registry: &dyn Registry,
    pending: &PendingRegistrations,
) -> RegistryResult<Vec<RetryResult>> {
    let mut results = Vec::new();
    for registration in pending.list()? {
        let full_name = registration.full_name().unwrap_or_default().to_string();
        let outcome = registration_proposal(&registration.metadata)
            .and_then(|proposal| registry.submit(&proposal));
        match &outcome {
            Ok(pr_url) => {
                pending.clear(&full_name)?;
                info!(target: "mintd::registry", project = %full_name, pr = %pr_url, "Pending registration submitted");
            }
            Err(e) => {
                warn!(target: "mintd::registry", project = %full_name, error = %e, "Pending registration failed again");
            }
        }
        results.push(RetryResult { full_name, outcome });
    }
    Ok(results)
}
