//! Catalog registry access
//!
//! The registry is a git repository holding one YAML entry per registered
//! project under `catalog/{data,projects,infra}/<name>.yaml`. Changes are
//! never pushed to the default branch directly: every write is a branch plus
//! a pull request for review.
//!
//! [`GitRegistry`] clones the registry into a fresh temporary directory on
//! every call; the clone is removed when the call returns, whatever the
//! outcome.

mod git;
mod pending;
mod registration;

pub use git::GitRegistry;
pub use pending::{PendingRegistration, PendingRegistrations, PENDING_DIR_NAME};
pub use registration::{
    catalog_entry_for, load_project_metadata, register_project, registration_proposal,
    retry_pending, RegistrationOutcome, RetryResult, REQUIRED_SECTIONS,
};

use crate::error::RegistryResult;
use mintd_core::{CatalogValue, EntryKind};
use serde::Serialize;

/// An entry as found in the registry
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    /// Catalog directory the entry lives in
    pub kind: EntryKind,
    /// Path relative to the registry root
    pub path: String,
    /// Parsed document
    pub value: CatalogValue,
}

/// One-line view of a data product
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProductSummary {
    /// Entry name (file stem)
    pub name: String,
    /// `project.full_name`
    pub full_name: String,
    /// `metadata.description`
    pub description: String,
    /// `project.created_at`
    pub created_at: String,
    /// `ownership.created_by`
    pub created_by: String,
}

impl ProductSummary {
    /// Summarize a catalog entry named `name`
    pub fn from_entry(name: &str, entry: &CatalogValue) -> Self {
        let field = |path: &str| entry.str_at(path).unwrap_or_default().to_string();
        Self {
            name: name.to_string(),
            full_name: field("project.full_name"),
            description: field("metadata.description"),
            created_at: field("project.created_at"),
            created_by: field("ownership.created_by"),
        }
    }
}

/// A change to submit for review
#[derive(Debug, Clone, PartialEq)]
pub struct EntryProposal {
    /// Catalog directory to write into
    pub kind: EntryKind,
    /// Entry name (file stem)
    pub name: String,
    /// Full document to write
    pub entry: CatalogValue,
    /// Branch to create
    pub branch: String,
    /// Commit message
    pub commit_message: String,
    /// Pull request title
    pub title: String,
    /// Pull request body
    pub body: String,
}

/// Where a project stands in the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationStatus {
    /// Entry exists on the default branch
    Registered {
        /// Catalog kind
        kind: EntryKind,
        /// `<type>_<name>`
        full_name: String,
        /// Web URL of the entry
        url: String,
    },
    /// A registration pull request is open
    PendingReview {
        /// Pull request URL
        pr_url: String,
        /// Pull request title
        pr_title: String,
    },
    /// Neither registered nor pending
    NotFound,
}

/// Registry lookup and change submission
pub trait Registry {
    /// Registry URL, for messages and entry links
    fn url(&self) -> &str;

    /// Entry for `name`, searched across data, projects and infra.
    ///
    /// Fails with `RegistryError::NotFound` if there is none.
    fn fetch_entry(&self, name: &str) -> RegistryResult<CatalogEntry>;

    /// Catalog entry of data product `name`.
    ///
    /// Fails with `RegistryError::ProductNotFound` listing what exists.
    fn query_data_product(&self, name: &str) -> RegistryResult<CatalogValue>;

    /// All data products, sorted by name; malformed entries are skipped
    fn list_data_products(&self) -> RegistryResult<Vec<ProductSummary>>;

    /// Write the proposed entry on a new branch and open a pull request.
    /// Returns the pull request URL.
    fn submit(&self, proposal: &EntryProposal) -> RegistryResult<String>;

    /// Registered, pending review, or unknown
    fn registration_status(&self, name: &str) -> RegistryResult<RegistrationStatus>;
}

/// UTC timestamp used for `status.last_updated`
pub fn utc_timestamp() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.6fZ")
        .to_string()
}
