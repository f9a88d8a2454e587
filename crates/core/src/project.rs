//! Project descriptor (`metadata.json`)
//!
//! Analysis projects describe themselves in a JSON descriptor. mintd only
//! interprets the `project` identity block and the
//! `metadata.data_dependencies` list; everything else is carried through
//! untouched so that a load/save cycle never drops fields.

use crate::error::{CoreError, CoreResult};
use crate::records::{upsert, Upsert};
use crate::store::{LockPolicy, StateFile};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File name of the project descriptor inside a project repository
pub const PROJECT_DESCRIPTOR_FILE: &str = "metadata.json";

/// Project kinds that may import data products
pub const IMPORTING_KINDS: &[&str] = &["project", "infra"];

/// One imported data product recorded in the descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRecord {
    /// Product name (e.g. `data_hospital_claims`)
    pub source: String,
    /// Repository URL of the product
    #[serde(default)]
    pub source_url: String,
    /// Pipeline stage imported, empty when a raw path was imported
    #[serde(default)]
    pub stage: String,
    /// Path inside the product repository, empty when a stage was imported
    #[serde(default)]
    pub path: String,
    /// Destination path inside the project
    pub local_path: String,
    /// Tracking pointer file written by the import (`<dest>.dvc`)
    #[serde(alias = "dvc_file", default)]
    pub artifact_pointer: String,
    /// Local timestamp of the import
    #[serde(default)]
    pub imported_at: String,
    /// Revision of the product the import was pinned to
    #[serde(alias = "source_commit", default)]
    pub source_revision: String,
}

/// Identity block of a descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    /// Short name without type prefix
    pub name: String,
    /// Project kind (`data`, `project`, `infra`, `enclave`)
    #[serde(rename = "type")]
    pub kind: String,
    /// Prefixed name (e.g. `prj_readmissions`)
    #[serde(default)]
    pub full_name: String,
    /// Remaining identity fields
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// The `metadata` section of a descriptor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    /// Imported data products
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dependencies: Option<Vec<DependencyRecord>>,
    /// Remaining metadata fields
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A project descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDescriptor {
    /// Identity
    pub project: ProjectInfo,
    /// Descriptive metadata and dependencies
    #[serde(default)]
    pub metadata: ProjectMetadata,
    /// Every other top-level section
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ProjectDescriptor {
    /// Imported dependencies, empty if none were ever recorded
    pub fn dependencies(&self) -> &[DependencyRecord] {
        self.metadata.data_dependencies.as_deref().unwrap_or(&[])
    }

    /// Upsert a dependency keyed on `(source, local_path)`
    pub fn record_dependency(&mut self, record: DependencyRecord) -> Upsert {
        let list = self.metadata.data_dependencies.get_or_insert_with(Vec::new);
        upsert(
            list,
            |d| (d.source.clone(), d.local_path.clone()),
            record,
        )
    }

    /// Drop the dependency on `source` at `local_path`; true if one was removed
    pub fn forget_dependency(&mut self, source: &str, local_path: &str) -> bool {
        let Some(list) = self.metadata.data_dependencies.as_mut() else {
            return false;
        };
        let before = list.len();
        list.retain(|d| !(d.source == source && d.local_path == local_path));
        list.len() != before
    }

    /// Whether this kind of project may import data products
    pub fn accepts_imports(&self) -> bool {
        IMPORTING_KINDS.contains(&self.project.kind.as_str())
    }

    /// Full name, falling back to the short name
    pub fn full_name(&self) -> &str {
        if self.project.full_name.is_empty() {
            &self.project.name
        } else {
            &self.project.full_name
        }
    }
}

/// Store for one project's descriptor
#[derive(Debug, Clone)]
pub struct DescriptorStore {
    file: StateFile,
}

impl DescriptorStore {
    /// Store for the descriptor of the project rooted at `root`
    pub fn for_project(root: &Path) -> Self {
        Self {
            file: StateFile::json(descriptor_path(root)),
        }
    }

    /// Override the lock retry policy
    pub fn with_lock_policy(mut self, policy: LockPolicy) -> Self {
        self.file = self.file.with_lock_policy(policy);
        self
    }

    /// Path of the descriptor
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Whether the descriptor exists
    pub fn exists(&self) -> bool {
        self.file.exists()
    }

    /// Load the typed descriptor
    pub fn load(&self) -> CoreResult<ProjectDescriptor> {
        self.file.load()
    }

    /// Load the descriptor as an untyped tree, exactly as stored
    pub fn load_raw<T: serde::de::DeserializeOwned>(&self) -> CoreResult<T> {
        self.file.load()
    }

    /// Save the descriptor
    pub fn save(&self, descriptor: &ProjectDescriptor) -> CoreResult<()> {
        self.file.save(descriptor)
    }

    /// Locked read-modify-write of the descriptor
    pub fn update<R, E, F>(&self, f: F) -> Result<R, E>
    where
        E: From<CoreError>,
        F: FnOnce(&mut ProjectDescriptor) -> Result<R, E>,
    {
        self.file.update(f)
    }
}

/// Path of the descriptor for a project root
fn descriptor_path(root: &Path) -> PathBuf {
    root.join(PROJECT_DESCRIPTOR_FILE)
}
