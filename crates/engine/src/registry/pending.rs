use crate::config::mintd_home;
use crate::error::{RegistryError, RegistryResult};
use mintd_core::{timestamp_now, CatalogValue, StateFile};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Directory under `~/.mintd` holding deferred registrations
pub const PENDING_DIR_NAME: &str = "pending_registrations";

/// A registration that could not be submitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRegistration {
    /// Project the registration was made from
    pub project_path: PathBuf,
    /// Descriptor as it was at the time
    pub metadata: CatalogValue,
    /// When it was deferred
    pub created_at: String,
}

impl PendingRegistration {
    /// `project.full_name` of the stored descriptor
    pub fn full_name(&self) -> Option<&str> {
        self.metadata.str_at("project.full_name")
    }
}

/// One JSON file per deferred registration, named `<full_name>.json`
#[derive(Debug, Clone)]
pub struct PendingRegistrations {
    dir: PathBuf,
}

impl PendingRegistrations {
    /// Store rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `~/.mintd/pending_registrations`
    pub fn in_home() -> RegistryResult<Self> {
        Ok(Self::new(mintd_home()?.join(PENDING_DIR_NAME)))
    }

    /// Directory of the store
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, full_name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", full_name))
    }

    /// Persist a deferred registration; returns the file written
    pub fn save(&self, project_path: &Path, metadata: &CatalogValue) -> RegistryResult<PathBuf> {
        let full_name = metadata
            .str_at("project.full_name")
            .ok_or_else(|| RegistryError::InvalidEntry {
                path: "metadata.json".to_string(),
                reason: "missing project.full_name".to_string(),
            })?;
        fs::create_dir_all(&self.dir)?;
        let path = self.file_for(full_name);
        let record = PendingRegistration {
            project_path: project_path.to_path_buf(),
            metadata: metadata.clone(),
            created_at: timestamp_now(),
        };
        StateFile::json(&path).save(&record)?;
        Ok(path)
    }

    /// All deferred registrations; unreadable files are skipped
    pub fn list(&self) -> RegistryResult<Vec<PendingRegistration>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut out = Vec::new();
        for path in paths {
            match StateFile::json(&path).load::<PendingRegistration>() {
                Ok(p) => out.push(p),
                Err(e) => {
                    warn!(target: "mintd::registry", file = %path.display(), error = %e, "Skipping unreadable pending registration")
                }
            }
        }
        Ok(out)
    }

    /// Forget the registration of `full_name`. Returns `true` if one existed.
    pub fn clear(&self, full_name: &str) -> RegistryResult<bool> {
        let path = self.file_for(full_name);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path)?;
        Ok(true)
    }
}
