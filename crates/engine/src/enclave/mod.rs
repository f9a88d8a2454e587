//! Enclave workspaces
//!
//! ## Layout
//!
//! ```text
//! <root>/
//! ├── enclave_manifest.yaml
//! ├── data/
//! │   ├── staging/<repo>/              disposable clones
//! │   ├── downloads/<repo>/<version>/  promoted, waiting to be packaged
//! │   └── <repo>/<version>/            received through a transfer bundle
//! └── transfers/<name>.tar.zst
//! ```
//!
//! Versions are named `<hash7>-<YYYY-MM-DD>` (see [`VersionId`]). All list
//! mutations go through the locked [`ManifestStore`]; paths recorded in the
//! manifest are relative to the root.

pub(crate) mod fsutil;

mod clean;
mod package;
mod sync;
mod verify;

pub use clean::{CleanOptions, CleanReport, RemovedVersion};
pub use package::{PackageOptions, PackageReport};
pub use sync::{PullReport, PullTarget, PulledVersion, RepoPull, SyncContext};
pub use verify::{unpack, InstalledVersion, VerifyReport};

use crate::error::{EnclaveError, EnclaveResult};
use mintd_core::{
    short_hash, ApprovedProduct, CoreError, EnclaveManifest, LockPolicy, ManifestStore,
    TransferRecord, VersionId,
};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Directory of staging clones, relative to the enclave root
pub const STAGING_DIR: &str = "data/staging";
/// Directory of promoted versions awaiting transfer
pub const DOWNLOADS_DIR: &str = "data/downloads";
/// Directory of received versions
pub const DATA_DIR: &str = "data";
/// Directory bundles are written to
pub const TRANSFERS_DIR: &str = "transfers";

/// A non-fatal condition reported alongside a successful operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnclaveWarning {
    /// `enclave add` for a product that is already approved
    AlreadyApproved {
        /// Product repo
        repo: String,
    },
    /// The version has crossed the boundary before
    AlreadyTransferred {
        /// Product repo
        repo: String,
        /// Content hash of the version
        content_hash: String,
        /// Bundle that carried it
        transfer_id: String,
        /// Day it was received
        transfer_date: String,
    },
    /// A download record points at a directory that is gone
    MissingOnDisk {
        /// Product repo
        repo: String,
        /// Recorded path
        local_path: String,
    },
    /// The bundle was packaged for a different enclave
    EnclaveMismatch {
        /// This enclave
        expected: String,
        /// Name in the bundle
        found: String,
    },
    /// A manifest entry has no data in the bundle
    MissingBundleData {
        /// Product repo
        repo: String,
        /// Version folder looked for
        version: String,
    },
}

impl fmt::Display for EnclaveWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnclaveWarning::AlreadyApproved { repo } => {
                write!(f, "{} is already in the approved list", repo)
            }
            EnclaveWarning::AlreadyTransferred {
                repo,
                content_hash,
                transfer_id,
                transfer_date,
            } => write!(
                f,
                "{} ({}) was already transferred via {} on {}",
                repo,
                short_hash(content_hash),
                transfer_id,
                transfer_date
            ),
            EnclaveWarning::MissingOnDisk { repo, local_path } => {
                write!(f, "{}: {} is missing on disk, skipped", repo, local_path)
            }
            EnclaveWarning::EnclaveMismatch { expected, found } => write!(
                f,
                "bundle was packaged for enclave '{}', not '{}'",
                found, expected
            ),
            EnclaveWarning::MissingBundleData { repo, version } => {
                write!(f, "{}/{} is listed but not present in the bundle", repo, version)
            }
        }
    }
}

/// Approved product with what has been received for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductListing {
    /// The approval
    pub product: ApprovedProduct,
    /// Versions received, in manifest order
    pub transfers: Vec<TransferRecord>,
}

/// An enclave workspace rooted at a directory holding `enclave_manifest.yaml`
#[derive(Debug, Clone)]
pub struct Enclave {
    root: PathBuf,
    store: ManifestStore,
}

impl Enclave {
    /// Open an existing enclave.
    ///
    /// Fails with `CoreError::ManifestNotFound` if `root` has no manifest.
    pub fn open(root: impl Into<PathBuf>) -> EnclaveResult<Self> {
        let root = root.into();
        let store = ManifestStore::for_enclave(&root);
        if !store.exists() {
            return Err(CoreError::ManifestNotFound {
                path: store.path().to_path_buf(),
            }
            .into());
        }
        Ok(Self { root, store })
    }

    /// Create an enclave at `root` if none exists, then open it
    pub fn init(root: impl Into<PathBuf>, enclave_name: &str) -> EnclaveResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let store = ManifestStore::for_enclave(&root);
        if store.init(enclave_name)? {
            info!(target: "mintd::enclave", name = enclave_name, root = %root.display(), "Created enclave");
        }
        Ok(Self { root, store })
    }

    /// Override the manifest lock retry policy
    pub fn with_lock_policy(mut self, policy: LockPolicy) -> Self {
        self.store = self.store.with_lock_policy(policy);
        self
    }

    /// Workspace root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Manifest store
    pub fn store(&self) -> &ManifestStore {
        &self.store
    }

    /// Current manifest contents
    pub fn manifest(&self) -> EnclaveResult<EnclaveManifest> {
        Ok(self.store.load()?)
    }

    /// Staging clone directory for `repo`
    pub fn staging_dir(&self, repo: &str) -> PathBuf {
        self.root.join(STAGING_DIR).join(repo)
    }

    /// Promoted version directory
    pub fn download_dir(&self, repo: &str, version: &VersionId) -> PathBuf {
        self.root.join(DOWNLOADS_DIR).join(repo).join(version.as_str())
    }

    /// Received version directory
    pub fn received_dir(&self, repo: &str, version_folder: &str) -> PathBuf {
        self.root.join(DATA_DIR).join(repo).join(version_folder)
    }

    /// Where bundles are written by default
    pub fn transfers_dir(&self) -> PathBuf {
        self.root.join(TRANSFERS_DIR)
    }

    /// Path recorded in the manifest for a directory under the root
    pub(crate) fn manifest_path(&self, path: &Path) -> String {
        fsutil::relative_display(&self.root, path)
    }

    /// Approve `repo` for this enclave.
    ///
    /// Approving twice leaves the first approval in place and returns a
    /// warning.
    pub fn add(&self, repo: &str, stage: &str) -> EnclaveResult<Option<EnclaveWarning>> {
        if repo.trim().is_empty() {
            return Err(EnclaveError::Validation("repository name is empty".to_string()));
        }
        self.store.update(|m| {
            if m.approve(ApprovedProduct::new(repo, stage)) {
                info!(target: "mintd::enclave", repo, stage, "Approved product");
                Ok(None)
            } else {
                let warning = EnclaveWarning::AlreadyApproved {
                    repo: repo.to_string(),
                };
                warn!(target: "mintd::enclave", "{}", warning);
                Ok::<_, EnclaveError>(Some(warning))
            }
        })
    }

    /// Approved products with their received versions, optionally for one repo
    pub fn list(&self, repo: Option<&str>) -> EnclaveResult<Vec<ProductListing>> {
        let manifest = self.store.load()?;
        if let Some(repo) = repo {
            if manifest.approved(repo).is_none() {
                return Err(EnclaveError::NotApproved {
                    repo: repo.to_string(),
                });
            }
        }
        Ok(manifest
            .approved_products
            .iter()
            .filter(|p| repo.map_or(true, |r| p.repo == r))
            .map(|p| ProductListing {
                product: p.clone(),
                transfers: manifest
                    .transferred
                    .iter()
                    .filter(|t| t.repo == p.repo)
                    .cloned()
                    .collect(),
            })
            .collect())
    }
}
