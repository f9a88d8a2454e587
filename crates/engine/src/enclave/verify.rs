//! Unpack/Verify: install the versions carried by a transfer bundle.

use super::fsutil;
use super::{Enclave, EnclaveWarning};
use crate::error::{EnclaveError, EnclaveResult};
use mintd_bundle::{
    BundleError, TransferBundleReader, TransferManifest, BUNDLE_EXTENSION, TRANSFER_MANIFEST_FILE,
};
use mintd_core::{TransferRecord, Upsert, VersionId};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const VERIFY_WORKDIR_PREFIX: &str = ".mintd-verify-";

/// One version moved into place
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledVersion {
    /// Product repo
    pub repo: String,
    /// Version folder
    pub version: String,
    /// Destination, relative to the enclave root
    pub local_path: String,
    /// Whether the transfer record was new or refreshed
    pub upsert: Upsert,
}

/// Result of verifying a bundle
#[derive(Debug, Clone)]
pub struct VerifyReport {
    /// Bundle identifier
    pub transfer_id: String,
    /// Versions installed, in manifest order
    pub installed: Vec<InstalledVersion>,
    /// Non-fatal conditions
    pub warnings: Vec<EnclaveWarning>,
}

fn bundle_stem(bundle: &Path) -> String {
    let name = bundle
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.strip_suffix(BUNDLE_EXTENSION) {
        Some(stem) => stem.to_string(),
        None => bundle
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or(name),
    }
}

/// Extract `bundle` without installing anything.
///
/// `dest` defaults to `tmp_<name>` next to the bundle. The embedded manifest
/// is written into the extracted directory so it can be verified later.
pub fn unpack(bundle: &Path, dest: Option<&Path>) -> EnclaveResult<(PathBuf, TransferManifest)> {
    if !bundle.is_file() {
        return Err(EnclaveError::BundleNotFound(bundle.to_path_buf()));
    }
    let dest = match dest {
        Some(d) => d.to_path_buf(),
        None => bundle
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(format!("tmp_{}", bundle_stem(bundle))),
    };
    fs::create_dir_all(&dest)?;
    let manifest = TransferBundleReader::extract_to(bundle, &dest)?;
    let json = serde_json::to_string_pretty(&manifest).map_err(BundleError::from)?;
    fs::write(dest.join(TRANSFER_MANIFEST_FILE), json)?;
    info!(target: "mintd::enclave", bundle = %bundle.display(), dest = %dest.display(), "Unpacked");
    Ok((dest, manifest))
}

/// Flat `<repo>/` data of a legacy entry that predates version folders.
///
/// A repo directory that already holds version folders belongs to other
/// entries, so it is never taken as a whole.
fn legacy_source(repo_dir: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(repo_dir).ok()?;
    let versioned = entries.filter_map(|e| e.ok()).any(|e| {
        e.path().is_dir() && VersionId::from_folder(e.file_name().to_string_lossy()).date().is_some()
    });
    (!versioned).then(|| repo_dir.to_path_buf())
}

impl Enclave {
    /// Install the versions carried by `source` (a bundle file or an
    /// extracted directory).
    ///
    /// Each version is moved to `data/<repo>/<version>`, replacing what is
    /// there, and its transfer record is saved before the next one is
    /// touched. If a move fails, the versions before it stay installed and
    /// recorded and the error names the failing entry. A scratch extraction
    /// directory is removed on every path.
    pub fn verify(&self, source: &Path) -> EnclaveResult<VerifyReport> {
        if source.is_file() {
            let workdir = tempfile::Builder::new()
                .prefix(VERIFY_WORKDIR_PREFIX)
                .tempdir_in(self.root())?;
            debug!(target: "mintd::enclave", workdir = %workdir.path().display(), "Extracting bundle");
            let manifest = TransferBundleReader::extract_to(source, workdir.path())?;
            self.install(workdir.path(), &manifest)
        } else if source.is_dir() {
            let manifest = TransferBundleReader::read_manifest_dir(source)?;
            self.install(source, &manifest)
        } else {
            Err(EnclaveError::BundleNotFound(source.to_path_buf()))
        }
    }

    fn install(&self, dir: &Path, manifest: &TransferManifest) -> EnclaveResult<VerifyReport> {
        info!(target: "mintd::enclave", transfer_id = %manifest.transfer_id, "Verifying transfer");
        let mut warnings = Vec::new();

        let local = self.store().load()?;
        if !manifest.enclave_name.is_empty()
            && !local.enclave_name.is_empty()
            && manifest.enclave_name != local.enclave_name
        {
            let warning = EnclaveWarning::EnclaveMismatch {
                expected: local.enclave_name.clone(),
                found: manifest.enclave_name.clone(),
            };
            warn!(target: "mintd::enclave", "{}", warning);
            warnings.push(warning);
        }

        let transfer_day = match manifest.transfer_day() {
            "" => chrono::Local::now().format("%Y-%m-%d").to_string(),
            day => day.to_string(),
        };

        let mut installed = Vec::new();
        for entry in &manifest.contents {
            entry.check_paths(&transfer_day)?;
            let version = entry.resolved_folder(&transfer_day);
            let versioned = dir.join(&entry.repo).join(&version);
            let src = if versioned.is_dir() {
                Some(versioned)
            } else if entry.version_folder.is_empty() {
                legacy_source(&dir.join(&entry.repo))
            } else {
                None
            };
            let Some(src) = src else {
                let warning = EnclaveWarning::MissingBundleData {
                    repo: entry.repo.clone(),
                    version,
                };
                warn!(target: "mintd::enclave", "{}", warning);
                warnings.push(warning);
                continue;
            };

            let dest = self.received_dir(&entry.repo, &version);
            fsutil::move_dir(&src, &dest).map_err(|source| EnclaveError::Install {
                repo: entry.repo.clone(),
                version: version.clone(),
                source,
            })?;

            let local_path = self.manifest_path(&dest);
            let record = TransferRecord {
                repo: entry.repo.clone(),
                content_hash: entry.content_hash.clone(),
                source_revision: entry.source_revision.clone(),
                transfer_date: transfer_day.clone(),
                transfer_id: manifest.transfer_id.clone(),
                local_path: local_path.clone(),
            };
            let upsert = self
                .store()
                .update(|m| Ok::<_, EnclaveError>(m.record_transfer(record)))?;
            info!(target: "mintd::enclave", repo = %entry.repo, version = %version, "Installed");
            installed.push(InstalledVersion {
                repo: entry.repo.clone(),
                version,
                local_path,
                upsert,
            });
        }

        Ok(VerifyReport {
            transfer_id: manifest.transfer_id.clone(),
            installed,
            warnings,
        })
    }
}
