//! Package: bundle promoted versions for transfer. Reads the manifest, never
//! writes it.

use super::{Enclave, EnclaveWarning};
use crate::error::{EnclaveError, EnclaveResult};
use mintd_bundle::{
    BundleInfo, BundleItem, BundleOptions, ManifestEntry, TransferBundleWriter, TransferManifest,
    BUNDLE_EXTENSION,
};
use mintd_core::timestamp_now;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

/// What to package and where
#[derive(Debug, Clone)]
pub struct PackageOptions {
    /// Bundle name, default `transfer-<YYYY-MM-DD-HHMMSS>`
    pub name: Option<String>,
    /// Only these repos; empty means every download
    pub repos: Vec<String>,
    /// Output directory, default `<root>/transfers`
    pub output_dir: Option<PathBuf>,
    /// zstd level
    pub compression_level: i32,
}

impl Default for PackageOptions {
    fn default() -> Self {
        Self {
            name: None,
            repos: Vec::new(),
            output_dir: None,
            compression_level: BundleOptions::default().compression_level,
        }
    }
}

/// A written bundle
#[derive(Debug, Clone)]
pub struct PackageReport {
    /// Archive path, size and checksum
    pub bundle: BundleInfo,
    /// Versions carried
    pub entries: Vec<ManifestEntry>,
    /// Skipped or previously transferred versions
    pub warnings: Vec<EnclaveWarning>,
}

fn default_package_name() -> String {
    format!("transfer-{}", chrono::Local::now().format("%Y-%m-%d-%H%M%S"))
}

impl Enclave {
    /// Bundle downloaded versions into `<name>.tar.zst`.
    ///
    /// Records whose directory is gone are skipped with a warning. Versions
    /// that were transferred before are still packaged, with a warning.
    pub fn package(&self, options: &PackageOptions) -> EnclaveResult<PackageReport> {
        let manifest = self.store().load()?;
        let mut warnings = Vec::new();
        let mut items = Vec::new();

        for record in &manifest.downloaded {
            if !options.repos.is_empty() && !options.repos.contains(&record.repo) {
                continue;
            }
            let dir = self.root().join(&record.local_path);
            if record.local_path.is_empty() || !dir.is_dir() {
                let warning = EnclaveWarning::MissingOnDisk {
                    repo: record.repo.clone(),
                    local_path: record.local_path.clone(),
                };
                warn!(target: "mintd::enclave", "{}", warning);
                warnings.push(warning);
                continue;
            }
            if let Some(t) = manifest.find_transfer(&record.repo, &record.content_hash) {
                let warning = EnclaveWarning::AlreadyTransferred {
                    repo: record.repo.clone(),
                    content_hash: record.content_hash.clone(),
                    transfer_id: t.transfer_id.clone(),
                    transfer_date: t.transfer_date.clone(),
                };
                warn!(target: "mintd::enclave", "{}", warning);
                warnings.push(warning);
            }
            let version_folder = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            items.push(BundleItem {
                entry: ManifestEntry {
                    repo: record.repo.clone(),
                    version_folder,
                    content_hash: record.content_hash.clone(),
                    source_revision: record.source_revision.clone(),
                },
                source_dir: dir,
            });
        }

        if items.is_empty() {
            return Err(EnclaveError::NothingToPackage);
        }

        let name = options.name.clone().unwrap_or_else(default_package_name);
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(EnclaveError::Validation(format!(
                "invalid package name '{}'",
                name
            )));
        }
        let out_dir = options
            .output_dir
            .clone()
            .unwrap_or_else(|| self.transfers_dir());
        fs::create_dir_all(&out_dir)?;
        let path = out_dir.join(format!("{}{}", name, BUNDLE_EXTENSION));

        let transfer = TransferManifest::new(manifest.enclave_name.clone(), name, timestamp_now());
        let writer = TransferBundleWriter::new(&BundleOptions {
            compression_level: options.compression_level,
        });
        let bundle = writer.write(transfer, &items, &path)?;
        info!(
            target: "mintd::enclave",
            bundle = %bundle.path.display(),
            entries = bundle.entry_count,
            bytes = bundle.bundle_size_bytes,
            "Packaged"
        );

        Ok(PackageReport {
            bundle,
            entries: items.into_iter().map(|i| i.entry).collect(),
            warnings,
        })
    }
}
