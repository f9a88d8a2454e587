//! Retention/Clean: drop staging clones and prune old versions.

use super::fsutil;
use super::{Enclave, DATA_DIR, DOWNLOADS_DIR, STAGING_DIR};
use crate::error::{EnclaveError, EnclaveResult};
use std::cmp::Reverse;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Retention policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanOptions {
    /// Versions to keep per repo, newest first by modification time
    pub keep: usize,
    /// Only remove staging clones
    pub staging_only: bool,
}

impl Default for CleanOptions {
    fn default() -> Self {
        Self {
            keep: 1,
            staging_only: false,
        }
    }
}

/// A pruned version directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedVersion {
    /// Product repo
    pub repo: String,
    /// Version folder
    pub version: String,
}

/// What a clean removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    /// Staging clones removed
    pub staging_removed: Vec<String>,
    /// Version directories removed
    pub versions_removed: Vec<RemovedVersion>,
    /// Manifest records dropped along with them
    pub manifest_entries_removed: usize,
}

impl Enclave {
    /// Apply the retention policy.
    ///
    /// Staging clones are always removed. Unless `staging_only`, each repo
    /// under `data/` and `data/downloads/` keeps its `keep` most recently
    /// modified versions and the manifest forgets the rest. If a deletion
    /// fails, records for the versions already deleted are still dropped
    /// before the error is returned.
    pub fn clean(&self, options: &CleanOptions) -> EnclaveResult<CleanReport> {
        if options.keep == 0 {
            return Err(EnclaveError::Validation(
                "keep must be at least 1".to_string(),
            ));
        }
        let mut report = CleanReport::default();

        for entry in fsutil::subdirs(&self.root().join(STAGING_DIR))? {
            fs::remove_dir_all(entry.path())?;
            let name = entry.file_name().to_string_lossy().into_owned();
            debug!(target: "mintd::enclave", repo = %name, "Removed staging clone");
            report.staging_removed.push(name);
        }

        if options.staging_only {
            info!(target: "mintd::enclave", staging = report.staging_removed.len(), "Cleaned staging");
            return Ok(report);
        }

        let pruned = self.prune_versions(options.keep, &mut report.versions_removed);

        if !report.versions_removed.is_empty() {
            let removed = &report.versions_removed;
            report.manifest_entries_removed = self.store().update(|m| {
                Ok::<_, EnclaveError>(
                    removed
                        .iter()
                        .map(|v| m.forget_version(&v.repo, &v.version))
                        .sum(),
                )
            })?;
        }
        pruned?;

        info!(
            target: "mintd::enclave",
            staging = report.staging_removed.len(),
            versions = report.versions_removed.len(),
            records = report.manifest_entries_removed,
            "Cleaned"
        );
        Ok(report)
    }

    fn prune_versions(&self, keep: usize, removed: &mut Vec<RemovedVersion>) -> EnclaveResult<()> {
        let data = self.root().join(DATA_DIR);
        let skip = [
            self.root().join(STAGING_DIR),
            self.root().join(DOWNLOADS_DIR),
        ];
        for layout in [data.clone(), self.root().join(DOWNLOADS_DIR)] {
            for repo_dir in fsutil::subdirs(&layout)? {
                let repo_path = repo_dir.path();
                if skip.contains(&repo_path) {
                    continue;
                }
                prune_repo(&repo_path, keep, removed)?;
            }
        }
        Ok(())
    }
}

fn prune_repo(repo_dir: &Path, keep: usize, removed: &mut Vec<RemovedVersion>) -> EnclaveResult<()> {
    let repo = repo_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut versions = Vec::new();
    for entry in fsutil::subdirs(repo_dir)? {
        let mtime = fsutil::modified(&entry.path())?;
        versions.push((mtime, entry));
    }
    // newest first; ties by name so the order is stable
    versions.sort_by_key(|(mtime, entry)| (Reverse(*mtime), entry.file_name()));

    for (_, entry) in versions.into_iter().skip(keep) {
        let version = entry.file_name().to_string_lossy().into_owned();
        if let Err(e) = fs::remove_dir_all(entry.path()) {
            warn!(target: "mintd::enclave", repo = %repo, version = %version, error = %e, "Could not remove version");
            return Err(e.into());
        }
        info!(target: "mintd::enclave", repo = %repo, version = %version, "Removed version");
        removed.push(RemovedVersion {
            repo: repo.clone(),
            version,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mintd_core::{CoreError, DownloadRecord};
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn version_dir(root: &Path, rel: &str, age_secs: u64) {
        let dir = root.join(rel);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("part.csv"), "x\n").unwrap();
        let when = SystemTime::now() - Duration::from_secs(age_secs);
        fs::File::open(&dir).unwrap().set_modified(when).unwrap();
    }

    #[test]
    fn test_keep_zero_rejected() {
        let tmp = TempDir::new().unwrap();
        let enclave = Enclave::init(tmp.path(), "lab").unwrap();
        let err = enclave
            .clean(&CleanOptions {
                keep: 0,
                staging_only: false,
            })
            .unwrap_err();
        assert!(matches!(err, EnclaveError::Validation(_)));
    }

    #[test]
    fn test_staging_only_leaves_versions() {
        let tmp = TempDir::new().unwrap();
        let enclave = Enclave::init(tmp.path(), "lab").unwrap();
        version_dir(tmp.path(), "data/staging/data_alpha/data", 0);
        version_dir(tmp.path(), "data/downloads/data_alpha/1111111-2024-01-01", 300);
        version_dir(tmp.path(), "data/downloads/data_alpha/2222222-2024-01-02", 100);

        let report = enclave
            .clean(&CleanOptions {
                keep: 1,
                staging_only: true,
            })
            .unwrap();
        assert_eq!(report.staging_removed, vec!["data_alpha".to_string()]);
        assert!(report.versions_removed.is_empty());
        assert!(!tmp.path().join("data/staging/data_alpha").exists());
        assert!(tmp
            .path()
            .join("data/downloads/data_alpha/1111111-2024-01-01")
            .exists());
    }

    #[test]
    fn test_prunes_both_layouts_and_forgets_records() {
        let tmp = TempDir::new().unwrap();
        let enclave = Enclave::init(tmp.path(), "lab").unwrap();
        version_dir(tmp.path(), "data/downloads/data_alpha/1111111-2024-01-01", 300);
        version_dir(tmp.path(), "data/downloads/data_alpha/2222222-2024-01-02", 100);
        version_dir(tmp.path(), "data/data_beta/3333333-2024-01-01", 500);
        version_dir(tmp.path(), "data/data_beta/4444444-2024-01-03", 50);
        enclave
            .store()
            .update(|m| {
                for (repo, hash, path) in [
                    ("data_alpha", "1111111", "data/downloads/data_alpha/1111111-2024-01-01"),
                    ("data_alpha", "2222222", "data/downloads/data_alpha/2222222-2024-01-02"),
                ] {
                    m.record_download(DownloadRecord {
                        repo: repo.into(),
                        content_hash: hash.into(),
                        source_revision: "r".into(),
                        downloaded_at: "2024-01-01T00:00:00".into(),
                        local_path: path.into(),
                    });
                }
                Ok::<_, CoreError>(())
            })
            .unwrap();

        let report = enclave.clean(&CleanOptions::default()).unwrap();
        let mut removed: Vec<_> = report
            .versions_removed
            .iter()
            .map(|v| v.version.as_str())
            .collect();
        removed.sort();
        assert_eq!(removed, vec!["1111111-2024-01-01", "3333333-2024-01-01"]);
        assert_eq!(report.manifest_entries_removed, 1);

        assert!(tmp.path().join("data/data_beta/4444444-2024-01-03").exists());
        assert!(tmp.path().join("data/downloads/data_alpha/2222222-2024-01-02").exists());
        let m = enclave.manifest().unwrap();
        assert_eq!(m.downloaded.len(), 1);
        assert_eq!(m.downloaded[0].content_hash, "2222222");
    }
}
