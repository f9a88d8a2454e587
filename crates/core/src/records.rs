//! Enclave manifest records
//!
//! The enclave manifest (`enclave_manifest.yaml`) is the single state file of
//! an enclave workspace. It holds three lists:
//!
//! - `approved_products`: products an operator approved for this enclave
//! - `downloaded`: versions promoted into the source-side downloads area
//! - `transferred`: versions that crossed the boundary and landed in `data/`
//!
//! `downloaded` and `transferred` are keyed on `(repo, content_hash)`; writing
//! the same key again replaces the record in place.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// File name of the enclave manifest inside an enclave workspace
pub const ENCLAVE_MANIFEST_FILE: &str = "enclave_manifest.yaml";

/// Default pipeline stage pulled for an approved product
pub const DEFAULT_STAGE: &str = "final";

/// A product approved for transfer into this enclave
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovedProduct {
    /// Repository identifier (e.g. `data_hospital_claims`)
    pub repo: String,
    /// Path of the registry catalog entry for the product
    #[serde(default)]
    pub registry_entry: String,
    /// Pipeline stage to pull
    #[serde(default = "default_stage")]
    pub stage: String,
}

fn default_stage() -> String {
    DEFAULT_STAGE.to_string()
}

impl ApprovedProduct {
    /// Approve a product with the conventional registry entry path
    pub fn new(repo: impl Into<String>, stage: impl Into<String>) -> Self {
        let repo = repo.into();
        Self {
            registry_entry: format!("catalog/data/{}.yaml", repo),
            repo,
            stage: stage.into(),
        }
    }
}

/// One promoted version in the source-side downloads area
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    /// Repository identifier
    pub repo: String,
    /// Content hash of the stage output
    #[serde(alias = "dvc_hash")]
    pub content_hash: String,
    /// Revision of the source repository the data was pulled at
    #[serde(alias = "git_commit", default)]
    pub source_revision: String,
    /// Local timestamp of the pull
    #[serde(default)]
    pub downloaded_at: String,
    /// Version directory, relative to the enclave root
    #[serde(default)]
    pub local_path: String,
}

/// One version that has crossed the boundary into this enclave
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    /// Repository identifier
    pub repo: String,
    /// Content hash of the stage output
    #[serde(alias = "dvc_hash")]
    pub content_hash: String,
    /// Revision of the source repository
    #[serde(alias = "git_commit", default)]
    pub source_revision: String,
    /// Date of the transfer (`YYYY-MM-DD`)
    #[serde(default)]
    pub transfer_date: String,
    /// Identifier of the bundle that carried the version
    #[serde(default)]
    pub transfer_id: String,
    /// Version directory, relative to the enclave root
    #[serde(default)]
    pub local_path: String,
}

/// Whether an upsert replaced an existing record or appended a new one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// A record with the same key was replaced in place
    Replaced,
    /// No record had the key; the new one was appended
    Inserted,
}

/// Replace the first element whose key matches, or append.
pub fn upsert<T, K, F>(list: &mut Vec<T>, key: F, record: T) -> Upsert
where
    K: PartialEq,
    F: Fn(&T) -> K,
{
    let wanted = key(&record);
    match list.iter().position(|existing| key(existing) == wanted) {
        Some(idx) => {
            list[idx] = record;
            Upsert::Replaced
        }
        None => {
            list.push(record);
            Upsert::Inserted
        }
    }
}

/// The enclave manifest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnclaveManifest {
    /// Name of the enclave
    #[serde(default)]
    pub enclave_name: String,
    /// Products approved for this enclave
    #[serde(default)]
    pub approved_products: Vec<ApprovedProduct>,
    /// Versions promoted into the downloads area
    #[serde(default)]
    pub downloaded: Vec<DownloadRecord>,
    /// Versions received through transfer bundles
    #[serde(default)]
    pub transferred: Vec<TransferRecord>,
    /// Fields this version does not know about, kept verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl EnclaveManifest {
    /// Create an empty manifest for a named enclave
    pub fn new(enclave_name: impl Into<String>) -> Self {
        Self {
            enclave_name: enclave_name.into(),
            ..Default::default()
        }
    }

    /// Look up an approved product by repo
    pub fn approved(&self, repo: &str) -> Option<&ApprovedProduct> {
        self.approved_products.iter().find(|p| p.repo == repo)
    }

    /// Approve a product. Returns `false` if it was already approved.
    pub fn approve(&mut self, product: ApprovedProduct) -> bool {
        if self.approved(&product.repo).is_some() {
            return false;
        }
        self.approved_products.push(product);
        true
    }

    /// Find the transfer record for an exact `(repo, hash)` pair
    pub fn find_transfer(&self, repo: &str, content_hash: &str) -> Option<&TransferRecord> {
        self.transferred
            .iter()
            .find(|t| t.repo == repo && t.content_hash == content_hash)
    }

    /// Find the download record for an exact `(repo, hash)` pair
    pub fn find_download(&self, repo: &str, content_hash: &str) -> Option<&DownloadRecord> {
        self.downloaded
            .iter()
            .find(|d| d.repo == repo && d.content_hash == content_hash)
    }

    /// Upsert a download record keyed on `(repo, content_hash)`
    pub fn record_download(&mut self, record: DownloadRecord) -> Upsert {
        upsert(
            &mut self.downloaded,
            |d| (d.repo.clone(), d.content_hash.clone()),
            record,
        )
    }

    /// Upsert a transfer record keyed on `(repo, content_hash)`
    pub fn record_transfer(&mut self, record: TransferRecord) -> Upsert {
        upsert(
            &mut self.transferred,
            |t| (t.repo.clone(), t.content_hash.clone()),
            record,
        )
    }

    /// Drop every downloaded/transferred record of `repo` whose local path
    /// ends with `version_folder`. Returns the number of records removed.
    pub fn forget_version(&mut self, repo: &str, version_folder: &str) -> usize {
        let matches = |r: &str, local_path: &str| {
            r == repo && Path::new(local_path).ends_with(version_folder)
        };
        let before = self.downloaded.len() + self.transferred.len();
        self.downloaded
            .retain(|d| !matches(&d.repo, &d.local_path));
        self.transferred
            .retain(|t| !matches(&t.repo, &t.local_path));
        before - (self.downloaded.len() + self.transferred.len())
    }
}

/// Local wall-clock timestamp in ISO 8601 form without offset
pub fn timestamp_now() -> String {
    chrono::Local::now()
        .naive_local()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn download(repo: &str, hash: &str, path: &str) -> DownloadRecord {
        DownloadRecord {
            repo: repo.to_string(),
            content_hash: hash.to_string(),
            source_revision: "rev".to_string(),
            downloaded_at: "2024-03-01T10:00:00".to_string(),
            local_path: path.to_string(),
        }
    }

    #[test]
    fn test_upsert_replaces_by_key() {
        let mut m = EnclaveManifest::new("lab");
        assert_eq!(
            m.record_download(download("a", "1111111", "data/downloads/a/v1")),
            Upsert::Inserted
        );
        let mut again = download("a", "1111111", "data/downloads/a/v2");
        again.downloaded_at = "2024-03-02T10:00:00".to_string();
        assert_eq!(m.record_download(again), Upsert::Replaced);

        assert_eq!(m.downloaded.len(), 1);
        assert_eq!(m.downloaded[0].local_path, "data/downloads/a/v2");
        assert_eq!(m.downloaded[0].downloaded_at, "2024-03-02T10:00:00");
    }

    #[test]
    fn test_upsert_distinct_keys_append() {
        let mut m = EnclaveManifest::new("lab");
        m.record_download(download("a", "1111111", "x"));
        m.record_download(download("a", "2222222", "y"));
        m.record_download(download("b", "1111111", "z"));
        assert_eq!(m.downloaded.len(), 3);
    }

    #[test]
    fn test_approve_is_idempotent() {
        let mut m = EnclaveManifest::new("lab");
        assert!(m.approve(ApprovedProduct::new("data_alpha", "final")));
        assert!(!m.approve(ApprovedProduct::new("data_alpha", "clean")));
        assert_eq!(m.approved_products.len(), 1);
        assert_eq!(
            m.approved("data_alpha").unwrap().registry_entry,
            "catalog/data/data_alpha.yaml"
        );
    }

    #[test]
    fn test_forget_version_matches_repo_and_folder() {
        let mut m = EnclaveManifest::new("lab");
        m.record_download(download("a", "1", "data/downloads/a/1111111-2024-01-01"));
        m.record_download(download("b", "1", "data/downloads/b/1111111-2024-01-01"));
        m.record_transfer(TransferRecord {
            repo: "a".into(),
            content_hash: "1".into(),
            source_revision: "r".into(),
            transfer_date: "2024-01-02".into(),
            transfer_id: "transfer-1".into(),
            local_path: "data/a/1111111-2024-01-01".into(),
        });

        let removed = m.forget_version("a", "1111111-2024-01-01");
        assert_eq!(removed, 2);
        assert_eq!(m.downloaded.len(), 1);
        assert_eq!(m.downloaded[0].repo, "b");
        assert!(m.transferred.is_empty());
    }

    #[test]
    fn test_legacy_field_names_accepted() {
        let yaml = r#"
enclave_name: lab
approved_products:
  - repo: data_alpha
downloaded:
  - repo: data_alpha
    dvc_hash: abcdef123
    git_commit: 0123abc
    downloaded_at: "2024-03-01T10:00:00"
    local_path: data/downloads/data_alpha/abcdef1-2024-03-01
notes: keep me
"#;
        let m: EnclaveManifest = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(m.approved_products[0].stage, DEFAULT_STAGE);
        assert_eq!(m.downloaded[0].content_hash, "abcdef123");
        assert_eq!(m.downloaded[0].source_revision, "0123abc");
        assert!(m.extra.contains_key("notes"));

        let out = serde_yaml::to_string(&m).unwrap();
        assert!(out.contains("content_hash"));
        assert!(out.contains("notes"));
    }
}
