//! Transfer bundle core types
//!
//! Types for the transfer bundle archive format (`.tar.zst`)

use crate::error::{BundleError, BundleResult};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

/// Current transfer manifest format version
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

/// File extension for transfer bundles
pub const BUNDLE_EXTENSION: &str = ".tar.zst";

/// Name of the embedded transfer manifest at the archive root
pub const TRANSFER_MANIFEST_FILE: &str = "_transfer_manifest.json";

/// Manifest name used by older, pre-extracted transfers
pub const LEGACY_MANIFEST_FILE: &str = "_transfer_manifest.yaml";

fn default_format_version() -> u32 {
    BUNDLE_FORMAT_VERSION
}

// =============================================================================
// _transfer_manifest.json
// =============================================================================

/// One versioned data directory carried by a bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Repository identifier
    pub repo: String,
    /// Version directory name (`<hash-prefix>-<date>`)
    #[serde(default)]
    pub version_folder: String,
    /// Content hash of the stage output
    #[serde(alias = "dvc_hash")]
    pub content_hash: String,
    /// Source repository revision
    #[serde(alias = "git_commit", default)]
    pub source_revision: String,
}

impl ManifestEntry {
    /// Version folder, derived from hash and transfer day for entries written
    /// before the folder was recorded
    pub fn resolved_folder(&self, transfer_day: &str) -> String {
        if self.version_folder.is_empty() {
            let prefix: String = self.content_hash.chars().take(7).collect();
            format!("{}-{}", prefix, transfer_day)
        } else {
            self.version_folder.clone()
        }
    }

    /// Relative path of the entry's data inside the bundle
    pub fn archive_dir(&self) -> String {
        format!("{}/{}", self.repo, self.version_folder)
    }

    /// Reject names that would resolve outside `<root>/<repo>/<version>`.
    ///
    /// Checks the repo and the folder the entry resolves to on `transfer_day`.
    pub fn check_paths(&self, transfer_day: &str) -> BundleResult<()> {
        for name in [self.repo.clone(), self.resolved_folder(transfer_day)] {
            if !is_plain_component(&name) {
                return Err(BundleError::UnsafePath(format!(
                    "manifest entry '{}' names '{}'",
                    self.repo, name
                )));
            }
        }
        Ok(())
    }
}

/// Provenance manifest embedded in every bundle
///
/// Written first into the archive so readers can find it without scanning
/// the data entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferManifest {
    /// Format version
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    /// Name of the enclave the bundle was packaged for
    #[serde(default)]
    pub enclave_name: String,
    /// ISO 8601 timestamp of packaging
    #[serde(default)]
    pub transfer_date: String,
    /// Bundle identifier (the package name)
    #[serde(default)]
    pub transfer_id: String,
    /// Carried versions
    #[serde(default)]
    pub contents: Vec<ManifestEntry>,
}

impl TransferManifest {
    /// Create an empty manifest
    pub fn new(
        enclave_name: impl Into<String>,
        transfer_id: impl Into<String>,
        transfer_date: impl Into<String>,
    ) -> Self {
        Self {
            format_version: BUNDLE_FORMAT_VERSION,
            enclave_name: enclave_name.into(),
            transfer_date: transfer_date.into(),
            transfer_id: transfer_id.into(),
            contents: Vec::new(),
        }
    }

    /// Calendar day of the transfer (`YYYY-MM-DD` prefix of the timestamp)
    pub fn transfer_day(&self) -> &str {
        match self.transfer_date.char_indices().nth(10) {
            Some((idx, _)) => &self.transfer_date[..idx],
            None => &self.transfer_date,
        }
    }

    /// Check every entry with [`ManifestEntry::check_paths`]
    pub fn check_paths(&self) -> BundleResult<()> {
        let day = self.transfer_day();
        self.contents.iter().try_for_each(|e| e.check_paths(day))
    }
}

// =============================================================================
// Writer input / output
// =============================================================================

/// A directory to bundle together with its manifest entry
#[derive(Debug, Clone)]
pub struct BundleItem {
    /// Manifest entry describing the directory
    pub entry: ManifestEntry,
    /// Directory on disk whose contents go under `<repo>/<version>/`
    pub source_dir: PathBuf,
}

/// Information returned after writing a bundle
#[derive(Debug, Clone)]
pub struct BundleInfo {
    /// Path where the bundle was written
    pub path: PathBuf,

    /// Transfer identifier
    pub transfer_id: String,

    /// Number of versions in the bundle
    pub entry_count: usize,

    /// Size of the bundle file in bytes
    pub bundle_size_bytes: u64,

    /// xxh3 checksum of the entire bundle file
    pub checksum: String,
}

/// Options for writing bundles
#[derive(Debug, Clone)]
pub struct BundleOptions {
    /// Zstd compression level (1-22, default: 3)
    pub compression_level: i32,
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self {
            compression_level: 3,
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// True if `name` is exactly one normal path component
pub(crate) fn is_plain_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Compute xxh3 hash of data and return as hex string
pub fn xxh3_hex(data: &[u8]) -> String {
    use xxhash_rust::xxh3::xxh3_64;
    format!("{:016x}", xxh3_64(data))
}

/// Streaming xxh3 of a file, hex encoded
pub fn xxh3_file(path: &Path) -> io::Result<String> {
    let mut hasher = xxhash_rust::xxh3::Xxh3::new();
    let mut file = File::open(path)?;
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:016x}", hasher.digest()))
}
