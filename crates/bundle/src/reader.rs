//! Transfer bundle reader
//!
//! Reads `.tar.zst` transfer bundles and pre-extracted bundle directories.

use crate::error::{BundleError, BundleResult};
use crate::types::{TransferManifest, LEGACY_MANIFEST_FILE, TRANSFER_MANIFEST_FILE};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;
use tar::Archive;
use tracing::debug;
use zstd::Decoder;

/// Reader for transfer bundles
pub struct TransferBundleReader;

impl TransferBundleReader {
    /// Read and parse the embedded manifest without extracting data
    pub fn read_manifest(path: &Path) -> BundleResult<TransferManifest> {
        let mut archive = Self::open(path)?;

        for entry in archive
            .entries()
            .map_err(|e| BundleError::archive(e.to_string()))?
        {
            let mut entry = entry.map_err(|e| BundleError::archive(e.to_string()))?;
            let entry_path = entry
                .path()
                .map_err(|e| BundleError::archive(e.to_string()))?
                .to_string_lossy()
                .to_string();

            if is_manifest_entry(&entry_path) {
                let mut data = Vec::new();
                entry
                    .read_to_end(&mut data)
                    .map_err(|e| BundleError::archive(format!("read manifest: {}", e)))?;
                return parse_json(&data);
            }
        }

        Err(BundleError::ManifestMissing(path.display().to_string()))
    }

    /// Extract every data entry into `dest` and return the parsed manifest.
    ///
    /// The manifest itself is parsed in memory and not written to `dest`.
    /// Entries that would escape `dest` abort the extraction with
    /// [`BundleError::UnsafePath`]. Data already written stays in `dest`;
    /// callers own its cleanup.
    pub fn extract_to(path: &Path, dest: &Path) -> BundleResult<TransferManifest> {
        fs::create_dir_all(dest)?;
        let mut archive = Self::open(path)?;
        let mut manifest = None;
        let mut count = 0usize;

        for entry in archive
            .entries()
            .map_err(|e| BundleError::archive(e.to_string()))?
        {
            let mut entry = entry.map_err(|e| BundleError::archive(e.to_string()))?;
            let entry_path = entry
                .path()
                .map_err(|e| BundleError::archive(e.to_string()))?
                .to_string_lossy()
                .to_string();

            if is_manifest_entry(&entry_path) {
                let mut data = Vec::new();
                entry
                    .read_to_end(&mut data)
                    .map_err(|e| BundleError::archive(format!("read manifest: {}", e)))?;
                manifest = Some(parse_json(&data)?);
                continue;
            }

            let unpacked = entry
                .unpack_in(dest)
                .map_err(|e| BundleError::archive(format!("unpack '{}': {}", entry_path, e)))?;
            if !unpacked {
                return Err(BundleError::UnsafePath(entry_path));
            }
            count += 1;
        }

        debug!(
            target: "mintd::bundle",
            bundle = %path.display(),
            dest = %dest.display(),
            entries = count,
            "Bundle extracted"
        );

        manifest.ok_or_else(|| BundleError::ManifestMissing(path.display().to_string()))
    }

    /// Read the manifest of a pre-extracted bundle directory.
    ///
    /// Accepts the current JSON manifest and the legacy YAML one.
    pub fn read_manifest_dir(dir: &Path) -> BundleResult<TransferManifest> {
        let json_path = dir.join(TRANSFER_MANIFEST_FILE);
        if json_path.is_file() {
            return parse_json(&fs::read(&json_path)?);
        }
        let yaml_path = dir.join(LEGACY_MANIFEST_FILE);
        if yaml_path.is_file() {
            let data = fs::read(&yaml_path)?;
            let manifest: TransferManifest = serde_yaml::from_slice(&data)
                .map_err(|e| BundleError::InvalidManifest(e.to_string()))?;
            manifest.check_paths()?;
            return Ok(manifest);
        }
        Err(BundleError::ManifestMissing(dir.display().to_string()))
    }

    fn open(path: &Path) -> BundleResult<Archive<Decoder<'static, BufReader<BufReader<File>>>>> {
        let file = File::open(path)?;
        let buf_reader = BufReader::new(file);
        let decoder = Decoder::new(buf_reader)
            .map_err(|e| BundleError::compression(format!("zstd decode: {}", e)))?;
        Ok(Archive::new(decoder))
    }
}

fn is_manifest_entry(entry_path: &str) -> bool {
    entry_path.trim_start_matches("./") == TRANSFER_MANIFEST_FILE
}

fn parse_json(data: &[u8]) -> BundleResult<TransferManifest> {
    let manifest: TransferManifest =
        serde_json::from_slice(data).map_err(|e| BundleError::InvalidManifest(e.to_string()))?;
    manifest.check_paths()?;
    Ok(manifest)
}
