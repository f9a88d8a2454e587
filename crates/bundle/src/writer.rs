//! Transfer bundle writer
//!
//! Creates `.tar.zst` archives containing:
//! - `_transfer_manifest.json` - provenance of every carried version (first entry)
//! - `<repo>/<version>/...` - the promoted data directories

use crate::error::{BundleError, BundleResult};
use crate::types::{is_plain_component, xxh3_file, BundleInfo, BundleItem, BundleOptions, TransferManifest, TRANSFER_MANIFEST_FILE};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tar::{Builder, Header};
use tracing::debug;

/// Writer for transfer bundles
///
/// Creates `.tar.zst` files with atomic write semantics.
pub struct TransferBundleWriter {
    compression_level: i32,
}

impl TransferBundleWriter {
    /// Create a new writer with the given options
    pub fn new(options: &BundleOptions) -> Self {
        Self {
            compression_level: options.compression_level,
        }
    }

    /// Create a new writer with default options
    pub fn with_defaults() -> Self {
        Self::new(&BundleOptions::default())
    }

    /// Write a complete bundle
    ///
    /// The manifest's `contents` are rebuilt from `items`, in order. Either
    /// the complete archive is written or no file is left behind.
    pub fn write(
        &self,
        mut manifest: TransferManifest,
        items: &[BundleItem],
        path: &Path,
    ) -> BundleResult<BundleInfo> {
        if items.is_empty() {
            return Err(BundleError::invalid_bundle("no versions to bundle"));
        }
        for item in items {
            validate_component(&item.entry.repo)?;
            validate_component(&item.entry.version_folder)?;
            if !item.source_dir.is_dir() {
                return Err(BundleError::invalid_bundle(format!(
                    "source directory missing: {}",
                    item.source_dir.display()
                )));
            }
        }
        manifest.contents = items.iter().map(|i| i.entry.clone()).collect();

        let temp_path = path.with_extension("tmp");

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        match self.write_inner(&manifest, items, &temp_path) {
            Ok(()) => {
                fs::rename(&temp_path, path)?;
            }
            Err(e) => {
                let _ = fs::remove_file(&temp_path);
                return Err(e);
            }
        }

        let bundle_size_bytes = fs::metadata(path)?.len();
        let checksum = xxh3_file(path)?;
        debug!(
            target: "mintd::bundle",
            path = %path.display(),
            entries = items.len(),
            bytes = bundle_size_bytes,
            "Bundle written"
        );

        Ok(BundleInfo {
            path: path.to_path_buf(),
            transfer_id: manifest.transfer_id,
            entry_count: items.len(),
            bundle_size_bytes,
            checksum,
        })
    }

    fn write_inner(
        &self,
        manifest: &TransferManifest,
        items: &[BundleItem],
        path: &Path,
    ) -> BundleResult<()> {
        let manifest_json = serde_json::to_vec_pretty(manifest)?;

        let file = File::create(path)?;
        let buf_writer = BufWriter::new(file);
        let zstd_writer = zstd::Encoder::new(buf_writer, self.compression_level)
            .map_err(|e| BundleError::compression(format!("zstd encoder: {}", e)))?;

        let mut tar_builder = Builder::new(zstd_writer);
        tar_builder.follow_symlinks(false);

        self.add_file(&mut tar_builder, TRANSFER_MANIFEST_FILE, &manifest_json)?;

        for item in items {
            let arc_dir = item.entry.archive_dir();
            tar_builder
                .append_dir_all(&arc_dir, &item.source_dir)
                .map_err(|e| BundleError::archive(format!("append '{}': {}", arc_dir, e)))?;
        }

        let zstd_writer = tar_builder
            .into_inner()
            .map_err(|e| BundleError::archive(format!("tar finish: {}", e)))?;
        let mut buf_writer = zstd_writer
            .finish()
            .map_err(|e| BundleError::compression(format!("zstd finish: {}", e)))?;
        buf_writer.flush()?;
        let file = buf_writer
            .into_inner()
            .map_err(|e| BundleError::Io(e.into_error()))?;
        file.sync_all()?;
        Ok(())
    }

    /// Add an in-memory file to the tar archive
    fn add_file<W: Write>(
        &self,
        builder: &mut Builder<W>,
        path: &str,
        data: &[u8],
    ) -> BundleResult<()> {
        let mut header = Header::new_gnu();
        header
            .set_path(path)
            .map_err(|e| BundleError::archive(format!("set path '{}': {}", path, e)))?;
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_cksum();

        builder
            .append(&header, data)
            .map_err(|e| BundleError::archive(format!("append '{}': {}", path, e)))?;

        Ok(())
    }
}

/// A repo or version name must be a single plain path component
fn validate_component(name: &str) -> BundleResult<()> {
    if is_plain_component(name) {
        Ok(())
    } else {
        Err(BundleError::invalid_bundle(format!(
            "'{}' is not a plain directory name",
            name
        )))
    }
}
