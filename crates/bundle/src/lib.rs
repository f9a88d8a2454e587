//! Transfer bundles: portable archives that carry promoted data versions
//! across a network-isolation boundary.
//!
//! ## Archive Structure
//!
//! ```text
//! transfer-2024-03-02-101500.tar.zst
//! ├── _transfer_manifest.json   # enclave, transfer id/date, carried versions
//! ├── data_alpha/
//! │   └── 1111111-2024-03-01/   # promoted stage output
//! └── data_beta/
//!     └── 2222222-2024-03-01/
//! ```
//!
//! The manifest is always the first entry. Its name cannot collide with a
//! repository directory because repository identifiers never start with `_`.
//!
//! ## Usage
//!
//! ```ignore
//! let info = TransferBundleWriter::with_defaults().write(manifest, &items, &path)?;
//! let manifest = TransferBundleReader::extract_to(&path, &workdir)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod reader;
pub mod types;
pub mod writer;

pub use error::{BundleError, BundleResult};
pub use reader::TransferBundleReader;
pub use types::{
    xxh3_file, xxh3_hex, BundleInfo, BundleItem, BundleOptions, ManifestEntry, TransferManifest,
    BUNDLE_EXTENSION, BUNDLE_FORMAT_VERSION, LEGACY_MANIFEST_FILE, TRANSFER_MANIFEST_FILE,
};
pub use writer::TransferBundleWriter;
