//! Core types for mintd
//!
//! This crate defines the state shared by every mintd operation:
//! - VersionId: `<hash-prefix>-<date>` name of one promoted version
//! - EnclaveManifest: approved / downloaded / transferred records of an enclave
//! - ManifestStore, DescriptorStore: locked load/update/save of state files
//! - ProjectDescriptor, DependencyRecord: the analysis project's `metadata.json`
//! - CatalogValue: typed registry catalog tree with diff and section merge
//! - CoreError: error type for all of the above

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod error;
pub mod project;
pub mod records;
pub mod store;
pub mod version;

pub use catalog::{diff, merge_sections, CatalogChange, CatalogValue, EntryKind, SYNCED_SECTIONS};
pub use error::{CoreError, CoreResult};
pub use project::{
    DependencyRecord, DescriptorStore, ProjectDescriptor, ProjectInfo, ProjectMetadata,
    IMPORTING_KINDS, PROJECT_DESCRIPTOR_FILE,
};
pub use records::{
    timestamp_now, upsert, ApprovedProduct, DownloadRecord, EnclaveManifest, TransferRecord,
    Upsert, DEFAULT_STAGE, ENCLAVE_MANIFEST_FILE,
};
pub use store::{LockPolicy, ManifestStore, StateFile, StateFormat, StateLock};
pub use version::{short_hash, VersionId, HASH_PREFIX_LEN};
