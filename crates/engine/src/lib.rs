//! Operations for mintd
//!
//! This crate drives the versioned data-product lifecycle on top of the
//! state and bundle crates:
//! - Enclave: approve, pull/promote, package, unpack/verify, clean
//! - Import: data products into analysis projects, with a recovery snapshot
//! - Fetch: one-off copies of a product's data
//! - Registry: catalog lookup, registration, catalog diff/update
//! - Tools: git, dvc and gh behind traits, with timeouts
//!
//! External collaborators are reached only through the traits in [`tools`]
//! and [`registry::Registry`], so every operation can run against the fakes
//! in `testing` (enabled by the `testing` feature).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog_update;
pub mod config;
pub mod enclave;
pub mod error;
pub mod fetch;
pub mod import;
pub mod registry;
pub mod tools;

#[cfg(any(test, feature = "testing"))]
#[allow(missing_docs)]
pub mod testing;

pub use catalog_update::{update_catalog_entry, update_project, CatalogUpdate};
pub use config::{default_config_path, mintd_home, MintConfig, CONFIG_ENV_VAR};
pub use enclave::{
    unpack, CleanOptions, CleanReport, Enclave, EnclaveWarning, PackageOptions, PackageReport,
    ProductListing, PullReport, PullTarget, SyncContext, VerifyReport,
};
pub use error::{
    CatalogUpdateError, ConfigError, EnclaveError, EnclaveResult, ImportError, RegistryError,
    RegistryResult, ToolError, ToolResult,
};
pub use fetch::{fetch_product, FetchOutcome, FetchRequest};
pub use import::{DataImporter, ImportReport, ImportRequest, ImportResult, ImportTransaction};
pub use registry::{GitRegistry, PendingRegistrations, Registry, RegistrationStatus};
pub use tools::{ContentTracker, Dvc, Gh, Git, HostingPlatform, SourceControl};
