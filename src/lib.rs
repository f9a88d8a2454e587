//! mintd: versioned data products for research projects and offline enclaves
//!
//! Data products live in their own repositories, are catalogued in a
//! git-backed registry, and reach air-gapped enclaves as `.tar.zst`
//! transfer bundles. This crate re-exports the three library layers:
//!
//! - [`model`]: version identifiers, the enclave manifest, project
//!   descriptors and catalog trees, with locked on-disk stores
//! - [`bundle`]: the transfer bundle archive format
//! - [`engine`]: enclave, import and registry operations over git, dvc and gh
//!
//! # Example
//!
//! ```ignore
//! use mintd::engine::{Enclave, GitRegistry, MintConfig, PullTarget, SyncContext};
//! use mintd::engine::tools::{Dvc, Git};
//!
//! let config = MintConfig::load(None)?;
//! let registry = GitRegistry::from_config(&config)?;
//! let (git, dvc) = (Git::new(config.tool_timeout()), Dvc::new(config.tool_timeout()));
//!
//! let enclave = Enclave::init("enclave", "lab")?;
//! enclave.add("data_claims", "final")?;
//! let report = enclave.pull(&SyncContext::new(&registry, &git, &dvc), PullTarget::Default)?;
//! ```

pub use mintd_bundle as bundle;
pub use mintd_core as model;
pub use mintd_engine as engine;
