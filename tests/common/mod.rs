//! Shared fixtures for the integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::NaiveDate;
pub use mintd_engine::testing::{FakeDvc, FakeGit, FakeRegistry};
use mintd_engine::{Enclave, SyncContext};
use tempfile::TempDir;

/// Organisation the fake data products live under
pub const ORG: &str = "https://github.com/lab";

/// Day every fixture pull is stamped with
pub fn pull_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
}

/// Version folder a pull of content `md5` produces on [`pull_date`]
pub fn version_of(md5: &str) -> String {
    format!("{}-2024-03-01", &md5[..7])
}

/// Write a data product checkout: `data/final/rows.csv` tracked by
/// `data/final.dvc` with the given content hash.
pub fn write_product(dir: &Path, repo: &str, md5: &str) {
    let data = dir.join("data");
    fs::create_dir_all(data.join("final")).unwrap();
    fs::write(data.join("final/rows.csv"), format!("source,hash\n{},{}\n", repo, md5)).unwrap();
    fs::write(
        data.join("final.dvc"),
        format!("outs:\n- md5: {}\n  size: 42\n  nfiles: 1\n  path: final\n", md5),
    )
    .unwrap();
}

/// Make a version directory `rel` under `root`, last modified `age_secs` ago
pub fn aged_dir(root: &Path, rel: &str, age_secs: u64) -> PathBuf {
    dir_modified_at(root, rel, SystemTime::now() - Duration::from_secs(age_secs))
}

/// Make a version directory `rel` under `root` with mtime exactly `when`
pub fn dir_modified_at(root: &Path, rel: &str, when: SystemTime) -> PathBuf {
    let dir = root.join(rel);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("part.csv"), "x\n").unwrap();
    fs::File::open(&dir).unwrap().set_modified(when).unwrap();
    dir
}

// ============================================================================
// Lab: an enclave plus fake collaborators
// ============================================================================

pub struct Lab {
    pub tmp: TempDir,
    pub registry: FakeRegistry,
    pub git: FakeGit,
    pub dvc: FakeDvc,
    pub enclave: Enclave,
}

impl Lab {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let enclave = Enclave::init(tmp.path().join("enclave"), "lab").unwrap();
        Self {
            tmp,
            registry: FakeRegistry::new(),
            git: FakeGit::new(),
            dvc: FakeDvc::new(),
            enclave,
        }
    }

    /// Publish `repo` with content `md5`: an origin checkout, a catalog
    /// entry and a git remote serving it. Publishing again changes content.
    pub fn publish(&self, repo: &str, md5: &str) -> PathBuf {
        let origin = self.tmp.path().join("origins").join(repo);
        write_product(&origin, repo, md5);
        self.registry.add_data_product(
            repo,
            &format!("{}/{}", ORG, repo),
            Some(&format!("s3://lab-data/{}", repo)),
        );
        self.git
            .add_remote(&format!("git@github.com:lab/{}.git", repo), &origin);
        origin
    }

    pub fn context(&self) -> SyncContext<'_> {
        SyncContext::new(&self.registry, &self.git, &self.dvc).on_date(pull_date())
    }

    pub fn root(&self) -> &Path {
        self.enclave.root()
    }

    /// A second, empty enclave in the same scratch directory
    pub fn receiving_enclave(&self, name: &str) -> Enclave {
        Enclave::init(self.tmp.path().join(name), name).unwrap()
    }
}
