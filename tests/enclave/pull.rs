//! Pull/promote against fake registry, git and dvc.

use crate::common::{version_of, Lab};
use mintd_core::Upsert;
use mintd_engine::{EnclaveError, PullTarget};

const HASH_A: &str = "a1b2c3d4e5f60718293a4b5c6d7e8f90";
const HASH_B: &str = "b2c3d4e5f60718293a4b5c6d7e8f90a1";

#[test]
fn pull_promotes_stage_and_records_download() {
    let lab = Lab::new();
    lab.publish("data_claims", HASH_A);
    lab.enclave.add("data_claims", "final").unwrap();

    let report = lab.enclave.pull(&lab.context(), PullTarget::Default).unwrap();
    assert!(report.is_success());
    let pulled: Vec<_> = report.succeeded().collect();
    assert_eq!(pulled.len(), 1);
    assert_eq!(pulled[0].version.as_str(), version_of(HASH_A));
    assert_eq!(pulled[0].content_hash, HASH_A);
    assert_eq!(pulled[0].upsert, Upsert::Inserted);

    let promoted = lab
        .root()
        .join("data/downloads/data_claims")
        .join(version_of(HASH_A))
        .join("final/rows.csv");
    assert!(promoted.is_file());

    let remotes = lab.dvc.remotes();
    assert_eq!(remotes.len(), 1);
    assert_eq!(remotes[0].1, "s3://lab-data/data_claims");
    assert_eq!(
        lab.git.cloned_urls(),
        vec!["git@github.com:lab/data_claims.git".to_string()]
    );

    let manifest = lab.enclave.manifest().unwrap();
    assert_eq!(manifest.downloaded.len(), 1);
    assert_eq!(
        manifest.downloaded[0].local_path,
        format!("data/downloads/data_claims/{}", version_of(HASH_A))
    );
}

#[test]
fn repull_of_same_content_replaces_record() {
    let lab = Lab::new();
    lab.publish("data_claims", HASH_A);
    lab.enclave.add("data_claims", "final").unwrap();

    lab.enclave.pull(&lab.context(), PullTarget::Default).unwrap();
    let again = lab.enclave.pull(&lab.context(), PullTarget::Default).unwrap();
    let pulled: Vec<_> = again.succeeded().collect();
    assert_eq!(pulled[0].upsert, Upsert::Replaced);
    assert_eq!(lab.enclave.manifest().unwrap().downloaded.len(), 1);
}

#[test]
fn new_content_adds_a_second_version() {
    let lab = Lab::new();
    lab.publish("data_claims", HASH_A);
    lab.enclave.add("data_claims", "final").unwrap();
    lab.enclave.pull(&lab.context(), PullTarget::Default).unwrap();

    lab.publish("data_claims", HASH_B);
    lab.enclave.pull(&lab.context(), PullTarget::Default).unwrap();

    let manifest = lab.enclave.manifest().unwrap();
    assert_eq!(manifest.downloaded.len(), 2);
    for hash in [HASH_A, HASH_B] {
        assert!(lab
            .root()
            .join("data/downloads/data_claims")
            .join(version_of(hash))
            .is_dir());
    }
}

#[test]
fn pull_all_continues_past_a_failing_repo() {
    let lab = Lab::new();
    lab.publish("data_claims", HASH_A);
    lab.publish("data_vitals", HASH_B);
    lab.enclave.add("data_claims", "final").unwrap();
    lab.enclave.add("data_vitals", "final").unwrap();
    lab.dvc.fail_pull("data_claims");

    let report = lab.enclave.pull(&lab.context(), PullTarget::All).unwrap();
    assert!(!report.is_success());

    let failed: Vec<_> = report.failed().map(|(repo, _)| repo).collect();
    assert_eq!(failed, vec!["data_claims"]);
    let ok: Vec<_> = report.succeeded().map(|v| v.repo.as_str()).collect();
    assert_eq!(ok, vec!["data_vitals"]);

    let manifest = lab.enclave.manifest().unwrap();
    assert_eq!(manifest.downloaded.len(), 1);
    assert_eq!(manifest.downloaded[0].repo, "data_vitals");
}

#[test]
fn default_target_needs_exactly_one_approval() {
    let lab = Lab::new();
    let err = lab
        .enclave
        .pull(&lab.context(), PullTarget::Default)
        .unwrap_err();
    assert!(matches!(err, EnclaveError::NoApprovedProducts));

    lab.enclave.add("data_claims", "final").unwrap();
    lab.enclave.add("data_vitals", "final").unwrap();
    let err = lab
        .enclave
        .pull(&lab.context(), PullTarget::Default)
        .unwrap_err();
    assert!(matches!(err, EnclaveError::AmbiguousTarget { .. }));
}

#[test]
fn unapproved_repo_is_rejected_before_any_clone() {
    let lab = Lab::new();
    lab.publish("data_claims", HASH_A);
    lab.enclave.add("data_vitals", "final").unwrap();

    let err = lab
        .enclave
        .pull(&lab.context(), PullTarget::Repo("data_claims".into()))
        .unwrap_err();
    assert!(matches!(err, EnclaveError::NotApproved { .. }));
    assert!(lab.git.cloned_urls().is_empty());
}

#[test]
fn product_missing_from_registry_fails_that_repo() {
    let lab = Lab::new();
    lab.enclave.add("data_ghost", "final").unwrap();

    let report = lab.enclave.pull(&lab.context(), PullTarget::Default).unwrap();
    let failures: Vec<_> = report.failed().collect();
    assert_eq!(failures.len(), 1);
    assert!(matches!(failures[0].1, EnclaveError::ProductNotFound { .. }));
}
