//! Advisory locking of the enclave manifest.

use std::time::Duration;

use crate::common::Lab;
use mintd_core::{CoreError, LockPolicy, StateFile, ENCLAVE_MANIFEST_FILE};
use mintd_engine::{Enclave, EnclaveError};

fn impatient(lab: &Lab) -> Enclave {
    Enclave::open(lab.root()).unwrap().with_lock_policy(LockPolicy {
        attempts: 3,
        backoff: Duration::from_millis(5),
    })
}

#[test]
fn held_lock_makes_writers_give_up() {
    let lab = Lab::new();
    let held = StateFile::yaml(lab.root().join(ENCLAVE_MANIFEST_FILE))
        .lock()
        .unwrap();

    let err = impatient(&lab).add("data_claims", "final").unwrap_err();
    assert!(err.suggestion().is_some());
    match err {
        EnclaveError::Core(CoreError::Locked { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("expected lock timeout, got {:?}", other),
    }
    assert!(lab.enclave.manifest().unwrap().approved_products.is_empty());

    drop(held);
    assert!(impatient(&lab).add("data_claims", "final").unwrap().is_none());
    assert_eq!(lab.enclave.manifest().unwrap().approved_products.len(), 1);
}

#[test]
fn readers_do_not_need_the_lock() {
    let lab = Lab::new();
    lab.enclave.add("data_claims", "final").unwrap();
    let _held = StateFile::yaml(lab.root().join(ENCLAVE_MANIFEST_FILE))
        .lock()
        .unwrap();
    assert_eq!(impatient(&lab).list(None).unwrap().len(), 1);
}
