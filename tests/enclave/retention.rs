//! Clean: staging removal and per-repo retention.

use std::time::{Duration, SystemTime};

use crate::common::{aged_dir, dir_modified_at, Lab};
use mintd_core::{CoreError, DownloadRecord, TransferRecord};
use mintd_engine::{CleanOptions, EnclaveError};

const VERSIONS: [(&str, u64); 5] = [
    ("1111111-2024-01-01", 500),
    ("2222222-2024-01-02", 400),
    ("3333333-2024-01-03", 300),
    ("4444444-2024-01-04", 200),
    ("5555555-2024-01-05", 100),
];

fn lab_with_versions() -> Lab {
    let lab = Lab::new();
    for (folder, age) in VERSIONS {
        aged_dir(lab.root(), &format!("data/downloads/data_claims/{}", folder), age);
    }
    lab.enclave
        .store()
        .update(|m| {
            for (folder, _) in VERSIONS {
                m.record_download(DownloadRecord {
                    repo: "data_claims".into(),
                    content_hash: folder[..7].to_string(),
                    source_revision: "r".into(),
                    downloaded_at: "2024-01-05T00:00:00".into(),
                    local_path: format!("data/downloads/data_claims/{}", folder),
                });
            }
            Ok::<_, CoreError>(())
        })
        .unwrap();
    aged_dir(lab.root(), "data/staging/data_claims/.git", 0);
    lab
}

#[test]
fn keeps_newest_versions_and_forgets_the_rest() {
    let lab = lab_with_versions();
    let report = lab
        .enclave
        .clean(&CleanOptions {
            keep: 2,
            staging_only: false,
        })
        .unwrap();

    assert_eq!(report.staging_removed, vec!["data_claims".to_string()]);
    let mut removed: Vec<_> = report.versions_removed.iter().map(|v| v.version.clone()).collect();
    removed.sort();
    assert_eq!(
        removed,
        vec!["1111111-2024-01-01", "2222222-2024-01-02", "3333333-2024-01-03"]
    );
    assert_eq!(report.manifest_entries_removed, 3);

    let downloads = lab.root().join("data/downloads/data_claims");
    assert!(downloads.join("4444444-2024-01-04").is_dir());
    assert!(downloads.join("5555555-2024-01-05").is_dir());
    assert!(!downloads.join("1111111-2024-01-01").exists());
    assert!(!lab.root().join("data/staging/data_claims").exists());

    let kept: Vec<_> = lab
        .enclave
        .manifest()
        .unwrap()
        .downloaded
        .into_iter()
        .map(|d| d.content_hash)
        .collect();
    assert_eq!(kept, vec!["4444444", "5555555"]);
}

#[test]
fn staging_only_touches_no_versions() {
    let lab = lab_with_versions();
    let report = lab
        .enclave
        .clean(&CleanOptions {
            keep: 1,
            staging_only: true,
        })
        .unwrap();
    assert_eq!(report.staging_removed.len(), 1);
    assert!(report.versions_removed.is_empty());
    assert_eq!(lab.enclave.manifest().unwrap().downloaded.len(), 5);
}

#[test]
fn clean_twice_is_a_no_op() {
    let lab = lab_with_versions();
    lab.enclave.clean(&CleanOptions::default()).unwrap();
    let again = lab.enclave.clean(&CleanOptions::default()).unwrap();
    assert!(again.staging_removed.is_empty());
    assert!(again.versions_removed.is_empty());
    assert_eq!(again.manifest_entries_removed, 0);
}

#[test]
fn keep_zero_is_rejected() {
    let lab = lab_with_versions();
    let err = lab
        .enclave
        .clean(&CleanOptions {
            keep: 0,
            staging_only: false,
        })
        .unwrap_err();
    assert!(matches!(err, EnclaveError::Validation(_)));
    assert_eq!(lab.enclave.manifest().unwrap().downloaded.len(), 5);
}

#[test]
fn received_versions_are_pruned_with_their_transfer_records() {
    let lab = Lab::new();
    let base = SystemTime::now() - Duration::from_secs(1_000);
    // newest first; the two older folders share an mtime
    let received = [
        ("7777777-2024-02-01", base),
        ("8888888-2024-02-02", base - Duration::from_secs(100)),
        ("9999999-2024-02-03", base - Duration::from_secs(100)),
    ];
    for (folder, when) in received {
        dir_modified_at(lab.root(), &format!("data/data_vitals/{}", folder), when);
    }
    lab.enclave
        .store()
        .update(|m| {
            for (folder, _) in received {
                m.record_transfer(TransferRecord {
                    repo: "data_vitals".into(),
                    content_hash: folder[..7].to_string(),
                    source_revision: "r".into(),
                    transfer_date: "2024-02-10".into(),
                    transfer_id: "transfer-1".into(),
                    local_path: format!("data/data_vitals/{}", folder),
                });
            }
            Ok::<_, CoreError>(())
        })
        .unwrap();

    let report = lab
        .enclave
        .clean(&CleanOptions {
            keep: 2,
            staging_only: false,
        })
        .unwrap();

    let removed: Vec<_> = report.versions_removed.iter().map(|v| v.version.as_str()).collect();
    assert_eq!(removed, vec!["9999999-2024-02-03"]);
    assert_eq!(report.manifest_entries_removed, 1);

    let data = lab.root().join("data/data_vitals");
    assert!(data.join("7777777-2024-02-01").is_dir());
    assert!(data.join("8888888-2024-02-02").is_dir());
    assert!(!data.join("9999999-2024-02-03").exists());

    let kept: Vec<_> = lab
        .enclave
        .manifest()
        .unwrap()
        .transferred
        .into_iter()
        .map(|t| t.content_hash)
        .collect();
    assert_eq!(kept, vec!["7777777", "8888888"]);
}
