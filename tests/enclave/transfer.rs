//! Package → unpack/verify across the enclave boundary.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use crate::common::{version_of, Lab};
use mintd_bundle::{ManifestEntry, TransferManifest, TRANSFER_MANIFEST_FILE};
use mintd_engine::{unpack, EnclaveError, EnclaveWarning, PackageOptions, PullTarget};

const HASH: &str = "c0ffee00112233445566778899aabbcc";

fn pulled_lab() -> Lab {
    let lab = Lab::new();
    lab.publish("data_claims", HASH);
    lab.enclave.add("data_claims", "final").unwrap();
    lab.enclave.pull(&lab.context(), PullTarget::Default).unwrap();
    lab
}

/// Every file under `dir`, keyed by its path relative to `dir`
fn tree(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<String, Vec<u8>>) {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                let rel = path.strip_prefix(root).unwrap().to_string_lossy().into_owned();
                out.insert(rel, fs::read(&path).unwrap());
            }
        }
    }
    let mut out = BTreeMap::new();
    walk(dir, dir, &mut out);
    out
}

fn package(lab: &Lab, name: &str) -> mintd_engine::PackageReport {
    lab.enclave
        .package(&PackageOptions {
            name: Some(name.to_string()),
            ..PackageOptions::default()
        })
        .unwrap()
}

#[test]
fn package_then_verify_installs_in_receiving_enclave() {
    let lab = pulled_lab();
    let report = package(&lab, "transfer-1");
    assert_eq!(report.bundle.entry_count, 1);
    assert_eq!(report.bundle.path, lab.root().join("transfers/transfer-1.tar.zst"));
    assert!(report.bundle.path.is_file());
    assert_eq!(report.bundle.checksum.len(), 16);
    assert!(report.warnings.is_empty());

    let inside = lab.receiving_enclave("inside");
    let verified = inside.verify(&report.bundle.path).unwrap();
    assert_eq!(verified.transfer_id, "transfer-1");
    assert_eq!(verified.installed.len(), 1);
    // packaged for "lab", received by "inside"
    assert!(matches!(
        verified.warnings.as_slice(),
        [EnclaveWarning::EnclaveMismatch { .. }]
    ));

    let installed = inside
        .root()
        .join("data/data_claims")
        .join(version_of(HASH))
        .join("final/rows.csv");
    let staged = lab
        .root()
        .join("data/downloads/data_claims")
        .join(version_of(HASH))
        .join("final/rows.csv");
    assert_eq!(fs::read(&installed).unwrap(), fs::read(&staged).unwrap());

    let manifest = inside.manifest().unwrap();
    assert_eq!(manifest.transferred.len(), 1);
    assert_eq!(manifest.transferred[0].content_hash, HASH);
    assert_eq!(manifest.transferred[0].transfer_id, "transfer-1");
}

#[test]
fn every_packaged_version_arrives_intact() {
    const CLAIMS_A: &str = "aaaa111122223333444455556666777a";
    const CLAIMS_B: &str = "bbbb111122223333444455556666777b";
    const VITALS: &str = "cccc111122223333444455556666777c";

    let lab = Lab::new();
    lab.publish("data_claims", CLAIMS_A);
    lab.publish("data_vitals", VITALS);
    lab.enclave.add("data_claims", "final").unwrap();
    lab.enclave.add("data_vitals", "final").unwrap();
    assert!(lab
        .enclave
        .pull(&lab.context(), PullTarget::All)
        .unwrap()
        .is_success());
    lab.publish("data_claims", CLAIMS_B);
    lab.enclave
        .pull(&lab.context(), PullTarget::Repo("data_claims".into()))
        .unwrap();

    let downloaded = lab.enclave.manifest().unwrap().downloaded;
    assert_eq!(downloaded.len(), 3);

    let report = package(&lab, "transfer-1");
    assert_eq!(report.bundle.entry_count, 3);
    let inside = lab.receiving_enclave("lab-inside");
    let verified = inside.verify(&report.bundle.path).unwrap();
    assert_eq!(verified.installed.len(), 3);

    let sent: BTreeSet<_> = downloaded
        .iter()
        .map(|d| (d.repo.clone(), d.content_hash.clone(), d.source_revision.clone()))
        .collect();
    let received: BTreeSet<_> = inside
        .manifest()
        .unwrap()
        .transferred
        .into_iter()
        .map(|t| (t.repo, t.content_hash, t.source_revision))
        .collect();
    assert_eq!(sent, received);

    for record in &downloaded {
        let staged = lab.root().join(&record.local_path);
        let folder = staged.file_name().unwrap();
        let installed = inside.root().join("data").join(&record.repo).join(folder);
        let files = tree(&staged);
        assert!(!files.is_empty());
        assert_eq!(tree(&installed), files, "{}", record.local_path);
    }
}

#[test]
fn unpack_then_verify_directory() {
    let lab = pulled_lab();
    let report = package(&lab, "transfer-1");

    let dest = lab.tmp.path().join("extracted");
    let (dir, manifest) = unpack(&report.bundle.path, Some(&dest)).unwrap();
    assert_eq!(dir, dest);
    assert_eq!(manifest.contents.len(), 1);
    assert!(dest.join(TRANSFER_MANIFEST_FILE).is_file());

    let inside = lab.receiving_enclave("lab-inside");
    let verified = inside.verify(&dest).unwrap();
    assert_eq!(verified.installed.len(), 1);
    assert_eq!(inside.list(None).unwrap().len(), 0);
    assert_eq!(inside.manifest().unwrap().transferred.len(), 1);
}

#[test]
fn second_crossing_of_same_content_warns() {
    let lab = pulled_lab();
    let first = package(&lab, "transfer-1");
    lab.enclave.verify(&first.bundle.path).unwrap();

    let repull = lab.enclave.pull(&lab.context(), PullTarget::Default).unwrap();
    let pulled: Vec<_> = repull.succeeded().collect();
    match pulled[0].warnings.as_slice() {
        [EnclaveWarning::AlreadyTransferred { transfer_id, .. }] => {
            assert_eq!(transfer_id, "transfer-1")
        }
        other => panic!("expected one transfer warning, got {:?}", other),
    }

    let second = package(&lab, "transfer-2");
    assert!(second
        .warnings
        .iter()
        .any(|w| matches!(w, EnclaveWarning::AlreadyTransferred { transfer_id, .. } if transfer_id == "transfer-1")));
    assert!(second.bundle.path.is_file());
}

#[test]
fn package_skips_versions_missing_on_disk() {
    let lab = pulled_lab();
    fs::remove_dir_all(lab.root().join("data/downloads/data_claims").join(version_of(HASH))).unwrap();

    let err = lab.enclave.package(&PackageOptions::default()).unwrap_err();
    assert!(matches!(err, EnclaveError::NothingToPackage));
}

#[test]
fn verify_keeps_what_was_installed_when_an_entry_is_missing() {
    let lab = Lab::new();
    let dir = lab.tmp.path().join("partial");
    let present = dir.join("data_claims/1111111-2024-03-01/final");
    fs::create_dir_all(&present).unwrap();
    fs::write(present.join("rows.csv"), "id\n1\n").unwrap();

    let mut manifest = TransferManifest::new("lab", "transfer-9", "2024-03-04T08:00:00");
    for (repo, folder, hash) in [
        ("data_claims", "1111111-2024-03-01", "1111111aaaa"),
        ("data_claims", "3333333-2024-03-02", "3333333cccc"),
        ("data_vitals", "2222222-2024-03-01", "2222222bbbb"),
    ] {
        manifest.contents.push(ManifestEntry {
            repo: repo.into(),
            version_folder: folder.into(),
            content_hash: hash.into(),
            source_revision: "deadbeef".into(),
        });
    }
    fs::write(
        dir.join(TRANSFER_MANIFEST_FILE),
        serde_json::to_string_pretty(&manifest).unwrap(),
    )
    .unwrap();

    let report = lab.enclave.verify(&dir).unwrap();
    assert_eq!(report.installed.len(), 1);
    assert_eq!(report.installed[0].version, "1111111-2024-03-01");
    let missing: Vec<_> = report
        .warnings
        .iter()
        .filter_map(|w| match w {
            EnclaveWarning::MissingBundleData { repo, version } => {
                Some((repo.as_str(), version.as_str()))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        missing,
        vec![
            ("data_claims", "3333333-2024-03-02"),
            ("data_vitals", "2222222-2024-03-01"),
        ]
    );
    assert!(!lab.root().join("data/data_claims/3333333-2024-03-02").exists());

    let recorded = lab.enclave.manifest().unwrap().transferred;
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].repo, "data_claims");
    assert_eq!(recorded[0].transfer_date, "2024-03-04");
}

#[test]
fn verify_missing_source() {
    let lab = Lab::new();
    let err = lab
        .enclave
        .verify(&lab.tmp.path().join("nope.tar.zst"))
        .unwrap_err();
    assert!(matches!(err, EnclaveError::BundleNotFound(_)));
}
