//! Multi-product data import into an analysis project.

#[path = "../common/mod.rs"]
mod common;

use std::fs;
use std::path::Path;

use common::{FakeDvc, FakeRegistry};
use mintd_core::{DescriptorStore, PROJECT_DESCRIPTOR_FILE};
use mintd_engine::import::state_path;
use mintd_engine::{DataImporter, ImportError, ImportRequest, ImportTransaction};
use tempfile::TempDir;

const DESCRIPTOR: &str = r#"{
  "project": {"name": "readmit", "type": "project", "full_name": "prj_readmit"},
  "metadata": {"description": "Readmission risk study", "data_dependencies": []},
  "ownership": {"created_by": "mz"}
}"#;

fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(PROJECT_DESCRIPTOR_FILE), DESCRIPTOR).unwrap();
    dir
}

fn registry() -> FakeRegistry {
    let registry = FakeRegistry::new();
    registry.add_data_product("data_claims", "https://github.com/lab/data_claims", None);
    registry.add_data_product("data_vitals", "https://github.com/lab/data_vitals", None);
    registry
}

fn dependency_sources(project: &Path) -> Vec<String> {
    DescriptorStore::for_project(project)
        .load()
        .unwrap()
        .dependencies()
        .iter()
        .map(|d| d.source.clone())
        .collect()
}

#[test]
fn one_failure_does_not_stop_the_others() {
    let dir = project();
    let registry = registry();
    let dvc = FakeDvc::new();
    dvc.fail_import("data_claims");
    let importer = DataImporter::new(dir.path(), &registry, &dvc).unwrap();

    let report = importer
        .import_all(&[
            ImportRequest::new("data_claims"),
            ImportRequest::new("data_vitals"),
        ])
        .unwrap();

    let summary = report.summary();
    assert_eq!((summary.total, summary.successful, summary.failed), (2, 1, 1));
    assert!(!report.is_success());
    assert!(matches!(
        report.imports[0].result,
        Err(ImportError::ContentImport { .. })
    ));
    assert_eq!(dependency_sources(dir.path()), vec!["data_vitals"]);
    assert!(dir.path().join("data/imports/vitals.dvc").is_file());

    // kept for inspection while anything failed
    assert!(state_path(dir.path()).is_file());
    let mut restored = ImportTransaction::new(dir.path());
    assert!(restored.load_state().unwrap());
    assert_eq!(restored.failed()[0].product_name, "data_claims");
    assert!(restored.failed()[0].error_message.is_some());
    assert_eq!(restored.completed()[0].product_name, "data_vitals");
}

#[test]
fn full_success_removes_the_snapshot() {
    let dir = project();
    let registry = registry();
    let dvc = FakeDvc::new();
    let importer = DataImporter::new(dir.path(), &registry, &dvc).unwrap();

    let report = importer
        .import_all(&[
            ImportRequest::new("data_claims"),
            ImportRequest {
                rev: Some("v1.2.0".into()),
                ..ImportRequest::new("data_vitals")
            },
        ])
        .unwrap();
    assert!(report.is_success());
    assert!(!state_path(dir.path()).exists());

    let deps = DescriptorStore::for_project(dir.path()).load().unwrap();
    let vitals = &deps.dependencies()[1];
    assert_eq!(vitals.source_revision, "v1.2.0");
    assert_eq!(vitals.local_path, "data/imports/vitals/");
    assert_eq!(vitals.artifact_pointer, "data/imports/vitals.dvc");
    assert_eq!(vitals.stage, "final");

    let calls = dvc.imports();
    assert_eq!(calls[0].url, "git@github.com:lab/data_claims.git");
    assert_eq!(calls[0].source_path, "data/final/");
}

#[test]
fn reimport_replaces_the_dependency() {
    let dir = project();
    let registry = registry();
    let dvc = FakeDvc::new();
    let importer = DataImporter::new(dir.path(), &registry, &dvc).unwrap();

    importer.import(&ImportRequest::new("data_claims")).unwrap();
    let again = importer
        .import(&ImportRequest {
            rev: Some("abc123".into()),
            ..ImportRequest::new("data_claims")
        })
        .unwrap();
    assert_eq!(again.upsert, Some(mintd_core::Upsert::Replaced));
    assert_eq!(dependency_sources(dir.path()), vec!["data_claims"]);
}

#[test]
fn rollback_removes_imported_data() {
    let dir = project();
    let registry = registry();
    let dvc = FakeDvc::new();
    let importer = DataImporter::new(dir.path(), &registry, &dvc).unwrap();

    let mut report = importer
        .import_all(&[ImportRequest::new("data_claims")])
        .unwrap();
    let imported = dir.path().join("data/imports/claims");
    assert!(imported.is_dir());

    assert_eq!(dependency_sources(dir.path()), vec!["data_claims"]);

    assert_eq!(report.transaction.rollback(), 0);
    assert!(!imported.exists());
    assert!(!dir.path().join("data/imports/claims.dvc").exists());
    assert!(dependency_sources(dir.path()).is_empty());
}

#[test]
fn unknown_product_lists_what_is_available() {
    let dir = project();
    let registry = registry();
    let dvc = FakeDvc::new();
    let importer = DataImporter::new(dir.path(), &registry, &dvc).unwrap();

    let err = importer
        .import(&ImportRequest::new("data_missing"))
        .unwrap_err();
    let hint = err.suggestion().unwrap();
    assert!(hint.contains("data_claims"));
    assert!(dvc.imports().is_empty());
}
